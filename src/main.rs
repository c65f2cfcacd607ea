use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use wordle_duel::*;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化全局配置
    Config::init()?;
    let config = Config::get();

    // 初始化日志，RUST_LOG 优先于配置文件
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter()));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("配置加载成功: {:?}", config);
    tracing::info!(
        "模式: {}",
        if config.game.required_players == 1 {
            "单人"
        } else {
            "对战"
        }
    );

    let server = WebSocketServer::new(config);
    server.start_room_cleanup();

    let http_addr = config.http_addr()?;
    let ws_addr = config.ws_addr()?;

    if config.shares_port() {
        server.start(http_addr).await?;
    } else {
        server.start_http_server(http_addr).await?;
        server.start_ws_server(ws_addr).await?;
    }

    Ok(())
}
