use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

static CONFIG: OnceCell<Config> = OnceCell::new();

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub websocket: WebSocketConfig,
    pub game: GameConfig,
    pub log: LogConfig,
    pub security: SecurityConfig,
    pub cors: CorsConfig,
    pub word_list: WordListConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub http_port: Option<u16>, // HTTP服务器端口，如果为None则使用port
    pub ws_port: Option<u16>,   // WebSocket服务器端口，如果为None则使用port
    /// 网页客户端静态文件目录
    pub static_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    pub path: String,
    pub channel_capacity: usize,
}

/// 单局规则。单人模式与双人模式是两种部署配置，通过 required_players 区分
#[derive(Debug, Clone, Deserialize)]
pub struct GameConfig {
    /// 开局所需人数
    pub required_players: usize,
    pub max_players: usize,
    /// 每局可猜测的行数
    pub max_rows: usize,
    /// 大厅满员后延迟开局的毫秒数
    pub auto_start_delay_ms: u64,
    /// 默认房间，始终存在
    pub default_room: String,
    /// 无玩家房间的最长空闲秒数，超过后被回收
    pub room_idle_timeout_secs: u64,
    /// 空闲房间检查间隔
    pub room_cleanup_interval_secs: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        GameConfig {
            required_players: 2,
            max_players: 2,
            max_rows: 5,
            auto_start_delay_ms: 800,
            default_room: "main".to_string(),
            room_idle_timeout_secs: 600,
            room_cleanup_interval_secs: 60,
        }
    }
}

impl GameConfig {
    pub fn auto_start_delay(&self) -> Duration {
        Duration::from_millis(self.auto_start_delay_ms)
    }

    pub fn room_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.room_idle_timeout_secs)
    }

    pub fn room_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.room_cleanup_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    pub level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub guess_window_ms: u64,
    pub guess_max_actions: u32,
    pub max_name_length: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        SecurityConfig {
            guess_window_ms: 1000,
            guess_max_actions: 3,
            max_name_length: 31,
        }
    }
}

impl SecurityConfig {
    pub fn guess_window(&self) -> Duration {
        Duration::from_millis(self.guess_window_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub allow_all_origins: Option<bool>,
    pub allowed_origins: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WordListConfig {
    pub file_path: String,
}

impl Config {
    /// 内置默认值 -> config.toml（可选）-> WORDLE__ 前缀的环境变量
    pub fn load() -> Result<Self> {
        Self::load_from("config")
    }

    pub fn load_from(file_name: &str) -> Result<Self> {
        let config = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.static_dir", "static")?
            .set_default("websocket.path", "/ws")?
            .set_default("websocket.channel_capacity", 100)?
            .set_default("game.required_players", 2)?
            .set_default("game.max_players", 2)?
            .set_default("game.max_rows", 5)?
            .set_default("game.auto_start_delay_ms", 800)?
            .set_default("game.default_room", "main")?
            .set_default("game.room_idle_timeout_secs", 600)?
            .set_default("game.room_cleanup_interval_secs", 60)?
            .set_default("log.level", "info")?
            .set_default("security.guess_window_ms", 1000)?
            .set_default("security.guess_max_actions", 3)?
            .set_default("security.max_name_length", 31)?
            .set_default("cors.allow_all_origins", true)?
            .set_default("word_list.file_path", "words.json")?
            .add_source(config::File::with_name(file_name).required(false))
            .add_source(
                config::Environment::with_prefix("WORDLE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("无法加载配置: {}", file_name))?;

        let config = config.try_deserialize::<Config>()?;
        config.validate()?;
        Ok(config)
    }

    /// 初始化全局配置
    pub fn init() -> Result<()> {
        let config = Self::load()?;
        CONFIG
            .set(config)
            .map_err(|_| anyhow::anyhow!("配置已经初始化"))?;
        Ok(())
    }

    /// 获取全局配置实例
    pub fn get() -> &'static Config {
        CONFIG.get().expect("配置未初始化，请先调用 Config::init()")
    }

    fn validate(&self) -> Result<()> {
        let game = &self.game;
        if game.required_players == 0 {
            anyhow::bail!("game.required_players 至少为 1");
        }
        if game.max_players < game.required_players {
            anyhow::bail!(
                "game.max_players ({}) 不能小于 game.required_players ({})",
                game.max_players,
                game.required_players
            );
        }
        if game.max_rows == 0 {
            anyhow::bail!("game.max_rows 至少为 1");
        }
        if !self.websocket.path.starts_with('/') {
            anyhow::bail!("websocket.path 必须以 / 开头");
        }
        Ok(())
    }

    pub fn http_addr(&self) -> Result<SocketAddr> {
        let port = self.server.http_port.unwrap_or(self.server.port);
        format!("{}:{}", self.server.host, port)
            .parse()
            .with_context(|| "无效的HTTP服务器地址")
    }

    pub fn ws_addr(&self) -> Result<SocketAddr> {
        let port = self.server.ws_port.unwrap_or(self.server.port);
        format!("{}:{}", self.server.host, port)
            .parse()
            .with_context(|| "无效的WebSocket服务器地址")
    }

    /// HTTP与WebSocket是否共用同一端口
    pub fn shares_port(&self) -> bool {
        self.server.http_port.unwrap_or(self.server.port)
            == self.server.ws_port.unwrap_or(self.server.port)
    }

    pub fn log_filter(&self) -> String {
        format!("wordle_duel={}", self.log.level)
    }
}
