use crate::config::Config;
use crate::message::{ClientMessage, ErrorCode, ServerMessage};
use crate::room::{Room, RoomStatus};
use crate::security::Security;
use crate::word_list::WordList;
use crate::{Error, Result};
use axum::{
    Router,
    extract::Query,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    http::{HeaderValue, Method, StatusCode, header},
    response::{Html, IntoResponse, Json, Response},
    routing::get,
};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type Rooms = Arc<DashMap<String, Arc<Room>>>;

#[derive(Debug, Deserialize)]
struct RoomQuery {
    room_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateRoomQuery {
    room_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateRoomResponse {
    success: bool,
    room_id: Option<String>,
    message: Option<String>,
}

/// 浏览器端连接WebSocket所需的信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct ClientConfig {
    ws_path: String,
    /// 与HTTP共用端口时为空
    ws_port: Option<u16>,
}

impl ClientConfig {
    fn from_config(config: &Config) -> Self {
        ClientConfig {
            ws_path: config.websocket.path.clone(),
            ws_port: if config.shares_port() {
                None
            } else {
                Some(config.server.ws_port.unwrap_or(config.server.port))
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct RoomsStatusResponse {
    success: bool,
    total_rooms: usize,
    rooms: Vec<RoomStatus>,
}

/// 房间注册表与 HTTP/WebSocket 服务
pub struct WebSocketServer {
    rooms: Rooms,
    word_list: Arc<WordList>,
    security: Arc<Security>,
    config: Config,
}

impl WebSocketServer {
    pub fn new(config: &Config) -> Self {
        let word_list = Arc::new(WordList::new(&config.word_list));
        info!("词库加载完成，共 {} 个单词", word_list.len());
        Self::with_word_list(config, word_list)
    }

    pub fn with_word_list(config: &Config, word_list: Arc<WordList>) -> Self {
        let security = Arc::new(Security::new(&config.security));
        let rooms: Rooms = Arc::new(DashMap::new());

        let default_room = config.game.default_room.clone();
        rooms.insert(
            default_room.clone(),
            Arc::new(Room::new(
                default_room,
                &config.game,
                word_list.clone(),
                security.clone(),
            )),
        );

        WebSocketServer {
            rooms,
            word_list,
            security,
            config: config.clone(),
        }
    }

    /// 根据配置文件设置CORS
    fn cors_layer(&self) -> CorsLayer {
        let cors = &self.config.cors;
        if cors.allow_all_origins.unwrap_or(true) {
            debug!("CORS配置: 允许所有来源");
            return CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_credentials(false);
        }

        match &cors.allowed_origins {
            Some(allowed_origins) if !allowed_origins.is_empty() => {
                let origins = allowed_origins
                    .iter()
                    .filter_map(|origin| origin.parse::<HeaderValue>().ok())
                    .collect::<Vec<_>>();

                debug!("CORS允许的来源: {:?}", origins);
                CorsLayer::new()
                    .allow_origin(origins)
                    .allow_methods([Method::GET, Method::OPTIONS])
            }
            _ => {
                debug!("CORS配置: 没有设置允许的来源，默认允许所有来源");
                CorsLayer::new().allow_origin(Any).allow_methods(Any)
            }
        }
    }

    /// 静态页面与房间管理接口
    pub fn http_router(&self) -> Router {
        let static_dir = PathBuf::from(&self.config.server.static_dir);

        Router::new()
            .route(
                "/",
                get({
                    let static_dir = static_dir.clone();
                    move || async move { serve_index(&static_dir).await }
                }),
            )
            .route(
                "/index.html",
                get({
                    let static_dir = static_dir.clone();
                    move || async move { serve_index(&static_dir).await }
                }),
            )
            .route(
                "/style.css",
                get({
                    let static_dir = static_dir.clone();
                    move || async move {
                        serve_asset(&static_dir, "style.css", "text/css; charset=utf-8").await
                    }
                }),
            )
            .route(
                "/script.js",
                get({
                    let static_dir = static_dir.clone();
                    move || async move {
                        serve_asset(
                            &static_dir,
                            "script.js",
                            "application/javascript; charset=utf-8",
                        )
                        .await
                    }
                }),
            )
            .route(
                "/client-config",
                get({
                    let client_config = ClientConfig::from_config(&self.config);
                    move || async move { Json(client_config) }
                }),
            )
            .route(
                "/rooms/create",
                get({
                    let rooms = self.rooms.clone();
                    let word_list = self.word_list.clone();
                    let security = self.security.clone();
                    let config = self.config.clone();
                    move |Query(query): Query<CreateRoomQuery>| async move {
                        handle_create_room(query, rooms, word_list, security, &config)
                    }
                }),
            )
            .route(
                "/rooms/status",
                get({
                    let rooms = self.rooms.clone();
                    move || async move { handle_rooms_status(rooms).await }
                }),
            )
            .layer(self.cors_layer())
    }

    /// WebSocket 路由
    pub fn ws_router(&self) -> Router {
        let rooms = self.rooms.clone();
        let default_room = self.config.game.default_room.clone();
        let capacity = self.config.websocket.channel_capacity;

        Router::new().route(
            &self.config.websocket.path,
            get(
                move |ws: WebSocketUpgrade, Query(query): Query<RoomQuery>| async move {
                    let room_id = query.room_id.unwrap_or_else(|| default_room.clone());
                    debug!("WebSocket连接请求 - 房间ID: {}", room_id);

                    ws.on_upgrade(move |socket| async move {
                        handle_room_connection(socket, room_id, rooms, default_room, capacity)
                            .await;
                        debug!("WebSocket连接处理完成");
                    })
                },
            ),
        )
    }

    /// 启动HTTP服务器（后台运行）
    pub async fn start_http_server(&self, http_addr: SocketAddr) -> Result<()> {
        let http_app = self.http_router();
        let http_listener = tokio::net::TcpListener::bind(http_addr)
            .await
            .map_err(|e| {
                error!("绑定HTTP地址失败: {} - {}", http_addr, e);
                Error::Network(anyhow::anyhow!(e))
            })?;

        info!("HTTP服务器启动在 {}", http_addr);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(http_listener, http_app).await {
                error!("HTTP服务器错误: {}", e);
            }
        });

        Ok(())
    }

    /// 启动WebSocket服务器
    pub async fn start_ws_server(&self, ws_addr: SocketAddr) -> Result<()> {
        let ws_app = self.ws_router().layer(self.cors_layer());
        let ws_listener = tokio::net::TcpListener::bind(ws_addr)
            .await
            .map_err(|e| {
                error!("绑定WebSocket地址失败: {} - {}", ws_addr, e);
                Error::Network(anyhow::anyhow!(e))
            })?;

        info!("WebSocket服务器启动在 {}", ws_addr);
        axum::serve(ws_listener, ws_app).await.map_err(|e| {
            error!("WebSocket服务器运行错误: {}", e);
            Error::Network(anyhow::anyhow!(e))
        })?;
        Ok(())
    }

    /// HTTP与WebSocket共用同一端口
    pub async fn start(&self, addr: SocketAddr) -> Result<()> {
        let app = self.http_router().merge(self.ws_router());
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| {
                error!("绑定地址失败: {} - {}", addr, e);
                Error::Network(anyhow::anyhow!(e))
            })?;

        info!("服务器启动在 {}", addr);
        axum::serve(listener, app)
            .await
            .map_err(|e| Error::Network(anyhow::anyhow!(e)))?;
        Ok(())
    }

    /// 定期回收空闲且无人的房间，默认房间除外
    pub fn start_room_cleanup(&self) {
        let rooms = self.rooms.clone();
        let default_room = self.config.game.default_room.clone();
        let max_idle = self.config.game.room_idle_timeout();
        let period = self.config.game.room_cleanup_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let removed = cleanup_idle_rooms(&rooms, &default_room, max_idle).await;
                if !removed.is_empty() {
                    info!("回收空闲房间: {:?}", removed);
                }
            }
        });
    }

    /// 获取房间列表
    pub async fn room_list(&self) -> Vec<(String, usize)> {
        let rooms: Vec<Arc<Room>> = self.rooms.iter().map(|e| e.value().clone()).collect();
        let mut list = Vec::with_capacity(rooms.len());
        for room in rooms {
            list.push((room.id().to_string(), room.player_count().await));
        }
        list
    }

    pub fn room(&self, room_id: &str) -> Option<Arc<Room>> {
        self.rooms.get(room_id).map(|entry| entry.value().clone())
    }
}

async fn serve_index(static_dir: &Path) -> Html<String> {
    match tokio::fs::read_to_string(static_dir.join("index.html")).await {
        Ok(content) => Html(content),
        Err(e) => {
            error!("读取index.html失败: {}", e);
            Html("<h1>404 Not Found</h1><p>找不到index.html文件</p>".to_string())
        }
    }
}

async fn serve_asset(static_dir: &Path, name: &str, content_type: &'static str) -> Response {
    match tokio::fs::read_to_string(static_dir.join(name)).await {
        Ok(content) => ([(header::CONTENT_TYPE, content_type)], content).into_response(),
        Err(e) => {
            error!("读取{}失败: {}", name, e);
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// 处理房间状态查询
async fn handle_rooms_status(rooms: Rooms) -> Json<RoomsStatusResponse> {
    let snapshot: Vec<Arc<Room>> = rooms.iter().map(|e| e.value().clone()).collect();

    let mut statuses = Vec::with_capacity(snapshot.len());
    for room in snapshot {
        statuses.push(room.status().await);
    }
    statuses.sort_by(|a, b| a.room_id.cmp(&b.room_id));

    Json(RoomsStatusResponse {
        success: true,
        total_rooms: statuses.len(),
        rooms: statuses,
    })
}

/// 删除空闲超过 max_idle 且没有玩家的房间，返回被删除的房间ID
async fn cleanup_idle_rooms(
    rooms: &Rooms,
    default_room: &str,
    max_idle: Duration,
) -> Vec<String> {
    let candidates: Vec<Arc<Room>> = rooms
        .iter()
        .filter(|entry| entry.key() != default_room)
        .map(|entry| entry.value().clone())
        .collect();

    let mut removed = Vec::new();
    for room in candidates {
        if room.is_empty().await && room.idle_for().await >= max_idle {
            rooms.remove(room.id());
            removed.push(room.id().to_string());
        }
    }
    removed
}

/// 校验自定义房间ID
fn validate_room_id(room_id: &str) -> std::result::Result<(), String> {
    if room_id.is_empty() {
        return Err("房间ID不能为空".to_string());
    }
    if room_id.chars().count() > 20 {
        return Err("房间ID长度不能超过20个字符".to_string());
    }
    if !room_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err("房间ID只能包含字母、数字、下划线和连字符".to_string());
    }
    Ok(())
}

/// 处理创建房间请求
fn handle_create_room(
    query: CreateRoomQuery,
    rooms: Rooms,
    word_list: Arc<WordList>,
    security: Arc<Security>,
    config: &Config,
) -> Json<CreateRoomResponse> {
    let room_id = match query.room_id {
        Some(custom_id) => {
            if let Err(message) = validate_room_id(&custom_id) {
                return Json(CreateRoomResponse {
                    success: false,
                    room_id: None,
                    message: Some(message),
                });
            }
            custom_id
        }
        None => generate_random_room_id(),
    };

    match rooms.entry(room_id.clone()) {
        dashmap::mapref::entry::Entry::Occupied(_) => Json(CreateRoomResponse {
            success: false,
            room_id: None,
            message: Some(format!("房间 {} 已存在", room_id)),
        }),
        dashmap::mapref::entry::Entry::Vacant(entry) => {
            entry.insert(Arc::new(Room::new(
                room_id.clone(),
                &config.game,
                word_list,
                security,
            )));
            info!("创建房间: {}", room_id);
            Json(CreateRoomResponse {
                success: true,
                room_id: Some(room_id),
                message: None,
            })
        }
    }
}

/// 生成随机6个字母的房间ID
fn generate_random_room_id() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut rng = rand::rng();

    (0..6)
        .map(|_| {
            let idx = rng.random_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// 将处理失败转换为发给客户端的错误消息
fn error_message(error: &Error) -> ServerMessage {
    match error {
        Error::Game(e) => ServerMessage::error(e.code(), e.to_string()),
        other => ServerMessage::error(ErrorCode::InternalError, other.to_string()),
    }
}

/// 处理WebSocket连接
async fn handle_room_connection(
    socket: WebSocket,
    room_id: String,
    rooms: Rooms,
    default_room: String,
    capacity: usize,
) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let ws_sender = Arc::new(Mutex::new(ws_sender));

    // 房间由 /rooms/create 创建，默认房间始终存在
    let room = match rooms.get(&room_id) {
        Some(entry) => entry.value().clone(),
        None => {
            let message = ServerMessage::error(
                ErrorCode::RoomNotFound,
                format!("房间 {} 不存在，请先创建房间", room_id),
            );
            if let Ok(text) = message.to_text() {
                let _ = ws_sender.lock().await.send(Message::Text(text)).await;
            }
            return;
        }
    };

    let player_id = Uuid::new_v4().to_string();
    debug!("玩家 {} 连接到房间 {}", player_id, room_id);

    let (tx, mut rx) = mpsc::channel::<ServerMessage>(capacity);

    // 房间消息写回WebSocket
    let writer = {
        let ws_sender = ws_sender.clone();
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let text = match message.to_text() {
                    Ok(text) => text,
                    Err(e) => {
                        error!("消息序列化失败: {}", e);
                        continue;
                    }
                };
                if let Err(e) = ws_sender.lock().await.send(Message::Text(text)).await {
                    error!("发送消息到WebSocket失败: {}", e);
                    break;
                }
            }
        })
    };

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                debug!("收到消息: {}", text);
                let reply = match ClientMessage::parse(&text) {
                    Ok(message) => room
                        .handle_message(&player_id, message, &tx)
                        .await
                        .err()
                        .map(|e| {
                            warn!("处理玩家 {} 的消息失败: {}", player_id, e);
                            error_message(&e)
                        }),
                    Err(e) => {
                        warn!("解析消息失败: {}", e);
                        Some(ServerMessage::error(ErrorCode::ParseError, "消息格式错误"))
                    }
                };

                if let Some(reply) = reply {
                    if tx.send(reply).await.is_err() {
                        break;
                    }
                }
            }
            Ok(Message::Close(_)) => {
                debug!("收到关闭消息");
                break;
            }
            Ok(Message::Ping(data)) => {
                if let Err(e) = ws_sender.lock().await.send(Message::Pong(data)).await {
                    error!("发送pong消息失败: {}", e);
                }
            }
            Ok(Message::Pong(_)) => {}
            Ok(Message::Binary(_)) => {
                let reply = ServerMessage::error(ErrorCode::ParseError, "不支持二进制消息");
                if tx.send(reply).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                error!("WebSocket错误: {}", e);
                break;
            }
        }
    }

    room.disconnect(&player_id).await;
    drop(tx);
    writer.abort();

    if room_id != default_room && room.is_empty().await {
        rooms.remove(&room_id);
        info!("房间 {} 已空，删除", room_id);
    }

    debug!("玩家 {} 的WebSocket连接关闭", player_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GameError;

    #[test]
    fn room_ids_are_validated() {
        assert!(validate_room_id("duel_1-a").is_ok());
        assert!(validate_room_id("").is_err());
        assert!(validate_room_id("a".repeat(21).as_str()).is_err());
        assert!(validate_room_id("bad id").is_err());
        assert!(validate_room_id("房间").is_err());

        let generated = generate_random_room_id();
        assert_eq!(generated.len(), 6);
        assert!(generated.chars().all(|c| c.is_ascii_uppercase()));
    }

    #[test]
    fn errors_map_to_wire_codes() {
        let message = error_message(&Error::Game(GameError::RowAlreadySubmitted));
        assert!(matches!(
            message,
            ServerMessage::Error {
                code: ErrorCode::RowAlreadySubmitted,
                ..
            }
        ));

        let message = error_message(&Error::WordList("empty".to_string()));
        assert!(matches!(
            message,
            ServerMessage::Error {
                code: ErrorCode::InternalError,
                ..
            }
        ));
    }

    #[test]
    fn client_config_follows_ports() {
        let mut config = Config::load_from("nonexistent-config").unwrap();
        assert_eq!(
            ClientConfig::from_config(&config),
            ClientConfig {
                ws_path: "/ws".to_string(),
                ws_port: None,
            }
        );

        config.server.ws_port = Some(9001);
        config.websocket.path = "/game".to_string();
        assert_eq!(
            ClientConfig::from_config(&config),
            ClientConfig {
                ws_path: "/game".to_string(),
                ws_port: Some(9001),
            }
        );
    }

    #[tokio::test]
    async fn create_room_registers_and_rejects_duplicates() {
        let config = Config::load_from("nonexistent-config").unwrap();
        let server = WebSocketServer::with_word_list(&config, Arc::new(WordList::with_defaults()));
        assert!(server.room("main").is_some());

        let create = |room_id: Option<&str>| {
            handle_create_room(
                CreateRoomQuery {
                    room_id: room_id.map(str::to_string),
                },
                server.rooms.clone(),
                server.word_list.clone(),
                server.security.clone(),
                &config,
            )
            .0
        };

        let response = create(Some("duel"));
        assert!(response.success);
        assert!(server.room("duel").is_some());

        let response = create(Some("duel"));
        assert!(!response.success);

        let response = create(None);
        assert!(response.success);
        assert_eq!(response.room_id.unwrap().len(), 6);

        let rooms = server.room_list().await;
        assert_eq!(rooms.len(), 3);
        assert!(rooms.iter().all(|(_, count)| *count == 0));
    }

    #[tokio::test]
    async fn idle_empty_rooms_are_reclaimed() {
        let config = Config::load_from("nonexistent-config").unwrap();
        let server = WebSocketServer::with_word_list(&config, Arc::new(WordList::with_defaults()));

        for _ in 0..50 {
            handle_create_room(
                CreateRoomQuery { room_id: None },
                server.rooms.clone(),
                server.word_list.clone(),
                server.security.clone(),
                &config,
            );
        }
        handle_create_room(
            CreateRoomQuery {
                room_id: Some("busy".to_string()),
            },
            server.rooms.clone(),
            server.word_list.clone(),
            server.security.clone(),
            &config,
        );
        let busy = server.room("busy").unwrap();
        let (tx, _rx) = mpsc::channel(16);
        busy.handle_message(
            "p1",
            ClientMessage::Join {
                player_name: "Ann".to_string(),
            },
            &tx,
        )
        .await
        .unwrap();
        assert!(server.rooms.len() >= 50);

        // 未超时的房间保留
        let removed = cleanup_idle_rooms(&server.rooms, "main", Duration::from_secs(600)).await;
        assert!(removed.is_empty());

        let removed = cleanup_idle_rooms(&server.rooms, "main", Duration::ZERO).await;
        assert!(!removed.is_empty());
        assert!(!removed.contains(&"busy".to_string()));
        assert_eq!(server.rooms.len(), 2);
        assert!(server.room("main").is_some());
        assert!(server.room("busy").is_some());
    }
}
