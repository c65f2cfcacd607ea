use crate::Result;
use crate::config::GameConfig;
use crate::evaluator::{WORD_LENGTH, Word};
use crate::game::{GameError, GameEvent, GameState, GuessOutcome, PhaseKind, Player, PlayerId};
use crate::message::{ClientMessage, PlayerSnapshot, ServerMessage};
use crate::security::Security;
use crate::word_list::WordList;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, error, info, warn};

/// 房间状态快照
#[derive(Debug, Clone, Serialize)]
pub struct RoomStatus {
    pub room_id: String,
    pub player_count: usize,
    pub required_players: usize,
    pub phase: PhaseKind,
    pub rounds_played: u32,
    pub idle_seconds: i64,
    pub players: Vec<PlayerSnapshot>,
}

/// 游戏房间，负责管理房间内的玩家连接和游戏状态
pub struct Room {
    id: String,
    state: Arc<RwLock<GameState>>,
    word_list: Arc<WordList>,
    security: Arc<Security>,
    player_channels: Arc<DashMap<PlayerId, mpsc::Sender<ServerMessage>>>,
    auto_start_delay: Duration,
    last_activity: Arc<RwLock<DateTime<Utc>>>,
}

impl Room {
    /// 创建新房间
    pub fn new(
        id: String,
        config: &GameConfig,
        word_list: Arc<WordList>,
        security: Arc<Security>,
    ) -> Self {
        Room {
            id,
            state: Arc::new(RwLock::new(GameState::new(config))),
            word_list,
            security,
            player_channels: Arc::new(DashMap::new()),
            auto_start_delay: config.auto_start_delay(),
            last_activity: Arc::new(RwLock::new(Utc::now())),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// 处理房间消息，tx 为发送方连接的消息通道
    pub async fn handle_message(
        &self,
        player_id: &str,
        message: ClientMessage,
        tx: &mpsc::Sender<ServerMessage>,
    ) -> Result<()> {
        self.update_activity().await;

        match message {
            ClientMessage::Join { player_name } => {
                self.handle_join(player_id, &player_name, tx.clone()).await?
            }
            ClientMessage::Guess { word } => self.handle_guess(player_id, &word).await?,
            ClientMessage::Restart => self.handle_restart(player_id).await?,
            ClientMessage::Leave => self.handle_leave(player_id).await?,
            ClientMessage::Ping => {
                if tx.send(ServerMessage::Pong).await.is_err() {
                    debug!("玩家 {} 的连接已关闭，无法回复pong", player_id);
                }
            }
        }
        Ok(())
    }

    /// 处理玩家加入消息
    async fn handle_join(
        &self,
        player_id: &str,
        player_name: &str,
        tx: mpsc::Sender<ServerMessage>,
    ) -> Result<()> {
        let name = self.security.validate_player_name(player_name)?;
        let player = Player::new(player_id.to_string(), name);

        let mut state = self.state.write().await;
        let event = state.add_player(player)?;
        let slot = state.slot_of(player_id).unwrap_or_default();
        drop(state);

        self.player_channels.insert(player_id.to_string(), tx);
        self.send_to(
            player_id,
            ServerMessage::Welcome {
                player_id: player_id.to_string(),
                slot,
            },
        )
        .await;

        Box::pin(self.handle_game_event(event)).await
    }

    /// 处理猜词消息
    async fn handle_guess(&self, player_id: &str, word: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if state.player(player_id).is_none() {
            return Err(GameError::NotJoined.into());
        }
        self.security.check_guess_rate(player_id)?;

        let event = state.submit_guess(player_id, word)?;
        drop(state);

        Box::pin(self.handle_game_event(event)).await
    }

    /// 上一局结束后重新开始
    async fn handle_restart(&self, player_id: &str) -> Result<()> {
        let state = self.state.read().await;
        if state.player(player_id).is_none() {
            return Err(GameError::NotJoined.into());
        }
        if state.phase_kind() == PhaseKind::Playing {
            return Err(GameError::RoundInProgress.into());
        }
        drop(state);

        self.start_round().await
    }

    async fn handle_leave(&self, player_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let event = state.remove_player(player_id)?;
        drop(state);

        Box::pin(self.handle_game_event(event)).await
    }

    /// 连接断开时清理玩家
    pub async fn disconnect(&self, player_id: &str) {
        let mut state = self.state.write().await;
        let event = state.remove_player(player_id);
        drop(state);

        match event {
            Ok(event) => {
                if let Err(e) = Box::pin(self.handle_game_event(event)).await {
                    error!("处理玩家 {} 断开事件失败: {}", player_id, e);
                }
            }
            Err(_) => {
                // 未加入游戏的连接
                self.player_channels.remove(player_id);
            }
        }
    }

    /// 用随机谜底开始新一局
    pub async fn start_round(&self) -> Result<()> {
        let secret = self
            .word_list
            .random_secret()
            .ok_or_else(|| crate::Error::WordList("词库为空，无法选择谜底".to_string()))?;
        self.start_round_with(secret).await
    }

    /// 用指定谜底开始新一局
    pub async fn start_round_with(&self, secret: Word) -> Result<()> {
        let mut state = self.state.write().await;
        let event = state.start_round(secret)?;
        drop(state);

        info!("房间 {} 开始新一局", self.id);
        debug!("房间 {} 的谜底: {}", self.id, secret);
        if let GameEvent::RoundStarted { round } = event {
            self.announce_round(round).await;
        }
        Ok(())
    }

    async fn announce_round(&self, round: u32) {
        let max_rows = self.state.read().await.max_rows();
        self.broadcast(ServerMessage::RoundStart {
            round,
            max_rows,
            word_length: WORD_LENGTH,
        })
        .await;
    }

    /// 大厅满员后延迟开局，开局前再次确认人数
    fn schedule_auto_start(&self) {
        let room = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(room.auto_start_delay).await;

            let state = room.state.read().await;
            let ready = state.phase_kind() == PhaseKind::Lobby
                && state.player_count() >= state.required_players();
            drop(state);

            if ready {
                if let Err(e) = room.start_round().await {
                    error!("房间 {} 自动开局失败: {}", room.id, e);
                }
            } else {
                debug!("房间 {} 人数变化，取消自动开局", room.id);
            }
        });
    }

    /// 处理游戏事件
    async fn handle_game_event(&self, event: GameEvent) -> Result<()> {
        match event {
            GameEvent::PlayerJoined {
                player,
                can_start,
                rejoined,
            } => {
                let message = if rejoined {
                    format!("玩家 {} 重新连接", player.name)
                } else {
                    format!("玩家 {} 加入了游戏", player.name)
                };
                self.broadcast(ServerMessage::notification(message)).await;
                self.broadcast_lobby_update().await;

                if can_start {
                    if self.auto_start_delay.is_zero() {
                        self.start_round().await?;
                    } else {
                        self.schedule_auto_start();
                    }
                }
            }
            GameEvent::PlayerLeft {
                player,
                round_aborted,
            } => {
                self.player_channels.remove(&player.id);
                self.security.forget(&player.id);

                let message = if round_aborted {
                    format!("玩家 {} 离开了游戏，本局结束", player.name)
                } else {
                    format!("玩家 {} 离开了游戏", player.name)
                };
                self.broadcast(ServerMessage::notification(message)).await;
                self.broadcast_lobby_update().await;
            }
            GameEvent::RoundStarted { round } => self.announce_round(round).await,
            GameEvent::GuessEvaluated {
                player,
                row,
                guess,
                result,
                outcome,
            } => {
                debug!(
                    "房间 {} 玩家 {} 第{}行: {} {}",
                    self.id,
                    player.name,
                    row + 1,
                    guess,
                    result.to_emoji()
                );

                self.broadcast(ServerMessage::GuessResult {
                    player_id: player.id.clone(),
                    player_name: player.name.clone(),
                    word: guess,
                    row,
                    result,
                    codes: result.codes(),
                })
                .await;

                match outcome {
                    GuessOutcome::Solved | GuessOutcome::OutOfRows => {
                        self.broadcast_round_end().await;
                    }
                    GuessOutcome::RowAdvanced(next_row) => {
                        self.broadcast(ServerMessage::RowAdvance { row: next_row })
                            .await;
                    }
                    GuessOutcome::WaitingForOthers => {
                        self.broadcast(ServerMessage::notification(format!(
                            "{} 已提交，等待其他玩家...",
                            player.name
                        )))
                        .await;
                    }
                }
            }
        }
        Ok(())
    }

    async fn broadcast_lobby_update(&self) {
        let state = self.state.read().await;
        let message = ServerMessage::LobbyUpdate {
            players: state.snapshots(),
            required_players: state.required_players(),
        };
        drop(state);

        self.broadcast(message).await;
    }

    /// 广播本局结果并公开谜底
    async fn broadcast_round_end(&self) {
        let state = self.state.read().await;
        let Some(secret) = state.revealed_secret() else {
            warn!("房间 {} 本局尚未结束，不能公开谜底", self.id);
            return;
        };

        let winner = state.winner().map(|p| state.snapshot(p));
        let message = ServerMessage::RoundEnd {
            round: state.rounds_played(),
            winner: winner.clone(),
            secret,
            scores: state.snapshots(),
        };
        drop(state);

        let summary = match &winner {
            Some(winner) => format!("{} 猜中了！谜底是 {}", winner.name, secret),
            None => format!("次数用尽，谜底是 {}", secret),
        };
        info!("房间 {}: {}", self.id, summary);

        self.broadcast(message).await;
        self.broadcast(ServerMessage::notification(summary)).await;
    }

    /// 广播消息给房间内所有玩家，通道已满的玩家被移出房间
    pub async fn broadcast(&self, message: ServerMessage) {
        let lagging = self.deliver(&message);
        if !lagging.is_empty() {
            self.evict(lagging).await;
        }
    }

    /// 发送消息给指定玩家
    pub async fn send_to(&self, player_id: &str, message: ServerMessage) {
        let channel = self
            .player_channels
            .get(player_id)
            .map(|entry| entry.value().clone());

        if let Some(channel) = channel {
            if self.try_deliver(player_id, &channel, message) {
                self.evict(vec![player_id.to_string()]).await;
            }
        }
    }

    /// 非阻塞投递，返回通道已满的玩家
    fn deliver(&self, message: &ServerMessage) -> Vec<PlayerId> {
        // 先取出通道快照，避免在发送时持有分片锁
        let channels: Vec<(PlayerId, mpsc::Sender<ServerMessage>)> = self
            .player_channels
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        channels
            .into_iter()
            .filter(|(player_id, channel)| self.try_deliver(player_id, channel, message.clone()))
            .map(|(player_id, _)| player_id)
            .collect()
    }

    /// 发送失败时移除通道，返回是否因积压而失败
    fn try_deliver(
        &self,
        player_id: &str,
        channel: &mpsc::Sender<ServerMessage>,
        message: ServerMessage,
    ) -> bool {
        match channel.try_send(message) {
            Ok(()) => false,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("玩家 {} 的消息积压，移出房间 {}", player_id, self.id);
                self.player_channels.remove(player_id);
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("玩家 {} 的连接已关闭", player_id);
                self.player_channels.remove(player_id);
                false
            }
        }
    }

    /// 移出积压的玩家并通知其余玩家
    async fn evict(&self, mut lagging: Vec<PlayerId>) {
        while !lagging.is_empty() {
            let mut state = self.state.write().await;
            let mut messages = Vec::new();
            for player_id in lagging.drain(..) {
                self.security.forget(&player_id);
                if let Ok(GameEvent::PlayerLeft {
                    player,
                    round_aborted,
                }) = state.remove_player(&player_id)
                {
                    let message = if round_aborted {
                        format!("玩家 {} 连接过慢被移出，本局结束", player.name)
                    } else {
                        format!("玩家 {} 连接过慢被移出", player.name)
                    };
                    messages.push(ServerMessage::notification(message));
                }
            }
            messages.push(ServerMessage::LobbyUpdate {
                players: state.snapshots(),
                required_players: state.required_players(),
            });
            drop(state);

            for message in &messages {
                lagging.extend(self.deliver(message));
            }
        }
    }

    pub async fn update_activity(&self) {
        *self.last_activity.write().await = Utc::now();
    }

    /// 获取房间内玩家数量
    pub async fn player_count(&self) -> usize {
        self.state.read().await.player_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.player_count().await == 0 && self.player_channels.is_empty()
    }

    /// 距离上次活动的时长
    pub async fn idle_for(&self) -> Duration {
        (Utc::now() - *self.last_activity.read().await)
            .to_std()
            .unwrap_or_default()
    }

    pub async fn status(&self) -> RoomStatus {
        let state = self.state.read().await;
        let idle_seconds = (Utc::now() - *self.last_activity.read().await).num_seconds();

        RoomStatus {
            room_id: self.id.clone(),
            player_count: state.player_count(),
            required_players: state.required_players(),
            phase: state.phase_kind(),
            rounds_played: state.rounds_played(),
            idle_seconds,
            players: state.snapshots(),
        }
    }
}

impl Clone for Room {
    fn clone(&self) -> Self {
        Room {
            id: self.id.clone(),
            state: self.state.clone(),
            word_list: self.word_list.clone(),
            security: self.security.clone(),
            player_channels: self.player_channels.clone(),
            auto_start_delay: self.auto_start_delay,
            last_activity: self.last_activity.clone(),
        }
    }
}
