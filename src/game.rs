use crate::config::GameConfig;
use crate::evaluator::{EvaluationError, EvaluationResult, Word, evaluate_words};
use crate::message::{ErrorCode, PlayerSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 玩家ID类型
pub type PlayerId = String;

/// 玩家信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub joined_at: DateTime<Utc>,
    pub last_action: DateTime<Utc>,
}

impl Player {
    pub fn new(id: PlayerId, name: String) -> Self {
        let now = Utc::now();
        Player {
            id,
            name,
            joined_at: now,
            last_action: now,
        }
    }
}

/// 已锁定的一行
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardRow {
    pub guess: Word,
    pub result: EvaluationResult,
}

/// 游戏规则错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("房间已满，最多 {0} 名玩家")]
    RoomFull(usize),
    #[error("本局正在进行中")]
    RoundInProgress,
    #[error("当前没有进行中的对局")]
    NotPlaying,
    #[error("请先加入游戏")]
    NotJoined,
    #[error("玩家不存在")]
    PlayerNotFound,
    #[error("本行已提交，请等待其他玩家")]
    RowAlreadySubmitted,
    #[error("无效的单词: {0}")]
    InvalidWord(#[from] EvaluationError),
    #[error("无效的玩家名称: {0}")]
    InvalidName(String),
    #[error("玩家数量不足，需要 {required} 名，当前 {current} 名")]
    NotEnoughPlayers { required: usize, current: usize },
    #[error("操作过于频繁")]
    RateLimited,
}

impl GameError {
    pub fn code(&self) -> ErrorCode {
        match self {
            GameError::RoomFull(_) => ErrorCode::RoomFull,
            GameError::RoundInProgress => ErrorCode::RoundInProgress,
            GameError::NotPlaying => ErrorCode::NotPlaying,
            GameError::NotJoined => ErrorCode::NotJoined,
            GameError::PlayerNotFound => ErrorCode::PlayerNotFound,
            GameError::RowAlreadySubmitted => ErrorCode::RowAlreadySubmitted,
            GameError::InvalidWord(_) => ErrorCode::InvalidWord,
            GameError::InvalidName(_) => ErrorCode::InvalidName,
            GameError::NotEnoughPlayers { .. } => ErrorCode::NotEnoughPlayers,
            GameError::RateLimited => ErrorCode::RateLimited,
        }
    }
}

/// 进行中的一局
#[derive(Debug, Clone)]
pub struct Round {
    pub number: u32,
    secret: Word,
    boards: HashMap<PlayerId, Vec<BoardRow>>,
    current_row: usize,
}

/// 游戏阶段
#[derive(Debug, Clone)]
pub enum Phase {
    Lobby,
    Playing(Round),
    RoundOver {
        round: Round,
        winner: Option<PlayerId>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Lobby,
    Playing,
    RoundOver,
}

/// 猜测提交后的走向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuessOutcome {
    /// 猜中，本局结束
    Solved,
    /// 等待其他玩家提交本行
    WaitingForOthers,
    /// 所有玩家已提交，进入下一行
    RowAdvanced(usize),
    /// 行数用尽，无人猜中
    OutOfRows,
}

/// 游戏事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    PlayerJoined {
        player: Player,
        can_start: bool,
        rejoined: bool,
    },
    PlayerLeft {
        player: Player,
        round_aborted: bool,
    },
    RoundStarted {
        round: u32,
    },
    GuessEvaluated {
        player: Player,
        row: usize,
        guess: Word,
        result: EvaluationResult,
        outcome: GuessOutcome,
    },
}

/// 单个会话的全部状态：座位、比分、当前阶段
#[derive(Debug, Clone)]
pub struct GameState {
    players: Vec<Player>,
    scores: HashMap<PlayerId, u32>,
    rounds_played: u32,
    phase: Phase,
    required_players: usize,
    max_players: usize,
    max_rows: usize,
}

impl GameState {
    pub fn new(config: &GameConfig) -> Self {
        GameState {
            players: Vec::new(),
            scores: HashMap::new(),
            rounds_played: 0,
            phase: Phase::Lobby,
            required_players: config.required_players,
            max_players: config.max_players,
            max_rows: config.max_rows,
        }
    }

    /// 添加玩家；对局进行中只允许已入座的玩家重新连接
    pub fn add_player(&mut self, player: Player) -> Result<GameEvent, GameError> {
        if let Some(existing) = self.players.iter().find(|p| p.id == player.id) {
            return Ok(GameEvent::PlayerJoined {
                player: existing.clone(),
                can_start: false,
                rejoined: true,
            });
        }

        if matches!(self.phase, Phase::Playing(_)) {
            return Err(GameError::RoundInProgress);
        }
        if self.players.len() >= self.max_players {
            return Err(GameError::RoomFull(self.max_players));
        }

        self.scores.insert(player.id.clone(), 0);
        self.players.push(player.clone());

        let can_start =
            matches!(self.phase, Phase::Lobby) && self.players.len() >= self.required_players;
        Ok(GameEvent::PlayerJoined {
            player,
            can_start,
            rejoined: false,
        })
    }

    /// 移除玩家；对局中有人离开则本局作废，回到大厅
    pub fn remove_player(&mut self, player_id: &str) -> Result<GameEvent, GameError> {
        let index = self
            .players
            .iter()
            .position(|p| p.id == player_id)
            .ok_or(GameError::PlayerNotFound)?;
        let player = self.players.remove(index);
        self.scores.remove(player_id);

        let round_aborted = matches!(self.phase, Phase::Playing(_));
        if round_aborted || self.players.len() < self.required_players {
            self.phase = Phase::Lobby;
        }

        Ok(GameEvent::PlayerLeft {
            player,
            round_aborted,
        })
    }

    /// 开始新一局，从大厅或上一局结束后进入
    pub fn start_round(&mut self, secret: Word) -> Result<GameEvent, GameError> {
        if matches!(self.phase, Phase::Playing(_)) {
            return Err(GameError::RoundInProgress);
        }
        if self.players.len() < self.required_players {
            return Err(GameError::NotEnoughPlayers {
                required: self.required_players,
                current: self.players.len(),
            });
        }

        self.rounds_played += 1;
        let boards = self
            .players
            .iter()
            .map(|p| (p.id.clone(), Vec::with_capacity(self.max_rows)))
            .collect();

        self.phase = Phase::Playing(Round {
            number: self.rounds_played,
            secret,
            boards,
            current_row: 0,
        });

        Ok(GameEvent::RoundStarted {
            round: self.rounds_played,
        })
    }

    /// 提交猜测并锁定当前行
    pub fn submit_guess(&mut self, player_id: &str, text: &str) -> Result<GameEvent, GameError> {
        let round = match &mut self.phase {
            Phase::Playing(round) => round,
            _ => return Err(GameError::NotPlaying),
        };

        let player = self
            .players
            .iter_mut()
            .find(|p| p.id == player_id)
            .ok_or(GameError::PlayerNotFound)?;

        let guess = Word::parse(text)?;
        let row = round.current_row;
        let board = round
            .boards
            .get_mut(player_id)
            .ok_or(GameError::PlayerNotFound)?;
        if board.len() > row {
            return Err(GameError::RowAlreadySubmitted);
        }

        let result = evaluate_words(&guess, &round.secret);
        board.push(BoardRow { guess, result });
        player.last_action = Utc::now();
        let player = player.clone();

        let outcome = if result.is_solved() {
            GuessOutcome::Solved
        } else if round.boards.values().all(|b| b.len() > row) {
            round.current_row += 1;
            if round.current_row >= self.max_rows {
                GuessOutcome::OutOfRows
            } else {
                GuessOutcome::RowAdvanced(round.current_row)
            }
        } else {
            GuessOutcome::WaitingForOthers
        };

        match outcome {
            GuessOutcome::Solved => {
                *self.scores.entry(player.id.clone()).or_insert(0) += 1;
                self.finish_round(Some(player.id.clone()));
            }
            GuessOutcome::OutOfRows => self.finish_round(None),
            _ => {}
        }

        Ok(GameEvent::GuessEvaluated {
            player,
            row,
            guess,
            result,
            outcome,
        })
    }

    fn finish_round(&mut self, winner: Option<PlayerId>) {
        let phase = std::mem::replace(&mut self.phase, Phase::Lobby);
        self.phase = match phase {
            Phase::Playing(round) => Phase::RoundOver { round, winner },
            other => other,
        };
    }

    pub fn phase_kind(&self) -> PhaseKind {
        match self.phase {
            Phase::Lobby => PhaseKind::Lobby,
            Phase::Playing(_) => PhaseKind::Playing,
            Phase::RoundOver { .. } => PhaseKind::RoundOver,
        }
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    /// 玩家座位号（从1开始）
    pub fn slot_of(&self, player_id: &str) -> Option<usize> {
        self.players
            .iter()
            .position(|p| p.id == player_id)
            .map(|i| i + 1)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn required_players(&self) -> usize {
        self.required_players
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    pub fn rounds_played(&self) -> u32 {
        self.rounds_played
    }

    /// 当前行号，仅在对局进行中有效
    pub fn current_row(&self) -> Option<usize> {
        match &self.phase {
            Phase::Playing(round) => Some(round.current_row),
            _ => None,
        }
    }

    /// 玩家在本局（或刚结束的一局）中已锁定的行
    pub fn board(&self, player_id: &str) -> Option<&[BoardRow]> {
        let round = match &self.phase {
            Phase::Playing(round) => round,
            Phase::RoundOver { round, .. } => round,
            Phase::Lobby => return None,
        };
        round.boards.get(player_id).map(|rows| rows.as_slice())
    }

    pub fn score(&self, player_id: &str) -> u32 {
        self.scores.get(player_id).copied().unwrap_or(0)
    }

    /// 谜底只在本局结束后公开
    pub fn revealed_secret(&self) -> Option<Word> {
        match &self.phase {
            Phase::RoundOver { round, .. } => Some(round.secret),
            _ => None,
        }
    }

    pub fn winner(&self) -> Option<&Player> {
        match &self.phase {
            Phase::RoundOver {
                winner: Some(id), ..
            } => self.player(id),
            _ => None,
        }
    }

    pub fn snapshot(&self, player: &Player) -> PlayerSnapshot {
        PlayerSnapshot {
            id: player.id.clone(),
            name: player.name.clone(),
            score: self.score(&player.id),
        }
    }

    /// 按座位顺序的玩家与比分
    pub fn snapshots(&self) -> Vec<PlayerSnapshot> {
        self.players.iter().map(|p| self.snapshot(p)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::LetterVerdict;

    fn duel() -> GameState {
        GameState::new(&GameConfig::default())
    }

    fn join(state: &mut GameState, id: &str) -> GameEvent {
        state
            .add_player(Player::new(id.to_string(), id.to_uppercase()))
            .unwrap()
    }

    fn secret(text: &str) -> Word {
        Word::parse(text).unwrap()
    }

    fn outcome(event: GameEvent) -> GuessOutcome {
        match event {
            GameEvent::GuessEvaluated { outcome, .. } => outcome,
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn lobby_fills_and_can_start() {
        let mut state = duel();
        assert!(matches!(
            join(&mut state, "a"),
            GameEvent::PlayerJoined {
                can_start: false,
                ..
            }
        ));
        assert!(matches!(
            join(&mut state, "b"),
            GameEvent::PlayerJoined {
                can_start: true,
                ..
            }
        ));
        assert_eq!(state.slot_of("b"), Some(2));
        assert_eq!(
            state.add_player(Player::new("c".into(), "C".into())),
            Err(GameError::RoomFull(2))
        );
    }

    #[test]
    fn rejoin_is_idempotent() {
        let mut state = duel();
        join(&mut state, "a");
        assert!(matches!(
            join(&mut state, "a"),
            GameEvent::PlayerJoined { rejoined: true, .. }
        ));
        assert_eq!(state.player_count(), 1);
    }

    #[test]
    fn cannot_start_without_enough_players() {
        let mut state = duel();
        join(&mut state, "a");
        assert_eq!(
            state.start_round(secret("CRANE")).unwrap_err(),
            GameError::NotEnoughPlayers {
                required: 2,
                current: 1
            }
        );
    }

    #[test]
    fn rows_advance_in_lockstep() {
        let mut state = duel();
        join(&mut state, "a");
        join(&mut state, "b");
        state.start_round(secret("FACTS")).unwrap();

        assert_eq!(
            outcome(state.submit_guess("a", "crane").unwrap()),
            GuessOutcome::WaitingForOthers
        );
        assert_eq!(
            state.submit_guess("a", "slate").unwrap_err(),
            GameError::RowAlreadySubmitted
        );
        assert_eq!(
            outcome(state.submit_guess("b", "slate").unwrap()),
            GuessOutcome::RowAdvanced(1)
        );
        assert_eq!(state.current_row(), Some(1));
        assert_eq!(state.board("a").unwrap().len(), 1);
        assert_eq!(state.board("a").unwrap()[0].guess.as_str(), "CRANE");
        assert!(state.revealed_secret().is_none());
    }

    #[test]
    fn solving_ends_round_and_scores() {
        let mut state = duel();
        join(&mut state, "a");
        join(&mut state, "b");
        state.start_round(secret("FACTS")).unwrap();

        let event = state.submit_guess("b", "facts").unwrap();
        match event {
            GameEvent::GuessEvaluated {
                outcome, result, ..
            } => {
                assert_eq!(outcome, GuessOutcome::Solved);
                assert!(result.verdicts().iter().all(|v| *v == LetterVerdict::Correct));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(state.phase_kind(), PhaseKind::RoundOver);
        assert_eq!(state.score("b"), 1);
        assert_eq!(state.winner().map(|p| p.id.as_str()), Some("b"));
        assert_eq!(state.revealed_secret(), Some(secret("FACTS")));
        assert_eq!(
            state.submit_guess("a", "facts").unwrap_err(),
            GameError::NotPlaying
        );

        // 再来一局，比分保留
        state.start_round(secret("CRANE")).unwrap();
        assert_eq!(state.rounds_played(), 2);
        assert_eq!(state.score("b"), 1);
        assert_eq!(state.board("b").unwrap().len(), 0);
    }

    #[test]
    fn out_of_rows_reveals_secret_without_winner() {
        let config = GameConfig {
            required_players: 1,
            max_players: 1,
            max_rows: 2,
            ..GameConfig::default()
        };
        let mut state = GameState::new(&config);
        join(&mut state, "solo");
        state.start_round(secret("FACTS")).unwrap();

        assert_eq!(
            outcome(state.submit_guess("solo", "crane").unwrap()),
            GuessOutcome::RowAdvanced(1)
        );
        assert_eq!(
            outcome(state.submit_guess("solo", "slate").unwrap()),
            GuessOutcome::OutOfRows
        );
        assert_eq!(state.phase_kind(), PhaseKind::RoundOver);
        assert!(state.winner().is_none());
        assert_eq!(state.revealed_secret(), Some(secret("FACTS")));
        assert_eq!(state.score("solo"), 0);
    }

    #[test]
    fn invalid_guess_does_not_lock_row() {
        let mut state = duel();
        join(&mut state, "a");
        join(&mut state, "b");
        state.start_round(secret("FACTS")).unwrap();

        assert!(matches!(
            state.submit_guess("a", "ab"),
            Err(GameError::InvalidWord(EvaluationError::InvalidInputLength { .. }))
        ));
        assert_eq!(state.board("a").unwrap().len(), 0);
        assert_eq!(
            state.submit_guess("ghost", "crane").unwrap_err(),
            GameError::PlayerNotFound
        );
    }

    #[test]
    fn leaving_mid_round_aborts_to_lobby() {
        let mut state = duel();
        join(&mut state, "a");
        join(&mut state, "b");
        state.start_round(secret("FACTS")).unwrap();
        assert_eq!(
            state.add_player(Player::new("c".into(), "C".into())),
            Err(GameError::RoundInProgress)
        );

        let event = state.remove_player("a").unwrap();
        assert!(matches!(
            event,
            GameEvent::PlayerLeft {
                round_aborted: true,
                ..
            }
        ));
        assert_eq!(state.phase_kind(), PhaseKind::Lobby);
        assert_eq!(state.player_count(), 1);
        assert_eq!(state.remove_player("a").unwrap_err(), GameError::PlayerNotFound);
    }

    #[test]
    fn error_codes_map() {
        assert_eq!(GameError::RateLimited.code(), ErrorCode::RateLimited);
        assert_eq!(
            GameError::InvalidWord(EvaluationError::InvalidCharacter('1')).code(),
            ErrorCode::InvalidWord
        );
    }
}
