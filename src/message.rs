use crate::evaluator::{EvaluationResult, Word};
use crate::game::PlayerId;
use serde::{Deserialize, Serialize};

/// 客户端发往服务器的消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Join { player_name: String },
    Guess { word: String },
    Restart,
    Leave,
    Ping,
}

impl ClientMessage {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// 服务器发往客户端的消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        player_id: PlayerId,
        slot: usize,
    },
    LobbyUpdate {
        players: Vec<PlayerSnapshot>,
        required_players: usize,
    },
    RoundStart {
        round: u32,
        max_rows: usize,
        word_length: usize,
    },
    #[serde(rename = "result")]
    GuessResult {
        player_id: PlayerId,
        player_name: String,
        word: Word,
        row: usize,
        result: EvaluationResult,
        /// 设备端兼容的数字编码
        codes: [u8; 5],
    },
    RowAdvance {
        row: usize,
    },
    RoundEnd {
        round: u32,
        winner: Option<PlayerSnapshot>,
        secret: Word,
        scores: Vec<PlayerSnapshot>,
    },
    Notification {
        message: String,
    },
    Error {
        code: ErrorCode,
        message: String,
    },
    Pong,
}

impl ServerMessage {
    pub fn notification(message: impl Into<String>) -> Self {
        ServerMessage::Notification {
            message: message.into(),
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code,
            message: message.into(),
        }
    }

    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub name: String,
    pub score: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    RoomFull,
    RoomNotFound,
    RoundInProgress,
    NotPlaying,
    NotJoined,
    PlayerNotFound,
    RowAlreadySubmitted,
    InvalidWord,
    InvalidName,
    NotEnoughPlayers,
    RateLimited,
    ParseError,
    InternalError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::evaluate;

    #[test]
    fn parses_tagged_client_messages() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"join","player_name":"Ann"}"#).unwrap(),
            ClientMessage::Join {
                player_name: "Ann".to_string()
            }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"guess","word":"crane"}"#).unwrap(),
            ClientMessage::Guess {
                word: "crane".to_string()
            }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"restart"}"#).unwrap(),
            ClientMessage::Restart
        );
    }

    #[test]
    fn rejects_unknown_or_incomplete_messages() {
        assert!(ClientMessage::parse(r#"{"type":"describe","content":"x"}"#).is_err());
        assert!(ClientMessage::parse(r#"{"type":"guess"}"#).is_err());
        assert!(ClientMessage::parse(r#"{"word":"crane"}"#).is_err());
        assert!(ClientMessage::parse("not json").is_err());
    }

    #[test]
    fn guess_result_wire_shape() {
        let result = evaluate("SPEED", "ERASE").unwrap();
        let message = ServerMessage::GuessResult {
            player_id: "p1".to_string(),
            player_name: "Ann".to_string(),
            word: Word::parse("speed").unwrap(),
            row: 0,
            result,
            codes: result.codes(),
        };

        let value: serde_json::Value = serde_json::from_str(&message.to_text().unwrap()).unwrap();
        assert_eq!(value["type"], "result");
        assert_eq!(value["word"], "SPEED");
        assert_eq!(value["codes"], serde_json::json!([1, 0, 1, 1, 0]));
        assert_eq!(value["result"][0], "present");
    }

    #[test]
    fn error_and_round_end_shape() {
        let value = serde_json::to_value(ServerMessage::error(
            ErrorCode::RowAlreadySubmitted,
            "本行已提交",
        ))
        .unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["code"], "row_already_submitted");

        let value = serde_json::to_value(ServerMessage::RoundEnd {
            round: 1,
            winner: None,
            secret: Word::parse("FACTS").unwrap(),
            scores: vec![],
        })
        .unwrap();
        assert_eq!(value["type"], "round_end");
        assert!(value["winner"].is_null());
        assert_eq!(value["secret"], "FACTS");
    }
}
