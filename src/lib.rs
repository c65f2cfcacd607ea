pub mod config;
pub mod evaluator;
pub mod game;
pub mod message;
pub mod network;
pub mod room;
pub mod security;
pub mod word_list;

pub use config::Config;
pub use evaluator::{EvaluationError, EvaluationResult, LetterVerdict, Word, evaluate};
pub use game::{GameError, GameState};
pub use message::{ClientMessage, ServerMessage};
pub use network::WebSocketServer;
pub use room::Room;
pub use word_list::WordList;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("网络错误: {0}")]
    Network(#[from] anyhow::Error),
    #[error("游戏错误: {0}")]
    Game(#[from] GameError),
    #[error("词库错误: {0}")]
    WordList(String),
}

pub type Result<T> = std::result::Result<T, Error>;
