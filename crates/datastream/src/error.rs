//! Data stream errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("no atomic operation in progress")]
    NoAtomicOp,

    #[error("atomic operation already in progress")]
    AtomicOpInProgress,

    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("entry encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("corrupt stream file: {0}")]
    Corrupt(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("protocol error: {0}")]
    Protocol(String),
}
