//! Data Stream - ordered log of finalized L2 blocks
//!
//! Architecture:
//! - The sequencer appends records inside atomic write groups
//! - Committed groups are persisted to a sled file and become visible together
//! - Downstream consumers connect over websocket and follow the log from any entry

pub mod client;
pub mod error;
pub mod log;
pub mod server;
pub mod types;

pub use client::StreamClient;
pub use error::StreamError;
pub use log::{EntryId, StreamLog};
pub use server::{StreamServer, StreamServerShutdown, StreamServerStats};
pub use types::{ClientRequest, EntryKind, ServerMessage, StreamEntry};
