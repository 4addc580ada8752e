//! Shared types for the sequencer core
//!
//! This crate contains the domain types exchanged between the sequencer
//! loops, the finalizer and the data stream:
//! - Fixed-size primitives (hashes, addresses)
//! - Pool transactions and the worker's trackers
//! - Finalized L2 blocks and their stream record payloads

pub mod block;
pub mod primitives;
pub mod stream;
pub mod system;
pub mod tx;

pub use block::{FullBlock, L2Transaction};
pub use primitives::{Address, Hash, ParseHexError};
pub use stream::{BookMark, BookmarkType, EntryType, L2BlockEnd, L2BlockStart};
pub use system::{system_sc_position, SYSTEM_SC_ADDRESS};
pub use tx::{PendingTransaction, TxStatus, TxTracker, ZkCounters};
