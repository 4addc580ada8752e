//! Stream Server - persists committed entries and fans them out to consumers
//!
//! Entries are stored in a sled file keyed by big-endian entry id, so a
//! consumer can replay from any position before following live commits.

use crate::error::StreamError;
use crate::log::{EntryId, StreamLog};
use crate::types::{ClientRequest, EntryKind, ServerMessage, StreamEntry};
use dashmap::DashMap;
use futures_util::{Sink, SinkExt, StreamExt};
use parking_lot::RwLock;
use sequencer_types::EntryType;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::{accept_async, tungstenite, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

const NEXT_ENTRY_KEY: &[u8] = b"next_entry";
const LAST_BOOKMARK_KEY: &[u8] = b"last_bookmark";

/// Capacity of the live fan-out channel; lagging consumers catch up from disk
const LIVE_CHANNEL_CAPACITY: usize = 4096;

/// Entries read from disk per replay step
const REPLAY_CHUNK: usize = 1024;

/// Entries of the atomic operation in progress
#[derive(Default)]
struct AtomicOp {
    entries: Vec<StreamEntry>,
    bookmarks: Vec<(Vec<u8>, EntryId)>,
}

#[derive(Debug, Clone)]
struct ClientInfo {
    peer: SocketAddr,
    connected_at: Instant,
}

/// Server counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamServerStats {
    pub entries_committed: u64,
    pub atomic_ops_committed: u64,
    pub atomic_ops_rolled_back: u64,
    pub connected_clients: usize,
}

/// Stops the listener and client sessions of a started server
#[derive(Clone)]
pub struct StreamServerShutdown {
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl StreamServerShutdown {
    /// Cancel the listener and every client session, then wait for them to exit.
    ///
    /// Once this returns and the server is dropped, the port is free and the
    /// stream file can be opened again.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        tracing::debug!("stream server tasks stopped");
    }
}

/// Persistent stream log with websocket fan-out
pub struct StreamServer {
    db: Db,
    entries: Tree,
    bookmarks: Tree,
    header: Tree,
    /// Id the next appended entry will get
    next_entry: EntryId,
    pending: Option<AtomicOp>,
    live_tx: broadcast::Sender<StreamEntry>,
    clients: Arc<DashMap<u64, ClientInfo>>,
    next_client_id: Arc<AtomicU64>,
    stats: Arc<RwLock<StreamServerStats>>,
    /// Cancelled on drop so network tasks release the file
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl StreamServer {
    /// Open or create a stream file at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StreamError> {
        let db = sled::open(&path)?;
        let entries = db.open_tree("entries")?;
        let bookmarks = db.open_tree("bookmarks")?;
        let header = db.open_tree("header")?;

        let next_entry = match header.get(NEXT_ENTRY_KEY)? {
            Some(bytes) => decode_id(&bytes)?,
            None => 0,
        };

        tracing::info!(
            "Opened stream file at {:?} ({} entries)",
            path.as_ref(),
            next_entry
        );

        let (live_tx, _) = broadcast::channel(LIVE_CHANNEL_CAPACITY);

        Ok(Self {
            db,
            entries,
            bookmarks,
            header,
            next_entry,
            pending: None,
            live_tx,
            clients: Arc::new(DashMap::new()),
            next_client_id: Arc::new(AtomicU64::new(1)),
            stats: Arc::new(RwLock::new(StreamServerStats::default())),
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
        })
    }

    /// Start accepting consumer connections.
    ///
    /// Returns the bound address (useful when binding port 0). The listener
    /// and its client sessions run until [`StreamServerShutdown::shutdown`]
    /// or until the server is dropped.
    pub async fn start(&self, addr: &str) -> Result<SocketAddr, StreamError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!("Stream server listening on {}", local_addr);

        let entries = self.entries.clone();
        let live_tx = self.live_tx.clone();
        let clients = self.clients.clone();
        let next_client_id = self.next_client_id.clone();
        let cancel = self.cancel.clone();
        let tasks = self.tasks.clone();

        self.tasks.spawn(async move {
            loop {
                let accepted = tokio::select! {
                    _ = cancel.cancelled() => break,
                    accepted = listener.accept() => accepted,
                };
                match accepted {
                    Ok((stream, peer)) => {
                        let client_id = next_client_id.fetch_add(1, Ordering::SeqCst);
                        tracing::info!(client_id, %peer, "stream client connected");
                        clients.insert(
                            client_id,
                            ClientInfo {
                                peer,
                                connected_at: Instant::now(),
                            },
                        );

                        let entries = entries.clone();
                        let live_tx = live_tx.clone();
                        let clients = clients.clone();
                        let cancel = cancel.clone();
                        tasks.spawn(async move {
                            tokio::select! {
                                _ = cancel.cancelled() => {}
                                result = handle_client(stream, entries, live_tx) => {
                                    if let Err(e) = result {
                                        tracing::warn!(client_id, error = %e, "stream client error");
                                    }
                                }
                            }
                            if let Some((_, info)) = clients.remove(&client_id) {
                                tracing::info!(
                                    client_id,
                                    peer = %info.peer,
                                    connected_secs = info.connected_at.elapsed().as_secs(),
                                    "stream client disconnected"
                                );
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Accept error: {}", e);
                    }
                }
            }
            tracing::info!("Stream server on {} stopped", local_addr);
        });

        Ok(local_addr)
    }

    /// Handle that stops the network side of this server
    pub fn shutdown_handle(&self) -> StreamServerShutdown {
        StreamServerShutdown {
            cancel: self.cancel.clone(),
            tasks: self.tasks.clone(),
        }
    }

    /// Number of committed entries
    pub fn total_entries(&self) -> u64 {
        self.next_entry
    }

    /// Get a committed entry
    pub fn entry(&self, id: EntryId) -> Result<Option<StreamEntry>, StreamError> {
        match self.entries.get(id.to_be_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Committed entries starting at `from`, at most `limit` of them
    pub fn entries_from(&self, from: EntryId, limit: usize) -> Result<Vec<StreamEntry>, StreamError> {
        read_entries(&self.entries, from, limit)
    }

    /// Entry id a committed bookmark points at
    pub fn bookmark_entry(&self, bookmark: &[u8]) -> Result<Option<EntryId>, StreamError> {
        match self.bookmarks.get(bookmark)? {
            Some(bytes) => Ok(Some(decode_id(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Get current stats
    pub fn stats(&self) -> StreamServerStats {
        let mut stats = self.stats.read().clone();
        stats.connected_clients = self.clients.len();
        stats
    }

    fn pending_mut(&mut self) -> Result<&mut AtomicOp, StreamError> {
        self.pending.as_mut().ok_or(StreamError::NoAtomicOp)
    }

    fn push_entry(&mut self, kind: EntryKind, payload: Vec<u8>) -> Result<EntryId, StreamError> {
        let next_entry = self.next_entry;
        let op = self.pending_mut()?;
        let id = next_entry + op.entries.len() as u64;
        op.entries.push(StreamEntry { id, kind, payload });
        Ok(id)
    }
}

impl StreamLog for StreamServer {
    fn start_atomic_op(&mut self) -> Result<(), StreamError> {
        if self.pending.is_some() {
            return Err(StreamError::AtomicOpInProgress);
        }
        self.pending = Some(AtomicOp::default());
        Ok(())
    }

    fn add_bookmark(&mut self, bookmark: Vec<u8>) -> Result<EntryId, StreamError> {
        let id = self.push_entry(EntryKind::Bookmark, bookmark.clone())?;
        self.pending_mut()?.bookmarks.push((bookmark, id));
        Ok(id)
    }

    fn add_entry(&mut self, entry_type: EntryType, data: Vec<u8>) -> Result<EntryId, StreamError> {
        self.push_entry(EntryKind::Data(entry_type), data)
    }

    fn commit_atomic_op(&mut self) -> Result<(), StreamError> {
        let op = self.pending.take().ok_or(StreamError::NoAtomicOp)?;

        let encoded = op
            .entries
            .iter()
            .map(|entry| Ok((entry.id.to_be_bytes().to_vec(), bincode::serialize(entry)?)))
            .collect::<Result<Vec<_>, StreamError>>()?;
        let next_entry = self.next_entry + op.entries.len() as u64;
        let last_bookmark = op.bookmarks.last().map(|(bookmark, _)| bookmark.clone());

        (&self.entries, &self.bookmarks, &self.header)
            .transaction(|(entries, bookmarks, header)| {
                for (key, value) in &encoded {
                    entries.insert(key.clone(), value.clone())?;
                }
                for (bookmark, id) in &op.bookmarks {
                    bookmarks.insert(bookmark.clone(), id.to_be_bytes().to_vec())?;
                }
                header.insert(NEXT_ENTRY_KEY, next_entry.to_be_bytes().to_vec())?;
                if let Some(bookmark) = &last_bookmark {
                    header.insert(LAST_BOOKMARK_KEY, bookmark.clone())?;
                }
                Ok::<(), ConflictableTransactionError<()>>(())
            })
            .map_err(|e| match e {
                TransactionError::Storage(e) => StreamError::Storage(e),
                TransactionError::Abort(()) => StreamError::Corrupt("commit aborted".to_string()),
            })?;
        self.db.flush()?;

        self.next_entry = next_entry;
        {
            let mut stats = self.stats.write();
            stats.entries_committed += op.entries.len() as u64;
            stats.atomic_ops_committed += 1;
        }

        for entry in op.entries {
            // No receivers connected is fine
            let _ = self.live_tx.send(entry);
        }

        Ok(())
    }

    fn rollback_atomic_op(&mut self) -> Result<(), StreamError> {
        let op = self.pending.take().ok_or(StreamError::NoAtomicOp)?;
        self.stats.write().atomic_ops_rolled_back += 1;
        tracing::debug!("Rolled back atomic op with {} entries", op.entries.len());
        Ok(())
    }

    fn last_bookmark(&self) -> Result<Option<Vec<u8>>, StreamError> {
        Ok(self.header.get(LAST_BOOKMARK_KEY)?.map(|bytes| bytes.to_vec()))
    }
}

impl Drop for StreamServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn decode_id(bytes: &[u8]) -> Result<EntryId, StreamError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StreamError::Corrupt(format!("invalid entry id length {}", bytes.len())))?;
    Ok(EntryId::from_be_bytes(arr))
}

fn read_entries(entries: &Tree, from: EntryId, limit: usize) -> Result<Vec<StreamEntry>, StreamError> {
    let mut out = Vec::new();
    for result in entries.range(from.to_be_bytes()..).take(limit) {
        let (_, value) = result?;
        out.push(bincode::deserialize(&value)?);
    }
    Ok(out)
}

fn committed_len(entries: &Tree) -> Result<u64, StreamError> {
    match entries.last()? {
        Some((key, _)) => Ok(decode_id(&key)? + 1),
        None => Ok(0),
    }
}

async fn send_entry<S>(sink: &mut S, entry: StreamEntry) -> Result<(), StreamError>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    sink.send(Message::Binary(ServerMessage::Entry(entry).to_bytes()))
        .await?;
    Ok(())
}

/// Send committed entries from `next` onwards; returns the next id to send
async fn replay<S>(entries: &Tree, mut next: EntryId, sink: &mut S) -> Result<EntryId, StreamError>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        let chunk = read_entries(entries, next, REPLAY_CHUNK)?;
        if chunk.is_empty() {
            return Ok(next);
        }
        for entry in chunk {
            next = entry.id + 1;
            send_entry(sink, entry).await?;
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    entries: Tree,
    live_tx: broadcast::Sender<StreamEntry>,
) -> Result<(), StreamError> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let from = loop {
        match ws_receiver.next().await {
            Some(Ok(Message::Binary(data))) => match ClientRequest::from_bytes(&data) {
                Ok(ClientRequest::StartFrom { entry }) => break entry,
                Err(e) => return Err(StreamError::Protocol(e.to_string())),
            },
            Some(Ok(Message::Close(_))) | None => return Ok(()),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    };

    // Subscribe before replaying so nothing committed meanwhile is missed
    let mut live_rx = live_tx.subscribe();

    let total = committed_len(&entries)?;
    if from > total {
        let reason = format!("start entry {} is past the end of the stream ({})", from, total);
        ws_sender
            .send(Message::Binary(ServerMessage::Error { reason }.to_bytes()))
            .await?;
        return Ok(());
    }

    let mut next = replay(&entries, from, &mut ws_sender).await?;

    loop {
        tokio::select! {
            live = live_rx.recv() => match live {
                Ok(entry) => {
                    if entry.id > next {
                        next = replay(&entries, next, &mut ws_sender).await?;
                    }
                    if entry.id < next {
                        continue;
                    }
                    next = entry.id + 1;
                    send_entry(&mut ws_sender, entry).await?;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Stream client lagged {} entries, replaying from disk", n);
                    next = replay(&entries, next, &mut ws_sender).await?;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = ws_receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(_)) => {}
            },
        }
    }

    Ok(())
}
