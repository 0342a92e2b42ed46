//! Client registry: id assignment, global admission cap, lookup.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use crate::config::Config;
use crate::signaling::frames::ServerFrame;
use crate::signaling::limiter::TokenBucket;

/// Outbound queue capacity per client. A consumer that lets this fill up is
/// disconnected rather than allowed to stall the dispatcher.
pub const OUTBOUND_QUEUE: usize = 64;

/// Messages travelling through a client's outbound queue.
#[derive(Debug)]
pub enum Outbound {
    Text(String),
    Binary(Vec<u8>),
    Ping,
}

/// Close code and reason recorded before a connection is killed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: &'static str,
}

/// One connected client. Exclusively owned by its connection task; the
/// registry, room index, dispatcher, and heartbeat hold shared `Arc`s and
/// mutate only through the operations defined here and on [`RoomIndex`].
///
/// [`RoomIndex`]: crate::signaling::rooms::RoomIndex
pub struct ClientHandle {
    /// Server-assigned id, unique for the life of the process.
    pub id: String,
    /// Current room. Updated only under the room index lock.
    pub room: Mutex<Option<String>>,
    /// Inbound-frame token bucket.
    pub bucket: Mutex<TokenBucket>,
    /// Set on admission and on each pong, cleared by each heartbeat tick.
    pub alive: AtomicBool,
    outbound: mpsc::Sender<Outbound>,
    shutdown: Notify,
    close_reason: Mutex<Option<CloseReason>>,
    killed: AtomicBool,
}

impl ClientHandle {
    /// Enqueue a server frame, best effort. A full or closed queue kills
    /// this client; the dispatcher is never blocked.
    pub fn send_frame(&self, frame: &ServerFrame) {
        self.send_text(frame.to_json());
    }

    pub fn send_text(&self, json: String) {
        if self.outbound.try_send(Outbound::Text(json)).is_err() {
            self.kill(None);
        }
    }

    pub fn send_binary(&self, bytes: Vec<u8>) {
        if self.outbound.try_send(Outbound::Binary(bytes)).is_err() {
            self.kill(None);
        }
    }

    pub fn send_ping(&self) {
        if self.outbound.try_send(Outbound::Ping).is_err() {
            self.kill(None);
        }
    }

    /// Ask the connection task to terminate. With `Some(reason)` a close
    /// frame is sent first; `None` drops the stream without one. The first
    /// caller wins; later reasons are ignored.
    pub fn kill(&self, reason: Option<CloseReason>) {
        if !self.killed.swap(true, Ordering::SeqCst) {
            *self.close_reason.lock() = reason;
        }
        self.shutdown.notify_one();
    }

    /// Resolves once [`kill`](Self::kill) has been called.
    pub async fn wait_killed(&self) {
        self.shutdown.notified().await;
    }

    pub fn take_close_reason(&self) -> Option<CloseReason> {
        self.close_reason.lock().take()
    }

    pub fn room(&self) -> Option<String> {
        self.room.lock().clone()
    }
}

/// Shared registry of all admitted clients.
///
/// Uses `DashMap` for shard-level concurrency; the admission cap is a
/// compare-and-swap on a separate counter so concurrent admits can never
/// exceed it.
pub struct ClientRegistry {
    clients: DashMap<String, Arc<ClientHandle>>,
    count: AtomicUsize,
    max_clients: usize,
    rate: f64,
    burst: f64,
}

impl ClientRegistry {
    pub fn new(config: &Config) -> Self {
        Self {
            clients: DashMap::new(),
            count: AtomicUsize::new(0),
            max_clients: config.max_clients,
            rate: config.message_rate_per_sec,
            burst: config.message_burst,
        }
    }

    /// Admit a new connection: reserve a slot, assign a fresh id, insert.
    /// Returns `None` when the global cap is reached. The handle is valid
    /// for lookups before the caller sends the `id` frame.
    pub fn admit(&self, outbound: mpsc::Sender<Outbound>) -> Option<Arc<ClientHandle>> {
        self.count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.max_clients).then_some(n + 1)
            })
            .ok()?;

        let id = beacon_common::id::client_id();
        let handle = Arc::new(ClientHandle {
            id: id.clone(),
            room: Mutex::new(None),
            bucket: Mutex::new(TokenBucket::new(self.rate, self.burst)),
            alive: AtomicBool::new(true),
            outbound,
            shutdown: Notify::new(),
            close_reason: Mutex::new(None),
            killed: AtomicBool::new(false),
        });
        self.clients.insert(id, handle.clone());
        Some(handle)
    }

    pub fn lookup(&self, id: &str) -> Option<Arc<ClientHandle>> {
        self.clients.get(id).map(|e| e.value().clone())
    }

    /// Idempotent removal; frees the admission slot exactly once.
    pub fn remove(&self, id: &str) {
        if self.clients.remove(id).is_some() {
            self.count.fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub fn len(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of connected client ids for the status endpoint.
    pub fn ids(&self) -> Vec<String> {
        self.clients.iter().map(|e| e.key().clone()).collect()
    }

    /// Snapshot of client handles for the heartbeat sweep and shutdown.
    pub fn handles(&self) -> Vec<Arc<ClientHandle>> {
        self.clients.iter().map(|e| e.value().clone()).collect()
    }
}
