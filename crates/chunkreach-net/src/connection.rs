//! Client connection to the auxiliary chunk server.
//!
//! [`ProtocolConnection`] owns at most one TCP stream at a time. Connecting
//! and all stream I/O run as tasks on the supplied runtime; callers never
//! block. Results and inbound messages come back as [`ConnectionEvent`]s on
//! the receiver returned by [`ProtocolConnection::new`].
//!
//! Every connection attempt gets a generation number. Tasks belonging to an
//! attempt that has since been replaced or torn down find their generation
//! stale and stay silent, so each attempt reports `Disconnected` exactly
//! once and no inbound message is delivered after a disconnect.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use chunkreach_chunk::{Chunk, CutoffPolicy};
use chunkreach_coords::Pos2;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::address::ServerAddress;
use crate::framing::{FrameConfig, FrameError, read_frame, write_frame};
use crate::messages::{InboundMessage, MessageError, OutboundMessage};
use crate::socket::{SocketConfig, connect_stream};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Attempting to establish a TCP connection.
    Connecting,
    /// TCP connection established, ready for communication.
    Connected,
    /// Connection lost or intentionally closed.
    Disconnected,
}

/// Observable connection state backed by a [`watch`] channel.
///
/// Multiple subscribers can observe state transitions without polling.
pub struct ConnectionStateWatch {
    tx: watch::Sender<ConnectionState>,
    rx: watch::Receiver<ConnectionState>,
}

impl Default for ConnectionStateWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateWatch {
    /// Create a new watch initialized to [`ConnectionState::Disconnected`].
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(ConnectionState::Disconnected);
        Self { tx, rx }
    }

    /// Set the current connection state, notifying all subscribers.
    pub fn set(&self, state: ConnectionState) {
        let _ = self.tx.send(state);
    }

    /// Return a new subscriber receiver.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.rx.clone()
    }

    /// Return the current state without blocking.
    pub fn current(&self) -> ConnectionState {
        *self.rx.borrow()
    }
}

/// Why a connection ended.
///
/// Expected reasons are deliberate and must not trigger reconnection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    Expected(String),
    Unexpected(String),
}

impl DisconnectReason {
    pub fn is_expected(&self) -> bool {
        matches!(self, Self::Expected(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Expected(msg) | Self::Unexpected(msg) => msg,
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expected(msg) => write!(f, "expected: {msg}"),
            Self::Unexpected(msg) => write!(f, "unexpected: {msg}"),
        }
    }
}

/// Notifications from the connection to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected(DisconnectReason),
    ExtraChunk(Chunk),
    StatusMessage(String),
}

/// Commands the admission controller issues to the auxiliary link.
///
/// Sends while disconnected are logged and dropped.
pub trait AuxLink: Send + Sync {
    /// Start connecting to `address` (`host` or `host:port`).
    fn connect(&self, address: &str);

    /// Close the connection, or cancel a pending attempt, and report
    /// `reason`. Reports even when already disconnected.
    fn disconnect(&self, reason: DisconnectReason);

    fn is_connected(&self) -> bool;

    /// Redact and upload one of the client's own game chunks.
    fn send_chunk(&self, chunk: Chunk);

    fn send_chunks_request(&self, positions: &[Pos2]);

    fn send_string_message(&self, text: &str);

    fn send_chunk_loads_per_second(&self, chunks_per_second: u32) {
        self.send_string_message(&format!("mod.chunksPerSecond={chunks_per_second}"));
    }

    fn send_player_dimension(&self, dimension: i32) {
        self.send_string_message(&format!("game.dimension={dimension}"));
    }
}

enum Link {
    Idle,
    Connecting {
        generation: u64,
        task: JoinHandle<()>,
    },
    Open {
        generation: u64,
        outbound: mpsc::UnboundedSender<Vec<u8>>,
        shutdown: watch::Sender<bool>,
        peer: SocketAddr,
    },
}

impl Link {
    fn generation(&self) -> Option<u64> {
        match self {
            Link::Idle => None,
            Link::Connecting { generation, .. } | Link::Open { generation, .. } => {
                Some(*generation)
            }
        }
    }

    /// Tear down whatever is live. Returns whether anything was.
    fn close(&mut self) -> bool {
        match std::mem::replace(self, Link::Idle) {
            Link::Idle => false,
            Link::Connecting { task, .. } => {
                task.abort();
                true
            }
            Link::Open { shutdown, .. } => {
                let _ = shutdown.send(true);
                true
            }
        }
    }
}

struct Shared {
    runtime: Handle,
    cutoff: Arc<dyn CutoffPolicy>,
    socket: SocketConfig,
    frame: FrameConfig,
    link: Mutex<Link>,
    next_generation: AtomicU64,
    state: ConnectionStateWatch,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

/// Framed protocol client for the auxiliary chunk server.
pub struct ProtocolConnection {
    shared: Arc<Shared>,
}

impl ProtocolConnection {
    /// Create an idle connection whose tasks run on `runtime`. Outbound
    /// chunks are redacted with `cutoff`.
    pub fn new(
        runtime: Handle,
        cutoff: Arc<dyn CutoffPolicy>,
    ) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        Self::with_config(runtime, cutoff, SocketConfig::default(), FrameConfig::default())
    }

    pub fn with_config(
        runtime: Handle,
        cutoff: Arc<dyn CutoffPolicy>,
        socket: SocketConfig,
        frame: FrameConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            runtime,
            cutoff,
            socket,
            frame,
            link: Mutex::new(Link::Idle),
            next_generation: AtomicU64::new(1),
            state: ConnectionStateWatch::new(),
            events,
        });
        (Self { shared }, receiver)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state.current()
    }

    /// Subscribe to lifecycle state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Remote endpoint of the open connection.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        match &*self.shared.link.lock().unwrap() {
            Link::Open { peer, .. } => Some(*peer),
            _ => None,
        }
    }
}

impl AuxLink for ProtocolConnection {
    fn connect(&self, address: &str) {
        let shared = &self.shared;
        let mut link = shared.link.lock().unwrap();
        if let Link::Open { peer, .. } = &*link {
            tracing::warn!(%peer, "connect ignored: already connected");
            return;
        }
        if link.close() {
            tracing::warn!("dropping stale connection attempt");
            shared.emit(ConnectionEvent::Disconnected(DisconnectReason::Expected(
                "superseded by a new connection attempt".into(),
            )));
        }

        let addr = match ServerAddress::parse(address) {
            Ok(addr) => addr,
            Err(e) => {
                tracing::error!(address, error = %e, "cannot connect to chunk server");
                shared.state.set(ConnectionState::Disconnected);
                shared.emit(ConnectionEvent::Disconnected(DisconnectReason::Unexpected(
                    e.to_string(),
                )));
                return;
            }
        };

        let generation = shared.next_generation.fetch_add(1, Ordering::Relaxed);
        shared.state.set(ConnectionState::Connecting);
        tracing::debug!(%addr, generation, "connecting to chunk server");
        // The task cannot observe the link until this guard is released.
        let task = shared
            .runtime
            .spawn(Arc::clone(shared).establish(generation, addr));
        *link = Link::Connecting { generation, task };
    }

    fn disconnect(&self, reason: DisconnectReason) {
        let shared = &self.shared;
        let mut link = shared.link.lock().unwrap();
        if link.close() {
            tracing::info!(%reason, "disconnected from chunk server");
        } else {
            tracing::debug!(%reason, "disconnect while not connected");
        }
        shared.state.set(ConnectionState::Disconnected);
        shared.emit(ConnectionEvent::Disconnected(reason));
    }

    fn is_connected(&self) -> bool {
        matches!(&*self.shared.link.lock().unwrap(), Link::Open { .. })
    }

    fn send_chunk(&self, chunk: Chunk) {
        let Some(outbound) = self.shared.outbound() else {
            tracing::error!(pos = %chunk.pos, "cannot send chunk: not connected");
            return;
        };

        let mut data = chunk.into_data();
        data.compute_height_map();
        let cutoff = self.shared.cutoff.decide_underground_cutoff(&data);
        let redacted = data.redact_below(cutoff);
        tracing::trace!(pos = %data.pos(), cutoff, redacted, "sending chunk");

        let message = OutboundMessage::ChunkData {
            timestamp_ms: unix_millis(),
            data,
        };
        let _ = outbound.send(message.encode());
    }

    fn send_chunks_request(&self, positions: &[Pos2]) {
        let Some(outbound) = self.shared.outbound() else {
            tracing::error!(count = positions.len(), "cannot request chunks: not connected");
            return;
        };
        tracing::debug!(count = positions.len(), "requesting chunks");
        let message = OutboundMessage::ChunksRequest(positions.to_vec());
        let _ = outbound.send(message.encode());
    }

    fn send_string_message(&self, text: &str) {
        let Some(outbound) = self.shared.outbound() else {
            tracing::error!(text, "cannot send message: not connected");
            return;
        };
        let message = OutboundMessage::StringMessage(text.to_string());
        let _ = outbound.send(message.encode());
    }
}

impl Drop for ProtocolConnection {
    fn drop(&mut self) {
        self.shared.link.lock().unwrap().close();
        self.shared.state.set(ConnectionState::Disconnected);
    }
}

impl Shared {
    fn emit(&self, event: ConnectionEvent) {
        let _ = self.events.send(event);
    }

    fn outbound(&self) -> Option<mpsc::UnboundedSender<Vec<u8>>> {
        match &*self.link.lock().unwrap() {
            Link::Open { outbound, .. } => Some(outbound.clone()),
            _ => None,
        }
    }

    async fn establish(self: Arc<Self>, generation: u64, addr: ServerAddress) {
        let stream = match connect_stream(&addr, &self.socket).await {
            Ok(stream) => stream,
            Err(e) => {
                self.fail(
                    generation,
                    DisconnectReason::Unexpected(format!("connect to {addr} failed: {e}")),
                );
                return;
            }
        };
        let peer = match stream.peer_addr() {
            Ok(peer) => peer,
            Err(e) => {
                self.fail(generation, DisconnectReason::Unexpected(e.to_string()));
                return;
            }
        };

        let (reader, writer) = stream.into_split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        {
            let mut link = self.link.lock().unwrap();
            if link.generation() != Some(generation) {
                tracing::debug!(generation, "dropping connection for a cancelled attempt");
                return;
            }
            *link = Link::Open {
                generation,
                outbound: outbound_tx,
                shutdown: shutdown_tx,
                peer,
            };
            self.state.set(ConnectionState::Connected);
            self.emit(ConnectionEvent::Connected);
        }
        tracing::info!(%peer, "connected to chunk server");

        self.runtime.spawn(Arc::clone(&self).write_loop(
            generation,
            writer,
            outbound_rx,
            shutdown_rx.clone(),
        ));
        self.runtime
            .spawn(Arc::clone(&self).read_loop(generation, reader, shutdown_rx));
    }

    /// Tear down attempt `generation` after a transport failure. No-op if it
    /// is no longer the live attempt.
    fn fail(&self, generation: u64, reason: DisconnectReason) {
        let mut link = self.link.lock().unwrap();
        if link.generation() != Some(generation) {
            tracing::debug!(generation, %reason, "ignoring failure of a stale connection");
            return;
        }
        // Never abort here: a connecting attempt fails from inside its own task.
        if let Link::Open { shutdown, .. } = std::mem::replace(&mut *link, Link::Idle) {
            let _ = shutdown.send(true);
        }
        tracing::warn!(%reason, "chunk server connection lost");
        self.state.set(ConnectionState::Disconnected);
        self.emit(ConnectionEvent::Disconnected(reason));
    }

    /// Emit an inbound event only while `generation` is the open connection.
    fn deliver(&self, generation: u64, event: ConnectionEvent) {
        let link = self.link.lock().unwrap();
        match &*link {
            Link::Open { generation: g, .. } if *g == generation => self.emit(event),
            _ => tracing::trace!(generation, "dropping inbound message from a closed connection"),
        }
    }

    fn dispatch(&self, generation: u64, payload: &[u8]) {
        let event = match InboundMessage::decode(payload) {
            Ok(InboundMessage::ChunkData(data)) => ConnectionEvent::ExtraChunk(Chunk::from_data(data)),
            Ok(InboundMessage::StatusMessage(text)) => ConnectionEvent::StatusMessage(text),
            Err(MessageError::EmptyChunk) => {
                tracing::warn!("chunk server sent a chunk message without data");
                return;
            }
            Err(MessageError::UnknownType(message_type)) => {
                tracing::error!(message_type, len = payload.len(), "unknown message type from chunk server");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, len = payload.len(), "discarding malformed frame");
                return;
            }
        };
        self.deliver(generation, event);
    }

    async fn read_loop(
        self: Arc<Self>,
        generation: u64,
        mut reader: OwnedReadHalf,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            let frame = tokio::select! {
                frame = read_frame(&mut reader, &self.frame) => frame,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            };
            match frame {
                Ok(payload) => self.dispatch(generation, &payload),
                Err(FrameError::ConnectionClosed) => {
                    self.fail(
                        generation,
                        DisconnectReason::Unexpected("connection closed by server".into()),
                    );
                    break;
                }
                Err(e) => {
                    self.fail(generation, DisconnectReason::Unexpected(format!("read failed: {e}")));
                    break;
                }
            }
        }
    }

    async fn write_loop(
        self: Arc<Self>,
        generation: u64,
        mut writer: OwnedWriteHalf,
        mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                payload = outbound.recv() => {
                    let Some(payload) = payload else { break };
                    match write_frame(&mut writer, &payload, &self.frame).await {
                        Ok(()) => {}
                        Err(FrameError::PayloadTooLarge { size, max }) => {
                            tracing::error!(size, max, "dropping oversized outbound message");
                        }
                        Err(e) => {
                            self.fail(generation, DisconnectReason::Unexpected(format!("write failed: {e}")));
                            break;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
