//! Outbound delivery state machine
//!
//! A single actor task owns the queue, the connection state, the open sink and
//! both timers. Every mutation happens inside that task, driven by three
//! inputs: commands from [`BridgeHandle`], lifecycle events from the transport,
//! and the two optional deadlines (idle close, delayed reconnect).
//!
//! State transitions:
//! - `Disconnected -> Connecting` on a connect attempt
//! - `Connecting -> Open` when the transport reports success
//! - `Connecting | Open -> Disconnected` on close, error or failed attempt

use crate::transport::{ChatSink, ChatTransport, ConnectionMonitor, TransportEvent};
use craftbridge_core::{BridgeError, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

/// Timing for the outbound bridge
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Wait before reopening a closed connection that still has messages queued
    pub reconnect_delay: Duration,
    /// Quiet period after which an open connection is released
    pub idle_timeout: Duration,
    /// Latency above which a delay note is appended to the message
    pub delay_threshold: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(10 * 60),
            delay_threshold: Duration::from_secs(5),
        }
    }
}

/// Chat connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
}

/// A rendered event waiting for delivery
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub text: String,
    pub enqueued_at: Instant,
}

impl QueuedMessage {
    pub fn new(text: String) -> Self {
        Self {
            text,
            enqueued_at: Instant::now(),
        }
    }

    /// Text to send at `now`, with ` (delayed Ns)` appended past `threshold`
    pub fn render(&self, now: Instant, threshold: Duration) -> String {
        let latency = now.saturating_duration_since(self.enqueued_at);
        if latency > threshold {
            format!("{} (delayed {}s)", self.text, latency.as_secs_f64().round() as u64)
        } else {
            self.text.clone()
        }
    }
}

enum Command {
    Enqueue(String),
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable handle to a running [`OutboundBridge`]
#[derive(Clone)]
pub struct BridgeHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
}

impl BridgeHandle {
    /// Queue a rendered event for delivery
    ///
    /// Only fails once the bridge has shut down.
    pub fn enqueue(&self, text: impl Into<String>) -> Result<()> {
        self.commands
            .send(Command::Enqueue(text.into()))
            .map_err(|_| BridgeError::Closed("outbound bridge"))
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Close the connection and stop the bridge
    pub async fn shutdown(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

/// Outbound bridge actor
pub struct OutboundBridge {
    transport: Arc<dyn ChatTransport>,
    credential: watch::Receiver<String>,
    config: BridgeConfig,
    queue: VecDeque<QueuedMessage>,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    sink: Option<Box<dyn ChatSink>>,
    /// Incremented per connect attempt; stale transport events are dropped
    generation: u64,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    idle_deadline: Option<Instant>,
    reconnect_at: Option<Instant>,
}

impl OutboundBridge {
    /// Start the bridge on the current runtime
    ///
    /// `credential` is read at every connect attempt, so a renewed credential
    /// applies from the next connection on.
    pub fn spawn(
        transport: Arc<dyn ChatTransport>,
        credential: watch::Receiver<String>,
        config: BridgeConfig,
    ) -> BridgeHandle {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let bridge = Self {
            transport,
            credential,
            config,
            queue: VecDeque::new(),
            state: ConnectionState::Disconnected,
            state_tx,
            sink: None,
            generation: 0,
            events_tx,
            idle_deadline: None,
            reconnect_at: None,
        };
        tokio::spawn(bridge.run(commands_rx, events_rx));

        BridgeHandle {
            commands: commands_tx,
            state: state_rx,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Enqueue(text)) => self.enqueue(text).await,
                    Some(Command::Shutdown(done)) => {
                        commands.close();
                        self.shutdown().await;
                        let _ = done.send(());
                        break;
                    }
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },
                Some(event) = events.recv() => self.on_transport_event(event).await,
                _ = wait_until(self.idle_deadline) => self.on_idle_expired().await,
                _ = wait_until(self.reconnect_at) => {
                    self.reconnect_at = None;
                    debug!("Reconnect delay elapsed");
                    self.connect();
                }
            }
        }
        debug!("Outbound bridge stopped");
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!("Chat connection {:?} -> {:?}", self.state, state);
        }
        self.state = state;
        self.state_tx.send_replace(state);
    }

    async fn enqueue(&mut self, text: String) {
        self.queue.push_back(QueuedMessage::new(text));
        if self.state == ConnectionState::Open {
            self.flush().await;
        } else {
            self.connect();
        }
    }

    /// Start a connect attempt unless one is in flight or already open
    fn connect(&mut self) {
        if self.state != ConnectionState::Disconnected {
            return;
        }

        self.reconnect_at = None;
        self.generation += 1;
        self.set_state(ConnectionState::Connecting);

        let generation = self.generation;
        let credential = self.credential.borrow().clone();
        let transport = Arc::clone(&self.transport);
        let events = self.events_tx.clone();
        let monitor = ConnectionMonitor::new(generation, self.events_tx.clone());

        debug!("Chat connect attempt {}", generation);
        tokio::spawn(async move {
            let event = match transport.connect(&credential, monitor).await {
                Ok(sink) => TransportEvent::Opened { generation, sink },
                Err(e) => TransportEvent::Failed {
                    generation,
                    reason: e.to_string(),
                },
            };
            let _ = events.send(event);
        });
    }

    fn is_current(&self, generation: u64) -> bool {
        generation == self.generation && self.state != ConnectionState::Disconnected
    }

    async fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened {
                generation,
                mut sink,
            } => {
                if generation != self.generation || self.state != ConnectionState::Connecting {
                    debug!("Discarding stale chat connection {}", generation);
                    sink.close().await;
                    return;
                }
                info!("Chat connection open, {} message(s) queued", self.queue.len());
                self.sink = Some(sink);
                self.set_state(ConnectionState::Open);
                self.flush().await;
            }
            TransportEvent::Failed { generation, reason } => {
                if self.is_current(generation) {
                    warn!("Chat connect failed: {}", reason);
                    self.on_closed();
                }
            }
            TransportEvent::Closed { generation } => {
                if self.is_current(generation) {
                    info!("Chat connection closed by peer");
                    self.sink = None;
                    self.on_closed();
                }
            }
            TransportEvent::Error { generation, reason } => {
                if self.is_current(generation) {
                    warn!("Chat connection error: {}", reason);
                    self.close_sink().await;
                    self.on_closed();
                }
            }
        }
    }

    /// Drain the queue oldest-first while the connection is open
    ///
    /// A failed send keeps the message at the head of the queue and drops the
    /// connection, so the next connection retries it.
    async fn flush(&mut self) {
        let mut delivered = 0usize;
        while let Some(message) = self.queue.front() {
            let Some(sink) = self.sink.as_mut() else {
                return;
            };
            let text = message.render(Instant::now(), self.config.delay_threshold);
            let sent = sink.send(&text).await;
            if let Err(e) = sent {
                warn!(
                    "Chat send failed, {} message(s) kept queued: {}",
                    self.queue.len(),
                    e
                );
                self.close_sink().await;
                self.on_closed();
                return;
            }
            self.queue.pop_front();
            delivered += 1;
        }

        if delivered > 0 {
            debug!("Delivered {} message(s)", delivered);
        }
        self.idle_deadline = Some(Instant::now() + self.config.idle_timeout);
    }

    async fn on_idle_expired(&mut self) {
        self.idle_deadline = None;
        if self.state == ConnectionState::Open {
            info!(
                "Chat connection idle for {:?}, closing",
                self.config.idle_timeout
            );
            self.close_sink().await;
            self.on_closed();
        }
    }

    async fn close_sink(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            sink.close().await;
        }
    }

    fn on_closed(&mut self) {
        self.sink = None;
        self.idle_deadline = None;
        self.set_state(ConnectionState::Disconnected);

        if self.queue.is_empty() {
            return;
        }
        info!(
            "{} message(s) pending, reconnecting in {:?}",
            self.queue.len(),
            self.config.reconnect_delay
        );
        self.reconnect_at = Some(Instant::now() + self.config.reconnect_delay);
    }

    async fn shutdown(&mut self) {
        self.close_sink().await;
        self.idle_deadline = None;
        self.reconnect_at = None;
        self.set_state(ConnectionState::Disconnected);
        if !self.queue.is_empty() {
            warn!(
                "Outbound bridge stopping with {} undelivered message(s)",
                self.queue.len()
            );
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
