//! Outbound half of craftbridge
//!
//! Delivers rendered game events to a remote chat room over a persistent
//! connection:
//!
//! - **Queue**: in-memory FIFO, at-least-once until a send succeeds
//! - **Connection**: opened lazily on enqueue, reopened 5s after a close while
//!   messages are pending, closed after 10 minutes of inactivity
//! - **Transport**: pluggable via [`ChatTransport`]; [`WebSocketTransport`] is
//!   the production implementation

pub mod bridge;
pub mod transport;
pub mod websocket;

pub use bridge::{BridgeConfig, BridgeHandle, ConnectionState, OutboundBridge, QueuedMessage};
pub use transport::{ChatSink, ChatTransport, ConnectionMonitor};
pub use websocket::{WebSocketConfig, WebSocketTransport};
