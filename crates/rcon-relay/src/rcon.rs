//! Source RCON protocol client
//!
//! Minecraft speaks the Valve Source RCON framing:
//! https://developer.valvesoftware.com/wiki/Source_RCON_Protocol
//!
//! Sessions are short-lived: connect, authenticate, run one command, close.
//! Nothing here reconnects or retries.

use craftbridge_core::{BridgeError, Result};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// RCON packet type constants
pub mod packet_type {
    /// Command output
    pub const RESPONSE_VALUE: i32 = 0;
    /// Execute command; also the type of the auth response
    pub const EXEC_COMMAND: i32 = 2;
    /// Authenticate with password
    pub const AUTH: i32 = 3;
}

/// Largest response body a server sends in one packet
const MAX_BODY_LEN: usize = 4096;
/// id(4) + type(4) + two null terminators
const HEADER_LEN: usize = 10;

/// A single RCON packet
#[derive(Debug, PartialEq)]
pub struct RconPacket {
    pub id: i32,
    pub packet_type: i32,
    pub body: String,
}

impl RconPacket {
    pub fn new(id: i32, packet_type: i32, body: impl Into<String>) -> Self {
        Self {
            id,
            packet_type,
            body: body.into(),
        }
    }

    /// Serialize packet to bytes, size prefix included
    pub fn to_bytes(&self) -> Vec<u8> {
        let body_bytes = self.body.as_bytes();
        let size = HEADER_LEN + body_bytes.len();

        let mut buf = Vec::with_capacity(4 + size);
        buf.extend_from_slice(&(size as i32).to_le_bytes());
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&self.packet_type.to_le_bytes());
        buf.extend_from_slice(body_bytes);
        buf.push(0);
        buf.push(0);

        buf
    }

    /// Parse packet from bytes (excluding size prefix)
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(BridgeError::Protocol("RCON packet too short".to_string()));
        }

        let id = i32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let packet_type = i32::from_le_bytes([data[4], data[5], data[6], data[7]]);

        let body_end = data[8..]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(data.len() - 8);
        let body = String::from_utf8_lossy(&data[8..8 + body_end]).to_string();

        Ok(Self {
            id,
            packet_type,
            body,
        })
    }
}

/// One authenticated RCON connection
pub struct RconSession {
    stream: TcpStream,
    next_id: i32,
    /// Bound on every wait for a reply
    timeout: Duration,
}

impl RconSession {
    /// Connect to `address` and authenticate with `password`
    pub async fn connect(address: &str, password: &str, timeout: Duration) -> Result<Self> {
        debug!("Connecting to RCON at {}", address);

        let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
            .await
            .map_err(|_| BridgeError::Rcon(format!("connect to {} timed out", address)))?
            .map_err(|e| BridgeError::Rcon(format!("connect to {} failed: {}", address, e)))?;

        let mut session = Self {
            stream,
            next_id: 1,
            timeout,
        };

        let auth_id = session.allocate_id();
        session
            .send_packet(&RconPacket::new(auth_id, packet_type::AUTH, password))
            .await?;
        let response = session.recv_packet().await?;

        if response.id == -1 {
            return Err(BridgeError::Rcon("authentication failed".to_string()));
        }
        if response.id != auth_id {
            warn!(
                "RCON auth response ID mismatch: expected {}, got {}",
                auth_id, response.id
            );
        }

        debug!("RCON authenticated");
        Ok(session)
    }

    fn allocate_id(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Run one command and return its textual output
    ///
    /// Output longer than one packet arrives split across several responses.
    /// An empty `RESPONSE_VALUE` packet is sent right after the command; the
    /// server answers it only once the command output is complete, so its
    /// echo marks the end of the output.
    pub async fn execute(&mut self, command: &str) -> Result<String> {
        let cmd_id = self.allocate_id();
        let end_id = self.allocate_id();
        self.send_packet(&RconPacket::new(cmd_id, packet_type::EXEC_COMMAND, command))
            .await?;
        self.send_packet(&RconPacket::new(end_id, packet_type::RESPONSE_VALUE, ""))
            .await?;

        let mut output = String::new();
        let mut packets = 0usize;
        loop {
            let response = tokio::time::timeout(self.timeout, self.recv_packet())
                .await
                .map_err(|_| BridgeError::Rcon(format!("no reply to {:?}", command)))??;

            if response.id == end_id {
                break;
            }
            if response.id != cmd_id {
                debug!(
                    "Response ID mismatch: expected {}, got {}",
                    cmd_id, response.id
                );
                continue;
            }
            output.push_str(&response.body);
            packets += 1;
        }

        if packets > 1 {
            debug!("RCON output for {:?} spanned {} packets", command, packets);
        }
        info!("RCON {} -> {}", command, output.trim_end());
        Ok(output)
    }

    async fn send_packet(&mut self, packet: &RconPacket) -> Result<()> {
        self.stream
            .write_all(&packet.to_bytes())
            .await
            .map_err(|e| BridgeError::Rcon(format!("send failed: {}", e)))
    }

    async fn recv_packet(&mut self) -> Result<RconPacket> {
        let mut size_buf = [0u8; 4];
        self.stream
            .read_exact(&mut size_buf)
            .await
            .map_err(|e| BridgeError::Rcon(format!("recv size failed: {}", e)))?;
        let size = i32::from_le_bytes(size_buf);

        if size < HEADER_LEN as i32 || (size as usize) > HEADER_LEN + MAX_BODY_LEN {
            return Err(BridgeError::Protocol(format!(
                "RCON packet size out of range: {} bytes",
                size
            )));
        }

        let mut data = vec![0u8; size as usize];
        self.stream
            .read_exact(&mut data)
            .await
            .map_err(|e| BridgeError::Rcon(format!("recv body failed: {}", e)))?;

        RconPacket::from_bytes(&data)
    }

    /// Shut the connection down
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("RCON shutdown: {}", e);
        }
    }
}
