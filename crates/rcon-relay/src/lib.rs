//! Inbound half of craftbridge
//!
//! Accepts commands over a local HTTP endpoint and forwards each one to the
//! game server's remote console:
//!
//! - **Relay**: `POST /` with a bearer token and `{"command": "..."}`
//! - **Console**: one fresh RCON session per request, closed afterwards

pub mod console;
pub mod rcon;
pub mod relay;

pub use console::{RconConfig, RconConsole, RemoteConsole};
pub use rcon::RconSession;
pub use relay::{AuthPolicy, RelayState, router, serve};
