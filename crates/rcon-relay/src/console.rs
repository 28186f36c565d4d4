//! Remote console seam used by the HTTP relay

use crate::rcon::RconSession;
use async_trait::async_trait;
use craftbridge_core::Result;
use std::time::Duration;

/// Something that can run one console command on the game server
#[async_trait]
pub trait RemoteConsole: Send + Sync + 'static {
    /// Run `command` and return the server's textual response
    async fn execute(&self, command: &str) -> Result<String>;
}

/// Connection parameters for the game server's RCON port
#[derive(Debug, Clone)]
pub struct RconConfig {
    /// RCON server address (host:port)
    pub address: String,
    /// RCON password
    pub password: String,
    /// Connect timeout
    pub timeout: Duration,
}

impl Default for RconConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:25575".to_string(),
            password: String::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl RconConfig {
    /// Create config for a host, port and password
    pub fn new(host: &str, port: u16, password: impl Into<String>) -> Self {
        Self {
            address: format!("{}:{}", host, port),
            password: password.into(),
            ..Default::default()
        }
    }
}

/// [`RemoteConsole`] that opens a fresh RCON session for every command
pub struct RconConsole {
    config: RconConfig,
}

impl RconConsole {
    pub fn new(config: RconConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RemoteConsole for RconConsole {
    async fn execute(&self, command: &str) -> Result<String> {
        let mut session =
            RconSession::connect(&self.config.address, &self.config.password, self.config.timeout)
                .await?;
        let result = session.execute(command).await;
        session.close().await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rcon::tests::fake_server;
    use craftbridge_core::BridgeError;
    use tokio::net::TcpListener;

    #[test]
    fn test_config_defaults() {
        let config = RconConfig::default();
        assert_eq!(config.address, "127.0.0.1:25575");
        assert_eq!(config.timeout, Duration::from_secs(10));

        let config = RconConfig::new("mc.local", 25576, "secret");
        assert_eq!(config.address, "mc.local:25576");
        assert_eq!(config.password, "secret");
    }

    #[tokio::test]
    async fn test_console_round_trip() {
        let address = fake_server("pw", "Set the time to 1000").await;
        let console = RconConsole::new(RconConfig {
            address,
            password: "pw".into(),
            ..Default::default()
        });

        let output = tokio_test::assert_ok!(console.execute("time set day").await);
        assert_eq!(output, "Set the time to 1000");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_an_error() {
        // Bind then drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let console = RconConsole::new(RconConfig {
            address,
            password: "pw".into(),
            ..Default::default()
        });
        let result = console.execute("list").await;
        assert!(matches!(result, Err(BridgeError::Rcon(_))));
    }
}
