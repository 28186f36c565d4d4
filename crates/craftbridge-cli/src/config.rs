//! Settings loaded from the environment

use crate::log_source::LogSourceConfig;
use chat_bridge::WebSocketConfig;
use craftbridge_core::parser::DEFAULT_SERVER_NAME;
use craftbridge_core::{BridgeError, Result};
use rcon_relay::{AuthPolicy, RconConfig};
use session_renewal::RenewalConfig;
use std::path::Path;
use std::str::FromStr;

const DEFAULT_RCON_HOST: &str = "127.0.0.1";
const DEFAULT_RCON_PORT: u16 = 25575;
const DEFAULT_RELAY_PORT: u16 = 8085;

/// Everything the daemon needs to start
#[derive(Debug, Clone)]
pub struct Settings {
    pub log_source: LogSourceConfig,
    pub chat: WebSocketConfig,
    pub session_credential: String,
    pub server_name: String,
    pub rcon: RconConfig,
    pub relay_port: u16,
    pub relay_auth: AuthPolicy,
    /// `None` when the renewal endpoints are not configured
    pub renewal: Option<RenewalConfig>,
}

impl Settings {
    /// Build settings from a key lookup
    ///
    /// Blank values count as absent. `env_file` is where a renewed credential
    /// gets written back.
    pub fn from_lookup<F>(lookup: F, env_file: &Path) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let require = |key: &str| {
            get(key).ok_or_else(|| BridgeError::Config(format!("{} is required", key)))
        };

        let log_source = match (get("LOG_COMMAND"), get("LOG_FILE")) {
            (Some(command), _) => LogSourceConfig::from_command(&command)
                .ok_or_else(|| BridgeError::Config("LOG_COMMAND is empty".to_string()))?,
            (None, Some(file)) => LogSourceConfig::tail(Path::new(&file)),
            (None, None) => {
                return Err(BridgeError::Config(
                    "LOG_FILE or LOG_COMMAND is required".to_string(),
                ));
            }
        };

        let mut chat = WebSocketConfig::new(require("CHAT_URL")?);
        if let Some(label) = get("CLIENT_LABEL") {
            chat.client_label = label;
        }

        let rcon = RconConfig::new(
            &get("RCON_HOST").unwrap_or_else(|| DEFAULT_RCON_HOST.to_string()),
            parse_or(get("RCON_PORT"), "RCON_PORT", DEFAULT_RCON_PORT)?,
            require("RCON_PASSWORD")?,
        );

        let relay_auth = match get("RELAY_TOKEN") {
            Some(token) => AuthPolicy::bearer(&token),
            None if parse_or(get("RELAY_ALLOW_UNAUTHENTICATED"), "RELAY_ALLOW_UNAUTHENTICATED", false)? => {
                AuthPolicy::Disabled
            }
            None => {
                return Err(BridgeError::Config(
                    "RELAY_TOKEN is required (set RELAY_ALLOW_UNAUTHENTICATED=true to run the relay without one)"
                        .to_string(),
                ));
            }
        };

        let renewal = match (
            get("RENEWAL_ISSUE_URL"),
            get("RENEWAL_LOGIN_URL"),
            get("RENEWAL_USERNAME"),
        ) {
            (Some(issue_url), Some(login_url), Some(username)) => Some(RenewalConfig::new(
                issue_url,
                login_url,
                username,
                env_file.to_path_buf(),
            )),
            _ => None,
        };

        Ok(Self {
            log_source,
            chat,
            session_credential: require("SESSION_CREDENTIAL")?,
            server_name: get("SERVER_NAME").unwrap_or_else(|| DEFAULT_SERVER_NAME.to_string()),
            rcon,
            relay_port: parse_or(get("RELAY_PORT"), "RELAY_PORT", DEFAULT_RELAY_PORT)?,
            relay_auth,
            renewal,
        })
    }
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> Result<T> {
    match value {
        Some(raw) => raw
            .parse()
            .map_err(|_| BridgeError::Config(format!("{} has invalid value {:?}", key, raw))),
        None => Ok(default),
    }
}
