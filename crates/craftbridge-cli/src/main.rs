//! craftbridge daemon
//!
//! Relays game server log events to a chat room and chat-originated commands
//! back to the server:
//! - log follower -> line parser -> outbound chat bridge (WebSocket)
//! - HTTP relay on 127.0.0.1 -> RCON
//! - daily session credential renewal, persisted to the env file
//!
//! Usage: `craftbridge [ENV_FILE]` (default `.env`)

mod config;
mod log_source;
mod pipeline;

use anyhow::{Context, Result};
use chat_bridge::{BridgeConfig, OutboundBridge, WebSocketTransport};
use config::Settings;
use craftbridge_core::LineParser;
use rcon_relay::{RconConsole, RelayState};
use session_renewal::{CredentialRenewal, fingerprint};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("craftbridge v{} starting", env!("CARGO_PKG_VERSION"));

    // The env file doubles as the store for renewed credentials, so it wins
    // over inherited variables
    let env_file = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".env"));
    match dotenvy::from_path_override(&env_file) {
        Ok(()) => info!("Loaded settings from {}", env_file.display()),
        Err(e) => warn!("Could not load {}: {}", env_file.display(), e),
    }

    let settings = Settings::from_lookup(|key| std::env::var(key).ok(), &env_file)
        .context("invalid configuration")?;
    let parser = LineParser::new(&settings.server_name)?;
    info!(
        "Chat endpoint {}, session credential {}",
        settings.chat.url,
        fingerprint(&settings.session_credential)
    );

    let shutdown = CancellationToken::new();
    let (credential_tx, credential_rx) = watch::channel(settings.session_credential.clone());

    // Outbound: log -> chat
    let transport = Arc::new(WebSocketTransport::new(settings.chat.clone()));
    let bridge = OutboundBridge::spawn(transport, credential_rx, BridgeConfig::default());
    let lines = log_source::spawn(settings.log_source.clone(), shutdown.clone());
    let pipeline = tokio::spawn(pipeline::forward_events(lines, parser, bridge.clone()));

    // Inbound: HTTP -> RCON
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, settings.relay_port))
        .await
        .with_context(|| format!("binding relay port {}", settings.relay_port))?;
    if matches!(settings.relay_auth, rcon_relay::AuthPolicy::Disabled) {
        warn!("RELAY_TOKEN not set, command relay accepts unauthenticated requests");
    }
    let state = RelayState {
        console: Arc::new(RconConsole::new(settings.rcon.clone())),
        auth: settings.relay_auth.clone(),
    };
    let mut relay = tokio::spawn(rcon_relay::serve(
        listener,
        state,
        shutdown.clone().cancelled_owned(),
    ));

    // Credential renewal
    let renewal = match settings.renewal.clone() {
        Some(config) => {
            let renewal = CredentialRenewal::new(config, credential_tx)?;
            Some(tokio::spawn(renewal.run(shutdown.clone())))
        }
        None => {
            warn!(
                "Credential renewal disabled: set RENEWAL_ISSUE_URL, RENEWAL_LOGIN_URL and RENEWAL_USERNAME to enable"
            );
            None
        }
    };

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("waiting for Ctrl-C")?;
            info!("Shutdown requested");
        }
        result = &mut relay => {
            error!("Command relay stopped unexpectedly: {:?}", result);
        }
    }

    shutdown.cancel();
    bridge.shutdown().await;

    if !relay.is_finished() {
        match relay.await {
            Ok(Err(e)) => error!("Command relay error: {}", e),
            Err(e) => error!("Command relay task failed: {}", e),
            Ok(Ok(())) => {}
        }
    }
    if let Some(renewal) = renewal {
        let _ = renewal.await;
    }
    let _ = pipeline.await;

    info!("craftbridge stopped");
    Ok(())
}
