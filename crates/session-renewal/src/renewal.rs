//! Periodic renewal of the session credential

use crate::claims::{expires_at, fingerprint};
use crate::store::persist_credential;
use chrono::{DateTime, TimeDelta, Utc};
use craftbridge_core::{BridgeError, Result};
use reqwest::header::{COOKIE, SET_COOKIE};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Configuration for credential renewal
#[derive(Debug, Clone)]
pub struct RenewalConfig {
    /// Endpoint issuing an access token for the current credential
    pub issue_url: String,
    /// Anonymous login endpoint returning the new credential as a cookie
    pub login_url: String,
    /// Account the bridge logs in as
    pub username: String,
    /// Env file the renewed credential is written to
    pub env_file: PathBuf,
    /// Key of the credential line in the env file
    pub credential_key: String,
    /// Time between checks; the first check runs immediately
    pub period: Duration,
    /// Renew once remaining validity drops below this
    pub window: Duration,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
}

impl RenewalConfig {
    /// Create config with the default schedule
    pub fn new(issue_url: String, login_url: String, username: String, env_file: PathBuf) -> Self {
        Self {
            issue_url,
            login_url,
            username,
            env_file,
            credential_key: "SESSION_CREDENTIAL".to_string(),
            period: Duration::from_secs(24 * 60 * 60),
            window: Duration::from_secs(10 * 24 * 60 * 60),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Result of one renewal check
#[derive(Debug, Clone, PartialEq)]
pub enum RenewalOutcome {
    /// Credential still valid for longer than the window
    NotDue { remaining: TimeDelta },
    /// Credential replaced
    Renewed,
}

/// Whether a credential expiring at `expires_at` should be renewed at `now`
pub fn needs_renewal(expires_at: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    let window = TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX);
    expires_at - now < window
}

#[derive(Deserialize)]
struct IssueResponse {
    #[serde(default)]
    success: bool,
    token: Option<String>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    access_token: &'a str,
}

fn http_error(context: &str, err: reqwest::Error) -> BridgeError {
    BridgeError::Http(format!("{}: {}", context, err))
}

/// Single writer of the session credential
pub struct CredentialRenewal {
    config: RenewalConfig,
    client: reqwest::Client,
    credential: watch::Sender<String>,
}

impl CredentialRenewal {
    pub fn new(config: RenewalConfig, credential: watch::Sender<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| http_error("building HTTP client", e))?;

        Ok(Self {
            config,
            client,
            credential,
        })
    }

    /// Check now, then every `period`, until `shutdown` is cancelled
    ///
    /// Checks run inline in this loop, so two renewals never overlap.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.cancelled() => break,
            }

            match self.run_once(Utc::now()).await {
                Ok(RenewalOutcome::Renewed) => {}
                Ok(RenewalOutcome::NotDue { remaining }) => {
                    info!(
                        "Session credential valid for {} more day(s), no renewal needed",
                        remaining.num_days()
                    );
                }
                Err(BridgeError::Credential(reason)) => {
                    warn!("Skipping renewal, credential unreadable: {}", reason);
                }
                Err(e) => error!("Session credential renewal failed: {}", e),
            }
        }
        debug!("Renewal task stopped");
    }

    /// One check-and-maybe-renew cycle evaluated at `now`
    ///
    /// On any exchange failure the current credential stays in place.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<RenewalOutcome> {
        let current = self.credential.borrow().clone();
        let expiry = expires_at(&current)?;

        if !needs_renewal(expiry, now, self.config.window) {
            return Ok(RenewalOutcome::NotDue {
                remaining: expiry - now,
            });
        }

        info!(
            "Session credential {} expires {}, renewing",
            fingerprint(&current),
            expiry
        );
        let access_token = self.issue_access_token(&current).await?;
        let renewed = self.login(&access_token).await?;

        self.credential.send_replace(renewed.clone());
        info!(
            "Session credential renewed: {} -> {}",
            fingerprint(&current),
            fingerprint(&renewed)
        );

        // The in-memory value stays even if the write fails
        if let Err(e) =
            persist_credential(&self.config.env_file, &self.config.credential_key, &renewed).await
        {
            error!(
                "Renewed credential not persisted to {}: {}",
                self.config.env_file.display(),
                e
            );
        }

        Ok(RenewalOutcome::Renewed)
    }

    async fn issue_access_token(&self, credential: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.config.issue_url)
            .header(COOKIE, credential)
            .send()
            .await
            .map_err(|e| http_error("token issue request", e))?
            .error_for_status()
            .map_err(|e| http_error("token issue request", e))?;

        let body: IssueResponse = response
            .json()
            .await
            .map_err(|e| http_error("token issue response", e))?;

        match body.token {
            Some(token) if body.success && !token.is_empty() => Ok(token),
            _ => Err(BridgeError::Renewal(
                "token issue endpoint reported failure".to_string(),
            )),
        }
    }

    async fn login(&self, access_token: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.config.login_url)
            .json(&LoginRequest {
                username: &self.config.username,
                access_token,
            })
            .send()
            .await
            .map_err(|e| http_error("login request", e))?
            .error_for_status()
            .map_err(|e| http_error("login request", e))?;

        response
            .headers()
            .get(SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .and_then(|cookie| cookie.split(';').next())
            .map(str::trim)
            .filter(|credential| !credential.is_empty())
            .map(str::to_string)
            .ok_or_else(|| BridgeError::Renewal("login response carried no cookie".to_string()))
    }
}
