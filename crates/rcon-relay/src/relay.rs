//! HTTP command relay
//!
//! `POST /` with `Authorization: Bearer <token>` and `{"command": "..."}`.
//!
//! | Outcome | Status |
//! |---------|--------|
//! | command ran | 200 `OK` |
//! | missing/empty/malformed command | 400 |
//! | bad or missing token | 401 |
//! | any other method or path | 404 |
//! | console unreachable or failed | 500 |

use crate::console::RemoteConsole;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use craftbridge_core::Result;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// How relay requests are authenticated
#[derive(Clone)]
pub enum AuthPolicy {
    /// Require `Authorization: Bearer <token>`; only the digest is kept
    Bearer([u8; 32]),
    /// Accept every request
    Disabled,
}

impl AuthPolicy {
    pub fn bearer(token: &str) -> Self {
        AuthPolicy::Bearer(Sha256::digest(token.as_bytes()).into())
    }

    fn allows(&self, headers: &HeaderMap) -> bool {
        let AuthPolicy::Bearer(expected) = self else {
            return true;
        };

        headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .is_some_and(|token| {
                let digest: [u8; 32] = Sha256::digest(token.as_bytes()).into();
                digest == *expected
            })
    }
}

impl std::fmt::Debug for AuthPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthPolicy::Bearer(_) => f.write_str("Bearer(..)"),
            AuthPolicy::Disabled => f.write_str("Disabled"),
        }
    }
}

/// Shared relay state
#[derive(Clone)]
pub struct RelayState {
    pub console: Arc<dyn RemoteConsole>,
    pub auth: AuthPolicy,
}

#[derive(Deserialize)]
struct CommandRequest {
    command: Option<String>,
}

fn parse_command(body: &[u8]) -> Option<String> {
    let request: CommandRequest = serde_json::from_slice(body).ok()?;
    request
        .command
        .map(|command| command.trim().to_string())
        .filter(|command| !command.is_empty())
}

/// `POST /`: run one console command
async fn submit_command(
    State(state): State<RelayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !state.auth.allows(&headers) {
        warn!("Relay request rejected: bad or missing token");
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }

    let Some(command) = parse_command(&body) else {
        debug!("Relay request without a usable command");
        return (StatusCode::BAD_REQUEST, "Missing command").into_response();
    };

    info!("Relaying command: {}", command);
    match state.console.execute(&command).await {
        Ok(output) => {
            debug!("Console output: {}", output.trim_end());
            (StatusCode::OK, "OK").into_response()
        }
        Err(e) => {
            error!("Console command failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}

/// Build the relay router
pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/", post(submit_command).fallback(not_found))
        .fallback(not_found)
        .with_state(state)
}

/// Serve the relay until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: RelayState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Command relay listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("Command relay stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use craftbridge_core::BridgeError;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tower::ServiceExt;

    #[derive(Default)]
    struct MockConsole {
        commands: Mutex<Vec<String>>,
        fail: AtomicBool,
    }

    impl MockConsole {
        fn calls(&self) -> Vec<String> {
            self.commands.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteConsole for MockConsole {
        async fn execute(&self, command: &str) -> Result<String> {
            self.commands.lock().unwrap().push(command.to_string());
            if self.fail.load(Ordering::SeqCst) {
                return Err(BridgeError::Rcon("connection refused".into()));
            }
            Ok(String::new())
        }
    }

    fn app(console: &Arc<MockConsole>, auth: AuthPolicy) -> Router {
        router(RelayState {
            console: Arc::clone(console) as Arc<dyn RemoteConsole>,
            auth,
        })
    }

    async fn send(
        app: Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: &str,
    ) -> (StatusCode, String) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let response = app
            .oneshot(builder.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    #[tokio::test]
    async fn test_valid_request_runs_command_once() {
        let console = Arc::new(MockConsole::default());
        let app = app(&console, AuthPolicy::bearer("s3cret"));

        let (status, body) = send(app, "POST", "/", Some("s3cret"), r#"{"command":"say hi"}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
        assert_eq!(console.calls(), vec!["say hi"]);
    }

    #[tokio::test]
    async fn test_wrong_token_is_unauthorized() {
        let console = Arc::new(MockConsole::default());

        let (status, _) = send(
            app(&console, AuthPolicy::bearer("s3cret")),
            "POST",
            "/",
            Some("guess"),
            r#"{"command":"op Steve"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            app(&console, AuthPolicy::bearer("s3cret")),
            "POST",
            "/",
            None,
            r#"{"command":"op Steve"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        assert!(console.calls().is_empty());
    }

    #[tokio::test]
    async fn test_token_must_match_exactly() {
        let console = Arc::new(MockConsole::default());

        for header in ["Bearer  s3cret", "Bearer s3cret ", "bearer s3cret", "s3cret"] {
            let request = Request::builder()
                .method("POST")
                .uri("/")
                .header("authorization", header)
                .body(Body::from(r#"{"command":"op Steve"}"#))
                .unwrap();
            let response = app(&console, AuthPolicy::bearer("s3cret"))
                .oneshot(request)
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "header: {:?}", header);
        }
        assert!(console.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_command_is_bad_request() {
        let console = Arc::new(MockConsole::default());

        for body in ["{}", r#"{"command":""}"#, r#"{"command":42}"#, "not json", ""] {
            let (status, _) = send(
                app(&console, AuthPolicy::bearer("s3cret")),
                "POST",
                "/",
                Some("s3cret"),
                body,
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body: {:?}", body);
        }
        assert!(console.calls().is_empty());
    }

    #[tokio::test]
    async fn test_other_routes_are_not_found() {
        let console = Arc::new(MockConsole::default());

        let (status, _) = send(app(&console, AuthPolicy::Disabled), "GET", "/", None, "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            app(&console, AuthPolicy::Disabled),
            "POST",
            "/command",
            None,
            r#"{"command":"list"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(console.calls().is_empty());
    }

    #[tokio::test]
    async fn test_console_failure_is_server_error() {
        let console = Arc::new(MockConsole::default());
        console.fail.store(true, Ordering::SeqCst);

        let (status, _) = send(
            app(&console, AuthPolicy::Disabled),
            "POST",
            "/",
            None,
            r#"{"command":"list"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(console.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_auth_accepts_any_request() {
        let console = Arc::new(MockConsole::default());

        let (status, _) = send(
            app(&console, AuthPolicy::Disabled),
            "POST",
            "/",
            None,
            r#"{"command":"  weather clear  "}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(console.calls(), vec!["weather clear"]);
    }
}
