//! Supervised log-following subprocess
//!
//! Runs `tail -n 0 -F <file>` (or a configured command) and forwards each
//! stdout line. The process is restarted after a short pause whenever it exits
//! or fails to start, until shutdown or until the consumer goes away.

use craftbridge_core::{BridgeError, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const LINE_BUFFER: usize = 1024;

/// Command line of the log-following process
#[derive(Debug, Clone, PartialEq)]
pub struct LogSourceConfig {
    pub program: String,
    pub args: Vec<String>,
    /// Pause before restarting after the process exits
    pub restart_delay: Duration,
}

impl LogSourceConfig {
    /// Follow `path` from its current end, across rotation
    pub fn tail(path: &Path) -> Self {
        Self {
            program: "tail".to_string(),
            args: vec![
                "-n".to_string(),
                "0".to_string(),
                "-F".to_string(),
                path.display().to_string(),
            ],
            restart_delay: Duration::from_secs(2),
        }
    }

    /// Whitespace-separated program and arguments
    pub fn from_command(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            restart_delay: Duration::from_secs(2),
        })
    }
}

enum Exit {
    /// Process ended on its own
    Ended,
    /// Shutdown requested or nobody reads the lines anymore
    Stopped,
}

/// Start the supervisor and return the stream of raw lines
pub fn spawn(config: LogSourceConfig, shutdown: CancellationToken) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(LINE_BUFFER);
    tokio::spawn(supervise(config, tx, shutdown));
    rx
}

async fn supervise(config: LogSourceConfig, lines: mpsc::Sender<String>, shutdown: CancellationToken) {
    loop {
        match follow(&config, &lines, &shutdown).await {
            Ok(Exit::Stopped) => break,
            Ok(Exit::Ended) => warn!(
                "Log source exited, restarting in {:?}",
                config.restart_delay
            ),
            Err(e) => error!(
                "Log source {} failed: {}, restarting in {:?}",
                config.program, e, config.restart_delay
            ),
        }

        tokio::select! {
            _ = sleep(config.restart_delay) => {}
            _ = shutdown.cancelled() => break,
            _ = lines.closed() => break,
        }
    }
    debug!("Log source supervisor stopped");
}

async fn follow(
    config: &LogSourceConfig,
    lines: &mpsc::Sender<String>,
    shutdown: &CancellationToken,
) -> Result<Exit> {
    let mut child = Command::new(&config.program)
        .args(&config.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;
    info!("Following log via {} {}", config.program, config.args.join(" "));

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| BridgeError::Io(std::io::Error::other("child stdout not captured")))?;
    // Split on raw bytes: one undecodable line must not end the session
    let mut reader = BufReader::new(stdout).split(b'\n');

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(Exit::Stopped),
            _ = lines.closed() => return Ok(Exit::Stopped),
            segment = reader.next_segment() => match segment? {
                Some(bytes) => {
                    if lines.send(decode_line(&bytes)).await.is_err() {
                        return Ok(Exit::Stopped);
                    }
                }
                None => break,
            },
        }
    }

    let status = child.wait().await?;
    debug!("Log source process ended: {}", status);
    Ok(Exit::Ended)
}

/// Lossy UTF-8 decode without the trailing `\r`
fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[test]
    fn test_tail_command() {
        let config = LogSourceConfig::tail(Path::new("/srv/mc/logs/latest.log"));
        assert_eq!(config.program, "tail");
        assert_eq!(config.args, vec!["-n", "0", "-F", "/srv/mc/logs/latest.log"]);
        assert_eq!(config.restart_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_custom_command() {
        let config = LogSourceConfig::from_command("  docker logs -f --tail 0 mc ").unwrap();
        assert_eq!(config.program, "docker");
        assert_eq!(config.args, vec!["logs", "-f", "--tail", "0", "mc"]);
        assert!(LogSourceConfig::from_command("   ").is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_restarts_after_exit() {
        let config = LogSourceConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "printf 'one\\ntwo\\n'".to_string()],
            restart_delay: Duration::from_millis(20),
        };
        let shutdown = CancellationToken::new();
        let mut lines = spawn(config, shutdown.clone());

        let mut seen = Vec::new();
        while seen.len() < 4 {
            let line = timeout(Duration::from_secs(5), lines.recv()).await.unwrap();
            seen.push(line.unwrap());
        }
        assert_eq!(seen, vec!["one", "two", "one", "two"]);

        shutdown.cancel();
        // Drains buffered lines, then the channel closes
        while timeout(Duration::from_secs(5), lines.recv()).await.unwrap().is_some() {}
    }

    #[test]
    fn test_decode_line() {
        assert_eq!(decode_line(b"[12:00:00] hello\r"), "[12:00:00] hello");
        assert_eq!(decode_line(b"caf\xc3\xa9"), "caf\u{e9}");
        assert_eq!(decode_line(b"\xff"), "\u{fffd}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invalid_utf8_line_keeps_session() {
        let config = LogSourceConfig {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "printf 'one\\n\\377\\ntwo\\n'; sleep 30".to_string(),
            ],
            restart_delay: Duration::from_secs(60),
        };
        let shutdown = CancellationToken::new();
        let mut lines = spawn(config, shutdown.clone());

        let mut seen = Vec::new();
        while seen.len() < 3 {
            let line = timeout(Duration::from_secs(5), lines.recv()).await.unwrap();
            seen.push(line.unwrap());
        }
        assert_eq!(seen, vec!["one", "\u{fffd}", "two"]);

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_spawn_failure_keeps_retrying_until_shutdown() {
        let config = LogSourceConfig {
            program: "/nonexistent/craftbridge-log-follower".to_string(),
            args: Vec::new(),
            restart_delay: Duration::from_millis(10),
        };
        let shutdown = CancellationToken::new();
        let mut lines = spawn(config, shutdown.clone());

        sleep(Duration::from_millis(50)).await;
        shutdown.cancel();

        let end = timeout(Duration::from_secs(5), lines.recv()).await.unwrap();
        assert!(end.is_none());
    }
}
