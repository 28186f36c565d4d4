//! Persisting the credential back to the key=value env file

use craftbridge_core::Result;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tracing::debug;

/// Replace the `key=` line in `contents`, or append one if absent
///
/// Every other line is kept verbatim.
pub fn upsert_line(contents: &str, key: &str, value: &str) -> String {
    let prefix = format!("{}=", key);
    let replacement = format!("{}={}", key, value);

    let mut found = false;
    let mut lines: Vec<String> = contents
        .lines()
        .map(|line| {
            let bare = line.trim_start().strip_prefix("export ").unwrap_or(line.trim_start());
            if !found && bare.starts_with(&prefix) {
                found = true;
                replacement.clone()
            } else {
                line.to_string()
            }
        })
        .collect();

    if !found {
        lines.push(replacement);
    }

    let mut updated = lines.join("\n");
    updated.push('\n');
    updated
}

/// Write `key=value` into the env file at `path`
///
/// The file is rewritten through a sibling temp file and a rename so a crash
/// never leaves it half-written. A missing file is created.
pub async fn persist_credential(path: &Path, key: &str, value: &str) -> Result<()> {
    let existing = match fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let updated = upsert_line(&existing, key, value);
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");

    fs::write(&staging, updated).await?;
    fs::rename(&staging, path).await?;
    debug!("Persisted {} to {}", key, path.display());
    Ok(())
}
