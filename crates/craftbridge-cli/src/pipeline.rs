//! Log lines to chat messages

use chat_bridge::BridgeHandle;
use craftbridge_core::LineParser;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Parse each raw line and queue the rendered event
///
/// Returns when the line stream ends or the bridge has stopped.
pub async fn forward_events(
    mut lines: mpsc::Receiver<String>,
    parser: LineParser,
    bridge: BridgeHandle,
) {
    while let Some(line) = lines.recv().await {
        let Some(event) = parser.parse(&line) else {
            continue;
        };

        debug!("{} event from {}", event.category(), event.player());
        if let Err(e) = bridge.enqueue(event.to_string()) {
            warn!("Dropping event: {}", e);
            break;
        }
    }
    debug!("Event pipeline stopped");
}
