//! `signalslice feed`: one-shot fetch of the activity feed.

use std::time::Duration;

use signalslice_core::Event;
use signalslice_transport::{BackendEndpoint, FeedClient};

use crate::render::format_event_line;

pub async fn cmd_feed(
    endpoint: &BackendEndpoint,
    limit: usize,
    timeout: Duration,
    use_color: bool,
) -> anyhow::Result<()> {
    let client = FeedClient::new(endpoint, timeout)?;
    let snapshot = client.fetch().await?;
    let output = format_feed(snapshot.events(), limit, use_color);
    if output.is_empty() {
        println!("(no activity)");
    } else {
        print!("{output}");
    }
    Ok(())
}

/// Newest first, at most `limit` lines.
pub fn format_feed(events: &[Event], limit: usize, use_color: bool) -> String {
    events
        .iter()
        .take(limit)
        .map(|event| format!("{}\n", format_event_line(event, use_color)))
        .collect()
}
