//! `signalslice scan`: request a manual scan over the push channel and exit.

use std::time::Duration;

use signalslice_core::OutboundMessage;
use signalslice_transport::{BackendEndpoint, send_once};

pub async fn cmd_scan(endpoint: &BackendEndpoint, timeout: Duration) -> anyhow::Result<()> {
    send_once(endpoint, OutboundMessage::ManualScan, timeout)
        .await
        .map_err(|e| anyhow::anyhow!("Cannot trigger scan - not connected to backend: {e}"))?;
    println!("Manual scan requested");
    Ok(())
}
