//! signalslice: terminal dashboard for the SignalSlice activity feed.
//! Follows the backend's push channel and falls back to HTTP polling when it
//! is unavailable.

use std::time::Duration;

use clap::Parser;
use signalslice_transport::BackendEndpoint;

mod cli;
mod cmd_feed;
mod cmd_scan;
mod context;
mod dashboard_loop;
mod render;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Logs go to stderr; stdout belongs to the dashboard.
    let filter = std::env::var("SIGNALSLICE_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let endpoint = BackendEndpoint::parse(&args.backend)?;
    let use_color = context::resolve_color(&args.color);

    let command = args
        .command
        .unwrap_or_else(|| cli::Command::Watch(cli::WatchOpts::default()));

    match command {
        cli::Command::Watch(opts) => {
            let config = cli::load_config(args.config.as_deref(), &opts)?;
            let renderer =
                render::TerminalRenderer::new(std::io::stdout(), use_color).with_panels(opts.panels);
            dashboard_loop::run_dashboard(config, endpoint, renderer).await?;
        }
        cli::Command::Feed(opts) => {
            cmd_feed::cmd_feed(
                &endpoint,
                opts.limit,
                Duration::from_millis(opts.timeout_ms),
                use_color,
            )
            .await?;
        }
        cli::Command::Scan(opts) => {
            cmd_scan::cmd_scan(&endpoint, Duration::from_millis(opts.timeout_ms)).await?;
        }
    }

    Ok(())
}
