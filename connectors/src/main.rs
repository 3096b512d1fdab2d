use anyhow::{Context, Result};
use sluice_connectors::output::write_messages;
use sluice_connectors::registry::build_connector;
use sluice_connectors::{Runner, SluiceConfig, StateStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the message stream
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sluice=info,sluice_connectors=info".into()),
        )
        .init();

    info!("Sluice connectors starting...");

    let config_path =
        std::env::var("SLUICE_CONFIG").unwrap_or_else(|_| "sluice.toml".to_string());
    let mut config = SluiceConfig::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;
    config.apply_env()?;

    info!(
        config = %config_path,
        state_db = %config.state_db,
        sources = config.sources.len(),
        poll_interval_secs = config.poll_interval_secs,
        "Configuration loaded"
    );

    let state = Arc::new(
        StateStore::new(&config.state_db).context("Failed to initialize watermark store")?,
    );
    info!("Watermark store initialized");

    // Output writer
    let (tx, rx) = mpsc::channel(1024);
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        write_messages(rx, &mut stdout).await
    });

    // Ctrl-C stops sessions before their next page
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal_token.cancel();
        }
    });

    let runner = Runner::new(state, tx).with_cancel_token(cancel.clone());

    loop {
        for source in &config.sources {
            if cancel.is_cancelled() {
                break;
            }
            let connector = match build_connector(source) {
                Ok(connector) => connector,
                Err(e) => {
                    error!(source = %source.name, error = %e, "Failed to build connector");
                    continue;
                }
            };
            match runner.run_source(source, connector).await {
                Ok(summary) if summary.failed() > 0 => {
                    warn!(
                        source = %source.name,
                        failed = summary.failed(),
                        "Source run finished with failures"
                    );
                }
                Ok(_) => {}
                Err(e) => error!(source = %source.name, error = %e, "Source run failed"),
            }
        }

        if config.poll_interval_secs == 0 || cancel.is_cancelled() {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(config.poll_interval_secs)) => {}
            _ = cancel.cancelled() => break,
        }
    }

    // Dropping the runner closes the channel so the writer can finish
    drop(runner);
    let written = writer.await.context("Output writer task panicked")??;
    info!(messages = written, "Sluice connectors stopped");

    Ok(())
}
