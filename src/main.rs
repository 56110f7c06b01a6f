use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use felix::config::Config;
use felix::daemon::Daemon;
use felix::store::SqliteStore;

#[derive(Parser)]
#[command(name = "felix", about = "Feed-watching link harvester")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "config.yml")]
    config: PathBuf,

    /// Directory for persistent data
    #[arg(long, default_value = ".")]
    datadir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = Config::from_file(&cli.config)?;
    let store = Arc::new(SqliteStore::new(cli.datadir.join("felix.db"))?);

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    Daemon::new(config, store).run(cancel).await?;

    info!("shutdown complete");
    Ok(())
}

/// Cancels the token on SIGINT or SIGTERM.
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::terminate(),
            ) {
                Ok(sigterm) => sigterm,
                Err(err) => {
                    tracing::error!(err = %err, "could not install SIGTERM handler");
                    let _ = ctrl_c.await;
                    cancel.cancel();
                    return;
                }
            };

            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }

        info!("shutdown signal received");
        cancel.cancel();
    });
}
