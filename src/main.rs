//! garmin-sync: keeps local folders of Garmin Connect activities up to date
//! and uploads activity files recorded elsewhere.
//!
//! Authentication starts from a pre-issued credential bundle; the access
//! token is refreshed once at startup when it has expired. Downloads and
//! uploads run through a fixed-size concurrency gate, and every activity
//! succeeds or fails on its own.

#![warn(clippy::all)]

mod api;
mod auth;
mod cli;
mod config;
mod download;
mod enumerate;
mod gate;
mod index;
mod retry;
mod shutdown;
mod types;
mod upload;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use api::ApiClient;
use auth::{Endpoints, Session};
use config::{Config, Mode};
use gate::ConcurrencyGate;
use upload::{DeviceAdaptor, FitDeviceSpoofer};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    let config = Config::from_cli(cli)?;
    tracing::debug!(?config, "Starting garmin-sync");

    let session = Session::new(&config.secret, Endpoints::for_domain(config.domain)).await?;
    let client = ApiClient::new(session);
    let shutdown = shutdown::install_signal_handler();
    let gate = ConcurrencyGate::default();

    match &config.mode {
        Mode::Sync {
            only_run,
            download,
            index,
        } => {
            tracing::info!(
                file_type = %download.file_type,
                only_run,
                concurrency = gate.capacity(),
                "Syncing activities"
            );
            let remote_ids = enumerate::activity_ids(&client, *only_run).await?;
            let report =
                download::download_new_activities(&client, &remote_ids, download, &gate, &shutdown)
                    .await?;
            tracing::info!("Wrote {} new activities", report.downloaded());
            persist_secret(&config, &client).await;
            if !shutdown.is_cancelled() {
                index::rebuild_index(index.as_ref(), &download.folders, download.file_type).await;
            }
        }
        Mode::Upload {
            files,
            stdin_name,
            impersonate_device,
        } => {
            let spoofer = FitDeviceSpoofer::default();
            let adaptor = impersonate_device.then_some(&spoofer as &dyn DeviceAdaptor);
            let mut reports = Vec::new();
            if !files.is_empty() {
                reports.extend(upload::upload_files(&client, files, adaptor, &gate, &shutdown).await);
            }
            if let Some(name) = stdin_name {
                let payload = upload::read_payload(tokio::io::stdin(), name)
                    .await
                    .context("Failed to read activity from stdin")?;
                let staging = tempfile::Builder::new().prefix("garmin-sync-").tempdir()?;
                reports.extend(
                    upload::upload_payloads(&client, vec![payload], staging.path(), adaptor, &gate, &shutdown)
                        .await,
                );
            }
            let uploaded = reports.iter().filter(|r| r.is_uploaded()).count();
            let total = files.len() + usize::from(stdin_name.is_some());
            tracing::info!("Uploaded {} of {} activities", uploaded, total);
            persist_secret(&config, &client).await;
        }
    }

    Ok(())
}

/// Honour `--save-secret`; a failed write is logged, the sync result stands.
async fn persist_secret(config: &Config, client: &ApiClient) {
    if let Some(path) = &config.save_secret {
        if let Err(e) = auth::save_secret(client.session(), path).await {
            tracing::error!("{:#}", e);
        }
    }
}
