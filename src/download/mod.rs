//! Download engine: diff remote ids against the output folder, then fetch the
//! backlog through the concurrency gate. Each activity succeeds or fails on
//! its own; a rerun picks up whatever is still missing.

pub mod archive;
pub mod error;
pub mod paths;

pub use error::DownloadError;
pub use paths::ActivityFolders;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use crate::api::ActivityApi;
use crate::gate::{Admission, ConcurrencyGate};
use crate::types::FileType;
use paths::{activity_path, backlog, local_activity_ids, partial_path};

/// Subset of application config consumed by the download engine.
/// Decoupled from CLI parsing so the engine can be tested independently.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub(crate) folders: ActivityFolders,
    pub(crate) file_type: FileType,
    pub(crate) no_progress_bar: bool,
}

#[derive(Debug)]
pub enum ActivityStatus {
    Downloaded,
    Failed(DownloadError),
}

#[derive(Debug)]
pub struct ActivityOutcome {
    pub activity_id: String,
    pub status: ActivityStatus,
}

/// Result of one download batch.
#[derive(Debug, Default)]
pub struct DownloadReport {
    /// Backlog ids, in dispatch order.
    pub attempted: Vec<String>,
    /// One entry per admitted task, in completion order.
    pub outcomes: Vec<ActivityOutcome>,
}

impl DownloadReport {
    pub fn downloaded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, ActivityStatus::Downloaded))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.downloaded()
    }

    /// Backlog entries never admitted because shutdown was requested.
    pub fn skipped(&self) -> usize {
        self.attempted.len() - self.outcomes.len()
    }
}

/// Create a progress bar with a consistent template.
///
/// Hidden when the user passed `--no-progress-bar` or stdout is not a TTY
/// (cron, pipes).
fn create_progress_bar(no_progress_bar: bool, total: u64) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template(
        "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    ) {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}

/// Download every remote activity not yet present in the target folder.
///
/// Only setup failures (creating or listing the output folder) are returned
/// as errors; per-activity failures end up in the report.
pub async fn download_new_activities(
    api: &dyn ActivityApi,
    remote_ids: &[String],
    config: &DownloadConfig,
    gate: &ConcurrencyGate,
    shutdown: &CancellationToken,
) -> Result<DownloadReport, DownloadError> {
    let started = Instant::now();
    let folder = config.folders.for_type(config.file_type);
    tokio::fs::create_dir_all(folder).await?;

    let local_ids = local_activity_ids(folder).await?;
    let attempted = backlog(remote_ids, &local_ids);
    tracing::info!(
        "{} remote activities, {} already in {}, {} to download",
        remote_ids.len(),
        local_ids.len(),
        folder.display(),
        attempted.len()
    );

    if attempted.is_empty() {
        tracing::info!("No new activities to download");
        return Ok(DownloadReport::default());
    }

    let pb = create_progress_bar(config.no_progress_bar, attempted.len() as u64);
    let tasks = attempted.iter().map(|id| {
        let pb = &pb;
        async move {
            let status = match download_one(api, id, config).await {
                Ok(paths) => {
                    tracing::debug!("Downloaded activity {} to {:?}", id, paths);
                    ActivityStatus::Downloaded
                }
                Err(e) => {
                    pb.suspend(|| tracing::error!("Download failed: activity {}: {}", id, e));
                    ActivityStatus::Failed(e)
                }
            };
            pb.inc(1);
            ActivityOutcome {
                activity_id: id.clone(),
                status,
            }
        }
    });

    let outcomes: Vec<ActivityOutcome> = gate
        .run_all(tasks, shutdown)
        .await
        .into_iter()
        .filter_map(|admission| match admission {
            Admission::Completed(outcome) => Some(outcome),
            Admission::Cancelled => None,
        })
        .collect();
    pb.finish_and_clear();

    let report = DownloadReport { attempted, outcomes };
    log_summary(&report, started.elapsed());
    Ok(report)
}

fn log_summary(report: &DownloadReport, elapsed: Duration) {
    tracing::info!("── Summary ──");
    tracing::info!(
        "  {} downloaded, {} failed, {} total",
        report.downloaded(),
        report.failed(),
        report.attempted.len()
    );
    for outcome in &report.outcomes {
        if let ActivityStatus::Failed(e) = &outcome.status {
            tracing::error!("  failed: activity {}: {}", outcome.activity_id, e);
        }
    }
    if report.skipped() > 0 {
        tracing::info!("  Interrupted: {} not started before shutdown", report.skipped());
    }
    let rate_limited = report
        .outcomes
        .iter()
        .filter(|o| matches!(&o.status, ActivityStatus::Failed(e) if e.is_rate_limited()))
        .count();
    if rate_limited > 0 {
        tracing::warn!("  {} rate limited; rerun later to fetch them", rate_limited);
    }
    tracing::info!("  elapsed: {}", format_duration(elapsed));
}

/// Fetch one activity and store it under its canonical name(s).
async fn download_one(
    api: &dyn ActivityApi,
    activity_id: &str,
    config: &DownloadConfig,
) -> Result<Vec<PathBuf>, DownloadError> {
    let folder = config.folders.for_type(config.file_type);
    let body = api.download_activity(activity_id, config.file_type).await?;
    tracing::debug!(bytes = body.len(), activity_id, "fetched");

    if !config.file_type.is_container() {
        let target = activity_path(folder, activity_id, config.file_type.extension());
        write_atomically(&target, &body).await?;
        return Ok(vec![target]);
    }

    // The staged container is hidden, so a crash mid-extraction leaves the id
    // missing and the next run fetches it again.
    let staged = partial_path(&activity_path(folder, activity_id, "zip"));
    if let Err(e) = tokio::fs::write(&staged, &body).await {
        let _ = tokio::fs::remove_file(&staged).await;
        return Err(e.into());
    }

    let container = staged.clone();
    let id = activity_id.to_string();
    let activity_dir = folder.to_path_buf();
    let route_dir = config.folders.route_dir().to_path_buf();
    let extracted = tokio::task::spawn_blocking(move || {
        archive::extract_container(&container, &id, &activity_dir, &route_dir)
    })
    .await;

    if let Err(e) = tokio::fs::remove_file(&staged).await {
        tracing::warn!("Could not remove container {}: {}", staged.display(), e);
    }
    let extracted = extracted??;
    if !extracted.discarded.is_empty() {
        tracing::debug!("Discarded {:?} from container of {}", extracted.discarded, activity_id);
    }
    Ok(extracted.into_paths())
}

/// Write through a hidden partial file and rename into place.
async fn write_atomically(target: &Path, body: &[u8]) -> std::io::Result<()> {
    let part = partial_path(target);
    let result = async {
        tokio::fs::write(&part, body).await?;
        tokio::fs::rename(&part, target).await
    }
    .await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(&part).await;
    }
    result
}

pub(crate) fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}
