//! Pushes activity files to the service through the concurrency gate.
//! Every file gets its own [`UploadReport`]; nothing here fails the batch.

pub mod device;
pub mod error;

pub use device::{DeviceAdaptor, FitDeviceSpoofer};
pub use error::UploadError;

use std::path::{Path, PathBuf};
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use crate::api::{ActivityApi, DetailedImportResult};
use crate::download::format_duration;
use crate::gate::{Admission, ConcurrencyGate};

#[derive(Debug)]
pub enum UploadStatus {
    Uploaded {
        upload_id: Option<i64>,
        activities: usize,
    },
    /// Accepted by the endpoint but refused by the importer (e.g. duplicates).
    Rejected { reasons: Vec<String> },
    Failed(UploadError),
}

#[derive(Debug)]
pub struct UploadReport {
    pub file: PathBuf,
    pub status: UploadStatus,
}

impl UploadReport {
    pub fn is_uploaded(&self) -> bool {
        matches!(self.status, UploadStatus::Uploaded { .. })
    }
}

/// An activity received from elsewhere that has no local file yet.
#[derive(Debug, Clone)]
pub struct UploadPayload {
    pub file_name: String,
    pub content: Vec<u8>,
}

fn classify(result: DetailedImportResult) -> UploadStatus {
    if result.failures.is_empty() {
        UploadStatus::Uploaded {
            upload_id: result.upload_id,
            activities: result.successes.len(),
        }
    } else {
        UploadStatus::Rejected {
            reasons: result.failure_reasons(),
        }
    }
}

async fn try_upload(
    api: &dyn ActivityApi,
    path: &Path,
    file_name: &str,
    adaptor: Option<&dyn DeviceAdaptor>,
) -> Result<DetailedImportResult, UploadError> {
    let mut body = tokio::fs::read(path).await.map_err(UploadError::Read)?;
    if let Some(adaptor) = adaptor {
        body = adaptor.adapt(file_name, body)?;
    }
    Ok(api.upload(file_name, body).await?)
}

/// Upload one local file, optionally rewriting its device identity first.
pub async fn upload_activity(
    api: &dyn ActivityApi,
    path: &Path,
    adaptor: Option<&dyn DeviceAdaptor>,
) -> UploadReport {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "activity".to_string());

    let status = match try_upload(api, path, &file_name, adaptor).await {
        Ok(result) => classify(result),
        Err(e) => UploadStatus::Failed(e),
    };
    match &status {
        UploadStatus::Uploaded {
            upload_id,
            activities,
        } => tracing::info!(
            "Uploaded {} (upload id {:?}, {} activities)",
            path.display(),
            upload_id,
            activities
        ),
        UploadStatus::Rejected { reasons } => {
            tracing::warn!("Upload of {} rejected: {}", path.display(), reasons.join("; "))
        }
        UploadStatus::Failed(e) => tracing::error!("Upload failed: {}: {}", path.display(), e),
    }
    UploadReport {
        file: path.to_path_buf(),
        status,
    }
}

/// Upload existing local files, at most `gate.capacity()` at a time.
pub async fn upload_files(
    api: &dyn ActivityApi,
    files: &[PathBuf],
    adaptor: Option<&dyn DeviceAdaptor>,
    gate: &ConcurrencyGate,
    shutdown: &CancellationToken,
) -> Vec<UploadReport> {
    let started = Instant::now();
    let tasks = files.iter().map(|path| upload_activity(api, path, adaptor));
    let reports = collect_admitted(gate.run_all(tasks, shutdown).await, files.len());
    log_summary(&reports, files.len(), started);
    reports
}

/// Read a whole activity from `reader`, e.g. stdin.
pub async fn read_payload<R>(mut reader: R, file_name: &str) -> std::io::Result<UploadPayload>
where
    R: AsyncRead + Unpin,
{
    let mut content = Vec::new();
    reader.read_to_end(&mut content).await?;
    Ok(UploadPayload {
        file_name: file_name.to_string(),
        content,
    })
}

/// Stage each payload as a file under `staging_dir`, upload it and remove
/// the staged file whatever the outcome.
pub async fn upload_payloads(
    api: &dyn ActivityApi,
    payloads: Vec<UploadPayload>,
    staging_dir: &Path,
    adaptor: Option<&dyn DeviceAdaptor>,
    gate: &ConcurrencyGate,
    shutdown: &CancellationToken,
) -> Vec<UploadReport> {
    let started = Instant::now();
    let total = payloads.len();
    let tasks = payloads
        .into_iter()
        .enumerate()
        .map(|(index, payload)| upload_staged(api, payload, index, staging_dir, adaptor));
    let reports = collect_admitted(gate.run_all(tasks, shutdown).await, total);
    log_summary(&reports, total, started);
    reports
}

async fn upload_staged(
    api: &dyn ActivityApi,
    payload: UploadPayload,
    index: usize,
    staging_dir: &Path,
    adaptor: Option<&dyn DeviceAdaptor>,
) -> UploadReport {
    // Only the final component is trusted; the index keeps equal names apart.
    let name = Path::new(&payload.file_name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "activity".to_string());
    let staged_dir = staging_dir.join(format!("{index}"));
    let staged = staged_dir.join(&name);

    let written = async {
        tokio::fs::create_dir_all(&staged_dir).await?;
        tokio::fs::write(&staged, &payload.content).await
    }
    .await;

    let report = match written {
        Ok(()) => upload_activity(api, &staged, adaptor).await,
        Err(e) => {
            tracing::error!("Could not stage {}: {}", name, e);
            UploadReport {
                file: staged.clone(),
                status: UploadStatus::Failed(UploadError::Stage(e)),
            }
        }
    };

    if let Err(e) = tokio::fs::remove_dir_all(&staged_dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Could not remove staged {}: {}", staged.display(), e);
        }
    }
    report
}

fn collect_admitted(admissions: Vec<Admission<UploadReport>>, total: usize) -> Vec<UploadReport> {
    let reports: Vec<UploadReport> = admissions
        .into_iter()
        .filter_map(|admission| match admission {
            Admission::Completed(report) => Some(report),
            Admission::Cancelled => None,
        })
        .collect();
    if reports.len() < total {
        tracing::info!("Interrupted: {} uploads not started before shutdown", total - reports.len());
    }
    reports
}

fn log_summary(reports: &[UploadReport], total: usize, started: Instant) {
    let uploaded = reports.iter().filter(|r| r.is_uploaded()).count();
    let rejected = reports
        .iter()
        .filter(|r| matches!(r.status, UploadStatus::Rejected { .. }))
        .count();
    let failed = reports.len() - uploaded - rejected;
    tracing::info!("── Summary ──");
    tracing::info!(
        "  {} uploaded, {} rejected, {} failed, {} total",
        uploaded,
        rejected,
        failed,
        total
    );
    for report in reports.iter().filter(|r| !r.is_uploaded()) {
        tracing::warn!("  not uploaded: {}", report.file.display());
    }
    tracing::info!("  elapsed: {}", format_duration(started.elapsed()));
}
