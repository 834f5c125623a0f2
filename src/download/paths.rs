use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::types::FileType;

/// Per-format output folders. Embedded routes from fit containers land in
/// the gpx folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityFolders {
    pub gpx: PathBuf,
    pub tcx: PathBuf,
    pub fit: PathBuf,
}

impl Default for ActivityFolders {
    fn default() -> Self {
        Self {
            gpx: PathBuf::from("GPX_OUT"),
            tcx: PathBuf::from("TCX_OUT"),
            fit: PathBuf::from("FIT_OUT"),
        }
    }
}

impl ActivityFolders {
    pub fn for_type(&self, file_type: FileType) -> &Path {
        match file_type {
            FileType::Gpx => &self.gpx,
            FileType::Tcx => &self.tcx,
            FileType::Fit => &self.fit,
        }
    }

    pub fn route_dir(&self) -> &Path {
        &self.gpx
    }
}

/// `<folder>/<id>.<ext>`
pub fn activity_path(folder: &Path, activity_id: &str, extension: &str) -> PathBuf {
    folder.join(format!("{activity_id}.{extension}"))
}

/// Hidden sibling used while a file is being written. The leading dot keeps
/// it out of [`local_activity_ids`] so an interrupted write is retried.
pub fn partial_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.part"))
}

/// Activity id of a local file name: everything before the first dot.
/// Hidden files yield `None`.
pub fn activity_id_from_file_name(name: &str) -> Option<&str> {
    if name.starts_with('.') {
        return None;
    }
    let id = name.split('.').next().unwrap_or(name);
    (!id.is_empty()).then_some(id)
}

/// Ids already present in `folder`. A missing folder holds nothing.
pub async fn local_activity_ids(folder: &Path) -> std::io::Result<HashSet<String>> {
    let mut ids = HashSet::new();
    let mut entries = match tokio::fs::read_dir(folder).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
        Err(e) => return Err(e),
    };
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if let Some(id) = activity_id_from_file_name(&name.to_string_lossy()) {
            ids.insert(id.to_string());
        }
    }
    Ok(ids)
}

/// Remote ids missing locally, in remote order, without duplicates.
pub fn backlog(remote_ids: &[String], local_ids: &HashSet<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    remote_ids
        .iter()
        .filter(|id| !local_ids.contains(*id) && seen.insert(id.as_str()))
        .cloned()
        .collect()
}
