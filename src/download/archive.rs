//! Unpacks the zip container the service returns for original (fit) downloads.
//!
//! A container holds `<id>_ACTIVITY.fit`, optionally an embedded route
//! (`<id>_ACTIVITY.gpx`) and sometimes extra parts such as device summaries.
//! Each known part is written under its canonical name; everything else is
//! dropped.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use super::error::DownloadError;
use super::paths::{activity_path, partial_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Timed route recording, kept as `<id>.fit`.
    Activity,
    /// Embedded route file, kept as `<id>.gpx` in the route folder.
    Route,
    Other,
}

pub fn classify(entry_name: &str) -> EntryKind {
    let ext = Path::new(entry_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("fit") => EntryKind::Activity,
        Some("gpx") => EntryKind::Route,
        _ => EntryKind::Other,
    }
}

/// Files produced from one container.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Extracted {
    pub activity: Option<PathBuf>,
    pub route: Option<PathBuf>,
    pub discarded: Vec<String>,
}

impl Extracted {
    pub fn into_paths(self) -> Vec<PathBuf> {
        self.activity.into_iter().chain(self.route).collect()
    }
}

/// A known entry written to its hidden sibling, not yet in place.
struct StagedFile {
    part: PathBuf,
    target: PathBuf,
}

impl StagedFile {
    fn write(entry: &mut impl Read, target: PathBuf) -> io::Result<Self> {
        if let Some(dir) = target.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let part = partial_path(&target);
        let written = File::create(&part).and_then(|mut out| io::copy(entry, &mut out));
        if let Err(e) = written {
            let _ = std::fs::remove_file(&part);
            return Err(e);
        }
        Ok(Self { part, target })
    }

    fn discard(&self) {
        let _ = std::fs::remove_file(&self.part);
    }
}

#[derive(Default)]
struct Staging {
    activity: Option<StagedFile>,
    route: Option<StagedFile>,
    discarded: Vec<String>,
}

impl Staging {
    fn discard(&self) {
        self.activity.iter().chain(&self.route).for_each(StagedFile::discard);
    }
}

fn stage_entries<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    activity_id: &str,
    activity_dir: &Path,
    route_dir: &Path,
    staging: &mut Staging,
) -> Result<(), DownloadError> {
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if entry.enclosed_name().is_none() {
            return Err(DownloadError::UnsafeEntry(name));
        }

        let (target, slot) = match classify(&name) {
            EntryKind::Activity => (
                activity_path(activity_dir, activity_id, "fit"),
                &mut staging.activity,
            ),
            EntryKind::Route => (
                activity_path(route_dir, activity_id, "gpx"),
                &mut staging.route,
            ),
            EntryKind::Other => {
                staging.discarded.push(name);
                continue;
            }
        };
        // A repeated entry rewrites the same part file.
        *slot = Some(StagedFile::write(&mut entry, target)?);
        tracing::debug!("Staged {}", name);
    }
    Ok(())
}

/// Extract `container` for `activity_id`. Blocking; run it off the runtime.
///
/// Every known entry is staged before anything is renamed, and the fit file
/// goes into place last. Any failure removes the staged parts and leaves no
/// `<id>.fit`, so the next run fetches the activity again.
pub fn extract_container(
    container: &Path,
    activity_id: &str,
    activity_dir: &Path,
    route_dir: &Path,
) -> Result<Extracted, DownloadError> {
    let reader = BufReader::new(File::open(container)?);
    let mut archive = zip::ZipArchive::new(reader)?;
    let mut staging = Staging::default();

    if let Err(e) = stage_entries(&mut archive, activity_id, activity_dir, route_dir, &mut staging) {
        staging.discard();
        return Err(e);
    }
    if staging.activity.is_none() {
        staging.discard();
        return Err(DownloadError::NoActivityFile(activity_id.to_string()));
    }

    let placed = staging
        .route
        .iter()
        .chain(&staging.activity)
        .try_for_each(|file| std::fs::rename(&file.part, &file.target));
    if let Err(e) = placed {
        staging.discard();
        return Err(e.into());
    }

    let Staging {
        activity,
        route,
        discarded,
    } = staging;
    let extracted = Extracted {
        activity: activity.map(|f| f.target),
        route: route.map(|f| f.target),
        discarded,
    };
    if let Some(path) = &extracted.activity {
        tracing::debug!("Extracted container of {} into {}", activity_id, path.display());
    }
    Ok(extracted)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    /// Build an in-memory zip with the given `(name, contents)` entries.
    pub(crate) fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, contents) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn write_container(dir: &Path, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = dir.join("container.zip");
        std::fs::write(&path, zip_bytes(entries)).unwrap();
        path
    }

    #[test]
    fn test_classify_by_extension() {
        assert_eq!(classify("42_ACTIVITY.fit"), EntryKind::Activity);
        assert_eq!(classify("42_ACTIVITY.FIT"), EntryKind::Activity);
        assert_eq!(classify("42_ACTIVITY.gpx"), EntryKind::Route);
        assert_eq!(classify("42_summary.json"), EntryKind::Other);
        assert_eq!(classify("README"), EntryKind::Other);
    }

    #[test]
    fn test_fit_and_route_land_in_their_folders() {
        let tmp = tempfile::tempdir().unwrap();
        let fit_dir = tmp.path().join("FIT_OUT");
        let gpx_dir = tmp.path().join("GPX_OUT");
        let container = write_container(
            tmp.path(),
            &[
                ("42_ACTIVITY.fit", b"fit-bytes"),
                ("42_ACTIVITY.gpx", b"<gpx/>"),
                ("42_DEVICE.json", b"{}"),
            ],
        );

        let out = extract_container(&container, "42", &fit_dir, &gpx_dir).unwrap();
        assert_eq!(out.activity, Some(fit_dir.join("42.fit")));
        assert_eq!(out.route, Some(gpx_dir.join("42.gpx")));
        assert_eq!(out.discarded, vec!["42_DEVICE.json"]);
        assert_eq!(std::fs::read(fit_dir.join("42.fit")).unwrap(), b"fit-bytes");
        assert_eq!(std::fs::read(gpx_dir.join("42.gpx")).unwrap(), b"<gpx/>");

        let leftovers: Vec<_> = std::fs::read_dir(&fit_dir).unwrap().collect();
        assert_eq!(leftovers.len(), 1, "only the canonical fit file remains");
    }

    #[test]
    fn test_container_without_fit_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let container = write_container(tmp.path(), &[("7_ACTIVITY.gpx", b"<gpx/>")]);
        let err = extract_container(&container, "7", tmp.path(), tmp.path()).unwrap_err();
        assert!(matches!(err, DownloadError::NoActivityFile(id) if id == "7"));
    }

    #[test]
    fn test_failed_route_leaves_no_activity_file() {
        let tmp = tempfile::tempdir().unwrap();
        let fit_dir = tmp.path().join("FIT_OUT");
        let gpx_dir = tmp.path().join("GPX_OUT");
        std::fs::write(&gpx_dir, b"occupied").unwrap();
        let container = write_container(
            tmp.path(),
            &[("5_ACTIVITY.fit", b"fit-bytes"), ("5_ACTIVITY.gpx", b"<gpx/>")],
        );

        let err = extract_container(&container, "5", &fit_dir, &gpx_dir).unwrap_err();
        assert!(matches!(err, DownloadError::Disk(_)));
        assert!(!fit_dir.join("5.fit").exists());
        let leftovers: Vec<_> = std::fs::read_dir(&fit_dir).unwrap().collect();
        assert!(leftovers.is_empty(), "staged parts are removed");
    }

    #[test]
    fn test_route_only_container_leaves_nothing_behind() {
        let tmp = tempfile::tempdir().unwrap();
        let gpx_dir = tmp.path().join("GPX_OUT");
        let container = write_container(tmp.path(), &[("8_ACTIVITY.gpx", b"<gpx/>")]);
        let err = extract_container(&container, "8", tmp.path(), &gpx_dir).unwrap_err();
        assert!(matches!(err, DownloadError::NoActivityFile(_)));
        assert_eq!(std::fs::read_dir(&gpx_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_not_a_zip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.zip");
        std::fs::write(&path, b"definitely not a zip").unwrap();
        let err = extract_container(&path, "1", tmp.path(), tmp.path()).unwrap_err();
        assert!(matches!(err, DownloadError::Archive(_)));
    }

    #[test]
    fn test_rejects_escaping_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let container = write_container(tmp.path(), &[("../evil.fit", b"x")]);
        let err = extract_container(&container, "1", tmp.path(), tmp.path()).unwrap_err();
        assert!(matches!(err, DownloadError::UnsafeEntry(_)));
    }
}
