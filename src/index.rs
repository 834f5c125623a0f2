//! Runs the external activity-index builder once downloads are on disk.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::process::Command;

use crate::config::IndexHook;
use crate::download::ActivityFolders;
use crate::types::FileType;

/// Folders to index after a sync, with the suffix passed along for each.
/// Fit downloads also refresh the gpx folder first, since their embedded
/// routes land there.
pub fn index_targets(folders: &ActivityFolders, file_type: FileType) -> Vec<(PathBuf, &'static str)> {
    let mut targets = Vec::new();
    if file_type.is_container() {
        targets.push((folders.route_dir().to_path_buf(), FileType::Gpx.extension()));
    }
    targets.push((folders.for_type(file_type).to_path_buf(), file_type.extension()));
    targets
}

/// `CMD <sql_file> <source_dir> <json_file> <suffix>`
pub async fn run_index_command(hook: &IndexHook, source_dir: &Path, suffix: &str) -> anyhow::Result<()> {
    tracing::info!("Rebuilding activity index for {}", source_dir.display());
    let status = Command::new(&hook.command)
        .arg(&hook.sql_file)
        .arg(source_dir)
        .arg(&hook.json_file)
        .arg(suffix)
        .status()
        .await
        .with_context(|| format!("Failed to start index command '{}'", hook.command))?;
    if !status.success() {
        anyhow::bail!("Index command '{}' exited with {}", hook.command, status);
    }
    Ok(())
}

/// Run the hook for every target; failures are logged, never fatal.
pub async fn rebuild_index(hook: Option<&IndexHook>, folders: &ActivityFolders, file_type: FileType) {
    let Some(hook) = hook else {
        tracing::debug!("No index command configured, skipping index rebuild");
        return;
    };
    for (dir, suffix) in index_targets(folders, file_type) {
        if let Err(e) = run_index_command(hook, &dir, suffix).await {
            tracing::error!("{:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_indexes_routes_first() {
        let folders = ActivityFolders::default();
        let targets = index_targets(&folders, FileType::Fit);
        assert_eq!(
            targets,
            vec![(PathBuf::from("GPX_OUT"), "gpx"), (PathBuf::from("FIT_OUT"), "fit")]
        );
    }

    #[test]
    fn test_tcx_indexes_single_folder() {
        let targets = index_targets(&ActivityFolders::default(), FileType::Tcx);
        assert_eq!(targets, vec![(PathBuf::from("TCX_OUT"), "tcx")]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hook_receives_arguments_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("args.txt");
        let script = tmp.path().join("hook.sh");
        std::fs::write(&script, format!("#!/bin/sh\necho \"$@\" > {}\n", out.display())).unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        let hook = IndexHook {
            command: script.display().to_string(),
            sql_file: PathBuf::from("data.db"),
            json_file: PathBuf::from("activities.json"),
        };

        run_index_command(&hook, Path::new("GPX_OUT"), "gpx").await.unwrap();
        let args = std::fs::read_to_string(&out).unwrap();
        assert_eq!(args.trim(), "data.db GPX_OUT activities.json gpx");
    }

    #[tokio::test]
    async fn test_missing_command_is_an_error() {
        let hook = IndexHook {
            command: "/nonexistent/index-builder".into(),
            sql_file: PathBuf::from("data.db"),
            json_file: PathBuf::from("activities.json"),
        };
        assert!(run_index_command(&hook, Path::new("GPX_OUT"), "gpx").await.is_err());
    }
}
