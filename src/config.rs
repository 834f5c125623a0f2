use std::path::PathBuf;

use crate::cli::{Cli, Command};
use crate::download::{ActivityFolders, DownloadConfig};
use crate::types::AuthDomain;

/// Settings for the activity-index hook run after a sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHook {
    pub command: String,
    pub sql_file: PathBuf,
    pub json_file: PathBuf,
}

#[derive(Debug, Clone)]
pub enum Mode {
    Sync {
        only_run: bool,
        download: DownloadConfig,
        index: Option<IndexHook>,
    },
    Upload {
        files: Vec<PathBuf>,
        /// File name for an activity read from stdin.
        stdin_name: Option<String>,
        impersonate_device: bool,
    },
}

/// Application configuration, resolved from the command line and environment.
pub struct Config {
    pub secret: String,
    pub domain: AuthDomain,
    pub save_secret: Option<PathBuf>,
    pub mode: Mode,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("secret", &"<redacted>")
            .field("domain", &self.domain)
            .field("save_secret", &self.save_secret)
            .field("mode", &self.mode)
            .finish()
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Config {
    pub fn from_cli(cli: Cli) -> anyhow::Result<Self> {
        let command = cli.effective_command();
        let secret = cli
            .secret
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Missing Garmin credential: pass it as the first argument or set GARMIN_SECRET_STRING"
                )
            })?;

        let (mode, save_secret) = match command {
            Command::Sync(args) => {
                let download = DownloadConfig {
                    folders: ActivityFolders {
                        gpx: expand_tilde(&args.gpx_dir),
                        tcx: expand_tilde(&args.tcx_dir),
                        fit: expand_tilde(&args.fit_dir),
                    },
                    file_type: args.file_type,
                    no_progress_bar: cli.no_progress_bar,
                };
                let index = args.index_command.map(|command| IndexHook {
                    command,
                    sql_file: expand_tilde(&args.sql_file),
                    json_file: expand_tilde(&args.json_file),
                });
                (
                    Mode::Sync {
                        only_run: args.only_run,
                        download,
                        index,
                    },
                    args.save_secret,
                )
            }
            Command::Upload(args) => (
                Mode::Upload {
                    files: args.files,
                    stdin_name: args.stdin_name,
                    impersonate_device: args.impersonate_device,
                },
                args.save_secret,
            ),
        };

        Ok(Self {
            secret,
            domain: AuthDomain::from_is_cn(cli.is_cn),
            save_secret: save_secret.as_deref().map(expand_tilde),
            mode,
        })
    }
}
