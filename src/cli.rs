use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::types::{FileType, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "garmin-sync",
    about = "Sync activities from Garmin Connect, or upload local activity files to it"
)]
pub struct Cli {
    /// Encoded credential bundle.
    /// WARNING: passing it as an argument is visible in process listings.
    /// Prefer the GARMIN_SECRET_STRING environment variable instead.
    #[arg(env = "GARMIN_SECRET_STRING", hide_env_values = true)]
    pub secret: Option<String>,

    /// Use the Garmin China (garmin.cn) endpoints
    #[arg(long)]
    pub is_cn: bool,

    /// Log level
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,

    /// Disable progress bar
    #[arg(long, global = true)]
    pub no_progress_bar: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Download activities missing from the local folders (default)
    Sync(SyncArgs),
    /// Upload local activity files
    Upload(UploadArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct SyncArgs {
    /// Only sync running activities
    #[arg(long)]
    pub only_run: bool,

    /// Download format
    #[arg(long, value_enum, default_value = "gpx")]
    pub file_type: FileType,

    /// Output folder for gpx files (also receives routes embedded in fit downloads)
    #[arg(long, default_value = "GPX_OUT")]
    pub gpx_dir: String,

    /// Output folder for tcx files
    #[arg(long, default_value = "TCX_OUT")]
    pub tcx_dir: String,

    /// Output folder for fit files
    #[arg(long, default_value = "FIT_OUT")]
    pub fit_dir: String,

    /// Command that rebuilds the activity index after a sync.
    /// Invoked as: CMD <sql-file> <source-dir> <json-file> <suffix>
    #[arg(long)]
    pub index_command: Option<String>,

    /// Database file handed to the index command
    #[arg(long, default_value = "data.db")]
    pub sql_file: String,

    /// JSON summary file handed to the index command
    #[arg(long, default_value = "activities.json")]
    pub json_file: String,

    /// Write the (possibly refreshed) credential bundle to this file
    #[arg(long)]
    pub save_secret: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct UploadArgs {
    /// Activity files to upload
    #[arg(required_unless_present = "stdin_name")]
    pub files: Vec<PathBuf>,

    /// Also upload an activity read from stdin, under this file name
    #[arg(long, value_name = "NAME")]
    pub stdin_name: Option<String>,

    /// Rewrite FIT device info so the upload looks like it came from a Garmin watch
    #[arg(long)]
    pub impersonate_device: bool,

    /// Write the (possibly refreshed) credential bundle to this file
    #[arg(long)]
    pub save_secret: Option<String>,
}

impl Cli {
    /// The subcommand to run; a bare invocation means `sync` with defaults.
    pub fn effective_command(&self) -> Command {
        self.command.clone().unwrap_or_else(|| {
            Command::Sync(SyncArgs {
                file_type: FileType::Gpx,
                gpx_dir: "GPX_OUT".to_string(),
                tcx_dir: "TCX_OUT".to_string(),
                fit_dir: "FIT_OUT".to_string(),
                sql_file: "data.db".to_string(),
                json_file: "activities.json".to_string(),
                ..Default::default()
            })
        })
    }
}
