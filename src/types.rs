use std::fmt;

/// Garmin account region. Each variant owns a fixed endpoint set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum AuthDomain {
    #[default]
    Global,
    China,
}

impl AuthDomain {
    pub fn from_is_cn(is_cn: bool) -> Self {
        if is_cn {
            AuthDomain::China
        } else {
            AuthDomain::Global
        }
    }
}

/// Activity file formats the service can export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, clap::ValueEnum)]
pub enum FileType {
    #[default]
    Gpx,
    Tcx,
    Fit,
}

impl FileType {
    pub fn extension(&self) -> &'static str {
        match self {
            FileType::Gpx => "gpx",
            FileType::Tcx => "tcx",
            FileType::Fit => "fit",
        }
    }

    /// Fit downloads arrive as a zip container rather than a bare file.
    pub fn is_container(&self) -> bool {
        matches!(self, FileType::Fit)
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
