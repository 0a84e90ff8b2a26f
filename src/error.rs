//! Startup and lifecycle error taxonomy.
//!
//! Every variant here is fatal for the process: the controller reports it and
//! exits with status 1 before (or instead of) entering an operating mode.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the orchestration core.
pub type Result<T> = std::result::Result<T, StartupError>;

/// Errors raised while bringing the process up or tearing it down.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("[SFX-1001] cannot load configuration from {location}: {details}")]
    ConfigLoad { location: String, details: String },

    #[error("[SFX-1002] cannot decode configuration {path}: {details}")]
    ConfigDecode { path: PathBuf, details: String },

    #[error("[SFX-1101] directory {path} is unusable: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[SFX-1102] logger setup failed: {details}")]
    Logging { details: String },

    #[error("[SFX-1201] invalid {field} time {input:?}: {details}")]
    TimeParse {
        field: &'static str,
        input: String,
        details: String,
    },

    #[error("[SFX-1301] pid file {path}: {source}")]
    PidFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[SFX-1501] cannot install signal listener: {source}")]
    Signal {
        #[source]
        source: std::io::Error,
    },

    #[error("[SFX-1502] shutdown after {signal} failed: {details}")]
    SignalShutdown { signal: String, details: String },
}

impl StartupError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ConfigLoad { .. } => "SFX-1001",
            Self::ConfigDecode { .. } => "SFX-1002",
            Self::Directory { .. } => "SFX-1101",
            Self::Logging { .. } => "SFX-1102",
            Self::TimeParse { .. } => "SFX-1201",
            Self::PidFile { .. } => "SFX-1301",
            Self::Signal { .. } => "SFX-1501",
            Self::SignalShutdown { .. } => "SFX-1502",
        }
    }

    /// Process exit status for this error. All startup failures share one.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        1
    }

    pub fn directory(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Directory {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn pid_file(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::PidFile {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}
