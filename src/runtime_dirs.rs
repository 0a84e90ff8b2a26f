//! Effective runtime directories and their three-tier resolution.

use crate::config::GeneralConfig;
use crate::error::{Result, StartupError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the append-only log file written in continuous-monitor mode.
pub const LOG_FILE_NAME: &str = "syncflux.log";

/// Dashboard assets subdirectory expected under the home directory.
pub const ASSETS_DIR_NAME: &str = "public";

/// Directory overrides given on the command line.
///
/// `None` means the operator did not pass the flag; any `Some` value wins,
/// even one identical to the built-in default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirOverrides {
    pub logs: Option<PathBuf>,
    pub home: Option<PathBuf>,
    pub data: Option<PathBuf>,
}

/// Which tier supplied a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirOrigin {
    Flag,
    Config,
    Default,
}

impl fmt::Display for DirOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DirOrigin::Flag => "command line",
            DirOrigin::Config => "config file",
            DirOrigin::Default => "built-in default",
        };
        write!(f, "{s}")
    }
}

/// Absolute directories shared by every subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeDirectories {
    pub log_dir: PathBuf,
    pub conf_dir: PathBuf,
    pub data_dir: PathBuf,
    pub home_dir: PathBuf,
    pub origins: DirOrigins,
}

/// Origin of each resolved directory, kept for startup logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirOrigins {
    pub log: DirOrigin,
    pub data: DirOrigin,
    pub home: DirOrigin,
}

impl RuntimeDirectories {
    /// Resolve every directory: explicit flag, then non-empty config value,
    /// then a default derived from `app_dir` (the working directory).
    ///
    /// Relative paths are anchored at `app_dir`.
    pub fn resolve(
        overrides: &DirOverrides,
        general: &GeneralConfig,
        conf_dir: &Path,
        app_dir: &Path,
    ) -> Self {
        let (log_dir, log) = pick(
            overrides.logs.as_deref(),
            &general.log_dir,
            app_dir.join("log"),
            app_dir,
        );
        let (data_dir, data) = pick(
            overrides.data.as_deref(),
            &general.data_dir,
            conf_dir.to_path_buf(),
            app_dir,
        );
        let (home_dir, home) = pick(
            overrides.home.as_deref(),
            &general.home_dir,
            app_dir.to_path_buf(),
            app_dir,
        );

        Self {
            log_dir,
            conf_dir: anchor(conf_dir, app_dir),
            data_dir,
            home_dir,
            origins: DirOrigins { log, data, home },
        }
    }

    /// Create every directory that does not exist yet. Safe to repeat.
    pub fn ensure(&self) -> Result<()> {
        for dir in [&self.log_dir, &self.conf_dir, &self.data_dir, &self.home_dir] {
            fs::create_dir_all(dir).map_err(|e| StartupError::directory(dir, e))?;
        }
        Ok(())
    }

    /// Dashboard static assets directory (`<home>/public`).
    pub fn assets_dir(&self) -> PathBuf {
        self.home_dir.join(ASSETS_DIR_NAME)
    }

    pub fn has_assets(&self) -> bool {
        self.assets_dir().is_dir()
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join(LOG_FILE_NAME)
    }
}

fn pick(
    flag: Option<&Path>,
    configured: &str,
    default: PathBuf,
    app_dir: &Path,
) -> (PathBuf, DirOrigin) {
    if let Some(path) = flag {
        return (anchor(path, app_dir), DirOrigin::Flag);
    }
    if !configured.trim().is_empty() {
        return (anchor(Path::new(configured.trim()), app_dir), DirOrigin::Config);
    }
    (anchor(&default, app_dir), DirOrigin::Default)
}

fn anchor(path: &Path, app_dir: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        app_dir.join(path)
    }
}
