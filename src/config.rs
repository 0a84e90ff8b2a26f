//! Configuration document, its on-disk resolver and the reloadable handle.

use crate::error::{Result, StartupError};
use crate::utils::serde_duration;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;


/// File name searched for in the conventional configuration directories.
pub const CONFIG_FILE_NAME: &str = "syncflux.toml";

/// Conventional locations, searched in order when no explicit file exists.
const SEARCH_DIRS: [&str; 4] = ["/etc/syncflux/", "/opt/syncflux/conf/", "./conf/", "."];

/// The resolved, typed configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectiveConfig {
    #[serde(alias = "General")]
    pub general: GeneralConfig,
    #[serde(alias = "HTTP")]
    pub http: HttpConfig,
    #[serde(alias = "InfluxDB")]
    pub influxdb: Vec<InfluxDbConfig>,
}

/// `[general]` section: directories, logging and HA tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    #[serde(rename = "instanceid")]
    pub instance_id: String,
    #[serde(rename = "logdir")]
    pub log_dir: String,
    #[serde(rename = "loglevel")]
    pub log_level: String,
    #[serde(rename = "datadir")]
    pub data_dir: String,
    #[serde(rename = "homedir")]
    pub home_dir: String,
    #[serde(rename = "master-db")]
    pub master_db: String,
    #[serde(rename = "slave-db")]
    pub slave_db: String,
    #[serde(rename = "check-interval", with = "serde_duration")]
    pub check_interval: Duration,
    #[serde(rename = "min-sync-interval", with = "serde_duration")]
    pub min_sync_interval: Duration,
    #[serde(
        rename = "data-chunk-duration",
        alias = "data-chuck-duration",
        with = "serde_duration"
    )]
    pub data_chunk_duration: Duration,
    #[serde(rename = "max-points-on-single-write")]
    pub max_points_on_single_write: usize,
    #[serde(rename = "rw-max-retries")]
    pub rw_max_retries: u32,
    #[serde(rename = "rw-retry-delay", with = "serde_duration")]
    pub rw_retry_delay: Duration,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            instance_id: "syncflux".to_string(),
            log_dir: String::new(),
            log_level: String::new(),
            data_dir: String::new(),
            home_dir: String::new(),
            master_db: String::new(),
            slave_db: String::new(),
            check_interval: Duration::from_secs(10),
            min_sync_interval: Duration::from_secs(20),
            data_chunk_duration: Duration::from_secs(5 * 60),
            max_points_on_single_write: 20_000,
            rw_max_retries: 5,
            rw_retry_delay: Duration::from_secs(10),
        }
    }
}

/// `[http]` section consumed by the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub name: String,
    #[serde(rename = "bind-addr")]
    pub bind_addr: String,
    #[serde(rename = "admin-user")]
    pub admin_user: String,
    #[serde(rename = "admin-passwd")]
    pub admin_passwd: String,
    #[serde(rename = "cookie-id")]
    pub cookie_id: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            name: "syncflux".to_string(),
            bind_addr: "0.0.0.0:4090".to_string(),
            admin_user: "admin".to_string(),
            admin_passwd: "admin".to_string(),
            cookie_id: "syncflux".to_string(),
        }
    }
}

/// One `[[influxdb]]` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InfluxDbConfig {
    pub release: String,
    pub name: String,
    pub location: String,
    #[serde(rename = "admin-user")]
    pub admin_user: String,
    #[serde(rename = "admin-passwd")]
    pub admin_passwd: String,
    #[serde(with = "serde_duration")]
    pub timeout: Duration,
}

impl Default for InfluxDbConfig {
    fn default() -> Self {
        Self {
            release: "1x".to_string(),
            name: String::new(),
            location: "http://127.0.0.1:8086/".to_string(),
            admin_user: String::new(),
            admin_passwd: String::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl EffectiveConfig {
    /// Read and decode the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| StartupError::ConfigLoad {
            location: path.display().to_string(),
            details: e.to_string(),
        })?;
        Self::from_toml_str(&content, path)
    }

    /// Decode and validate a configuration document. `path` is only used in
    /// error messages.
    pub fn from_toml_str(content: &str, path: &Path) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| StartupError::ConfigDecode {
            path: path.to_path_buf(),
            details: e.to_string(),
        })?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let invalid = |details: String| StartupError::ConfigDecode {
            path: path.to_path_buf(),
            details,
        };

        for (role, name) in [
            ("master-db", &self.general.master_db),
            ("slave-db", &self.general.slave_db),
        ] {
            if !name.is_empty() && self.find_db(name).is_none() {
                return Err(invalid(format!(
                    "{role} {name:?} does not match any [[influxdb]] entry"
                )));
            }
        }
        if !self.general.master_db.is_empty() && self.general.master_db == self.general.slave_db {
            return Err(invalid("master-db and slave-db must differ".to_string()));
        }
        if self.general.check_interval.is_zero() {
            return Err(invalid("check-interval must be positive".to_string()));
        }
        if self.general.data_chunk_duration.is_zero() {
            return Err(invalid("data-chunk-duration must be positive".to_string()));
        }
        if self.general.max_points_on_single_write == 0 {
            return Err(invalid(
                "max-points-on-single-write must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Look up an `[[influxdb]]` entry by name.
    pub fn find_db(&self, name: &str) -> Option<&InfluxDbConfig> {
        self.influxdb.iter().find(|db| db.name == name)
    }
}

/// Where the configuration document was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSource {
    pub path: PathBuf,
    pub conf_dir: PathBuf,
}

impl ConfigSource {
    /// Resolve the configuration file: `candidate` if it exists, otherwise the
    /// first `syncflux.toml` in the conventional search path.
    pub fn locate(candidate: &Path) -> Result<Self> {
        Self::locate_in(candidate, &search_dirs())
    }

    /// Same as [`ConfigSource::locate`] with an explicit search list.
    pub fn locate_in(candidate: &Path, search: &[PathBuf]) -> Result<Self> {
        if candidate.is_file() {
            return Ok(Self::from_file(candidate));
        }

        search
            .iter()
            .map(|dir| dir.join(CONFIG_FILE_NAME))
            .find(|path| path.is_file())
            .map(|path| Self::from_file(&path))
            .ok_or_else(|| StartupError::ConfigLoad {
                location: std::iter::once(candidate.display().to_string())
                    .chain(search.iter().map(|d| d.display().to_string()))
                    .collect::<Vec<_>>()
                    .join(", "),
                details: format!("no {CONFIG_FILE_NAME} found"),
            })
    }

    fn from_file(path: &Path) -> Self {
        let path = absolute(path);
        let conf_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self { path, conf_dir }
    }
}

/// The conventional search list plus the per-user configuration directory.
pub fn search_dirs() -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = SEARCH_DIRS.iter().map(PathBuf::from).collect();
    if let Some(user_dir) = dirs::config_dir() {
        dirs.push(user_dir.join("syncflux"));
    }
    dirs
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Shared, atomically swappable view of the [`EffectiveConfig`].
///
/// Readers take a cheap `Arc` snapshot; the reload path is the only writer and
/// replaces the whole document at once.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    current: Arc<RwLock<Arc<EffectiveConfig>>>,
    source: Arc<ConfigSource>,
}

impl ConfigHandle {
    pub fn new(config: EffectiveConfig, source: ConfigSource) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(config))),
            source: Arc::new(source),
        }
    }

    /// Snapshot of the configuration in force right now.
    pub fn current(&self) -> Arc<EffectiveConfig> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn source(&self) -> &ConfigSource {
        &self.source
    }

    /// Install `next` and return the configuration it replaced.
    pub fn replace(&self, next: EffectiveConfig) -> Arc<EffectiveConfig> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(next))
    }

    /// Decode the source file again without installing it.
    pub fn read_source(&self) -> Result<EffectiveConfig> {
        EffectiveConfig::load(&self.source.path)
    }
}
