//! Process-wide shared state and its one-time initialization.

use crate::config::{ConfigHandle, ConfigSource, EffectiveConfig};
use crate::dispatch::OperatingMode;
use crate::error::Result;
use crate::logging::Logger;
use crate::runtime_dirs::{DirOverrides, RuntimeDirectories};
use std::path::Path;
use std::sync::Arc;


/// State every subsystem receives before it is first invoked.
#[derive(Clone)]
pub struct SharedState {
    pub config: ConfigHandle,
    pub dirs: Arc<RuntimeDirectories>,
    pub logger: Logger,
}

/// A subsystem that must be handed the shared state before use.
pub trait Collaborator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Receive the shared logger, directories and configuration handle.
    fn attach(&self, state: &SharedState);
}

/// Inputs to [`initialize`] that come from the command line.
pub struct InitOptions<'a> {
    pub overrides: &'a DirOverrides,
    pub app_dir: &'a Path,
    pub mode: OperatingMode,
}

/// Resolve directories, finish logger setup and attach every collaborator.
///
/// Runs single-threaded, before the signal listener or any mode starts.
pub fn initialize(
    logger: Logger,
    config: EffectiveConfig,
    source: ConfigSource,
    options: &InitOptions<'_>,
    collaborators: &[&dyn Collaborator],
) -> Result<SharedState> {
    let dirs = RuntimeDirectories::resolve(
        options.overrides,
        &config.general,
        &source.conf_dir,
        options.app_dir,
    );
    dirs.ensure()?;

    if options.mode.logs_to_file() {
        logger.redirect_to_file(&dirs.log_file())?;
        tracing::info!(
            "Set logdir {} from {}",
            dirs.log_dir.display(),
            dirs.origins.log
        );
    }

    if !config.general.log_level.trim().is_empty() {
        match logger.set_level(&config.general.log_level) {
            Ok(level) => tracing::info!("Set log level to {level} from config file"),
            Err(e) => tracing::warn!("Ignoring log level from config file: {e}"),
        }
    }

    tracing::info!(
        "Set data dir {} from {}",
        dirs.data_dir.display(),
        dirs.origins.data
    );
    tracing::info!(
        "Set home dir {} from {}",
        dirs.home_dir.display(),
        dirs.origins.home
    );
    if !dirs.has_assets() {
        tracing::warn!(
            "There is no public (www) directory in [{}]",
            dirs.home_dir.display()
        );
    }

    let state = SharedState {
        config: ConfigHandle::new(config, source),
        dirs: Arc::new(dirs),
        logger,
    };

    for collaborator in collaborators {
        collaborator.attach(&state);
        tracing::debug!("Attached shared state to {}", collaborator.name());
    }

    tracing::info!(
        "Directories: exec {} | config {} | logs {} | data {} | home {}",
        options.app_dir.display(),
        state.dirs.conf_dir.display(),
        state.dirs.log_dir.display(),
        state.dirs.data_dir.display(),
        state.dirs.home_dir.display()
    );

    Ok(state)
}

impl SharedState {
    /// Re-read the configuration file and let `accept` adopt it before it is
    /// published together with its log level. If loading or `accept` fails,
    /// the handle and the log level keep their current values.
    pub fn reload_config<F>(&self, accept: F) -> anyhow::Result<Arc<EffectiveConfig>>
    where
        F: FnOnce(&EffectiveConfig) -> anyhow::Result<()>,
    {
        let next = self.config.read_source()?;
        accept(&next)?;
        self.config.replace(next);

        let config = self.config.current();
        if !config.general.log_level.trim().is_empty() {
            if let Err(e) = self.logger.set_level(&config.general.log_level) {
                tracing::warn!("Ignoring reloaded log level: {e}");
            }
        }
        Ok(config)
    }
}
