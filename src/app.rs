//! Startup sequence: configuration, shared state, pid file, signal listener,
//! time window and finally the selected action.

use crate::agent::InfluxAgent;
use crate::cli::Cli;
use crate::config::{ConfigSource, EffectiveConfig, CONFIG_FILE_NAME};
use crate::dispatch::{
    ActionRequest, Agent, Dashboard, DashboardTarget, DbSelector, DispatchError, Dispatcher,
    OperatingMode,
};
use crate::error::StartupError;
use crate::lifecycle::{process_exit, ExitFn, Lifecycle, LifecycleHooks, ListenMode};
use crate::logging::Logger;
use crate::pidfile::PidFile;
use crate::runtime_dirs::DirOverrides;
use crate::state::{initialize, InitOptions, SharedState};
use crate::webui::WebServer;
use crate::window::TimeWindow;
use chrono::Utc;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Anything that ends the run with a non-zero status.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl AppError {
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Startup(e) => e.exit_code(),
            AppError::Dispatch(e) => e.exit_code(),
        }
    }
}

/// How the signal listener is set up for a run.
pub struct SignalOptions {
    pub exit: ExitFn,
    pub mode: ListenMode,
}

/// Collaborators and environment for one run.
pub struct RunContext {
    pub agent: Arc<dyn Agent>,
    pub dashboard: Arc<dyn Dashboard>,
    pub logger: Logger,
    /// Directory the relative defaults are anchored at.
    pub app_dir: PathBuf,
    /// `None` leaves OS signals alone.
    pub signals: Option<SignalOptions>,
}

impl RunContext {
    /// Built-in agent and dashboard, real signal handling.
    pub fn production(logger: Logger) -> Self {
        let agent = Arc::new(InfluxAgent::new());
        let dashboard = Arc::new(WebServer::new(agent.status_board()));
        Self {
            agent,
            dashboard,
            logger,
            app_dir: app_dir(),
            signals: Some(SignalOptions {
                exit: process_exit(),
                mode: ListenMode::Persistent,
            }),
        }
    }
}

/// Working directory; the built-in directory defaults hang off it.
pub fn app_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Configuration file tried before the search path.
pub fn default_config_path() -> PathBuf {
    app_dir().join("conf").join(CONFIG_FILE_NAME)
}

/// Reload and shutdown wiring for the signal listener.
struct Supervisor {
    state: SharedState,
    agent: Arc<dyn Agent>,
}

impl LifecycleHooks for Supervisor {
    fn reload(&self) -> anyhow::Result<()> {
        let agent = &self.agent;
        self.state
            .reload_config(|config| agent.reload_config(config))?;
        Ok(())
    }

    fn shutdown(&self) -> anyhow::Result<()> {
        self.agent.shutdown()
    }
}

/// Run the whole startup sequence and return the process exit status.
pub fn run(cli: &Cli, ctx: RunContext) -> i32 {
    let logger = ctx.logger.clone();
    match run_with(cli, ctx) {
        Ok(()) => 0,
        Err(e) => {
            report(&e, &logger);
            e.exit_code()
        }
    }
}

fn report(err: &AppError, logger: &Logger) {
    tracing::error!("{err}");
    if let Some(path) = logger.sink().file_path() {
        eprintln!(
            "{} {err} (see {})",
            "✗".red().bold(),
            path.display()
        );
    }
}

/// Startup sequence with errors returned instead of an exit status.
pub fn run_with(cli: &Cli, ctx: RunContext) -> Result<(), AppError> {
    let mode: OperatingMode = cli.action.parse()?;

    let candidate = match &cli.config {
        Some(path) => {
            if !path.is_file() {
                tracing::warn!(
                    "Config file {} not found, searching default locations",
                    path.display()
                );
            }
            path.clone()
        }
        None => default_config_path(),
    };
    let source = ConfigSource::locate(&candidate)?;
    let config = EffectiveConfig::load(&source.path)?;
    tracing::info!("Loaded configuration from {}", source.path.display());

    let overrides = DirOverrides {
        logs: cli.logs.clone(),
        home: cli.home.clone(),
        data: cli.data.clone(),
    };
    let state = initialize(
        ctx.logger,
        config,
        source,
        &InitOptions {
            overrides: &overrides,
            app_dir: &ctx.app_dir,
            mode,
        },
        &[ctx.agent.as_ref(), ctx.dashboard.as_ref()],
    )?;

    if let Some(path) = &cli.pidfile {
        let pid_file = PidFile::write(path)?;
        tracing::info!("Wrote pid {} to {}", pid_file.pid(), path.display());
    }

    let lifecycle = match ctx.signals {
        Some(signals) => {
            let hooks = Arc::new(Supervisor {
                state: state.clone(),
                agent: Arc::clone(&ctx.agent),
            });
            Some(Lifecycle::start(hooks, signals.exit, signals.mode)?)
        }
        None => None,
    };

    let window = TimeWindow::parse(cli.start.as_deref(), cli.end.as_deref(), Utc::now())?;
    let request = ActionRequest {
        selector: DbSelector::parse(&cli.db),
        window,
        dashboard: DashboardTarget::from_state(&state),
    };

    let outcome = Dispatcher::new(ctx.agent.as_ref(), ctx.dashboard.as_ref()).dispatch(mode, &request);

    if let Some(lifecycle) = lifecycle {
        lifecycle.stop();
    }
    outcome?;
    Ok(())
}
