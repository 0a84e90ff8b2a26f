//! Operating modes, the collaborator contract and the action dispatcher.

use crate::config::{EffectiveConfig, HttpConfig};
use crate::state::{Collaborator, SharedState};
use crate::window::TimeWindow;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;


/// The one operating mode selected for this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatingMode {
    /// Continuous HA monitoring plus the status dashboard.
    HaMonitor,
    Copy,
    Move,
    ReplicateSchema,
}

impl OperatingMode {
    pub const ALL: [OperatingMode; 4] = [
        OperatingMode::HaMonitor,
        OperatingMode::Copy,
        OperatingMode::Move,
        OperatingMode::ReplicateSchema,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingMode::HaMonitor => "hamonitor",
            OperatingMode::Copy => "copy",
            OperatingMode::Move => "move",
            OperatingMode::ReplicateSchema => "replicateschema",
        }
    }

    /// Whether the mode performs one bounded operation and returns.
    pub fn is_one_shot(&self) -> bool {
        !matches!(self, OperatingMode::HaMonitor)
    }

    /// Whether the mode logs to `<logdir>/syncflux.log` instead of stderr.
    pub fn logs_to_file(&self) -> bool {
        matches!(self, OperatingMode::HaMonitor)
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatingMode {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == wanted)
            .ok_or_else(|| DispatchError::UnknownMode(s.to_string()))
    }
}

/// Which databases a one-shot operation applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbSelector {
    All,
    Named(String),
}

impl DbSelector {
    /// Literal used on the command line for every database.
    pub const ALL_LITERAL: &'static str = "all";

    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw == Self::ALL_LITERAL {
            DbSelector::All
        } else {
            DbSelector::Named(raw.to_string())
        }
    }

    pub fn matches(&self, db: &str) -> bool {
        match self {
            DbSelector::All => true,
            DbSelector::Named(name) => name == db,
        }
    }
}

impl fmt::Display for DbSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbSelector::All => f.write_str(Self::ALL_LITERAL),
            DbSelector::Named(name) => f.write_str(name),
        }
    }
}

/// Returned by collaborator entry points that have no implementation yet.
#[derive(Debug, Error)]
#[error("{operation} is not implemented")]
pub struct Unimplemented {
    pub operation: &'static str,
}

/// HA monitoring and data movement engine.
pub trait Agent: Collaborator {
    /// Start monitoring in the background and return.
    fn start_monitor(&self) -> anyhow::Result<()>;

    /// Adopt a reloaded configuration before the core publishes it. On error
    /// the agent keeps its previous settings and the reload is abandoned.
    fn reload_config(&self, config: &EffectiveConfig) -> anyhow::Result<()>;

    /// Flush state and stop monitoring. Must return once the work is stopped.
    fn shutdown(&self) -> anyhow::Result<()>;

    /// Copy every point in `window` from master to slave.
    fn copy(&self, selector: &DbSelector, window: &TimeWindow) -> anyhow::Result<()>;

    fn move_data(&self, _selector: &DbSelector, _window: &TimeWindow) -> anyhow::Result<()> {
        Err(Unimplemented { operation: "move" }.into())
    }

    fn replicate_schema(&self, _selector: &DbSelector) -> anyhow::Result<()> {
        Err(Unimplemented {
            operation: "replicateschema",
        }
        .into())
    }
}

/// Where and how the dashboard is served.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardTarget {
    pub assets: PathBuf,
    pub listen: String,
    pub http: HttpConfig,
    pub instance_id: String,
}

impl DashboardTarget {
    pub fn from_state(state: &SharedState) -> Self {
        let config = state.config.current();
        Self {
            assets: state.dirs.assets_dir(),
            listen: config.http.bind_addr.clone(),
            http: config.http.clone(),
            instance_id: config.general.instance_id.clone(),
        }
    }
}

/// HTTP status dashboard.
pub trait Dashboard: Collaborator {
    /// Serve until the process ends.
    fn serve(&self, target: &DashboardTarget) -> anyhow::Result<()>;
}

/// Everything a mode may need, resolved before dispatch.
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub selector: DbSelector,
    pub window: TimeWindow,
    pub dashboard: DashboardTarget,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("[SFX-1401] unknown action: {0}")]
    UnknownMode(String),

    #[error("[SFX-2001] action {0} is not implemented")]
    Unimplemented(OperatingMode),

    #[error("[SFX-2002] action {mode} failed: {details}")]
    Collaborator {
        mode: OperatingMode,
        details: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl DispatchError {
    pub const fn exit_code(&self) -> i32 {
        1
    }
}

/// Routes the selected mode to exactly one collaborator entry point.
pub struct Dispatcher<'a> {
    agent: &'a dyn Agent,
    dashboard: &'a dyn Dashboard,
}

impl<'a> Dispatcher<'a> {
    pub fn new(agent: &'a dyn Agent, dashboard: &'a dyn Dashboard) -> Self {
        Self { agent, dashboard }
    }

    /// Parse `action` and dispatch it. Nothing is invoked for an unknown
    /// action.
    pub fn dispatch_action(&self, action: &str, request: &ActionRequest) -> Result<(), DispatchError> {
        let mode: OperatingMode = action.parse()?;
        self.dispatch(mode, request)
    }

    pub fn dispatch(&self, mode: OperatingMode, request: &ActionRequest) -> Result<(), DispatchError> {
        tracing::info!("Running action {mode}");
        let outcome = match mode {
            OperatingMode::HaMonitor => self
                .agent
                .start_monitor()
                .and_then(|()| self.dashboard.serve(&request.dashboard)),
            OperatingMode::Copy => {
                tracing::info!("Copying {} over {}", request.selector, request.window);
                self.agent.copy(&request.selector, &request.window)
            }
            OperatingMode::Move => self.agent.move_data(&request.selector, &request.window),
            OperatingMode::ReplicateSchema => self.agent.replicate_schema(&request.selector),
        };

        outcome.map_err(|err| {
            if err.downcast_ref::<Unimplemented>().is_some() {
                DispatchError::Unimplemented(mode)
            } else {
                DispatchError::Collaborator {
                    mode,
                    details: format!("{err:#}"),
                    source: err.into(),
                }
            }
        })?;

        tracing::info!("Action {mode} finished");
        Ok(())
    }
}
