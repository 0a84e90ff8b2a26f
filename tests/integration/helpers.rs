//! Shared test helpers: recording collaborators and config fixtures

use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use syncflux::app::RunContext;
use syncflux::cli::{normalize_args, Cli};
use syncflux::config::{EffectiveConfig, CONFIG_FILE_NAME};
use syncflux::dispatch::{Agent, Dashboard, DashboardTarget, DbSelector};
use syncflux::logging::Logger;
use syncflux::state::{Collaborator, SharedState};
use syncflux::window::TimeWindow;

/// Log of collaborator calls, shared between the agent and the dashboard.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

pub struct RecordingAgent {
    pub log: CallLog,
}

impl Collaborator for RecordingAgent {
    fn name(&self) -> &'static str {
        "recording-agent"
    }

    fn attach(&self, state: &SharedState) {
        self.log
            .lock()
            .unwrap()
            .push(format!("attach agent {}", state.config.current().general.instance_id));
    }
}

impl Agent for RecordingAgent {
    fn start_monitor(&self) -> anyhow::Result<()> {
        self.log.lock().unwrap().push("start_monitor".to_string());
        Ok(())
    }

    fn reload_config(&self, config: &EffectiveConfig) -> anyhow::Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("reload_config {}", config.general.instance_id));
        Ok(())
    }

    fn shutdown(&self) -> anyhow::Result<()> {
        self.log.lock().unwrap().push("shutdown".to_string());
        Ok(())
    }

    fn copy(&self, selector: &DbSelector, window: &TimeWindow) -> anyhow::Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("copy {selector} {}s", window.duration().num_seconds()));
        Ok(())
    }
}

/// Hook run inside `serve`, standing in for the long-running server.
pub type ServeHook = Box<dyn Fn(&DashboardTarget) + Send + Sync>;

pub struct RecordingDashboard {
    pub log: CallLog,
    pub on_serve: Option<ServeHook>,
}

impl Collaborator for RecordingDashboard {
    fn name(&self) -> &'static str {
        "recording-dashboard"
    }

    fn attach(&self, _state: &SharedState) {
        self.log.lock().unwrap().push("attach dashboard".to_string());
    }
}

impl Dashboard for RecordingDashboard {
    fn serve(&self, target: &DashboardTarget) -> anyhow::Result<()> {
        self.log.lock().unwrap().push(format!(
            "serve {} {} {}",
            target.instance_id,
            target.listen,
            target.assets.display()
        ));
        if let Some(hook) = &self.on_serve {
            hook(target);
        }
        Ok(())
    }
}

/// Context with recording collaborators and no OS signal handling.
pub fn recording_context(app_dir: &Path) -> (RunContext, CallLog) {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    (recording_context_with(app_dir, Arc::clone(&log), None), log)
}

/// Same as [`recording_context`], recording into `log` and running
/// `on_serve` inside the dashboard.
pub fn recording_context_with(app_dir: &Path, log: CallLog, on_serve: Option<ServeHook>) -> RunContext {
    RunContext {
        agent: Arc::new(RecordingAgent { log: Arc::clone(&log) }),
        dashboard: Arc::new(RecordingDashboard {
            log: Arc::clone(&log),
            on_serve,
        }),
        logger: Logger::build().0,
        app_dir: app_dir.to_path_buf(),
        signals: None,
    }
}

/// Write a minimal configuration with the given `[general]` body.
pub fn write_config(dir: &Path, general: &str) -> PathBuf {
    let path = dir.join(CONFIG_FILE_NAME);
    let content = format!(
        "[general]\ninstanceid = \"it-node\"\n{general}\n\n[http]\nbind-addr = \"127.0.0.1:4999\"\n"
    );
    fs::write(&path, content).expect("Failed to write config");
    path
}

/// Parse command-line arguments the way the binary does.
pub fn cli(args: &[&str]) -> Cli {
    let argv = std::iter::once("syncflux")
        .chain(args.iter().copied())
        .map(std::ffi::OsString::from);
    Cli::try_parse_from(normalize_args(argv)).expect("Arguments should parse")
}
