//! Built-in HA agent backed by the InfluxDB HTTP API.

pub mod copy;
pub mod influx;
pub mod line_protocol;
pub mod monitor;
pub mod schema;

#[cfg(test)]
pub(crate) mod fake;

use crate::config::EffectiveConfig;
use crate::dispatch::{Agent, DbSelector};
use crate::state::{Collaborator, SharedState};
use crate::window::TimeWindow;
use anyhow::{anyhow, Context, Result};
use copy::{copy_window, CopySettings};
use influx::{InfluxApi, InfluxClient};
use monitor::{Monitor, MonitorHandle, MonitorSettings, StatusBoard};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// Builds endpoint clients from configuration entries.
pub type ClientFactory =
    Box<dyn Fn(&EffectiveConfig, &str) -> Result<Arc<dyn InfluxApi>> + Send + Sync>;

/// Agent driving the master/slave pair named in `[general]`.
pub struct InfluxAgent {
    state: OnceLock<SharedState>,
    board: StatusBoard,
    monitor: Mutex<Option<MonitorHandle>>,
    clients: ClientFactory,
}

impl Default for InfluxAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl InfluxAgent {
    pub fn new() -> Self {
        Self::with_clients(Box::new(|config: &EffectiveConfig, name: &str| {
            let db = config
                .find_db(name)
                .ok_or_else(|| anyhow!("no [[influxdb]] entry named {name}"))?;
            Ok(Arc::new(InfluxClient::new(db)?) as Arc<dyn InfluxApi>)
        }))
    }

    /// Agent using `clients` to reach the endpoints.
    pub fn with_clients(clients: ClientFactory) -> Self {
        Self {
            state: OnceLock::new(),
            board: StatusBoard::default(),
            monitor: Mutex::new(None),
            clients,
        }
    }

    /// Board the dashboard reads from.
    pub fn status_board(&self) -> StatusBoard {
        self.board.clone()
    }

    fn state(&self) -> Result<&SharedState> {
        self.state
            .get()
            .ok_or_else(|| anyhow!("agent used before shared state was attached"))
    }

    fn endpoints(&self, config: &EffectiveConfig) -> Result<(Arc<dyn InfluxApi>, Arc<dyn InfluxApi>)> {
        let general = &config.general;
        if general.master_db.is_empty() || general.slave_db.is_empty() {
            anyhow::bail!("master-db and slave-db must both be configured");
        }
        let master = (self.clients)(config, &general.master_db)
            .with_context(|| format!("Failed to set up master {}", general.master_db))?;
        let slave = (self.clients)(config, &general.slave_db)
            .with_context(|| format!("Failed to set up slave {}", general.slave_db))?;
        Ok((master, slave))
    }

    fn monitor_settings(&self, config: &EffectiveConfig) -> Result<MonitorSettings> {
        let (master, slave) = self.endpoints(config)?;
        Ok(MonitorSettings::new(master, slave, config))
    }
}

impl Collaborator for InfluxAgent {
    fn name(&self) -> &'static str {
        "agent"
    }

    fn attach(&self, state: &SharedState) {
        if self.state.set(state.clone()).is_err() {
            tracing::debug!("Agent already attached, keeping the first state");
        }
    }
}

impl Agent for InfluxAgent {
    fn start_monitor(&self) -> Result<()> {
        let config = self.state()?.config.current();
        let mut slot = self.monitor.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            tracing::warn!("HA monitor already running");
            return Ok(());
        }
        let settings = self.monitor_settings(&config)?;
        tracing::info!(
            "Starting HA monitor: master {} slave {} every {}s",
            config.general.master_db,
            config.general.slave_db,
            settings.check_interval.as_secs()
        );
        let monitor = Monitor::new(self.board.clone(), settings);
        *slot = Some(MonitorHandle::start(monitor).context("Failed to spawn HA monitor thread")?);
        Ok(())
    }

    fn reload_config(&self, config: &EffectiveConfig) -> Result<()> {
        let slot = self.monitor.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(handle) = slot.as_ref() else {
            return Ok(());
        };
        handle.monitor().apply(self.monitor_settings(config)?);
        tracing::info!(
            "HA monitor now checking every {}s",
            config.general.check_interval.as_secs()
        );
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        let handle = self
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            tracing::info!("Stopping HA monitor");
            handle.stop();
        }
        Ok(())
    }

    fn copy(&self, selector: &DbSelector, window: &TimeWindow) -> Result<()> {
        let config = self.state()?.config.current();
        let (master, slave) = self.endpoints(&config)?;
        copy_window(
            master.as_ref(),
            slave.as_ref(),
            selector,
            window,
            &CopySettings::from_general(&config.general),
        )?;
        Ok(())
    }

    fn replicate_schema(&self, selector: &DbSelector) -> Result<()> {
        let config = self.state()?.config.current();
        let (master, slave) = self.endpoints(&config)?;
        schema::replicate(master.as_ref(), slave.as_ref(), selector)?;
        Ok(())
    }
}
