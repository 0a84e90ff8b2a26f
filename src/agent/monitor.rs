//! Background health checks of the master/slave pair and outage resync.

use super::copy::{copy_window, CopySettings};
use super::influx::InfluxApi;
use crate::config::EffectiveConfig;
use crate::dispatch::DbSelector;
use crate::window::TimeWindow;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Granularity at which the monitor thread notices a stop request.
const STOP_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Master,
    Slave,
}

/// Last known state of one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterHealth {
    pub name: String,
    pub role: Role,
    pub ok: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub last_ok: Option<DateTime<Utc>>,
    pub down_since: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub latency_ms: Option<u64>,
}

/// Result of applying one check to a [`ClusterHealth`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    WentDown,
    /// Back up after being down since the given instant.
    Recovered(DateTime<Utc>),
}

impl ClusterHealth {
    /// Endpoints start healthy until a check says otherwise.
    pub fn new(name: &str, role: Role) -> Self {
        Self {
            name: name.to_string(),
            role,
            ok: true,
            last_check: None,
            last_ok: None,
            down_since: None,
            last_error: None,
            latency_ms: None,
        }
    }

    pub fn record(&mut self, outcome: Result<Duration, String>, now: DateTime<Utc>) -> Transition {
        self.last_check = Some(now);
        match outcome {
            Ok(latency) => {
                self.latency_ms = Some(u64::try_from(latency.as_millis()).unwrap_or(u64::MAX));
                self.last_ok = Some(now);
                self.last_error = None;
                self.ok = true;
                match self.down_since.take() {
                    Some(since) => Transition::Recovered(since),
                    None => Transition::Unchanged,
                }
            }
            Err(error) => {
                self.last_error = Some(error);
                self.latency_ms = None;
                let was_ok = self.ok;
                self.ok = false;
                if was_ok {
                    // The outage started right after the last good check.
                    self.down_since = Some(self.last_ok.unwrap_or(now));
                    Transition::WentDown
                } else {
                    Transition::Unchanged
                }
            }
        }
    }
}

/// Outcome of the most recent automatic resync.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncRecord {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub points: usize,
    pub error: Option<String>,
}

/// Serializable snapshot shown by the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub monitoring: bool,
    pub master: Option<ClusterHealth>,
    pub slave: Option<ClusterHealth>,
    pub last_sync: Option<SyncRecord>,
}

/// Shared, thread-safe status written by the monitor and read by the web UI.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    inner: Arc<RwLock<StatusSnapshot>>,
}

impl StatusBoard {
    pub fn snapshot(&self) -> StatusSnapshot {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut StatusSnapshot) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

/// Endpoints and intervals the monitor works with. Swapped on reload.
pub struct MonitorSettings {
    pub master: Arc<dyn InfluxApi>,
    pub slave: Arc<dyn InfluxApi>,
    pub check_interval: Duration,
    pub min_sync_interval: Duration,
    pub copy: CopySettings,
}

impl MonitorSettings {
    pub fn new(
        master: Arc<dyn InfluxApi>,
        slave: Arc<dyn InfluxApi>,
        config: &EffectiveConfig,
    ) -> Self {
        Self {
            master,
            slave,
            check_interval: config.general.check_interval,
            min_sync_interval: config.general.min_sync_interval,
            copy: CopySettings::from_general(&config.general),
        }
    }
}

/// The monitor loop state shared between its thread and the agent.
pub struct Monitor {
    board: StatusBoard,
    settings: RwLock<Arc<MonitorSettings>>,
    stop: AtomicBool,
}

impl Monitor {
    pub fn new(board: StatusBoard, settings: MonitorSettings) -> Arc<Self> {
        board.update(|s| {
            s.master = Some(ClusterHealth::new(settings.master.name(), Role::Master));
            s.slave = Some(ClusterHealth::new(settings.slave.name(), Role::Slave));
        });
        Arc::new(Self {
            board,
            settings: RwLock::new(Arc::new(settings)),
            stop: AtomicBool::new(false),
        })
    }

    fn settings(&self) -> Arc<MonitorSettings> {
        Arc::clone(&self.settings.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Install new endpoints and intervals; used from the next check on.
    pub fn apply(&self, settings: MonitorSettings) {
        let names_changed = {
            let current = self.settings();
            current.master.name() != settings.master.name()
                || current.slave.name() != settings.slave.name()
        };
        if names_changed {
            self.board.update(|s| {
                s.master = Some(ClusterHealth::new(settings.master.name(), Role::Master));
                s.slave = Some(ClusterHealth::new(settings.slave.name(), Role::Slave));
            });
        }
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(settings);
    }

    /// Check both endpoints once. Returns the outage window to resync when
    /// the slave just came back after a long enough outage.
    pub fn tick(&self, now: DateTime<Utc>) -> Option<TimeWindow> {
        let settings = self.settings();
        let master = settings.master.ping().map_err(|e| format!("{e:#}"));
        let slave = settings.slave.ping().map_err(|e| format!("{e:#}"));

        let (master_change, slave_change) = self.board.update(|s| {
            let m = s
                .master
                .get_or_insert_with(|| ClusterHealth::new(settings.master.name(), Role::Master))
                .record(master, now);
            let sl = s
                .slave
                .get_or_insert_with(|| ClusterHealth::new(settings.slave.name(), Role::Slave))
                .record(slave, now);
            (m, sl)
        });

        for (role, name, change) in [
            ("master", settings.master.name(), master_change),
            ("slave", settings.slave.name(), slave_change),
        ] {
            match change {
                Transition::WentDown => tracing::warn!("{role} {name} is DOWN"),
                Transition::Recovered(since) => {
                    tracing::info!("{role} {name} is back UP (down since {since})")
                }
                Transition::Unchanged => {}
            }
        }

        let Transition::Recovered(since) = slave_change else {
            return None;
        };
        let outage = (now - since).to_std().unwrap_or_default();
        if outage < settings.min_sync_interval {
            tracing::info!(
                "Slave outage of {}s is below the minimum sync interval, not resyncing",
                outage.as_secs()
            );
            return None;
        }
        Some(TimeWindow {
            start: since,
            end: now,
        })
    }

    /// Copy the outage window and record the result on the board.
    pub fn resync(&self, window: TimeWindow) {
        let settings = self.settings();
        tracing::info!("Resyncing slave over {window}");
        let result = copy_window(
            settings.master.as_ref(),
            settings.slave.as_ref(),
            &DbSelector::All,
            &window,
            &settings.copy,
        );
        let record = SyncRecord {
            start: window.start,
            end: window.end,
            finished: Utc::now(),
            points: result.as_ref().map(|r| r.points).unwrap_or(0),
            error: result.as_ref().err().map(|e| format!("{e:#}")),
        };
        if let Some(error) = &record.error {
            tracing::error!("Resync over {window} failed: {error}");
        }
        self.board.update(|s| s.last_sync = Some(record));
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn run(self: Arc<Self>) {
        self.board.update(|s| s.monitoring = true);
        while !self.is_stopping() {
            if let Some(window) = self.tick(Utc::now()) {
                self.resync(window);
            }
            let mut waited = Duration::ZERO;
            let interval = self.settings().check_interval;
            while waited < interval && !self.is_stopping() {
                let step = STOP_POLL.min(interval - waited);
                thread::sleep(step);
                waited += step;
            }
        }
        self.board.update(|s| s.monitoring = false);
        tracing::info!("HA monitor stopped");
    }

    /// Start the check loop on its own thread.
    pub fn spawn(self: &Arc<Self>) -> std::io::Result<JoinHandle<()>> {
        let monitor = Arc::clone(self);
        thread::Builder::new()
            .name("ha-monitor".to_string())
            .spawn(move || monitor.run())
    }
}

/// A running monitor and its thread.
pub struct MonitorHandle {
    monitor: Arc<Monitor>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl MonitorHandle {
    pub fn start(monitor: Arc<Monitor>) -> std::io::Result<Self> {
        let thread = monitor.spawn()?;
        Ok(Self {
            monitor,
            thread: Mutex::new(Some(thread)),
        })
    }

    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    /// Ask the loop to stop and wait for it.
    pub fn stop(&self) {
        self.monitor.request_stop();
        let thread = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(thread) = thread {
            if thread.join().is_err() {
                tracing::error!("HA monitor thread panicked");
            }
        }
    }
}
