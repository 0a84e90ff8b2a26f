//! OS signal handling: hot reload on SIGHUP, orderly exit on SIGTERM/SIGINT.
//!
//! Signals are turned into [`SignalEvent`]s by a [`SignalBridge`] thread and
//! consumed by a [`SignalListener`] loop running on its own thread, so neither
//! handler runs in async-signal context.

use crate::error::{Result, StartupError};
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};


/// Exit status used after a termination signal.
pub const TERMINATE_EXIT_CODE: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Running,
    Reloading,
    Terminating,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Running => "running",
            LifecycleState::Reloading => "reloading",
            LifecycleState::Terminating => "terminating",
        };
        f.write_str(name)
    }
}

/// What a delivered signal asks the process to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalEvent {
    /// Stop. Carries the signal name for the log.
    Terminate(String),
    Reload,
}

impl SignalEvent {
    pub fn from_signal(signal: i32) -> Option<Self> {
        match signal {
            SIGTERM => Some(SignalEvent::Terminate("SIGTERM".to_string())),
            SIGINT => Some(SignalEvent::Terminate("SIGINT".to_string())),
            SIGHUP => Some(SignalEvent::Reload),
            _ => None,
        }
    }
}

/// Work performed on behalf of the signal loop.
pub trait LifecycleHooks: Send + Sync {
    /// Re-read configuration and push it to the collaborators.
    fn reload(&self) -> anyhow::Result<()>;

    /// Stop all work. Called at most once.
    fn shutdown(&self) -> anyhow::Result<()>;
}

/// Terminates the process. Replaced in tests.
pub type ExitFn = Box<dyn Fn(i32) + Send + Sync>;

/// Production exit function.
pub fn process_exit() -> ExitFn {
    Box::new(|code| std::process::exit(code))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListenMode {
    /// Keep servicing events until terminated.
    #[default]
    Persistent,
    /// Service exactly one event, then stop listening.
    SingleShot,
}

/// Consumes [`SignalEvent`]s and drives the hooks.
pub struct SignalListener {
    hooks: Arc<dyn LifecycleHooks>,
    exit: ExitFn,
    mode: ListenMode,
    state: LifecycleState,
}

impl SignalListener {
    pub fn new(hooks: Arc<dyn LifecycleHooks>, exit: ExitFn, mode: ListenMode) -> Self {
        Self {
            hooks,
            exit,
            mode,
            state: LifecycleState::Running,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Handle one event and return the state it leaves the process in.
    pub fn handle(&mut self, event: SignalEvent) -> LifecycleState {
        match event {
            SignalEvent::Terminate(signal) => {
                self.state = LifecycleState::Terminating;
                tracing::info!("Received {signal}, shutting down");
                if let Err(e) = self.hooks.shutdown() {
                    let err = StartupError::SignalShutdown {
                        signal,
                        details: format!("{e:#}"),
                    };
                    tracing::error!("{err}");
                }
                (self.exit)(TERMINATE_EXIT_CODE);
            }
            SignalEvent::Reload => {
                self.state = LifecycleState::Reloading;
                tracing::info!("Received SIGHUP, reloading configuration");
                match self.hooks.reload() {
                    Ok(()) => tracing::info!("Configuration reloaded"),
                    Err(e) => {
                        tracing::error!("Reload failed, keeping previous configuration: {e:#}")
                    }
                }
                self.state = LifecycleState::Running;
            }
        }
        self.state
    }

    /// Run until terminated, the mode says stop, or the channel closes.
    pub fn run(mut self, events: Receiver<SignalEvent>) -> LifecycleState {
        while let Ok(event) = events.recv() {
            let state = self.handle(event);
            if state == LifecycleState::Terminating || self.mode == ListenMode::SingleShot {
                break;
            }
        }
        tracing::debug!("Signal listener stopped in state {}", self.state);
        self.state
    }

    /// Run the loop on a dedicated thread.
    pub fn spawn(self, events: Receiver<SignalEvent>) -> Result<JoinHandle<LifecycleState>> {
        thread::Builder::new()
            .name("lifecycle".to_string())
            .spawn(move || self.run(events))
            .map_err(|source| StartupError::Signal { source })
    }
}

/// Forwards OS signals into a channel from a dedicated thread.
pub struct SignalBridge {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl SignalBridge {
    /// Register SIGINT, SIGTERM and SIGHUP and start forwarding them to `tx`.
    pub fn install(tx: Sender<SignalEvent>) -> Result<Self> {
        let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])
            .map_err(|source| StartupError::Signal { source })?;
        let handle = signals.handle();

        let thread = thread::Builder::new()
            .name("signal-bridge".to_string())
            .spawn(move || {
                for signal in signals.forever() {
                    let Some(event) = SignalEvent::from_signal(signal) else {
                        continue;
                    };
                    if tx.send(event).is_err() {
                        break;
                    }
                }
            })
            .map_err(|source| StartupError::Signal { source })?;

        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    /// Stop forwarding and wait for the bridge thread.
    pub fn close(mut self) {
        self.shutdown_bridge();
    }

    fn shutdown_bridge(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SignalBridge {
    fn drop(&mut self) {
        self.shutdown_bridge();
    }
}

/// A running signal bridge plus the listener consuming it.
pub struct Lifecycle {
    bridge: SignalBridge,
    listener: JoinHandle<LifecycleState>,
}

impl Lifecycle {
    /// Install the OS bridge and start the listener loop.
    pub fn start(hooks: Arc<dyn LifecycleHooks>, exit: ExitFn, mode: ListenMode) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let bridge = SignalBridge::install(tx)?;
        let listener = SignalListener::new(hooks, exit, mode).spawn(rx)?;
        tracing::debug!("Signal listener started ({mode:?})");
        Ok(Self { bridge, listener })
    }

    /// Stop listening and return the listener's final state.
    pub fn stop(self) -> LifecycleState {
        self.bridge.close();
        self.listener
            .join()
            .unwrap_or(LifecycleState::Terminating)
    }
}
