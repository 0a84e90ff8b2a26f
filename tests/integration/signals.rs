//! Real OS signals delivered through the signal bridge
//!
//! Signals are process-wide, so every test here runs serially.

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{raise, Signal};
use serial_test::serial;
use syncflux::app::{run_with, SignalOptions};
use syncflux::lifecycle::{ExitFn, Lifecycle, LifecycleHooks, LifecycleState, ListenMode};
use tempfile::TempDir;

use super::helpers::*;

#[derive(Default)]
struct CountingHooks {
    reloads: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl LifecycleHooks for CountingHooks {
    fn reload(&self) -> anyhow::Result<()> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn shutdown(&self) -> anyhow::Result<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn recording_exit() -> (ExitFn, Arc<Mutex<Vec<i32>>>) {
    let codes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&codes);
    (Box::new(move |code| sink.lock().unwrap().push(code)), codes)
}

/// Poll `condition` for up to five seconds.
fn wait_for(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
#[serial]
fn test_hup_reloads_and_term_shuts_down() {
    let hooks = Arc::new(CountingHooks::default());
    let (exit, codes) = recording_exit();
    let lifecycle = Lifecycle::start(hooks.clone(), exit, ListenMode::Persistent)
        .expect("Signal listener should install");

    raise(Signal::SIGHUP).unwrap();
    wait_for("first reload", || hooks.reloads.load(Ordering::SeqCst) == 1);
    raise(Signal::SIGHUP).unwrap();
    wait_for("second reload", || hooks.reloads.load(Ordering::SeqCst) == 2);
    assert_eq!(hooks.shutdowns.load(Ordering::SeqCst), 0);

    raise(Signal::SIGTERM).unwrap();
    wait_for("exit", || !codes.lock().unwrap().is_empty());

    assert_eq!(hooks.shutdowns.load(Ordering::SeqCst), 1);
    assert_eq!(*codes.lock().unwrap(), vec![1]);
    assert_eq!(lifecycle.stop(), LifecycleState::Terminating);
}

#[test]
#[serial]
fn test_single_shot_listener_stops_after_one_signal() {
    let hooks = Arc::new(CountingHooks::default());
    let (exit, codes) = recording_exit();
    let lifecycle = Lifecycle::start(hooks.clone(), exit, ListenMode::SingleShot)
        .expect("Signal listener should install");

    raise(Signal::SIGHUP).unwrap();
    wait_for("reload", || hooks.reloads.load(Ordering::SeqCst) == 1);
    raise(Signal::SIGINT).unwrap();
    thread::sleep(Duration::from_millis(200));

    assert_eq!(hooks.shutdowns.load(Ordering::SeqCst), 0);
    assert!(codes.lock().unwrap().is_empty());
    assert_eq!(lifecycle.stop(), LifecycleState::Running);
}

#[test]
#[serial]
fn test_hup_during_monitor_reloads_config_into_agent() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path().to_path_buf();
    let config = write_config(&root, "");
    let rewritten = config.clone();

    // Stand-in for the blocking server: edit the config, send SIGHUP and
    // return once the agent saw the new document.
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let log_in_hook = Arc::clone(&log);
    let hook: ServeHook = Box::new(move |_target| {
        let content = fs::read_to_string(&rewritten)
            .unwrap()
            .replace("it-node", "it-node-reloaded");
        fs::write(&rewritten, content).unwrap();
        raise(Signal::SIGHUP).unwrap();
        wait_for("reload in agent", || {
            calls(&log_in_hook)
                .iter()
                .any(|c| c == "reload_config it-node-reloaded")
        });
    });
    let mut ctx = recording_context_with(&root, Arc::clone(&log), Some(hook));
    let (exit, codes) = recording_exit();
    ctx.signals = Some(SignalOptions {
        exit,
        mode: ListenMode::Persistent,
    });

    let args = cli(&["--config", config.to_str().unwrap()]);
    run_with(&args, ctx).expect("Monitor run should succeed");

    let recorded = calls(&log);
    assert!(recorded.contains(&"start_monitor".to_string()));
    assert!(recorded.contains(&"reload_config it-node-reloaded".to_string()));
    assert!(!recorded.contains(&"shutdown".to_string()));
    assert!(codes.lock().unwrap().is_empty());
}
