//! Startup sequence tests: config → state → pid file → window → dispatch

use std::fs;

use syncflux::app::{run, run_with, AppError};
use syncflux::dispatch::DispatchError;
use syncflux::error::StartupError;
use syncflux::pidfile::PidFile;
use syncflux::runtime_dirs::LOG_FILE_NAME;
use tempfile::TempDir;

use super::helpers::*;

#[test]
fn test_copy_runs_once_with_requested_window() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    let config = write_config(root, "");
    let (ctx, log) = recording_context(root);

    let args = cli(&[
        "-action",
        "copy",
        "-db",
        "telegraf",
        "-start",
        "2023-01-01T00:00:00Z",
        "-end",
        "2023-01-01T06:00:00Z",
        "-config",
        config.to_str().unwrap(),
    ]);
    let code = run(&args, ctx);

    assert_eq!(code, 0);
    assert_eq!(
        calls(&log),
        vec![
            "attach agent it-node".to_string(),
            "attach dashboard".to_string(),
            "copy telegraf 21600s".to_string(),
        ]
    );
}

#[test]
fn test_hamonitor_serves_dashboard_and_logs_to_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    let config = write_config(root, "");
    let home = root.join("home");
    fs::create_dir_all(home.join("public")).unwrap();
    let logs = root.join("logs");
    let (ctx, log) = recording_context(root);
    let logger = ctx.logger.clone();

    let args = cli(&[
        "--config",
        config.to_str().unwrap(),
        "--home",
        home.to_str().unwrap(),
        "--logs",
        logs.to_str().unwrap(),
    ]);
    run_with(&args, ctx).expect("Monitor mode should start");

    let recorded = calls(&log);
    assert_eq!(recorded[2], "start_monitor");
    assert_eq!(
        recorded[3],
        format!("serve it-node 127.0.0.1:4999 {}", home.join("public").display())
    );
    assert_eq!(recorded.len(), 4);
    assert_eq!(logger.sink().file_path(), Some(logs.join(LOG_FILE_NAME)));
    assert!(logs.join(LOG_FILE_NAME).is_file());
}

#[test]
fn test_pid_file_written_before_dispatch() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    let config = write_config(root, "");
    let pid_path = root.join("run").join("syncflux.pid");
    let (ctx, log) = recording_context(root);

    let args = cli(&[
        "--action",
        "copy",
        "--config",
        config.to_str().unwrap(),
        "--pidfile",
        pid_path.to_str().unwrap(),
    ]);
    run_with(&args, ctx).unwrap();

    assert_eq!(PidFile::read(&pid_path), Some(std::process::id()));
    assert!(calls(&log).iter().any(|c| c.starts_with("copy all")));
}

#[test]
fn test_unwritable_pid_file_stops_before_dispatch() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    let config = write_config(root, "");
    let blocker = root.join("blocker");
    fs::write(&blocker, "plain file").unwrap();
    let (ctx, log) = recording_context(root);

    let args = cli(&[
        "--action",
        "copy",
        "--config",
        config.to_str().unwrap(),
        "--pidfile",
        blocker.join("syncflux.pid").to_str().unwrap(),
    ]);
    let err = run_with(&args, ctx).unwrap_err();

    assert!(matches!(err, AppError::Startup(StartupError::PidFile { .. })));
    assert_eq!(err.exit_code(), 1);
    assert!(!calls(&log).iter().any(|c| c.starts_with("copy")));
}

#[test]
fn test_unknown_action_invokes_nothing() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    let config = write_config(root, "");
    let (ctx, log) = recording_context(root);

    let args = cli(&["--action", "teleport", "--config", config.to_str().unwrap()]);
    let err = run_with(&args, ctx).unwrap_err();

    assert!(matches!(err, AppError::Dispatch(DispatchError::UnknownMode(ref m)) if m == "teleport"));
    assert_eq!(err.exit_code(), 1);
    assert!(calls(&log).is_empty());
}

#[test]
fn test_move_is_unimplemented() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    let config = write_config(root, "");
    let (ctx, _log) = recording_context(root);

    let args = cli(&["--action", "move", "--config", config.to_str().unwrap()]);
    let err = run_with(&args, ctx).unwrap_err();

    assert!(matches!(err, AppError::Dispatch(DispatchError::Unimplemented(_))));
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn test_bad_window_is_reported_before_copy() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    let config = write_config(root, "");
    let (ctx, log) = recording_context(root);

    let args = cli(&[
        "--action",
        "copy",
        "--start",
        "last tuesday",
        "--config",
        config.to_str().unwrap(),
    ]);
    let code = run(&args, ctx);

    assert_eq!(code, 1);
    assert!(!calls(&log).iter().any(|c| c.starts_with("copy")));
}

#[test]
fn test_broken_config_is_fatal() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    let config = root.join("syncflux.toml");
    fs::write(&config, "[general\nlogdir = ").unwrap();
    let (ctx, log) = recording_context(root);

    let args = cli(&["--config", config.to_str().unwrap()]);
    let err = run_with(&args, ctx).unwrap_err();

    assert!(matches!(err, AppError::Startup(StartupError::ConfigDecode { .. })));
    assert!(calls(&log).is_empty());
}
