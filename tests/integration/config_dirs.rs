//! Configuration on disk flowing into the resolved runtime directories

use std::fs;

use syncflux::config::{ConfigSource, EffectiveConfig};
use syncflux::dispatch::OperatingMode;
use syncflux::logging::Logger;
use syncflux::runtime_dirs::{DirOrigin, DirOverrides};
use syncflux::state::{initialize, InitOptions};
use tempfile::TempDir;

use super::helpers::*;

#[test]
fn test_config_values_flags_and_defaults_combine() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    let conf_dir = root.join("etc");
    fs::create_dir_all(&conf_dir).unwrap();
    let data_dir = root.join("var").join("data");
    write_config(
        &conf_dir,
        &format!("logdir = \"relative-logs\"\ndatadir = \"{}\"", data_dir.display()),
    );

    let source = ConfigSource::locate_in(&root.join("missing.toml"), &[conf_dir.clone()])
        .expect("Config should be found in the search list");
    assert_eq!(source.conf_dir, conf_dir);
    let config = EffectiveConfig::load(&source.path).unwrap();

    let overrides = DirOverrides {
        home: Some(root.join("home-flag")),
        ..DirOverrides::default()
    };
    let state = initialize(
        Logger::build().0,
        config,
        source,
        &InitOptions {
            overrides: &overrides,
            app_dir: root,
            mode: OperatingMode::Copy,
        },
        &[],
    )
    .expect("Initialization should succeed");

    let dirs = &state.dirs;
    assert_eq!(dirs.log_dir, root.join("relative-logs"));
    assert_eq!(dirs.origins.log, DirOrigin::Config);
    assert_eq!(dirs.data_dir, data_dir);
    assert_eq!(dirs.origins.data, DirOrigin::Config);
    assert_eq!(dirs.home_dir, root.join("home-flag"));
    assert_eq!(dirs.origins.home, DirOrigin::Flag);
    assert_eq!(dirs.conf_dir, conf_dir);
    for dir in [&dirs.log_dir, &dirs.data_dir, &dirs.home_dir, &dirs.conf_dir] {
        assert!(dir.is_dir(), "{} should exist", dir.display());
    }
    assert_eq!(state.config.current().general.instance_id, "it-node");
}

#[test]
fn test_repeated_startup_reuses_directories() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    let config_path = write_config(root, "");

    for _ in 0..2 {
        let source = ConfigSource::locate_in(&config_path, &[]).unwrap();
        let config = EffectiveConfig::load(&source.path).unwrap();
        let state = initialize(
            Logger::build().0,
            config,
            source,
            &InitOptions {
                overrides: &DirOverrides::default(),
                app_dir: root,
                mode: OperatingMode::Copy,
            },
            &[],
        )
        .expect("Startup should be repeatable");
        assert_eq!(state.dirs.log_dir, root.join("log"));
        assert_eq!(state.dirs.data_dir, root);
    }
}
