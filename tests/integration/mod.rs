//! Integration tests for the syncflux startup sequence
//!
//! These drive the public API end to end: configuration on disk, directory
//! resolution, pid file, real OS signals and action dispatch.

pub mod config_dirs;
pub mod helpers;
pub mod signals;
pub mod startup;
