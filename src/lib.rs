pub mod agent;
pub mod app;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod pidfile;
pub mod runtime_dirs;
pub mod state;
pub mod utils;
pub mod webui;
pub mod window;
