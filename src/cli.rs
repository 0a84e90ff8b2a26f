//! Command-line surface.

use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

/// Long flags also accepted with a single leading dash (`-action copy`).
const LONG_FLAGS: [&str; 10] = [
    "version", "action", "db", "start", "end", "config", "logs", "home", "data", "pidfile",
];

#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "syncflux")]
#[command(about = "HA monitor and data sync controller for InfluxDB pairs", long_about = None)]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// Print version information and exit
    #[arg(long)]
    pub version: bool,

    /// Action to run: hamonitor, copy, move or replicateschema
    #[arg(long, default_value = "hamonitor")]
    pub action: String,

    /// Database to operate on ("all" for every database)
    #[arg(long, default_value = "all")]
    pub db: String,

    /// Window start: RFC 3339, "YYYY-MM-DD HH:MM:SS", now-<duration> (default: now-1h)
    #[arg(long, allow_hyphen_values = true)]
    pub start: Option<String>,

    /// Window end, same formats as --start (default: now)
    #[arg(long, allow_hyphen_values = true)]
    pub end: Option<String>,

    /// Configuration file (default: ./conf/syncflux.toml, then the search path)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log directory
    #[arg(long)]
    pub logs: Option<PathBuf>,

    /// Home directory holding the public/ web assets
    #[arg(long)]
    pub home: Option<PathBuf>,

    /// Data directory
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// Write the process id to this file
    #[arg(long)]
    pub pidfile: Option<PathBuf>,
}

impl Cli {
    /// Parse process arguments, accepting single-dash long flags.
    pub fn parse_args() -> Self {
        Self::parse_from(normalize_args(std::env::args_os()))
    }
}

/// Rewrite `-name` / `-name=value` to `--name` for every known long flag.
pub fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            let Some(text) = arg.to_str() else {
                return arg;
            };
            let Some(rest) = text.strip_prefix('-').filter(|r| !r.starts_with('-')) else {
                return arg;
            };
            let name = rest.split('=').next().unwrap_or(rest);
            if LONG_FLAGS.contains(&name) {
                OsString::from(format!("-{text}"))
            } else {
                arg
            }
        })
        .collect()
}

/// `syncflux v<version> (git: <commit>) built at [<stamp>]`
pub fn version_line() -> String {
    format!(
        "syncflux v{} (git: {}) built at [{}]",
        env!("CARGO_PKG_VERSION"),
        option_env!("SYNCFLUX_COMMIT").unwrap_or("unknown"),
        option_env!("SYNCFLUX_BUILD_STAMP").unwrap_or("unknown")
    )
}
