//! Process-wide logger.
//!
//! One `tracing` subscriber is installed for the whole process. Its sink starts
//! on stderr and can be redirected to an append-only file once the log
//! directory is known. `RUST_LOG` sets the starting filter; the configured
//! level replaces it at startup and on reload.

use crate::error::{Result, StartupError};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::Subscriber;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

/// Level used until the configuration says otherwise.
pub const DEFAULT_LEVEL: LevelFilter = LevelFilter::INFO;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

enum SinkTarget {
    Stderr,
    File { path: PathBuf, file: File },
}

/// Shared, switchable destination for formatted log lines.
#[derive(Clone)]
pub struct LogSink {
    inner: Arc<Mutex<SinkTarget>>,
}

impl LogSink {
    pub fn stderr() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SinkTarget::Stderr)),
        }
    }

    /// Send every subsequent line to `path`, appending and creating it if
    /// needed.
    pub fn redirect_to_file(&self, path: &Path) -> io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("log sink lock poisoned"))?;
        *guard = SinkTarget::File {
            path: path.to_path_buf(),
            file,
        };
        Ok(())
    }

    /// The file currently written to, if any.
    pub fn file_path(&self) -> Option<PathBuf> {
        match &*self.inner.lock().ok()? {
            SinkTarget::Stderr => None,
            SinkTarget::File { path, .. } => Some(path.clone()),
        }
    }
}

/// Writer handed to the formatter for a single event.
pub struct LogSinkGuard {
    inner: Arc<Mutex<SinkTarget>>,
}

impl<'a> fmt::MakeWriter<'a> for LogSink {
    type Writer = LogSinkGuard;

    fn make_writer(&'a self) -> Self::Writer {
        LogSinkGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for LogSinkGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("log sink lock poisoned"))?;
        match &mut *guard {
            SinkTarget::Stderr => io::stderr().write(buf),
            SinkTarget::File { file, .. } => file.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("log sink lock poisoned"))?;
        match &mut *guard {
            SinkTarget::Stderr => io::stderr().flush(),
            SinkTarget::File { file, .. } => file.flush(),
        }
    }
}

/// Cloneable handle on the process logger, given to every subsystem.
#[derive(Clone)]
pub struct Logger {
    sink: LogSink,
    filter: reload::Handle<EnvFilter, Registry>,
}

impl Logger {
    /// Build the logger and its subscriber at [`DEFAULT_LEVEL`] without
    /// installing it.
    pub fn build() -> (Self, impl Subscriber + Send + Sync + 'static) {
        Self::build_with(level_filter(DEFAULT_LEVEL))
    }

    fn build_with(initial: EnvFilter) -> (Self, impl Subscriber + Send + Sync + 'static) {
        let sink = LogSink::stderr();
        let (layer, filter) = reload::Layer::new(initial);
        let subscriber = tracing_subscriber::registry().with(layer).with(
            fmt::layer()
                .with_writer(sink.clone())
                .with_ansi(false)
                .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string())),
        );
        (Self { sink, filter }, subscriber)
    }

    /// Build the logger and install it as the global default subscriber.
    /// The starting filter comes from `RUST_LOG` when it is set and valid.
    pub fn install() -> Result<Self> {
        let initial =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| level_filter(DEFAULT_LEVEL));
        let (logger, subscriber) = Self::build_with(initial);
        subscriber.try_init().map_err(|e| StartupError::Logging {
            details: e.to_string(),
        })?;
        Ok(logger)
    }

    pub fn sink(&self) -> &LogSink {
        &self.sink
    }

    /// Redirect output to `path`.
    pub fn redirect_to_file(&self, path: &Path) -> Result<()> {
        self.sink
            .redirect_to_file(path)
            .map_err(|e| StartupError::Logging {
                details: format!("cannot open {}: {e}", path.display()),
            })
    }

    /// Apply a level name from the configuration file.
    pub fn set_level(&self, name: &str) -> std::result::Result<LevelFilter, String> {
        let level = parse_level(name)?;
        self.filter
            .reload(level_filter(level))
            .map_err(|e| e.to_string())?;
        Ok(level)
    }

    /// Most verbose level the current filter lets through.
    pub fn level(&self) -> LevelFilter {
        self.filter
            .with_current(|filter| filter.max_level_hint())
            .ok()
            .flatten()
            .unwrap_or(DEFAULT_LEVEL)
    }
}

fn level_filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::default().add_directive(level.into())
}

/// Map a configured level name onto a filter. Accepts the names operators
/// already use in existing config files (`warning`, `fatal`, `panic`).
pub fn parse_level(name: &str) -> std::result::Result<LevelFilter, String> {
    match name.trim().to_ascii_lowercase().as_str() {
        "panic" | "fatal" | "error" => Ok(LevelFilter::ERROR),
        "warn" | "warning" => Ok(LevelFilter::WARN),
        "info" => Ok(LevelFilter::INFO),
        "debug" => Ok(LevelFilter::DEBUG),
        "trace" => Ok(LevelFilter::TRACE),
        "off" => Ok(LevelFilter::OFF),
        other => Err(format!("unknown log level {other:?}")),
    }
}
