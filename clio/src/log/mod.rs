//! Logging configuration and the application logger.
//!
//! The [`Logger`] owns a `tracing` dispatch that is never installed as the
//! process-wide default. The application enters it explicitly around setup,
//! the command body and the event loop, so several applications (and tests)
//! can log side by side without fighting over a global subscriber.
//!
//! ```text
//! Registry
//!   ├── profiling slot   (reloadable, empty unless a CPU profile is running)
//!   └── fmt layer        (EnvFilter from LoggingConfig)
//!         └── RedactingMakeWriter ──► stderr | log file (non-blocking)
//! ```

mod redact;

pub use redact::{RedactStore, RedactingMakeWriter, RedactingWriter, REDACTED};

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::UtcOffset;
use tracing::{dispatcher, info_span, Dispatch, Span};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{reload, EnvFilter, Layer, Registry};

use crate::app::Error;
use crate::config::Flag;

/// Layer that can be swapped into a running logger (used for CPU profiles).
pub type ProfileLayer = Box<dyn Layer<Registry> + Send + Sync>;

type ProfileHandle = reload::Handle<Option<ProfileLayer>, Registry>;

/// Minimum level of emitted log records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<Level> for LevelFilter {
    fn from(level: Level) -> Self {
        match level {
            Level::Error => LevelFilter::ERROR,
            Level::Warn => LevelFilter::WARN,
            Level::Info => LevelFilter::INFO,
            Level::Debug => LevelFilter::DEBUG,
            Level::Trace => LevelFilter::TRACE,
        }
    }
}

/// Logging section of the application config (`log:`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Suppress all log output.
    pub quiet: bool,

    /// Level used when no verbosity is given.
    pub level: Level,

    /// `-v` count: 1 = info, 2 = debug, 3 or more = trace. Overrides `level`.
    pub verbosity: u8,

    /// Write logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            quiet: false,
            level: Level::Warn,
            verbosity: 0,
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Level filter after applying `quiet` and `verbosity`.
    pub fn effective_level(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::OFF;
        }
        match self.verbosity {
            0 => self.level.into(),
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }

    /// Flags controlling logging, bound to `log.*` keys.
    pub fn flags() -> Vec<Flag> {
        vec![
            Flag::switch("log.quiet", "quiet")
                .short('q')
                .help("Suppress all logging output"),
            Flag::count("log.verbosity", 'v')
                .help("Increase verbosity (-v info, -vv debug, -vvv trace)"),
        ]
    }
}

/// Application logger.
///
/// Cheap to clone; clones share the dispatch, the profiling slot and the
/// file writer.
#[derive(Clone)]
pub struct Logger {
    dispatch: Dispatch,
    span: Option<Span>,
    profiling: Option<ProfileHandle>,
    ansi: bool,
    _guard: Option<Arc<WorkerGuard>>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("span", &self.span)
            .field("profiling", &self.profiling.is_some())
            .finish_non_exhaustive()
    }
}

impl Logger {
    /// Build the default logger: stderr, or the configured log file.
    ///
    /// Output is masked with `redact_store`, including values added to the
    /// store after this call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Logger`] if the log file location is unusable.
    pub fn new(config: &LoggingConfig, redact_store: &RedactStore) -> Result<Self, Error> {
        let Some(path) = &config.file else {
            let ansi = console::colors_enabled_stderr();
            return Ok(Self::build(config, redact_store, io::stderr, ansi, None));
        };

        let dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let file_name = path
            .file_name()
            .ok_or_else(|| Error::Logger(format!("invalid log file: {}", path.display())))?;
        std::fs::create_dir_all(dir)
            .map_err(|e| Error::Logger(format!("cannot create {}: {}", dir.display(), e)))?;

        let appender = tracing_appender::rolling::never(dir, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        Ok(Self::build(config, redact_store, writer, false, Some(guard)))
    }

    /// Build a logger writing to an arbitrary writer.
    pub fn with_writer<W>(
        config: &LoggingConfig,
        redact_store: &RedactStore,
        writer: W,
        ansi: bool,
    ) -> Self
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        Self::build(config, redact_store, writer, ansi, None)
    }

    /// A logger that drops everything.
    pub fn disabled() -> Self {
        Self {
            dispatch: Dispatch::none(),
            span: None,
            profiling: None,
            ansi: false,
            _guard: None,
        }
    }

    fn build<W>(
        config: &LoggingConfig,
        redact_store: &RedactStore,
        writer: W,
        ansi: bool,
        guard: Option<WorkerGuard>,
    ) -> Self
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let (slot, handle) = reload::Layer::new(None::<ProfileLayer>);

        // the fmt layer stays installed when quiet so the profiling slot
        // keeps a live subscriber behind it
        let filter = EnvFilter::builder()
            .with_default_directive(config.effective_level().into())
            .parse_lossy("");
        let output = tracing_subscriber::fmt::layer()
            .with_writer(RedactingMakeWriter::new(writer, redact_store.clone()))
            .with_timer(timer())
            .with_ansi(ansi)
            .with_target(false)
            .with_filter(filter);

        let subscriber = Registry::default().with(slot).with(output);
        Self {
            dispatch: Dispatch::new(subscriber),
            span: None,
            profiling: Some(handle),
            ansi,
            _guard: guard.map(Arc::new),
        }
    }

    /// The underlying dispatch.
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Whether records are written with ANSI styling.
    pub fn ansi(&self) -> bool {
        self.ansi
    }

    /// Run `f` with this logger as the current dispatch (and inside its span).
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        dispatcher::with_default(&self.dispatch, || match &self.span {
            Some(span) => span.in_scope(f),
            None => f(),
        })
    }

    /// Child logger whose records are tagged with `component`.
    pub fn nested(&self, component: &str) -> Self {
        let span = dispatcher::with_default(&self.dispatch, || match &self.span {
            Some(parent) => info_span!(parent: parent, "component", name = %component),
            None => info_span!("component", name = %component),
        });
        Self {
            span: Some(span),
            ..self.clone()
        }
    }

    /// Install (or with `None`, remove) the profiling layer.
    #[cfg_attr(not(feature = "profiling"), allow(dead_code))]
    pub(crate) fn set_profile_layer(&self, layer: Option<ProfileLayer>) -> Result<(), Error> {
        let Some(handle) = &self.profiling else {
            return Err(Error::Logger("logger does not support profiling".into()));
        };
        handle
            .reload(layer)
            .map_err(|e| Error::Logger(format!("failed to swap profiling layer: {e}")))
    }
}

fn timer() -> OffsetTime<Rfc3339> {
    // the local offset is unavailable once other threads exist on some platforms
    OffsetTime::local_rfc_3339().unwrap_or_else(|_| OffsetTime::new(UtcOffset::UTC, Rfc3339))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Capture {
        type Writer = Capture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture_logger(config: &LoggingConfig, store: &RedactStore) -> (Logger, Capture) {
        let capture = Capture::default();
        let logger = Logger::with_writer(config, store, capture.clone(), false);
        (logger, capture)
    }

    #[test]
    fn test_effective_level() {
        let mut config = LoggingConfig::default();
        assert_eq!(config.effective_level(), LevelFilter::WARN);

        config.verbosity = 1;
        assert_eq!(config.effective_level(), LevelFilter::INFO);
        config.verbosity = 2;
        assert_eq!(config.effective_level(), LevelFilter::DEBUG);
        config.verbosity = 7;
        assert_eq!(config.effective_level(), LevelFilter::TRACE);

        config.quiet = true;
        assert_eq!(config.effective_level(), LevelFilter::OFF);
    }

    #[test]
    fn test_level_deserializes_lowercase() {
        let config: LoggingConfig = serde_yaml::from_str("level: debug").unwrap();
        assert_eq!(config.level, Level::Debug);
        assert!(!config.quiet);
    }

    #[test]
    fn test_logger_respects_level() {
        let config = LoggingConfig {
            level: Level::Info,
            ..Default::default()
        };
        let (logger, capture) = capture_logger(&config, &RedactStore::new());

        logger.in_scope(|| {
            tracing::info!("visible");
            tracing::debug!("hidden");
        });

        let out = capture.contents();
        assert!(out.contains("visible"));
        assert!(!out.contains("hidden"));
    }

    #[test]
    fn test_quiet_logger_emits_nothing() {
        let config = LoggingConfig {
            quiet: true,
            ..Default::default()
        };
        let (logger, capture) = capture_logger(&config, &RedactStore::new());

        logger.in_scope(|| tracing::error!("nothing"));
        assert!(capture.contents().is_empty());
    }

    #[test]
    fn test_logger_redacts_values_added_later() {
        let store = RedactStore::new();
        let (logger, capture) = capture_logger(&LoggingConfig::default(), &store);

        store.add(["hunter2"]);
        logger.in_scope(|| tracing::warn!(password = "hunter2", "login"));

        let out = capture.contents();
        assert!(out.contains(REDACTED));
        assert!(!out.contains("hunter2"));
    }

    #[test]
    fn test_nested_logger_tags_component() {
        let config = LoggingConfig {
            level: Level::Debug,
            ..Default::default()
        };
        let (logger, capture) = capture_logger(&config, &RedactStore::new());

        logger
            .nested("eventloop")
            .in_scope(|| tracing::info!("tick"));

        let out = capture.contents();
        assert!(out.contains("eventloop"));
        assert!(out.contains("tick"));
    }

    #[test]
    fn test_disabled_logger_still_runs_closure() {
        let logger = Logger::disabled();
        assert_eq!(logger.in_scope(|| 42), 42);
        assert!(logger.set_profile_layer(None).is_err());
    }

    #[test]
    fn test_file_logger_writes_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("tool.log");
        let config = LoggingConfig {
            file: Some(path.clone()),
            ..Default::default()
        };

        let logger = Logger::new(&config, &RedactStore::new()).unwrap();
        assert!(!logger.ansi());
        logger.in_scope(|| tracing::warn!("to the file"));
        drop(logger);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("to the file"));
        assert!(!contents.contains('\u{1b}'));
    }

    #[test]
    fn test_ansi_follows_writer_setting() {
        let store = RedactStore::new();
        let config = LoggingConfig::default();

        assert!(Logger::with_writer(&config, &store, Capture::default(), true).ansi());
        assert!(!Logger::with_writer(&config, &store, Capture::default(), false).ansi());
        assert!(!Logger::disabled().ansi());
    }
}
