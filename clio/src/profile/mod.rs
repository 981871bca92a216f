//! Development profiling around command execution.
//!
//! Profiling is selected with `dev.profile` (hidden `--profile` flag):
//!
//! - `cpu`: a Chrome trace of every span and event, written to
//!   `cpu.trace.json` (requires the `profiling` feature)
//! - `mem`: peak resident set size at start and stop, written to
//!   `mem.profile.json`
//!
//! Output goes to `<temp>/<app>-profile-<pid>/` unless another directory is
//! configured.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app::Error;
use crate::config::Flag;
use crate::log::Logger;
#[cfg(feature = "profiling")]
use crate::log::ProfileLayer;
#[cfg(feature = "profiling")]
use tracing_subscriber::Registry;

/// What to profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileMode {
    #[default]
    None,
    Cpu,
    Mem,
}

/// Development section of the application config (`dev:`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevelopmentConfig {
    pub profile: ProfileMode,
}

impl DevelopmentConfig {
    /// Flags bound to `dev.*` keys.
    pub fn flags() -> Vec<Flag> {
        vec![Flag::value("dev.profile", "profile")
            .help("Profile the command [none, cpu, mem]")
            .hidden()]
    }
}

/// A running profiling session.
///
/// The session is released exactly once: by [`ProfileSession::stop`] or,
/// failing that, when the guard is dropped (including during unwinding).
#[must_use = "the profile stops when the session is dropped"]
pub struct ProfileSession {
    stop: Option<Box<dyn FnOnce() + Send>>,
}

impl ProfileSession {
    /// Session that runs `stop` on release.
    pub fn new(stop: impl FnOnce() + Send + 'static) -> Self {
        Self {
            stop: Some(Box::new(stop)),
        }
    }

    /// Session with nothing to release.
    pub fn noop() -> Self {
        Self { stop: None }
    }

    pub fn stop(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop();
        }
    }
}

impl Drop for ProfileSession {
    fn drop(&mut self) {
        self.release();
    }
}

/// Starts profiling sessions.
pub trait Profiler: Send + Sync {
    /// Start profiling in `mode`. [`ProfileMode::None`] yields a no-op session.
    fn start(&self, mode: ProfileMode, logger: &Logger) -> Result<ProfileSession, Error>;
}

/// File-based profiler.
#[derive(Debug, Clone)]
pub struct DefaultProfiler {
    app_name: String,
    dir: Option<PathBuf>,
}

impl DefaultProfiler {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            dir: None,
        }
    }

    /// Write profiles to `dir` instead of the temp directory.
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            std::env::temp_dir().join(format!("{}-profile-{}", self.app_name, std::process::id()))
        })
    }

    fn prepare_dir(&self) -> Result<PathBuf, Error> {
        let dir = self.output_dir();
        fs::create_dir_all(&dir).map_err(Error::Profile)?;
        Ok(dir)
    }

    #[cfg(feature = "profiling")]
    fn start_cpu(&self, logger: &Logger) -> Result<ProfileSession, Error> {
        let path = self.prepare_dir()?.join("cpu.trace.json");
        let (layer, flush) = tracing_chrome::ChromeLayerBuilder::<Registry>::new()
            .file(&path)
            .include_args(true)
            .build();
        let layer: ProfileLayer = Box::new(layer);
        logger.set_profile_layer(Some(layer))?;
        logger.in_scope(|| info!(path = %path.display(), "CPU profiling started"));

        let logger = logger.clone();
        Ok(ProfileSession::new(move || {
            if let Err(err) = logger.set_profile_layer(None) {
                logger.in_scope(|| warn!(error = %err, "Failed to detach CPU profiler"));
            }
            drop(flush);
            logger.in_scope(|| info!(path = %path.display(), "CPU profile written"));
        }))
    }

    #[cfg(not(feature = "profiling"))]
    fn start_cpu(&self, logger: &Logger) -> Result<ProfileSession, Error> {
        logger.in_scope(|| {
            warn!("CPU profiling requires the `profiling` feature, continuing without it")
        });
        Ok(ProfileSession::noop())
    }

    fn start_mem(&self, logger: &Logger) -> Result<ProfileSession, Error> {
        let path = self.prepare_dir()?.join("mem.profile.json");
        let started = Instant::now();
        let peak_rss_start = peak_rss();
        logger.in_scope(|| info!(path = %path.display(), "Memory profiling started"));

        let logger = logger.clone();
        Ok(ProfileSession::new(move || {
            let report = MemoryReport {
                peak_rss_start,
                peak_rss_end: peak_rss(),
                elapsed_ms: started.elapsed().as_millis() as u64,
            };
            let written = serde_json::to_vec_pretty(&report)
                .map_err(io::Error::from)
                .and_then(|bytes| fs::write(&path, bytes));
            logger.in_scope(|| match written {
                Ok(()) => info!(path = %path.display(), "Memory profile written"),
                Err(err) => warn!(error = %err, "Failed to write memory profile"),
            });
        }))
    }
}

impl Profiler for DefaultProfiler {
    fn start(&self, mode: ProfileMode, logger: &Logger) -> Result<ProfileSession, Error> {
        match mode {
            ProfileMode::None => Ok(ProfileSession::noop()),
            ProfileMode::Cpu => self.start_cpu(logger),
            ProfileMode::Mem => self.start_mem(logger),
        }
    }
}

/// Contents of `mem.profile.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryReport {
    /// Peak RSS when profiling started (KiB on Linux, bytes on macOS).
    pub peak_rss_start: Option<u64>,
    pub peak_rss_end: Option<u64>,
    pub elapsed_ms: u64,
}

#[cfg(unix)]
fn peak_rss() -> Option<u64> {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
    // SAFETY: getrusage only writes into the provided struct.
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    // SAFETY: getrusage succeeded, so the struct is initialized.
    let usage = unsafe { usage.assume_init() };
    u64::try_from(usage.ru_maxrss).ok()
}

#[cfg(not(unix))]
fn peak_rss() -> Option<u64> {
    None
}
