//! clio - setup and run lifecycle for command-line applications.
//!
//! An [`Application`] turns a tree of [`Command`]s into a program with
//! layered configuration (YAML file, environment, flags), a `tracing`
//! logger with secret redaction, an event bus feeding a UI, and optional
//! profiling of each command run.
//!
//! # Modules
//!
//! - [`app`]: lifecycle orchestration, setup configuration and state
//! - [`command`]: command tree with `pre_run` / `run` hooks
//! - [`config`]: config targets, flags and the layered loader
//! - [`log`]: logging configuration, logger and redaction
//! - [`bus`]: event bus between command bodies and the UI
//! - [`ui`]: UI sinks driven by the event loop
//! - [`execution`]: body thread bridge and event loop
//! - [`profile`]: CPU and memory profiling sessions

pub mod app;
pub mod bus;
pub mod command;
pub mod config;
pub mod execution;
pub mod log;
pub mod profile;
pub mod ui;

pub use app::{AppConfig, Application, Error, Identification, SetupConfig, State};
pub use bus::{Bus, Event, Subscription};
pub use command::{Command, Hook, Invocation};
pub use config::{Config, ConfigRef, Flag, PostLoad};
pub use log::{Logger, LoggingConfig, RedactStore};
pub use profile::{DevelopmentConfig, ProfileMode, ProfileSession, Profiler};
pub use ui::Ui;

/// Version of the clio library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
