//! Application bootstrap and lifecycle management.
//!
//! [`Application`] binds configuration loading, resource construction and
//! execution to a [`Command`](crate::command::Command) tree:
//!
//! ```text
//! ┌──────────────────────────── pre_run ─────────────────────────────┐
//! │ 1. core config (log, dev) ◄── file < env < flags                 │
//! │ 2. resources: logger ─ bus + subscription ─ UIs                  │
//! │    └── initializers (in order, fail fast)                        │
//! │ 3. command configs, each followed by its post-load hook          │
//! │ 4. version + consolidated configuration log records              │
//! └──────────────────────────────────────────────────────────────────┘
//! ┌────────────────────────────── run ───────────────────────────────┐
//! │ profile session ─ body thread ─ event loop (UI) ─ profile stop   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

mod application;
mod error;
mod setup_config;
mod state;

pub use application::Application;
pub use error::{BoxError, Error};
pub use setup_config::{
    BusConstructor, Identification, Initializer, LoggerConstructor, PostConstruct, SetupConfig,
    UiConstructor,
};
pub use state::{AppConfig, State};
