//! Demo UIs and the progress events they render.

mod progress;

pub use progress::{LogUi, ProgressUi};

use clio::{AppConfig, Error, Ui};

/// Progress update, carrying a [`Progress`] payload.
pub const PROGRESS_UPDATE: &str = "demo.progress";

/// Work finished.
pub const PROGRESS_DONE: &str = "demo.done";

/// Payload of [`PROGRESS_UPDATE`] events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub current: u64,
    pub total: u64,
}

impl Progress {
    pub fn new(current: u64, total: u64) -> Self {
        Self { current, total }
    }
}

/// Candidate UIs: a terminal progress bar, falling back to log records.
pub fn candidates(config: &AppConfig) -> Result<Vec<Box<dyn Ui>>, Error> {
    let quiet = config.log.as_ref().is_some_and(|log| log.quiet);
    let mut uis: Vec<Box<dyn Ui>> = Vec::new();
    if !quiet {
        uis.push(Box::new(ProgressUi::new()));
    }
    uis.push(Box::new(LogUi::new()));
    Ok(uis)
}
