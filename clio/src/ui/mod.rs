//! UI sinks driven by the event loop.
//!
//! A command may be given several candidate UIs; the event loop uses the
//! first one whose [`Ui::setup`] succeeds, so a rich terminal UI can fall
//! back to plain log output when no terminal is attached.

use std::ops::ControlFlow;

use crate::app::Error;
use crate::bus::Event;

/// Renders bus events while a command runs.
pub trait Ui: Send {
    /// Prepare the output. An error makes the event loop try the next UI.
    fn setup(&mut self) -> Result<(), Error>;

    /// Render one event. `Break` stops event delivery to this UI.
    fn handle(&mut self, event: &Event) -> Result<ControlFlow<()>, Error>;

    /// Release the output. `force` is set when the command failed or was
    /// cancelled and the UI should not wait for pending work.
    fn teardown(&mut self, force: bool) -> Result<(), Error>;
}

/// Pick the first UI that sets up successfully.
///
/// Setup failures of skipped UIs are logged and otherwise ignored.
pub(crate) fn select(uis: Vec<Box<dyn Ui>>) -> Option<Box<dyn Ui>> {
    for (index, mut ui) in uis.into_iter().enumerate() {
        match ui.setup() {
            Ok(()) => return Some(ui),
            Err(err) => tracing::debug!(index, error = %err, "UI unavailable, trying next"),
        }
    }
    None
}
