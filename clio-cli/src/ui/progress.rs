//! Progress rendering: an `indicatif` bar on a terminal, log records
//! elsewhere.

use std::ops::ControlFlow;

use console::Term;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use clio::{Error, Event, Ui};

use super::{Progress, PROGRESS_DONE, PROGRESS_UPDATE};

const BAR_TEMPLATE: &str = "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}";

/// Progress bar on stderr. Setup fails when stderr is not a terminal.
pub struct ProgressUi {
    bar: Option<ProgressBar>,
    require_terminal: bool,
}

impl ProgressUi {
    pub fn new() -> Self {
        Self {
            bar: None,
            require_terminal: true,
        }
    }

    /// Render into an existing bar, terminal or not.
    #[cfg(test)]
    fn with_bar(bar: ProgressBar) -> Self {
        Self {
            bar: Some(bar),
            require_terminal: false,
        }
    }

    fn update(&mut self, progress: Progress) -> Result<(), Error> {
        if self.bar.is_none() {
            self.bar = Some(new_bar(progress.total)?);
        }
        if let Some(bar) = &self.bar {
            bar.set_length(progress.total);
            bar.set_position(progress.current);
        }
        Ok(())
    }
}

impl Default for ProgressUi {
    fn default() -> Self {
        Self::new()
    }
}

fn new_bar(total: u64) -> Result<ProgressBar, Error> {
    let style = ProgressStyle::with_template(BAR_TEMPLATE)
        .map_err(|e| Error::Ui(format!("invalid progress template: {}", e)))?
        .progress_chars("=> ");
    Ok(ProgressBar::new(total).with_style(style))
}

impl Ui for ProgressUi {
    fn setup(&mut self) -> Result<(), Error> {
        if self.require_terminal && !Term::stderr().is_term() {
            return Err(Error::Ui("stderr is not a terminal".to_string()));
        }
        Ok(())
    }

    fn handle(&mut self, event: &Event) -> Result<ControlFlow<()>, Error> {
        match event.kind() {
            PROGRESS_UPDATE => {
                if let Some(progress) = event.value_as::<Progress>() {
                    self.update(*progress)?;
                }
            }
            PROGRESS_DONE => {
                if let Some(bar) = &self.bar {
                    bar.finish_with_message("done");
                }
            }
            _ => {}
        }
        Ok(ControlFlow::Continue(()))
    }

    fn teardown(&mut self, force: bool) -> Result<(), Error> {
        if let Some(bar) = self.bar.take() {
            if force {
                bar.abandon_with_message("cancelled");
            } else if !bar.is_finished() {
                bar.finish_and_clear();
            }
        }
        Ok(())
    }
}

/// Fallback UI reporting progress as log records.
#[derive(Debug, Default)]
pub struct LogUi {
    last_reported: Option<u64>,
}

impl LogUi {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Ui for LogUi {
    fn setup(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn handle(&mut self, event: &Event) -> Result<ControlFlow<()>, Error> {
        match event.kind() {
            PROGRESS_UPDATE => {
                if let Some(progress) = event.value_as::<Progress>() {
                    if self.last_reported != Some(progress.current) {
                        info!(current = progress.current, total = progress.total, "Progress");
                        self.last_reported = Some(progress.current);
                    }
                }
            }
            PROGRESS_DONE => info!("Done"),
            _ => {}
        }
        Ok(ControlFlow::Continue(()))
    }

    fn teardown(&mut self, _force: bool) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(current: u64, total: u64) -> Event {
        Event::new(PROGRESS_UPDATE).with_value(Progress::new(current, total))
    }

    #[test]
    fn test_progress_ui_tracks_position() {
        let mut ui = ProgressUi::with_bar(ProgressBar::hidden());

        ui.handle(&update(3, 8)).unwrap();

        let bar = ui.bar.as_ref().unwrap();
        assert_eq!(bar.position(), 3);
        assert_eq!(bar.length(), Some(8));
    }

    #[test]
    fn test_progress_ui_finishes_on_done() {
        let mut ui = ProgressUi::with_bar(ProgressBar::hidden());

        ui.handle(&update(8, 8)).unwrap();
        ui.handle(&Event::new(PROGRESS_DONE)).unwrap();

        assert!(ui.bar.as_ref().unwrap().is_finished());
        ui.teardown(false).unwrap();
        assert!(ui.bar.is_none());
    }

    #[test]
    fn test_progress_ui_ignores_unknown_events() {
        let mut ui = ProgressUi::with_bar(ProgressBar::hidden());

        let flow = ui.handle(&Event::new("other")).unwrap();

        assert_eq!(flow, ControlFlow::Continue(()));
        assert_eq!(ui.bar.as_ref().unwrap().position(), 0);
    }

    #[test]
    fn test_forced_teardown_abandons_bar() {
        let mut ui = ProgressUi::with_bar(ProgressBar::hidden());
        ui.handle(&update(1, 8)).unwrap();

        ui.teardown(true).unwrap();

        assert!(ui.bar.is_none());
    }

    #[test]
    fn test_bar_template_is_valid() {
        assert!(new_bar(10).is_ok());
    }

    #[test]
    fn test_log_ui_reports_each_step_once() {
        let mut ui = LogUi::new();
        ui.setup().unwrap();

        ui.handle(&update(1, 2)).unwrap();
        ui.handle(&update(1, 2)).unwrap();
        assert_eq!(ui.last_reported, Some(1));

        ui.handle(&update(2, 2)).unwrap();
        assert_eq!(ui.last_reported, Some(2));
    }
}
