//! Event loop that feeds bus events to the UI until the command finishes.

use std::ops::ControlFlow;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::Outcome;
use crate::app::Error;
use crate::bus::{Event, Subscription};
use crate::log::Logger;
use crate::ui::{self, Ui};

/// Drive the UI until the command body finishes or the invocation is
/// cancelled.
///
/// - a body error stops event delivery and forces UI teardown
/// - a successful body stops the loop once already queued events are
///   delivered
/// - cancellation returns [`Error::Cancelled`] without waiting for the body
///
/// Every error observed (body, UI handling, teardown) is returned; several
/// are combined into [`Error::Multiple`].
pub async fn eventloop(
    cancellation: CancellationToken,
    logger: Logger,
    subscription: Option<Subscription>,
    mut outcome: Outcome,
    uis: Vec<Box<dyn Ui>>,
) -> Result<(), Error> {
    let mut ui = logger.in_scope(|| ui::select(uis));
    let mut events = subscription;
    let mut errors = Vec::new();
    let mut force = false;

    loop {
        tokio::select! {
            result = outcome.recv() => {
                match result {
                    Some(err) => {
                        logger.in_scope(|| debug!(error = %err, "Command failed"));
                        errors.push(err);
                        events = None;
                        force = true;
                    }
                    None => {
                        while let Some(event) = events.as_mut().and_then(Subscription::try_recv) {
                            deliver(&logger, &mut ui, &mut events, &event, &mut errors);
                        }
                    }
                }
                break;
            }
            event = next_event(&mut events) => match event {
                Some(event) => deliver(&logger, &mut ui, &mut events, &event, &mut errors),
                None => {
                    logger.in_scope(|| trace!("Bus closed"));
                    events = None;
                }
            },
            _ = cancellation.cancelled() => {
                logger.in_scope(|| debug!("Command cancelled"));
                errors.push(Error::Cancelled);
                force = true;
                break;
            }
        }
    }

    if let Some(mut ui) = ui {
        if let Err(err) = logger.in_scope(|| ui.teardown(force)) {
            errors.push(err);
        }
    }
    Error::from_list(errors)
}

async fn next_event(events: &mut Option<Subscription>) -> Option<Event> {
    match events {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

fn deliver(
    logger: &Logger,
    ui: &mut Option<Box<dyn Ui>>,
    events: &mut Option<Subscription>,
    event: &Event,
    errors: &mut Vec<Error>,
) {
    match ui {
        Some(ui) => match logger.in_scope(|| ui.handle(event)) {
            Ok(ControlFlow::Continue(())) => {}
            Ok(ControlFlow::Break(())) => *events = None,
            Err(err) => errors.push(err),
        },
        None => logger.in_scope(|| trace!(kind = event.kind(), "No UI for event")),
    }
    if event.is_exit() {
        *events = None;
    }
}
