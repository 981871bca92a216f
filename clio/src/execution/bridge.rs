//! Runs a blocking command body on its own thread and reports the result
//! over a one-shot channel.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use tokio::sync::mpsc;
use tracing::debug;

use crate::app::Error;
use crate::command::{Hook, Invocation};
use crate::log::Logger;

/// Receiving end of a spawned command body.
///
/// Yields at most one error; the channel closes exactly once, after the body
/// has returned (or panicked).
#[derive(Debug)]
pub struct Outcome {
    receiver: mpsc::Receiver<Error>,
}

impl Outcome {
    /// The body's error, or `None` once the channel is closed.
    pub async fn recv(&mut self) -> Option<Error> {
        self.receiver.recv().await
    }

    /// Block until the body finishes. For callers outside an async runtime.
    pub fn wait(mut self) -> Result<(), Error> {
        match self.receiver.blocking_recv() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Run `body` on a new thread with `logger` as its default dispatch.
///
/// A panic in the body is reported as [`Error::Panicked`]; a failure to
/// spawn the thread is reported as [`Error::Spawn`] through the same
/// channel.
pub fn spawn(invocation: Invocation, body: Hook, logger: Logger) -> Outcome {
    let (sender, receiver) = mpsc::channel(1);
    let body_sender = sender.clone();
    let name = format!("clio-{}", invocation.name());

    let spawned = thread::Builder::new().name(name).spawn(move || {
        let result =
            logger.in_scope(|| panic::catch_unwind(AssertUnwindSafe(|| body(&invocation))));
        let failure = match result {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(payload) => Some(Error::Panicked(panic_message(payload.as_ref()))),
        };
        if let Some(err) = failure {
            // the receiver is gone when the event loop was cancelled
            if body_sender.blocking_send(err).is_err() {
                logger.in_scope(|| debug!("Command finished after the event loop stopped"));
            }
        }
    });

    if let Err(err) = spawned {
        let _ = sender.try_send(Error::Spawn(err));
    }
    Outcome { receiver }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    fn invocation() -> Invocation {
        let matches = clap::Command::new("tool").get_matches_from(["tool"]);
        Invocation::new(vec!["tool".to_string()], matches, CancellationToken::new())
    }

    fn body(f: impl Fn(&Invocation) -> Result<(), Error> + Send + Sync + 'static) -> Hook {
        Arc::new(f)
    }

    #[test]
    fn test_success_closes_without_error() {
        let outcome = spawn(invocation(), body(|_| Ok(())), Logger::disabled());
        assert!(outcome.wait().is_ok());
    }

    #[test]
    fn test_error_is_delivered() {
        let outcome = spawn(
            invocation(),
            body(|_| Err(Error::msg("boom"))),
            Logger::disabled(),
        );
        assert_eq!(outcome.wait().unwrap_err().to_string(), "boom");
    }

    #[test]
    fn test_panic_becomes_error() {
        let outcome = spawn(
            invocation(),
            body(|_| panic!("body exploded")),
            Logger::disabled(),
        );

        match outcome.wait() {
            Err(Error::Panicked(message)) => assert_eq!(message, "body exploded"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_channel_closes_once_after_error() {
        let mut outcome = spawn(
            invocation(),
            body(|_| Err(Error::msg("boom"))),
            Logger::disabled(),
        );

        assert!(outcome.recv().await.is_some());
        assert!(outcome.recv().await.is_none());
        assert!(outcome.recv().await.is_none());
    }

    #[test]
    fn test_body_runs_on_named_thread() {
        let outcome = spawn(
            invocation(),
            body(|_| {
                assert_eq!(thread::current().name(), Some("clio-tool"));
                Ok(())
            }),
            Logger::disabled(),
        );
        assert!(outcome.wait().is_ok());
    }
}
