//! `count` subcommand: a long-running command reporting progress.
//!
//! Plain clap arguments, no config binding. Progress is published on the
//! application bus and rendered by whichever UI the event loop selected.

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, FromArgMatches};
use tracing::{debug, info};

use clio::{Application, Command, Error, Event, Invocation};

use crate::ui::{Progress, PROGRESS_DONE, PROGRESS_UPDATE};

/// Arguments for the `count` subcommand.
#[derive(Debug, Args)]
pub struct CountArgs {
    /// Number to count up to
    #[arg(long, default_value_t = 10)]
    pub to: u64,

    /// Pause between steps in milliseconds
    #[arg(long = "delay-ms", default_value_t = 100)]
    pub delay_ms: u64,
}

/// Build the `count` subcommand bound to `app`.
pub fn command(app: &Arc<Application>) -> Command {
    let definition =
        CountArgs::augment_args(clap::Command::new("count").about("Count up, reporting progress"));

    let body_app = Arc::clone(app);
    let mut cmd = Command::from_definition(definition)
        .run(move |invocation| run(&body_app, invocation));
    app.setup_command(&mut cmd, Vec::new());
    cmd
}

fn run(app: &Application, invocation: &Invocation) -> Result<(), Error> {
    let args = CountArgs::from_arg_matches(invocation.matches())?;
    let bus = app.state().bus.clone();
    let delay = Duration::from_millis(args.delay_ms);

    bus.publish(Event::new(PROGRESS_UPDATE).with_value(Progress::new(0, args.to)));
    for current in 1..=args.to {
        if invocation.is_cancelled() {
            debug!(current, "Counting cancelled");
            return Ok(());
        }
        std::thread::sleep(delay);
        bus.publish(Event::new(PROGRESS_UPDATE).with_value(Progress::new(current, args.to)));
    }
    bus.publish(Event::new(PROGRESS_DONE));

    info!(total = args.to, "Counting finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let matches = command_definition().get_matches_from(["count"]);
        let args = CountArgs::from_arg_matches(&matches).unwrap();

        assert_eq!(args.to, 10);
        assert_eq!(args.delay_ms, 100);
    }

    #[test]
    fn test_explicit_args() {
        let matches =
            command_definition().get_matches_from(["count", "--to", "3", "--delay-ms", "0"]);
        let args = CountArgs::from_arg_matches(&matches).unwrap();

        assert_eq!(args.to, 3);
        assert_eq!(args.delay_ms, 0);
    }

    fn command_definition() -> clap::Command {
        CountArgs::augment_args(clap::Command::new("count"))
    }
}
