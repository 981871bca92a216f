//! Application error types.

use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;

/// Boxed error type accepted from user hooks, initializers and command bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during the application lifecycle.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded or validated.
    #[error("invalid application config: {0}")]
    InvalidConfig(#[source] ConfigError),

    /// Failed to construct the logger.
    #[error("failed to construct logger: {0}")]
    Logger(String),

    /// A UI sink failed to set up, handle an event, or tear down.
    #[error("ui error: {0}")]
    Ui(String),

    /// Failed to start or stop a profiling session.
    #[error("profiling error: {0}")]
    Profile(#[source] std::io::Error),

    /// Failed to create the runtime backing the event loop.
    #[error("failed to create event loop runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// Failed to spawn the thread running the command body.
    #[error("failed to spawn command thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The command body panicked.
    #[error("command panicked: {0}")]
    Panicked(String),

    /// The invocation was cancelled before the command body finished.
    #[error("context canceled")]
    Cancelled,

    /// Command-line arguments were rejected by the parser.
    #[error(transparent)]
    Usage(#[from] clap::Error),

    /// More than one failure was observed while running a command.
    #[error("{}", ErrorList(.0))]
    Multiple(Vec<Error>),

    /// Failure raised by caller-supplied code.
    #[error(transparent)]
    Other(BoxError),
}

impl Error {
    /// Wrap any error raised by caller-supplied code.
    pub fn other(err: impl Into<BoxError>) -> Self {
        Error::Other(err.into())
    }

    /// Create an error from a plain message.
    pub fn msg(message: impl fmt::Display) -> Self {
        Error::Other(message.to_string().into())
    }

    /// Collapse a list of errors: none is success, one is returned as-is.
    pub(crate) fn from_list(mut errors: Vec<Error>) -> Result<(), Error> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Error::Multiple(errors)),
        }
    }
}

struct ErrorList<'a>(&'a [Error]);

impl fmt::Display for ErrorList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} errors occurred: ", self.0.len())?;
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}
