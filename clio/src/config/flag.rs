//! Command-line flags bound to configuration fields.

use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches};

/// How a flag's value is read back from parsed arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    /// Takes a value (`--level debug`).
    Value,
    /// Boolean switch (`--quiet`).
    Switch,
    /// Counted occurrences (`-vvv`).
    Count,
}

/// A command-line flag bound to a dotted configuration key.
///
/// The key (e.g. `log.level`) addresses a field in the target's serialized
/// form and doubles as the clap argument id.
#[derive(Debug, Clone)]
pub struct Flag {
    key: String,
    arg: Arg,
    kind: FlagKind,
}

/// Value read from the command line for a flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FlagValue {
    Text(String),
    Bool(bool),
    Count(u8),
}

impl Flag {
    /// A flag that takes a value.
    pub fn value(key: impl Into<String>, long: impl Into<String>) -> Self {
        let key = key.into();
        let arg = Arg::new(key.clone())
            .long(long.into())
            .action(ArgAction::Set)
            .value_name("VALUE");
        Self {
            key,
            arg,
            kind: FlagKind::Value,
        }
    }

    /// A boolean switch.
    pub fn switch(key: impl Into<String>, long: impl Into<String>) -> Self {
        let key = key.into();
        let arg = Arg::new(key.clone())
            .long(long.into())
            .action(ArgAction::SetTrue);
        Self {
            key,
            arg,
            kind: FlagKind::Switch,
        }
    }

    /// A short flag counted by occurrence.
    pub fn count(key: impl Into<String>, short: char) -> Self {
        let key = key.into();
        let arg = Arg::new(key.clone()).short(short).action(ArgAction::Count);
        Self {
            key,
            arg,
            kind: FlagKind::Count,
        }
    }

    /// Set the short name.
    pub fn short(mut self, short: char) -> Self {
        self.arg = self.arg.short(short);
        self
    }

    /// Set the help text.
    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.arg = self.arg.help(help.into());
        self
    }

    /// Make the flag available to every subcommand.
    pub fn global(mut self) -> Self {
        self.arg = self.arg.global(true);
        self
    }

    /// Hide the flag from help output.
    pub fn hidden(mut self) -> Self {
        self.arg = self.arg.hide(true);
        self
    }

    /// Dotted configuration key this flag writes to.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Key split into path segments.
    pub(crate) fn path(&self) -> Vec<String> {
        self.key.split('.').map(str::to_string).collect()
    }

    pub fn kind(&self) -> FlagKind {
        self.kind
    }

    pub(crate) fn arg(&self) -> &Arg {
        &self.arg
    }

    /// Read the flag from parsed arguments.
    ///
    /// Returns `None` unless the flag was given on the command line; clap
    /// defaults for switches and counters never override loaded values.
    pub(crate) fn value_from(&self, matches: &ArgMatches) -> Option<FlagValue> {
        if !matches!(matches.try_contains_id(&self.key), Ok(true)) {
            return None;
        }
        if matches.value_source(&self.key) != Some(ValueSource::CommandLine) {
            return None;
        }
        match self.kind {
            FlagKind::Value => matches
                .try_get_one::<String>(&self.key)
                .ok()
                .flatten()
                .cloned()
                .map(FlagValue::Text),
            FlagKind::Switch => Some(FlagValue::Bool(matches.get_flag(&self.key))),
            FlagKind::Count => Some(FlagValue::Count(matches.get_count(&self.key))),
        }
    }
}

/// Add flags to a clap command, skipping ids it already defines.
pub(crate) fn apply(mut cmd: clap::Command, flags: impl IntoIterator<Item = Flag>) -> clap::Command {
    for flag in flags {
        let exists = cmd
            .get_arguments()
            .any(|arg| arg.get_id().as_str() == flag.key());
        if !exists {
            cmd = cmd.arg(flag.arg);
        }
    }
    cmd
}
