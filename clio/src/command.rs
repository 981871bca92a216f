//! Command tree with setup and run hooks.
//!
//! [`Command`] pairs a `clap::Command` definition with two optional hooks.
//! Executing the tree parses arguments, resolves the leaf subcommand and runs
//! its `pre_run` hook followed by its `run` hook:
//!
//! ```text
//! args ──► clap parse ──► leaf command ──► pre_run(&Invocation) ──► run(&Invocation)
//! ```
//!
//! A leaf without a `run` hook prints its help instead.

use std::ffi::OsString;
use std::fmt;
use std::sync::Arc;

use clap::error::ErrorKind;
use clap::{Arg, ArgMatches};
use tokio_util::sync::CancellationToken;

use crate::app::Error;

/// Callback run for a command invocation.
pub type Hook = Arc<dyn Fn(&Invocation) -> Result<(), Error> + Send + Sync>;

/// One execution of a command: the resolved path, its parsed arguments and
/// the token that cancels it.
#[derive(Debug, Clone)]
pub struct Invocation {
    path: Vec<String>,
    matches: ArgMatches,
    cancellation: CancellationToken,
}

impl Invocation {
    pub fn new(path: Vec<String>, matches: ArgMatches, cancellation: CancellationToken) -> Self {
        Self {
            path,
            matches,
            cancellation,
        }
    }

    /// Command names from the root to the executed command.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Name of the executed command.
    pub fn name(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or_default()
    }

    /// Arguments parsed for the executed command (global args included).
    pub fn matches(&self) -> &ArgMatches {
        &self.matches
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// A command in the tree.
pub struct Command {
    definition: clap::Command,
    pre_run: Option<Hook>,
    run: Option<Hook>,
    subcommands: Vec<Command>,
    version: Option<String>,
    version_template: Option<String>,
    /// Do not print usage when a hook fails.
    pub silence_usage: bool,
    /// Do not print hook or parse errors; the caller reports them.
    pub silence_errors: bool,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name())
            .field("pre_run", &self.pre_run.is_some())
            .field("run", &self.run.is_some())
            .field("subcommands", &self.subcommands)
            .finish_non_exhaustive()
    }
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_definition(clap::Command::new(name.into()))
    }

    /// Wrap an existing clap definition.
    ///
    /// Subcommands of `definition` itself have no hooks; register hooked
    /// subcommands with [`Command::subcommand`].
    pub fn from_definition(definition: clap::Command) -> Self {
        Self {
            definition,
            pre_run: None,
            run: None,
            subcommands: Vec::new(),
            version: None,
            version_template: None,
            silence_usage: false,
            silence_errors: false,
        }
    }

    pub fn about(self, about: impl Into<String>) -> Self {
        self.with_definition(|d| d.about(about.into()))
    }

    pub fn arg(self, arg: Arg) -> Self {
        self.with_definition(|d| d.arg(arg))
    }

    pub fn subcommand(mut self, subcommand: Command) -> Self {
        self.subcommands.push(subcommand);
        self
    }

    pub fn pre_run<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Invocation) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.pre_run = Some(Arc::new(hook));
        self
    }

    pub fn run<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Invocation) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.run = Some(Arc::new(hook));
        self
    }

    fn with_definition(mut self, f: impl FnOnce(clap::Command) -> clap::Command) -> Self {
        self.map_definition(f);
        self
    }

    /// Transform the clap definition in place.
    pub fn map_definition(&mut self, f: impl FnOnce(clap::Command) -> clap::Command) {
        let definition = std::mem::take(&mut self.definition);
        self.definition = f(definition);
    }

    pub fn definition(&self) -> &clap::Command {
        &self.definition
    }

    pub fn name(&self) -> &str {
        self.definition.get_name()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.map_definition(|d| d.name(name));
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = Some(version.into());
    }

    /// Template printed for `--version`; `{version}` is replaced.
    pub fn set_version_template(&mut self, template: impl Into<String>) {
        self.version_template = Some(template.into());
    }

    pub fn pre_run_hook(&self) -> Option<&Hook> {
        self.pre_run.as_ref()
    }

    pub fn run_hook(&self) -> Option<&Hook> {
        self.run.as_ref()
    }

    pub fn set_pre_run(&mut self, hook: Option<Hook>) {
        self.pre_run = hook;
    }

    pub fn set_run(&mut self, hook: Option<Hook>) {
        self.run = hook;
    }

    pub fn take_pre_run(&mut self) -> Option<Hook> {
        self.pre_run.take()
    }

    pub fn take_run(&mut self) -> Option<Hook> {
        self.run.take()
    }

    pub fn subcommands(&self) -> impl Iterator<Item = &Command> {
        self.subcommands.iter()
    }

    pub fn subcommands_mut(&mut self) -> impl Iterator<Item = &mut Command> {
        self.subcommands.iter_mut()
    }

    pub fn find_subcommand_mut(&mut self, name: &str) -> Option<&mut Command> {
        self.subcommands.iter_mut().find(|c| c.name() == name)
    }

    /// Complete clap definition of this command and its subcommands.
    pub fn build(&self) -> clap::Command {
        let mut definition = self.definition.clone();
        if let Some(version) = &self.version {
            definition = definition.version(version.clone());
        }
        definition.subcommands(self.subcommands.iter().map(Command::build))
    }

    /// Execute with the process arguments.
    pub fn execute(&self) -> Result<(), Error> {
        self.execute_from(std::env::args_os(), CancellationToken::new())
    }

    /// Execute with the given arguments; the first one is the binary name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] for rejected arguments, otherwise the first
    /// error returned by the leaf command's hooks.
    pub fn execute_from<I, T>(&self, args: I, cancellation: CancellationToken) -> Result<(), Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let mut definition = self.build();
        let matches = match definition.try_get_matches_from_mut(args) {
            Ok(matches) => matches,
            Err(err) => return self.parse_failed(err),
        };

        let mut command = self;
        let mut leaf_matches = &matches;
        let mut path = vec![self.name().to_string()];
        while let Some((name, sub_matches)) = leaf_matches.subcommand() {
            let Some(child) = command.subcommands.iter().find(|c| c.name() == name) else {
                break;
            };
            command = child;
            leaf_matches = sub_matches;
            path.push(name.to_string());
        }

        let Some(run) = &command.run else {
            return print_help(&mut definition, &path[1..]);
        };

        let invocation = Invocation::new(path, leaf_matches.clone(), cancellation);
        let result = match &command.pre_run {
            Some(pre_run) => pre_run(&invocation).and_then(|()| run(&invocation)),
            None => run(&invocation),
        };

        if let Err(err) = &result {
            if !command.silence_errors {
                eprintln!("Error: {err}");
            }
            if !command.silence_usage {
                if let Some(leaf) = find_definition(&mut definition, &invocation.path()[1..]) {
                    eprintln!("{}", leaf.render_usage());
                }
            }
        }
        result
    }

    fn parse_failed(&self, err: clap::Error) -> Result<(), Error> {
        match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(Error::other)
            }
            ErrorKind::DisplayVersion => match (&self.version_template, &self.version) {
                (Some(template), Some(version)) => {
                    print!("{}", template.replace("{version}", version));
                    Ok(())
                }
                _ => err.print().map_err(Error::other),
            },
            _ => {
                if !self.silence_errors {
                    let _ = err.print();
                }
                Err(Error::Usage(err))
            }
        }
    }
}

fn find_definition<'a>(
    definition: &'a mut clap::Command,
    path: &[String],
) -> Option<&'a mut clap::Command> {
    match path.split_first() {
        None => Some(definition),
        Some((first, rest)) => find_definition(definition.find_subcommand_mut(first)?, rest),
    }
}

fn print_help(definition: &mut clap::Command, path: &[String]) -> Result<(), Error> {
    match find_definition(definition, path) {
        Some(leaf) => leaf.print_help().map_err(Error::other),
        None => Ok(()),
    }
}
