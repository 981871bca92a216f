//! Application lifecycle: setup, command binding and execution.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info};

use super::error::Error;
use super::setup_config::{Identification, SetupConfig};
use super::state::{AppConfig, State};
use crate::command::{Command, Hook, Invocation};
use crate::config::{self, ConfigLoader, ConfigRef, Target};
use crate::execution;

/// Orchestrates configuration loading, resource construction and command
/// execution.
///
/// Setup of every command invocation runs in a fixed order:
///
/// 1. Load the core config (`log`, `dev`)
/// 2. Construct resources from it (logger, bus, UIs), then run initializers
/// 3. Load each config bound to the command, running its post-load hook
/// 4. Log the version and the consolidated configuration
///
/// The command body then runs on its own thread while the invoking thread
/// drives the event loop.
///
/// # Example
///
/// ```ignore
/// let app = Application::new(SetupConfig::new(Identification::new("tool", "1.0.0")));
///
/// let options = config::shared(Options::default());
/// let mut root = Command::new("tool").run(move |_| {
///     println!("hello {}", options.read().name);
///     Ok(())
/// });
/// app.setup_root_command(&mut root, vec![config::config_ref(&options)]);
///
/// root.execute()?;
/// ```
pub struct Application {
    setup_config: SetupConfig,
    state: Mutex<State>,
}

impl Application {
    pub fn new(setup_config: SetupConfig) -> Arc<Self> {
        let config = AppConfig {
            log: setup_config.default_logging.clone(),
            dev: setup_config.default_development.clone(),
            from_commands: Vec::new(),
        };
        Arc::new(Self {
            state: Mutex::new(State::new(config)),
            setup_config,
        })
    }

    pub fn setup_config(&self) -> &SetupConfig {
        &self.setup_config
    }

    /// Lock the application state.
    ///
    /// Safe to call from command bodies and config post-load hooks, but not
    /// from initializers, which already hold the lock.
    pub fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock()
    }

    /// Hook that loads configuration and constructs resources.
    pub fn setup(self: &Arc<Self>, cfgs: Vec<ConfigRef>) -> Hook {
        let app = Arc::clone(self);
        Arc::new(move |invocation: &Invocation| app.load_all(invocation, &cfgs))
    }

    fn load_all(&self, invocation: &Invocation, cfgs: &[ConfigRef]) -> Result<(), Error> {
        let loader = ConfigLoader::new(&self.setup_config.loader, invocation.matches())
            .map_err(Error::InvalidConfig)?;

        let logger = {
            let mut state = self.state.lock();
            loader
                .load(&mut state.config)
                .map_err(Error::InvalidConfig)?;
            self.construct_resources(&mut state)?;
            state.logger.clone()
        };

        // post-load hooks log through the application logger
        logger.in_scope(|| {
            cfgs.iter().try_for_each(|cfg| {
                let mut target = cfg.write();
                loader.load(&mut *target).map_err(Error::InvalidConfig)
            })
        })?;

        self.log_setup(cfgs);
        Ok(())
    }

    /// Build logger, bus and UIs from the loaded core config, then run the
    /// initializers in order, stopping at the first failure.
    fn construct_resources(&self, state: &mut State) -> Result<(), Error> {
        let setup = &self.setup_config;

        state.logger = (setup.logger_constructor)(&state.config, &state.redact_store)?;

        let bus = (setup.bus_constructor)(&state.config);
        state.subscription = Some(bus.subscribe());
        state.bus = bus;

        state.uis = (setup.ui_constructor)(&state.config)?;

        let logger = state.logger.clone();
        logger.in_scope(|| {
            setup
                .initializers
                .iter()
                .try_for_each(|initializer| initializer(state))
        })
    }

    fn log_setup(&self, cfgs: &[ConfigRef]) {
        let (logger, mut rendered) = {
            let state = self.state.lock();
            (state.logger.clone(), vec![state.config.render()])
        };
        rendered.extend(cfgs.iter().map(|cfg| cfg.read().render()));

        logger.in_scope(|| {
            info!("{}", version_line(&self.setup_config.id));
            match format_configuration(&rendered, logger.ansi()) {
                Some(text) => debug!("config:\n{}", text),
                None => debug!("config: (none)"),
            }
        });
    }

    /// Hook that runs `body` on its own thread and drives the event loop
    /// until it finishes.
    ///
    /// The profiling session selected by `dev.profile` brackets the whole
    /// run and is stopped on every exit path.
    ///
    /// Must not be invoked from within a tokio runtime.
    pub fn run(self: &Arc<Self>, body: Hook) -> Hook {
        let app = Arc::clone(self);
        Arc::new(move |invocation: &Invocation| app.run_body(invocation, Arc::clone(&body)))
    }

    fn run_body(&self, invocation: &Invocation, body: Hook) -> Result<(), Error> {
        let (logger, subscription, uis, mode) = {
            let mut state = self.state.lock();
            let mode = state
                .config
                .dev
                .as_ref()
                .map(|dev| dev.profile)
                .unwrap_or_default();
            (
                state.logger.clone(),
                state.subscription.take(),
                std::mem::take(&mut state.uis),
                mode,
            )
        };

        let session = self.setup_config.profiler.start(mode, &logger)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(Error::Runtime)?;

        let outcome = execution::spawn(invocation.clone(), body, logger.clone());
        // bus receives log lag warnings outside of UI delivery
        let loop_logger = logger.nested("eventloop");
        let result = loop_logger.in_scope(|| {
            runtime.block_on(execution::eventloop(
                invocation.cancellation().clone(),
                loop_logger.clone(),
                subscription,
                outcome,
                uis,
            ))
        });

        session.stop();
        result
    }

    /// Bind setup and execution to a command.
    ///
    /// - an existing `pre_run` hook runs after setup, and not at all if
    ///   setup fails
    /// - an existing `run` hook becomes the body executed through the event
    ///   loop
    /// - the configs' flags are added to the command
    /// - usage and error printing are silenced; the caller reports errors
    pub fn setup_command(self: &Arc<Self>, cmd: &mut Command, cfgs: Vec<ConfigRef>) {
        self.add_flags(cmd, &cfgs);

        let setup = self.setup(cfgs);
        let original = cmd.take_pre_run();
        cmd.set_pre_run(Some(Arc::new(move |invocation: &Invocation| {
            setup(invocation)?;
            match &original {
                Some(pre_run) => pre_run(invocation),
                None => Ok(()),
            }
        })));

        if let Some(body) = cmd.take_run() {
            cmd.set_run(Some(self.run(body)));
        }

        cmd.silence_usage = true;
        cmd.silence_errors = true;
    }

    /// Bind the root command: name, version, default config sections and
    /// post-construct hooks, then the same binding as [`Self::setup_command`].
    pub fn setup_root_command(self: &Arc<Self>, cmd: &mut Command, cfgs: Vec<ConfigRef>) {
        let id = &self.setup_config.id;
        if !cmd.name().starts_with(id.name.as_str()) {
            cmd.set_name(id.name.clone());
        }
        if !id.version.is_empty() {
            cmd.set_version(id.version.clone());
            cmd.set_version_template(format!("{} {{version}}\n", id.name));
        }

        {
            let mut state = self.state.lock();
            state.config.log = self.setup_config.default_logging.clone();
            state.config.dev = self.setup_config.default_development.clone();
        }

        for post_construct in &self.setup_config.post_constructs {
            post_construct(self, cmd);
        }

        self.setup_command(cmd, cfgs);
    }

    /// Add config flags to a command without binding any hooks.
    ///
    /// The configs are recorded in [`AppConfig::from_commands`].
    pub fn add_flags(&self, cmd: &mut Command, cfgs: &[ConfigRef]) {
        self.state
            .lock()
            .config
            .from_commands
            .extend(cfgs.iter().cloned());
        config::add_flags(cmd, cfgs);
    }
}

/// Version log line: `"<name>"`, or `"<name> version: <version>"`.
pub(crate) fn version_line(id: &Identification) -> String {
    if id.version.is_empty() {
        id.name.clone()
    } else {
        format!("{} version: {}", id.name, id.version)
    }
}

/// Join rendered configs for the configuration log.
///
/// Empty renderings and `{}` are skipped; `None` when nothing is left.
/// Colored only when `ansi` is set.
pub(crate) fn format_configuration(rendered: &[String], ansi: bool) -> Option<String> {
    let parts: Vec<&str> = rendered
        .iter()
        .map(|text| text.trim())
        .filter(|text| !text.is_empty() && *text != "{}")
        .collect();
    if parts.is_empty() {
        return None;
    }

    let indented = parts
        .join("\n")
        .lines()
        .map(|line| format!("  {line}"))
        .collect::<Vec<_>>()
        .join("\n");
    Some(console::style(indented).magenta().force_styling(ansi).to_string())
}
