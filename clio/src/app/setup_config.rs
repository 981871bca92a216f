//! Application setup configuration.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{value_parser, Arg};

use super::application::Application;
use super::error::Error;
use super::state::{AppConfig, State};
use crate::bus::Bus;
use crate::command::Command;
use crate::config::{self, Flag, LoaderConfig, CONFIG_FLAG};
use crate::log::{Logger, LoggingConfig, RedactStore};
use crate::profile::{DefaultProfiler, DevelopmentConfig, Profiler};
use crate::ui::Ui;

/// Callback run after resources are constructed, in registration order.
pub type Initializer = Box<dyn Fn(&mut State) -> Result<(), Error> + Send + Sync>;

/// Callback run when the root command is set up.
pub type PostConstruct = Box<dyn Fn(&Application, &mut Command) + Send + Sync>;

pub type LoggerConstructor =
    Box<dyn Fn(&AppConfig, &RedactStore) -> Result<Logger, Error> + Send + Sync>;

pub type BusConstructor = Box<dyn Fn(&AppConfig) -> Bus + Send + Sync>;

pub type UiConstructor = Box<dyn Fn(&AppConfig) -> Result<Vec<Box<dyn Ui>>, Error> + Send + Sync>;

/// Name and version of the application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identification {
    pub name: String,
    pub version: String,
}

impl Identification {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// Everything the application needs to set itself up.
///
/// # Example
///
/// ```ignore
/// let setup = SetupConfig::new(Identification::new("tool", env!("CARGO_PKG_VERSION")))
///     .with_global_config_flag()
///     .with_global_logging_flags()
///     .with_initializer(|state| {
///         state.redact_store.add(["secret"]);
///         Ok(())
///     });
/// let app = Application::new(setup);
/// ```
pub struct SetupConfig {
    pub id: Identification,

    /// Logging defaults; `None` disables the `log` section entirely.
    pub default_logging: Option<LoggingConfig>,

    /// Development defaults; `None` disables the `dev` section (and profiling).
    pub default_development: Option<DevelopmentConfig>,

    pub loader: LoaderConfig,

    pub(crate) initializers: Vec<Initializer>,
    pub(crate) post_constructs: Vec<PostConstruct>,
    pub(crate) logger_constructor: LoggerConstructor,
    pub(crate) bus_constructor: BusConstructor,
    pub(crate) ui_constructor: UiConstructor,
    pub(crate) profiler: Arc<dyn Profiler>,
}

impl fmt::Debug for SetupConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetupConfig")
            .field("id", &self.id)
            .field("default_logging", &self.default_logging)
            .field("default_development", &self.default_development)
            .field("loader", &self.loader)
            .field("initializers", &self.initializers.len())
            .field("post_constructs", &self.post_constructs.len())
            .finish_non_exhaustive()
    }
}

impl SetupConfig {
    pub fn new(id: Identification) -> Self {
        Self {
            loader: LoaderConfig::new(&id.name),
            profiler: Arc::new(DefaultProfiler::new(&id.name)),
            id,
            default_logging: Some(LoggingConfig::default()),
            default_development: None,
            initializers: Vec::new(),
            post_constructs: Vec::new(),
            logger_constructor: Box::new(default_logger),
            bus_constructor: Box::new(|_| Bus::new()),
            ui_constructor: Box::new(|_| Ok(Vec::new())),
        }
    }

    pub fn with_default_logging(mut self, logging: Option<LoggingConfig>) -> Self {
        self.default_logging = logging;
        self
    }

    pub fn with_default_development(mut self, development: Option<DevelopmentConfig>) -> Self {
        self.default_development = development;
        self
    }

    pub fn with_loader(mut self, loader: LoaderConfig) -> Self {
        self.loader = loader;
        self
    }

    /// Append an initializer. Initializers run after the logger, bus and
    /// UIs exist, and before the configuration is logged.
    ///
    /// The application state is locked while initializers run; they must
    /// use the `&mut State` they are given rather than [`Application::state`].
    pub fn with_initializer<F>(mut self, initializer: F) -> Self
    where
        F: Fn(&mut State) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.initializers.push(Box::new(initializer));
        self
    }

    /// Append a hook run by [`Application::setup_root_command`].
    pub fn with_post_construct<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Application, &mut Command) + Send + Sync + 'static,
    {
        self.post_constructs.push(Box::new(hook));
        self
    }

    pub fn with_logger_constructor<F>(mut self, constructor: F) -> Self
    where
        F: Fn(&AppConfig, &RedactStore) -> Result<Logger, Error> + Send + Sync + 'static,
    {
        self.logger_constructor = Box::new(constructor);
        self
    }

    pub fn with_bus_constructor<F>(mut self, constructor: F) -> Self
    where
        F: Fn(&AppConfig) -> Bus + Send + Sync + 'static,
    {
        self.bus_constructor = Box::new(constructor);
        self
    }

    /// Candidate UIs, in order of preference.
    pub fn with_ui_constructor<F>(mut self, constructor: F) -> Self
    where
        F: Fn(&AppConfig) -> Result<Vec<Box<dyn Ui>>, Error> + Send + Sync + 'static,
    {
        self.ui_constructor = Box::new(constructor);
        self
    }

    pub fn with_profiler(mut self, profiler: impl Profiler + 'static) -> Self {
        self.profiler = Arc::new(profiler);
        self
    }

    /// Add a global `-c/--config <PATH>` flag to the root command.
    pub fn with_global_config_flag(self) -> Self {
        self.with_post_construct(|_, cmd| {
            cmd.map_definition(|definition| {
                if definition
                    .get_arguments()
                    .any(|arg| arg.get_id() == CONFIG_FLAG)
                {
                    return definition;
                }
                definition.arg(
                    Arg::new(CONFIG_FLAG)
                        .short('c')
                        .long("config")
                        .value_name("PATH")
                        .value_parser(value_parser!(PathBuf))
                        .global(true)
                        .help("Application config file"),
                )
            })
        })
    }

    /// Add global `-q/--quiet` and `-v` flags to the root command, plus a
    /// hidden `--profile` flag when development config is enabled.
    pub fn with_global_logging_flags(self) -> Self {
        self.with_post_construct(|app, cmd| {
            let mut flags = LoggingConfig::flags();
            if app.setup_config().default_development.is_some() {
                flags.extend(DevelopmentConfig::flags());
            }
            cmd.map_definition(|definition| {
                config::apply_flags(definition, flags.into_iter().map(Flag::global))
            });
        })
    }
}

fn default_logger(config: &AppConfig, redact_store: &RedactStore) -> Result<Logger, Error> {
    match &config.log {
        Some(logging) => Logger::new(logging, redact_store),
        None => Ok(Logger::disabled()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let setup = SetupConfig::new(Identification::new("my-tool", "1.0.0"));

        assert_eq!(setup.default_logging, Some(LoggingConfig::default()));
        assert!(setup.default_development.is_none());
        assert_eq!(setup.loader.env_prefix, "MY_TOOL");
        assert!(setup.initializers.is_empty());
    }

    #[test]
    fn test_builders_append_in_order() {
        let setup = SetupConfig::new(Identification::new("tool", ""))
            .with_initializer(|_| Ok(()))
            .with_initializer(|_| Err(Error::msg("second")))
            .with_global_config_flag()
            .with_global_logging_flags();

        assert_eq!(setup.initializers.len(), 2);
        assert_eq!(setup.post_constructs.len(), 2);
    }

    #[test]
    fn test_default_logger_disabled_without_log_section() {
        let config = AppConfig::default();
        assert!(default_logger(&config, &RedactStore::new()).is_ok());
    }
}
