//! Application state populated during setup.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bus::{Bus, Subscription};
use crate::config::{Config, ConfigRef, Flag};
use crate::log::{Logger, LoggingConfig, RedactStore};
use crate::profile::DevelopmentConfig;
use crate::ui::Ui;

/// Core application configuration (`log:` and `dev:` sections).
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<LoggingConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev: Option<DevelopmentConfig>,

    /// Every config registered by a bound command.
    #[serde(skip)]
    pub from_commands: Vec<ConfigRef>,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("log", &self.log)
            .field("dev", &self.dev)
            .field("from_commands", &self.from_commands.len())
            .finish()
    }
}

impl Config for AppConfig {
    fn flags(&self) -> Vec<Flag> {
        let mut flags = Vec::new();
        if self.log.is_some() {
            flags.extend(LoggingConfig::flags());
        }
        if self.dev.is_some() {
            flags.extend(DevelopmentConfig::flags());
        }
        flags
    }

    fn merge(&mut self, loaded: Self) {
        self.log = loaded.log;
        self.dev = loaded.dev;
    }
}

/// Resources shared by the application, its initializers and command bodies.
///
/// `logger`, `bus` and `redact_store` always hold a usable value: until setup
/// constructs them the logger discards everything and the bus has no
/// subscribers.
pub struct State {
    pub config: AppConfig,
    pub logger: Logger,
    pub redact_store: RedactStore,
    pub bus: Bus,
    /// Event loop subscription; taken when the command body starts.
    pub subscription: Option<Subscription>,
    /// Candidate UIs; taken when the command body starts.
    pub uis: Vec<Box<dyn Ui>>,
}

impl State {
    pub(crate) fn new(config: AppConfig) -> Self {
        Self {
            config,
            logger: Logger::disabled(),
            redact_store: RedactStore::new(),
            bus: Bus::new(),
            subscription: None,
            uis: Vec::new(),
        }
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("config", &self.config)
            .field("logger", &self.logger)
            .field("bus", &self.bus)
            .field("subscribed", &self.subscription.is_some())
            .field("uis", &self.uis.len())
            .finish_non_exhaustive()
    }
}
