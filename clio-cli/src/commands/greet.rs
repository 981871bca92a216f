//! `greet` subcommand: a config-backed command with a secret.
//!
//! Every option is a field of [`GreetConfig`], so it can be set in the
//! config file (`name: Ada`), the environment (`CLIO_DEMO_NAME=Ada`) or on
//! the command line (`--name Ada`).

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use clio::config::{self, Config, Flag, PostLoad};
use clio::{Application, Command, Error, RedactStore};

/// Options for the `greet` subcommand.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GreetConfig {
    pub name: String,
    pub greeting: String,
    /// Access token; masked in every log record once loaded.
    pub token: String,

    #[serde(skip)]
    secrets: Option<RedactStore>,
}

impl Default for GreetConfig {
    fn default() -> Self {
        Self {
            name: "world".to_string(),
            greeting: "Hello".to_string(),
            token: String::new(),
            secrets: None,
        }
    }
}

impl GreetConfig {
    /// Store that receives the token when the config is loaded.
    pub fn register_secrets(&mut self, store: RedactStore) {
        self.secrets = Some(store);
    }

    pub fn message(&self) -> String {
        format!("{}, {}!", self.greeting, self.name)
    }
}

impl PostLoad for GreetConfig {
    fn post_load(&mut self) -> Result<(), Error> {
        if self.greeting.trim().is_empty() {
            return Err(Error::msg("greeting must not be empty"));
        }
        if let Some(secrets) = &self.secrets {
            secrets.add([self.token.clone()]);
        }
        Ok(())
    }
}

impl Config for GreetConfig {
    fn flags(&self) -> Vec<Flag> {
        vec![
            Flag::value("name", "name").help("Who to greet"),
            Flag::value("greeting", "greeting").help("Greeting word"),
            Flag::value("token", "token").help("Access token (never logged)"),
        ]
    }

    fn as_post_load(&mut self) -> Option<&mut dyn PostLoad> {
        Some(self)
    }

    fn merge(&mut self, loaded: Self) {
        let secrets = self.secrets.take();
        *self = loaded;
        self.secrets = secrets;
    }
}

/// Build the `greet` subcommand bound to `app`.
pub fn command(app: &Arc<Application>, config: &Arc<RwLock<GreetConfig>>) -> Command {
    let body_config = Arc::clone(config);
    let mut cmd = Command::new("greet")
        .about("Print a greeting")
        .run(move |_| {
            let config = body_config.read();
            println!("{}", config.message());
            info!(
                name = %config.name,
                authenticated = !config.token.is_empty(),
                "Greeted"
            );
            Ok(())
        });
    app.setup_command(&mut cmd, vec![config::config_ref(config)]);
    cmd
}
