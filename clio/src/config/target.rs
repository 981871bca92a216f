//! Configuration targets and the optional post-load capability.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_yaml::Value;

use super::Flag;
use crate::app::Error;

/// Hook invoked immediately after a target's fields are populated.
///
/// Targets expose it through [`Config::as_post_load`]; the loader checks for
/// the capability on every target it loads.
pub trait PostLoad {
    fn post_load(&mut self) -> Result<(), Error>;
}

/// A serde-backed configuration struct.
///
/// Every field is addressed by its serialized key path. Current values act
/// as defaults; the loader layers the config file, environment and flags on
/// top of them.
///
/// ```ignore
/// #[derive(Default, Serialize, Deserialize)]
/// #[serde(default)]
/// struct Options {
///     name: String,
/// }
///
/// impl Config for Options {
///     fn flags(&self) -> Vec<Flag> {
///         vec![Flag::value("name", "name").help("who to greet")]
///     }
/// }
/// ```
pub trait Config: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Flags bound to fields of this config.
    fn flags(&self) -> Vec<Flag> {
        Vec::new()
    }

    /// Text used when the configuration is logged, instead of YAML.
    fn describe(&self) -> Option<String> {
        None
    }

    /// Post-load capability, if this config implements [`PostLoad`].
    fn as_post_load(&mut self) -> Option<&mut dyn PostLoad> {
        None
    }

    /// Accept freshly loaded values.
    ///
    /// Override to keep fields that are skipped during (de)serialization.
    fn merge(&mut self, loaded: Self) {
        *self = loaded;
    }
}

/// Object-safe view of a configuration target used by the loader.
pub trait Target {
    /// Current values in serialized form.
    fn to_value(&self) -> Result<Value, serde_yaml::Error>;

    /// Replace values from serialized form.
    fn set_value(&mut self, value: Value) -> Result<(), serde_yaml::Error>;

    fn flags(&self) -> Vec<Flag>;

    /// Human-readable rendering for the configuration log.
    fn render(&self) -> String;

    fn post_loader(&mut self) -> Option<&mut dyn PostLoad>;

    fn type_name(&self) -> &'static str;
}

impl<T: Config> Target for T {
    fn to_value(&self) -> Result<Value, serde_yaml::Error> {
        serde_yaml::to_value(self)
    }

    fn set_value(&mut self, value: Value) -> Result<(), serde_yaml::Error> {
        let loaded: T = serde_yaml::from_value(value)?;
        Config::merge(self, loaded);
        Ok(())
    }

    fn flags(&self) -> Vec<Flag> {
        Config::flags(self)
    }

    fn render(&self) -> String {
        match self.describe() {
            Some(text) => text,
            // yaml reads better than json for humans
            None => serde_yaml::to_string(self).unwrap_or_else(|err| err.to_string()),
        }
    }

    fn post_loader(&mut self) -> Option<&mut dyn PostLoad> {
        self.as_post_load()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// A configuration object shared between the command binding, the loader
/// and the command body.
pub type ConfigRef = Arc<RwLock<dyn Target + Send + Sync>>;

/// Wrap a config so it can be registered with a command and read back later.
pub fn shared<T: Config>(value: T) -> Arc<RwLock<T>> {
    Arc::new(RwLock::new(value))
}

/// Type-erased handle to a shared config.
pub fn config_ref<T: Config>(config: &Arc<RwLock<T>>) -> ConfigRef {
    config.clone()
}
