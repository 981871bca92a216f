//! Layered configuration loading.
//!
//! Values are resolved from lowest to highest precedence:
//!
//! ```text
//! struct defaults  <  YAML config file  <  environment  <  command-line flags
//! ```
//!
//! After a target is populated, its [`PostLoad`](super::PostLoad) hook runs
//! (if it exposes one) before the next target is loaded.

use std::path::{Path, PathBuf};
use std::{fs, io};

use clap::ArgMatches;
use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::{debug, trace};

use super::flag::FlagValue;
use super::target::Target;
use super::value;
use crate::app::Error;

/// Argument id of the `--config <path>` flag.
pub const CONFIG_FLAG: &str = "config";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested config file does not exist.
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Current values of a target could not be serialized.
    #[error("failed to read defaults of {target}: {source}")]
    Encode {
        target: &'static str,
        #[source]
        source: serde_yaml::Error,
    },

    /// Layered values do not fit the target's fields.
    #[error("failed to populate {target}: {source}")]
    Decode {
        target: &'static str,
        #[source]
        source: serde_yaml::Error,
    },

    /// A raw string from the environment or a flag has the wrong type.
    #[error("invalid value {value:?} for '{key}' (from {source_name})")]
    InvalidValue {
        key: String,
        source_name: String,
        value: String,
    },

    /// A target's post-load hook rejected the loaded values.
    #[error("{0}")]
    PostLoad(Box<Error>),
}

/// Where configuration is looked up.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Application name used for default file names.
    pub app_name: String,
    /// Config file to use instead of searching.
    pub file: Option<PathBuf>,
    /// Candidate config files, first existing one wins.
    pub search_paths: Vec<PathBuf>,
    /// Prefix for environment variables (`<PREFIX>_LOG_LEVEL`).
    pub env_prefix: String,
}

impl LoaderConfig {
    /// Loader settings derived from the application name.
    pub fn new(app_name: impl Into<String>) -> Self {
        let app_name = app_name.into();
        Self {
            search_paths: default_search_paths(&app_name),
            env_prefix: app_name.to_uppercase().replace('-', "_"),
            file: None,
            app_name,
        }
    }

    /// Always read the given config file.
    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_search_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.search_paths = paths;
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Find the config file for this invocation.
    ///
    /// The `--config` flag wins over [`LoaderConfig::file`], which wins over
    /// `<PREFIX>_CONFIG`. A file named by any of these must exist. Otherwise
    /// the first existing search path is used, if any.
    fn locate(&self, matches: &ArgMatches) -> Result<Option<PathBuf>, ConfigError> {
        let explicit = matches
            .try_get_one::<PathBuf>(CONFIG_FLAG)
            .ok()
            .flatten()
            .cloned()
            .or_else(|| self.file.clone())
            .or_else(|| {
                std::env::var_os(format!("{}_CONFIG", self.env_prefix))
                    .filter(|path| !path.is_empty())
                    .map(PathBuf::from)
            });

        match explicit {
            Some(path) if path.is_file() => Ok(Some(path)),
            Some(path) => Err(ConfigError::NotFound(path)),
            None => Ok(self.search_paths.iter().find(|p| p.is_file()).cloned()),
        }
    }
}

/// `./.<name>.yaml`, `./.<name>/config.yaml`, `~/.<name>.yaml` and
/// `<config dir>/<name>/config.yaml`.
fn default_search_paths(app_name: &str) -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from(format!(".{app_name}.yaml")),
        PathBuf::from(format!(".{app_name}")).join("config.yaml"),
    ];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(format!(".{app_name}.yaml")));
    }
    if let Some(config) = dirs::config_dir() {
        paths.push(config.join(app_name).join("config.yaml"));
    }
    paths
}

fn read_file(path: &Path) -> Result<Value, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed: Value = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    match parsed {
        Value::Null => Ok(Value::Mapping(Mapping::new())),
        Value::Mapping(_) => Ok(parsed),
        _ => Err(ConfigError::Parse {
            path: path.to_path_buf(),
            source: <serde_yaml::Error as serde::de::Error>::custom(
                "top level of a config file must be a mapping",
            ),
        }),
    }
}

/// Populates configuration targets for one invocation.
///
/// The config file is located and parsed once, when the loader is created.
pub struct ConfigLoader<'a> {
    config: &'a LoaderConfig,
    matches: &'a ArgMatches,
    file: Option<Value>,
}

impl<'a> ConfigLoader<'a> {
    /// Create a loader for the given invocation arguments.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named config file is missing, or if
    /// the config file cannot be read or parsed.
    pub fn new(config: &'a LoaderConfig, matches: &'a ArgMatches) -> Result<Self, ConfigError> {
        let file = match config.locate(matches)? {
            Some(path) => {
                debug!(path = %path.display(), "Reading config file");
                Some(read_file(&path)?)
            }
            None => None,
        };
        Ok(Self {
            config,
            matches,
            file,
        })
    }

    /// Populate one target, then run its post-load hook.
    pub fn load(&self, target: &mut dyn Target) -> Result<(), ConfigError> {
        let name = target.type_name();
        let mut values = target
            .to_value()
            .map_err(|source| ConfigError::Encode {
                target: name,
                source,
            })?;

        if let Some(file) = &self.file {
            value::merge(&mut values, file);
        }
        self.apply_env(&mut values)?;
        self.apply_flags(target, &mut values)?;

        trace!(target_type = name, "Populating config");
        target
            .set_value(values)
            .map_err(|source| ConfigError::Decode {
                target: name,
                source,
            })?;

        if let Some(hook) = target.post_loader() {
            hook.post_load()
                .map_err(|err| ConfigError::PostLoad(Box::new(err)))?;
        }
        Ok(())
    }

    fn apply_env(&self, values: &mut Value) -> Result<(), ConfigError> {
        for (path, current) in value::leaves(values) {
            let key = value::env_key(&self.config.env_prefix, &path);
            let Ok(raw) = std::env::var(&key) else {
                continue;
            };
            let coerced =
                value::coerce(Some(&current), &raw).ok_or_else(|| ConfigError::InvalidValue {
                    key: path.join("."),
                    source_name: key.clone(),
                    value: raw.clone(),
                })?;
            value::set_path(values, &path, coerced);
        }
        Ok(())
    }

    fn apply_flags(&self, target: &dyn Target, values: &mut Value) -> Result<(), ConfigError> {
        for flag in target.flags() {
            let Some(given) = flag.value_from(self.matches) else {
                continue;
            };
            let path = flag.path();
            let new = match given {
                FlagValue::Bool(on) => Value::Bool(on),
                FlagValue::Count(n) => Value::Number(n.into()),
                FlagValue::Text(raw) => {
                    value::coerce(value::get_path(values, &path), &raw).ok_or_else(|| {
                        ConfigError::InvalidValue {
                            key: flag.key().to_string(),
                            source_name: "command line".to_string(),
                            value: raw.clone(),
                        }
                    })?
                }
            };
            value::set_path(values, &path, new);
        }
        Ok(())
    }
}

/// Load every target in order.
///
/// Each target is fully populated and post-loaded before the next one is
/// touched; the first failure stops the sequence.
pub fn load(
    config: &LoaderConfig,
    matches: &ArgMatches,
    targets: &mut [&mut dyn Target],
) -> Result<(), ConfigError> {
    let loader = ConfigLoader::new(config, matches)?;
    for target in targets.iter_mut() {
        loader.load(&mut **target)?;
    }
    Ok(())
}
