//! Configuration binding and loading.
//!
//! Configuration objects are plain serde structs implementing [`Config`].
//! They are shared as [`ConfigRef`] handles between the command that binds
//! their flags, the loader that fills them in, and the command body that
//! reads them.
//!
//! # Example
//!
//! ```ignore
//! use clio::config::{self, Config, Flag};
//!
//! #[derive(Default, Serialize, Deserialize)]
//! #[serde(default)]
//! struct GreetOptions {
//!     name: String,
//! }
//!
//! impl Config for GreetOptions {
//!     fn flags(&self) -> Vec<Flag> {
//!         vec![Flag::value("name", "name").help("who to greet")]
//!     }
//! }
//!
//! let options = config::shared(GreetOptions::default());
//! app.setup_command(&mut cmd, vec![config::config_ref(&options)]);
//! ```

mod flag;
mod loader;
mod target;
mod value;

pub use flag::{Flag, FlagKind};
pub use loader::{load, ConfigError, ConfigLoader, LoaderConfig, CONFIG_FLAG};
pub use target::{config_ref, shared, Config, ConfigRef, PostLoad, Target};

pub(crate) use flag::apply as apply_flags;

use crate::command::Command;

/// Add the flags of every config to a command.
///
/// Flags whose id the command already defines are skipped.
pub fn add_flags(cmd: &mut Command, cfgs: &[ConfigRef]) {
    let flags: Vec<Flag> = cfgs.iter().flat_map(|cfg| cfg.read().flags()).collect();
    cmd.map_definition(|definition| apply_flags(definition, flags));
}
