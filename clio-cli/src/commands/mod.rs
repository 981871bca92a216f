//! Demo subcommands.

pub mod count;
pub mod greet;
