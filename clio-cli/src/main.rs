//! clio-demo - example command-line application built on clio.
//!
//! Shows the full lifecycle: layered configuration (`--config`, `CLIO_DEMO_*`
//! environment, flags), logging with secret redaction, and a progress UI fed
//! from the event bus.

mod commands;
mod ui;

use std::process::ExitCode;

use clio::config;
use clio::{Application, Command, DevelopmentConfig, Identification, SetupConfig};
use console::style;
use tokio_util::sync::CancellationToken;

use commands::greet::GreetConfig;

fn main() -> ExitCode {
    let greet_config = config::shared(GreetConfig::default());

    let secrets_target = greet_config.clone();
    let setup = SetupConfig::new(Identification::new("clio-demo", env!("CARGO_PKG_VERSION")))
        .with_default_development(Some(DevelopmentConfig::default()))
        .with_global_config_flag()
        .with_global_logging_flags()
        .with_initializer(move |state| {
            secrets_target
                .write()
                .register_secrets(state.redact_store.clone());
            Ok(())
        })
        .with_ui_constructor(ui::candidates);
    let app = Application::new(setup);

    let mut root = Command::new("clio-demo")
        .about("Demonstrates the clio application lifecycle")
        .subcommand(commands::greet::command(&app, &greet_config))
        .subcommand(commands::count::command(&app));
    app.setup_root_command(&mut root, Vec::new());

    // Set up signal handler for graceful shutdown
    let cancellation = CancellationToken::new();
    let on_signal = cancellation.clone();
    if let Err(e) = ctrlc::set_handler(move || on_signal.cancel()) {
        eprintln!("Warning: failed to set signal handler: {}", e);
    }

    match root.execute_from(std::env::args_os(), cancellation) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
