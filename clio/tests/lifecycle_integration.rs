//! Integration tests for the application lifecycle.
//!
//! These tests drive complete command invocations through
//! `Command::execute_from` and verify:
//! - configuration layering and post-load hooks
//! - the version and configuration log records, including redaction
//! - body errors, panics and cancellation reaching the caller
//! - profiling sessions being released exactly once
//! - events flowing from the command body to the UI
//!
//! Run with: `cargo test --test lifecycle_integration`

use std::io::{self, Write};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::fmt::MakeWriter;

use clio::config::{self, Config, Flag, LoaderConfig, PostLoad};
use clio::log::Level;
use clio::{
    Application, Bus, Command, DevelopmentConfig, Error, Event, Identification, Logger, LoggingConfig,
    ProfileMode, ProfileSession, Profiler, SetupConfig, Ui,
};

// ============================================================================
// Helpers
// ============================================================================

/// In-memory log sink.
#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Capture {
    type Writer = Capture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn debug_logging() -> LoggingConfig {
    LoggingConfig {
        level: Level::Debug,
        ..Default::default()
    }
}

/// Setup isolated from the real environment and filesystem, logging into
/// `capture`.
fn capture_setup(version: &str, env_prefix: &str, capture: &Capture) -> SetupConfig {
    let capture = capture.clone();
    SetupConfig::new(Identification::new("tool", version))
        .with_default_logging(Some(debug_logging()))
        .with_loader(
            LoaderConfig::new("tool")
                .with_search_paths(Vec::new())
                .with_env_prefix(env_prefix),
        )
        .with_logger_constructor(move |cfg, store| {
            let logging = cfg.log.clone().unwrap_or_else(debug_logging);
            Ok(Logger::with_writer(&logging, store, capture.clone(), false))
        })
}

fn execute(cmd: &Command, args: &[&str]) -> Result<(), Error> {
    cmd.execute_from(args.iter().copied(), CancellationToken::new())
}

/// Command config that normalizes its value after loading.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct Greeting {
    name: String,
    token: String,
}

impl PostLoad for Greeting {
    fn post_load(&mut self) -> Result<(), Error> {
        self.name = self.name.to_uppercase();
        Ok(())
    }
}

impl Config for Greeting {
    fn flags(&self) -> Vec<Flag> {
        vec![
            Flag::value("name", "name"),
            Flag::value("token", "token"),
        ]
    }

    fn as_post_load(&mut self) -> Option<&mut dyn PostLoad> {
        Some(self)
    }
}

/// Second command config; normalizes and reports its host after loading.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct Endpoint {
    host: String,
}

impl PostLoad for Endpoint {
    fn post_load(&mut self) -> Result<(), Error> {
        self.host = self.host.to_lowercase();
        tracing::warn!(host = %self.host, "Endpoint normalized");
        Ok(())
    }
}

impl Config for Endpoint {
    fn flags(&self) -> Vec<Flag> {
        vec![Flag::value("host", "host")]
    }

    fn as_post_load(&mut self) -> Option<&mut dyn PostLoad> {
        Some(self)
    }
}

/// Profiler that counts session starts and stops.
#[derive(Clone, Default)]
struct CountingProfiler {
    modes: Arc<Mutex<Vec<ProfileMode>>>,
    stops: Arc<AtomicUsize>,
}

impl Profiler for CountingProfiler {
    fn start(&self, mode: ProfileMode, _logger: &Logger) -> Result<ProfileSession, Error> {
        self.modes.lock().push(mode);
        if mode == ProfileMode::None {
            return Ok(ProfileSession::noop());
        }
        let stops = self.stops.clone();
        Ok(ProfileSession::new(move || {
            stops.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

fn cpu_profiled(setup: SetupConfig, profiler: &CountingProfiler) -> SetupConfig {
    setup
        .with_default_development(Some(DevelopmentConfig {
            profile: ProfileMode::Cpu,
        }))
        .with_profiler(profiler.clone())
}

/// UI that records event kinds.
struct RecordingUi {
    seen: Arc<Mutex<Vec<String>>>,
}

impl Ui for RecordingUi {
    fn setup(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn handle(&mut self, event: &Event) -> Result<ControlFlow<()>, Error> {
        self.seen.lock().push(event.kind().to_string());
        Ok(ControlFlow::Continue(()))
    }

    fn teardown(&mut self, _force: bool) -> Result<(), Error> {
        Ok(())
    }
}

/// UI that stalls on the first event so the bus overruns.
struct SlowUi {
    seen: Arc<Mutex<Vec<String>>>,
}

impl Ui for SlowUi {
    fn setup(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn handle(&mut self, event: &Event) -> Result<ControlFlow<()>, Error> {
        let mut seen = self.seen.lock();
        if seen.is_empty() {
            std::thread::sleep(Duration::from_millis(200));
        }
        seen.push(event.kind().to_string());
        Ok(ControlFlow::Continue(()))
    }

    fn teardown(&mut self, _force: bool) -> Result<(), Error> {
        Ok(())
    }
}

// ============================================================================
// Setup and configuration logging
// ============================================================================

#[test]
fn test_config_logged_after_post_load() {
    let capture = Capture::default();
    let app = Application::new(capture_setup("1.0.0", "LIFECYCLE_T1", &capture));
    let greeting = config::shared(Greeting::default());

    let mut cmd = Command::new("tool").run(|_| Ok(()));
    app.setup_root_command(&mut cmd, vec![config::config_ref(&greeting)]);
    execute(&cmd, &["tool", "--name", "ada"]).unwrap();

    let out = capture.contents();
    assert!(out.contains("config:"));
    assert!(out.contains("name: ADA"), "dump should show post-load value:\n{out}");
    assert!(!out.contains("name: ada"));
    assert_eq!(greeting.read().name, "ADA");
}

/// Both registration orders produce one record holding every post-load value.
#[test]
fn test_config_logged_once_after_every_post_load() {
    for (order, prefix) in [(0, "LIFECYCLE_T17"), (1, "LIFECYCLE_T18")] {
        let capture = Capture::default();
        let app = Application::new(capture_setup("1.0.0", prefix, &capture));
        let greeting = config::shared(Greeting::default());
        let endpoint = config::shared(Endpoint::default());

        let mut cfgs = vec![config::config_ref(&greeting), config::config_ref(&endpoint)];
        if order == 1 {
            cfgs.reverse();
        }
        let mut cmd = Command::new("tool").run(|_| Ok(()));
        app.setup_root_command(&mut cmd, cfgs);
        execute(&cmd, &["tool", "--name", "ada", "--host", "Example.ORG"]).unwrap();

        let out = capture.contents();
        assert_eq!(out.matches("config:").count(), 1, "order {order}:\n{out}");
        let record = &out[out.find("config:").unwrap()..];
        assert!(record.contains("name: ADA"), "order {order}:\n{out}");
        assert!(record.contains("host: example.org"), "order {order}:\n{out}");
    }
}

/// Initializers and post-load hooks log through the application logger,
/// before the configuration record.
#[test]
fn test_setup_hooks_log_through_application_logger() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tool.yaml");
    std::fs::write(&path, "host: FILE.example\n").unwrap();

    let capture = Capture::default();
    let setup = capture_setup("1.0.0", "LIFECYCLE_T19", &capture)
        .with_global_config_flag()
        .with_initializer(|_| {
            tracing::warn!("Initializer ran");
            Ok(())
        });
    let app = Application::new(setup);
    let endpoint = config::shared(Endpoint::default());

    let mut cmd = Command::new("tool").run(|_| Ok(()));
    app.setup_root_command(&mut cmd, vec![config::config_ref(&endpoint)]);
    execute(&cmd, &["tool", "-c", path.to_str().unwrap()]).unwrap();

    let out = capture.contents();
    let config_at = out.find("config:").expect("configuration record");
    let initializer_at = out.find("Initializer ran").expect("initializer record");
    let post_load_at = out.find("Endpoint normalized").expect("post-load record");
    assert!(initializer_at < config_at);
    assert!(post_load_at < config_at);
    assert!(out.contains("host=file.example"));
}

/// A subscriber that falls behind the bus logs a warning.
#[test]
fn test_bus_lag_is_logged() {
    let capture = Capture::default();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let ui_seen = seen.clone();
    let setup = capture_setup("1.0.0", "LIFECYCLE_T20", &capture)
        .with_bus_constructor(|_| Bus::with_capacity(1))
        .with_ui_constructor(move |_| {
            Ok(vec![Box::new(SlowUi {
                seen: ui_seen.clone(),
            }) as Box<dyn Ui>])
        });
    let app = Application::new(setup);

    let body_app = app.clone();
    let mut cmd = Command::new("tool").run(move |_| {
        let bus = body_app.state().bus.clone();
        bus.publish(Event::new("first"));
        std::thread::sleep(Duration::from_millis(20));
        for _ in 0..50 {
            bus.publish(Event::new("tick"));
        }
        Ok(())
    });
    app.setup_root_command(&mut cmd, Vec::new());
    execute(&cmd, &["tool"]).unwrap();

    let out = capture.contents();
    assert!(out.contains("Event subscriber lagged"), "{out}");
    assert!(seen.lock().len() < 51);
}

#[test]
fn test_configuration_record_has_no_ansi_without_ansi_writer() {
    let capture = Capture::default();
    let app = Application::new(capture_setup("1.0.0", "LIFECYCLE_T21", &capture));
    let greeting = config::shared(Greeting::default());

    let mut cmd = Command::new("tool").run(|_| Ok(()));
    app.setup_root_command(&mut cmd, vec![config::config_ref(&greeting)]);
    execute(&cmd, &["tool"]).unwrap();

    let out = capture.contents();
    assert!(out.contains("config:"));
    assert!(!out.contains('\u{1b}'));
}

#[test]
fn test_config_dump_is_redacted() {
    let capture = Capture::default();
    let setup = capture_setup("1.0.0", "LIFECYCLE_T2", &capture).with_initializer(|state| {
        state.redact_store.add(["s3cret-token"]);
        Ok(())
    });
    let app = Application::new(setup);
    let greeting = config::shared(Greeting::default());

    let mut cmd = Command::new("tool").run(|_| Ok(()));
    app.setup_root_command(&mut cmd, vec![config::config_ref(&greeting)]);
    execute(&cmd, &["tool", "--token", "s3cret-token"]).unwrap();

    let out = capture.contents();
    assert!(out.contains("token: *******"), "token should be masked:\n{out}");
    assert!(!out.contains("s3cret-token"));
    assert_eq!(greeting.read().token, "s3cret-token");
}

#[test]
fn test_empty_configuration_placeholder() {
    let capture = Capture::default();
    let setup = capture_setup("1.0.0", "LIFECYCLE_T3", &capture).with_default_logging(None);
    let app = Application::new(setup);

    let mut cmd = Command::new("tool").run(|_| Ok(()));
    app.setup_root_command(&mut cmd, Vec::new());
    execute(&cmd, &["tool"]).unwrap();

    assert!(capture.contents().contains("config: (none)"));
}

#[test]
fn test_version_line_with_version() {
    let capture = Capture::default();
    let app = Application::new(capture_setup("1.2.3", "LIFECYCLE_T4", &capture));

    let mut cmd = Command::new("tool").run(|_| Ok(()));
    app.setup_root_command(&mut cmd, Vec::new());
    execute(&cmd, &["tool"]).unwrap();

    assert!(capture.contents().contains("tool version: 1.2.3"));
}

#[test]
fn test_version_line_without_version() {
    let capture = Capture::default();
    let app = Application::new(capture_setup("", "LIFECYCLE_T5", &capture));

    let mut cmd = Command::new("tool").run(|_| Ok(()));
    app.setup_root_command(&mut cmd, Vec::new());
    execute(&cmd, &["tool"]).unwrap();

    let out = capture.contents();
    let version_record = out
        .lines()
        .find(|line| line.contains("INFO"))
        .expect("version record");
    assert!(version_record.trim_end().ends_with("tool"));
    assert!(!out.contains("version:"));
}

#[test]
fn test_config_file_and_environment_layering() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tool.yaml");
    std::fs::write(&path, "log:\n  level: error\nname: from-file\ntoken: file-token\n").unwrap();
    std::env::set_var("LIFECYCLE_T6_TOKEN", "env-token");

    let capture = Capture::default();
    let setup = capture_setup("1.0.0", "LIFECYCLE_T6", &capture).with_global_config_flag();
    let app = Application::new(setup);
    let greeting = config::shared(Greeting::default());

    let mut cmd = Command::new("tool").run(|_| Ok(()));
    app.setup_root_command(&mut cmd, vec![config::config_ref(&greeting)]);
    execute(&cmd, &["tool", "-c", path.to_str().unwrap()]).unwrap();

    assert_eq!(greeting.read().name, "FROM-FILE");
    assert_eq!(greeting.read().token, "env-token");
    assert_eq!(
        app.state().config.log.as_ref().map(|log| log.level),
        Some(Level::Error)
    );
    // error level hides the version and configuration records
    assert!(capture.contents().is_empty());
}

#[test]
fn test_global_logging_flags_reach_subcommands() {
    let capture = Capture::default();
    let setup = capture_setup("1.0.0", "LIFECYCLE_T7", &capture)
        .with_default_logging(Some(LoggingConfig::default()))
        .with_global_logging_flags();
    let app = Application::new(setup);

    let mut sub = Command::new("serve").run(|_| Ok(()));
    app.setup_command(&mut sub, Vec::new());
    let mut root = Command::new("tool").subcommand(sub);
    app.setup_root_command(&mut root, Vec::new());

    execute(&root, &["tool", "serve", "-vv"]).unwrap();

    assert_eq!(
        app.state().config.log.as_ref().map(|log| log.verbosity),
        Some(2)
    );
    assert!(capture.contents().contains("config:"));
}

#[test]
fn test_missing_config_file_is_invalid_config() {
    let capture = Capture::default();
    let setup = capture_setup("1.0.0", "LIFECYCLE_T8", &capture).with_global_config_flag();
    let app = Application::new(setup);

    let mut cmd = Command::new("tool").run(|_| Ok(()));
    app.setup_root_command(&mut cmd, Vec::new());
    let err = execute(&cmd, &["tool", "--config", "/nonexistent/tool.yaml"]).unwrap_err();

    assert!(matches!(err, Error::InvalidConfig(_)));
    assert!(err.to_string().starts_with("invalid application config: "));
}

// ============================================================================
// Execution
// ============================================================================

#[test]
fn test_body_error_reaches_caller() {
    let capture = Capture::default();
    let app = Application::new(capture_setup("1.0.0", "LIFECYCLE_T9", &capture));

    let mut cmd = Command::new("tool").run(|_| Err(Error::msg("body failed")));
    app.setup_root_command(&mut cmd, Vec::new());

    let err = execute(&cmd, &["tool"]).unwrap_err();
    assert_eq!(err.to_string(), "body failed");
}

#[test]
fn test_body_logs_through_application_logger() {
    let capture = Capture::default();
    let app = Application::new(capture_setup("1.0.0", "LIFECYCLE_T10", &capture));

    let mut cmd = Command::new("tool").run(|_| {
        tracing::warn!("from the body");
        Ok(())
    });
    app.setup_root_command(&mut cmd, Vec::new());
    execute(&cmd, &["tool"]).unwrap();

    assert!(capture.contents().contains("from the body"));
}

#[test]
fn test_events_reach_ui() {
    let capture = Capture::default();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let ui_seen = seen.clone();
    let setup = capture_setup("1.0.0", "LIFECYCLE_T11", &capture).with_ui_constructor(move |_| {
        Ok(vec![Box::new(RecordingUi {
            seen: ui_seen.clone(),
        }) as Box<dyn Ui>])
    });
    let app = Application::new(setup);

    let body_app = app.clone();
    let mut cmd = Command::new("tool").run(move |_| {
        let bus = body_app.state().bus.clone();
        bus.publish(Event::new("task.started"));
        bus.publish(Event::new("task.finished"));
        Ok(())
    });
    app.setup_root_command(&mut cmd, Vec::new());
    execute(&cmd, &["tool"]).unwrap();

    assert_eq!(*seen.lock(), vec!["task.started", "task.finished"]);
}

#[test]
fn test_cancellation_ends_invocation() {
    let capture = Capture::default();
    let app = Application::new(capture_setup("1.0.0", "LIFECYCLE_T12", &capture));

    let mut cmd = Command::new("tool").run(|invocation| {
        // runs until cancelled, then finishes on its own
        while !invocation.is_cancelled() {
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(())
    });
    app.setup_root_command(&mut cmd, Vec::new());

    let token = CancellationToken::new();
    let canceller = token.clone();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        canceller.cancel();
    });

    let err = cmd.execute_from(["tool"], token).unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(err.to_string(), "context canceled");
}

// ============================================================================
// Profiling
// ============================================================================

#[test]
fn test_cpu_profile_stopped_once_on_success() {
    let capture = Capture::default();
    let profiler = CountingProfiler::default();
    let app = Application::new(cpu_profiled(
        capture_setup("1.0.0", "LIFECYCLE_T13", &capture),
        &profiler,
    ));

    let mut cmd = Command::new("tool").run(|_| Ok(()));
    app.setup_root_command(&mut cmd, Vec::new());
    execute(&cmd, &["tool"]).unwrap();

    assert_eq!(*profiler.modes.lock(), vec![ProfileMode::Cpu]);
    assert_eq!(profiler.stops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_cpu_profile_stopped_once_on_failure() {
    let capture = Capture::default();
    let profiler = CountingProfiler::default();
    let app = Application::new(cpu_profiled(
        capture_setup("1.0.0", "LIFECYCLE_T14", &capture),
        &profiler,
    ));

    let mut cmd = Command::new("tool").run(|_| Err(Error::msg("body failed")));
    app.setup_root_command(&mut cmd, Vec::new());

    assert!(execute(&cmd, &["tool"]).is_err());
    assert_eq!(profiler.stops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_cpu_profile_stopped_once_on_panic() {
    let capture = Capture::default();
    let profiler = CountingProfiler::default();
    let app = Application::new(cpu_profiled(
        capture_setup("1.0.0", "LIFECYCLE_T15", &capture),
        &profiler,
    ));

    let mut cmd = Command::new("tool").run(|_| panic!("body panicked"));
    app.setup_root_command(&mut cmd, Vec::new());

    let err = execute(&cmd, &["tool"]).unwrap_err();
    assert!(matches!(err, Error::Panicked(_)));
    assert_eq!(profiler.stops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_profile_mode_from_flag() {
    let capture = Capture::default();
    let profiler = CountingProfiler::default();
    let setup = capture_setup("1.0.0", "LIFECYCLE_T16", &capture)
        .with_default_development(Some(DevelopmentConfig::default()))
        .with_global_logging_flags()
        .with_profiler(profiler.clone());
    let app = Application::new(setup);

    let mut cmd = Command::new("tool").run(|_| Ok(()));
    app.setup_root_command(&mut cmd, Vec::new());
    execute(&cmd, &["tool", "--profile", "mem"]).unwrap();

    assert_eq!(*profiler.modes.lock(), vec![ProfileMode::Mem]);
    assert_eq!(profiler.stops.load(Ordering::SeqCst), 1);
}
