//! Interpreter configuration and diagnostics setup.

use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Install a `tracing` subscriber filtered by `RUST_LOG`.
///
/// Does nothing when `RUST_LOG` is unset; safe to call repeatedly.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(EnvFilter::from_default_env())
                .init();
        }
    });
}

/// Where the `print` builtin writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrintTarget {
    #[default]
    Stdout,
    /// Keep lines in memory; read them back with [`Console::captured`].
    Capture,
    Discard,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub print: PrintTarget,
}

impl Config {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn capture() -> Self {
        Self {
            print: PrintTarget::Capture,
        }
    }
}

/// Output sink shared by every table cloned from the same root.
#[derive(Debug)]
pub struct Console {
    target: PrintTarget,
    captured: Mutex<Vec<String>>,
}

impl Console {
    pub fn new(target: PrintTarget) -> Self {
        Self {
            target,
            captured: Mutex::new(Vec::new()),
        }
    }

    pub fn write(&self, line: &str) {
        match self.target {
            PrintTarget::Stdout => println!("{line}"),
            PrintTarget::Capture => self.captured.lock().push(line.to_string()),
            PrintTarget::Discard => {}
        }
    }

    pub fn captured(&self) -> Vec<String> {
        self.captured.lock().clone()
    }
}
