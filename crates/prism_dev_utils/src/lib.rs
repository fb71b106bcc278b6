//! Prism Dev Utils
//!
//! Test doubles shared by the workspace's tests and benches:
//!
//! - [`MockBackend`]: deterministic, instrumented [`CodegenBackend`](prism_compiler::CodegenBackend)
//! - [`RecordingSink`]: keeps every diagnostic message
//! - [`fixtures`]: ready-made [`ShaderInfo`](prism_core::ShaderInfo) records
//! - [`init_logger`]: `env_logger` set up for tests

pub mod fixtures;
pub mod mock_backend;

use parking_lot::Mutex;

use prism_compiler::DiagnosticSink;

pub use mock_backend::{MockBackend, MockTarget};

/// Initialise `env_logger` once; safe to call from every test.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Diagnostic sink that stores messages for inspection.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<(log::Level, String)>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn messages(&self) -> Vec<(log::Level, String)> {
        self.messages.lock().clone()
    }

    /// Whether a message at `level` contains `needle`.
    #[must_use]
    pub fn contains(&self, level: log::Level, needle: &str) -> bool {
        self.messages
            .lock()
            .iter()
            .any(|(l, text)| *l == level && text.contains(needle))
    }
}

impl DiagnosticSink for RecordingSink {
    fn message(&self, level: log::Level, text: &str) {
        log::log!(target: "prism::test", level, "{text}");
        self.messages.lock().push((level, text.to_owned()));
    }
}
