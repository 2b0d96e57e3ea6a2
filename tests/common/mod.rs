#![allow(dead_code)]

use std::sync::Once;
use std::thread;

static INIT_LOGGING: Once = Once::new();

/// Installs a test-writer subscriber once per test binary.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .with_thread_names(true)
            .with_ansi(false)
            .try_init();
    });
}

pub fn thread_name() -> String {
    thread::current().name().unwrap_or("<unnamed>").to_owned()
}
