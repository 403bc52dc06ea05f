//! Process-wide tracing setup shared by binaries and tests.

/// Initialize process-wide tracing with defaults (`info`, JSON output).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use tracing::{LogSettings, init_with};
