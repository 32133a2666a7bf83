//! Logging utilities and structured logging support
//!
//! The library only talks to the `log` facade. Binaries call [`init`] once to
//! route records through `env_logger` (filter with `RUST_LOG`).

pub use log::{debug, info, warn, error, trace};

/// Initialize the logging system
///
/// Defaults to `info` when `RUST_LOG` is not set. Calling it twice is
/// harmless; the second initialization is ignored.
pub fn init() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
