use std::sync::Mutex;

use slog::Drain;
use slog::Fuse;
use slog_async::Async;
use slog_json::Json;

pub use slog::{debug, error, info, o, trace, warn, Discard, Logger};

/// Builds the root logger: JSON lines on stderr behind an async drain,
/// tagged with build metadata.
pub fn initialize_logger() -> Logger {
    let drain = Mutex::new(Json::default(std::io::stderr())).map(Fuse);
    let drain = Async::new(drain).build().fuse();

    Logger::root(
        drain,
        o!(
            "service" => info::SERVICE,
            "version" => info::VERSION,
            "revision" => info::REVISION,
            "build_timestamp" => info::BUILD_TIMESTAMP
        ),
    )
}

/// Routes `log`-style records from dependencies through a global slog
/// logger filtered by `RUST_LOG`. The guard must be kept alive.
#[cfg(feature = "env_logging")]
pub fn initialize_env_logging() -> Result<slog_scope::GlobalLoggerGuard, String> {
    slog_envlogger::init().map_err(|e| e.to_string())
}

/// A logger that swallows everything, for tools and tests that do not
/// care about output.
pub fn discard() -> Logger {
    Logger::root(Discard, o!())
}
