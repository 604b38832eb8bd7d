pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const REVISION: Option<&str> = option_env!("RECORDER_REVISION");

pub const BUILD_TIMESTAMP: Option<&str> = option_env!("RECORDER_BUILD_TIMESTAMP");

/// Name reported by the health check.
pub const SERVICE: &str = "recorder-backend";
