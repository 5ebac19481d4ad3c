use std::time::Duration;

pub(crate) const DEFAULT_THREAD_COUNT: u8 = 4;

pub(crate) const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Base of the whoami string attached to logs and exported traces.
pub(crate) const SERVICE_NAME: &str = "vigilante";
