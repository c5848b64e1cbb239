//! Process startup: logging and signal handling

mod logging;
mod shutdown;

pub use logging::{LOG_FILE_NAME, LogRotation, LoggingConfig, LoggingGuard, init_logging};
pub use shutdown::stop_on_shutdown_signal;
