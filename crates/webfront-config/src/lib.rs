//! Configuration, runtime paths, and logging bootstrap for WebFront.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    ChatConfig, Config, MailConfig, DEFAULT_CHAT_MODEL, DEFAULT_LOG_LEVEL,
    DEFAULT_RESOLVE_TIMEOUT_MS, DEFAULT_SUBSCRIPTION_POLL_INTERVAL_MS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_for_service, parse_level};
pub use paths::Paths;
