use thiserror::Error;

/// Error returned by [`Handler::handle`](crate::handler::Handler::handle)
/// when a record cannot be written.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("failed to write log record: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode log record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Error returned when parsing configuration values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid log level: {0:?}")]
    InvalidLevel(String),

    #[error("invalid log format: {0:?} (expected \"json\" or \"text\")")]
    InvalidFormat(String),

    #[error("invalid boolean for {key}: {value:?}")]
    InvalidBool { key: &'static str, value: String },
}

/// Error returned when installing global logging state.
#[derive(Error, Debug)]
pub enum InitError {
    #[error("a global tracing subscriber is already installed")]
    SubscriberAlreadySet(#[from] tracing_subscriber::util::TryInitError),
}
