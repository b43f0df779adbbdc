//! Error types for the collection engine.
//!
//! Configuration mistakes (unknown formats, duplicate query names,
//! unregistered engine protocols) are surfaced while the graph is being
//! built, as [`ConfigError`]. Everything that can only fail at run time
//! lands in [`Error`].

use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors detected while wiring resources, storages and contexts,
/// before the supervisor ever runs.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("data format '{0}' is not registered in the codec registry")]
    UnknownFormat(String),

    #[error("data format '{0}' is already registered")]
    DuplicateFormat(String),

    #[error("query '{0}' already exists on this resource (pass replace=true to overwrite)")]
    DuplicateQuery(String),

    #[error("endpoint '{0}' is not defined on this resource")]
    UnknownEndpoint(String),

    #[error("storage engine protocol '{0}' is not registered")]
    UnknownEngineProto(String),

    #[error("buffer limit kind '{0}' is not recognized")]
    UnknownLimitType(String),

    #[error("pipeline step order {order} is out of range (1..={max})")]
    InvalidStepOrder { order: usize, max: usize },

    #[error("max_batch must be at least 1, got {0}")]
    InvalidMaxBatch(usize),

    #[error("schedule period is invalid: {0}")]
    InvalidPeriod(String),

    #[error("header '{0}' cannot be sent as given")]
    InvalidHeader(String),

    #[error("invalid base url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Run-time errors raised by collectors, pipelines and storages.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A response outside the 2xx range is fatal for the batch.
    #[error("request to {url} failed with status {status}: {body}")]
    HttpStatus {
        url: String,
        status: u16,
        body: String,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to decode '{format}' payload: {reason}")]
    Decode { format: String, reason: String },

    #[error("failed to encode '{format}' payload: {reason}")]
    Encode { format: String, reason: String },

    #[error("pipeline aborted: {0}")]
    Pipeline(String),

    #[error("pipeline batch timed out after {0} seconds")]
    PipelineTimeout(u64),

    #[error("storage engine error: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// Storage failure with context, used by engines and the flush path.
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }
}
