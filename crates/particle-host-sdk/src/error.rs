//! Error types for particles, handles and storage proxies

use thiserror::Error;

/// Errors raised by particle lifecycle and data callbacks
#[derive(Error, Debug)]
pub enum ParticleError {
    #[error("particle callback failed: {0}")]
    Callback(String),

    #[error("handle error: {0}")]
    Handle(#[from] HandleError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("required service missing: {0}")]
    ServiceMissing(&'static str),

    #[error("internal particle error: {0}")]
    Internal(String),
}

/// Errors raised when creating or using a handle
#[derive(Error, Debug)]
pub enum HandleError {
    #[error("handle {0:?} is not readable")]
    NotReadable(String),

    #[error("handle {0:?} is not writable")]
    NotWritable(String),

    #[error("proxy error on handle {name:?}: {source}")]
    Proxy {
        name: String,
        #[source]
        source: ProxyError,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid handle configuration: {0}")]
    InvalidConfig(String),
}

/// Errors raised by storage proxy operations
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("storage proxy {0:?} is no longer running")]
    Closed(String),

    #[error("no response from storage proxy {0:?}")]
    NoResponse(String),

    #[error("registration rejected by storage proxy {proxy:?}: {reason}")]
    RegistrationRejected { proxy: String, reason: String },

    #[error("storage proxy operation failed: {0}")]
    OperationFailed(String),
}
