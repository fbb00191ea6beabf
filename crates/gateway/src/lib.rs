pub mod compute;
pub mod config;
pub mod gateway;
pub mod ledger;
pub mod lifecycle;
pub mod metrics;
pub mod protocol;
pub mod server;
pub mod stdio;
pub mod tools;

use thiserror::Error;

use crate::protocol::ErrorCode;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid params: {0}")]
    InvalidParams(String),
    #[error("Operation {operation} failed: {message}")]
    OperationFailed { operation: String, message: String },
    #[error("Provider error ({status}): {message}")]
    Provider { status: u16, message: String },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
    #[error("Internal error: {0}")]
    Internal(String),
    /// Failure after the provider accepted a mutation; keeps the operation id.
    #[error("{source}")]
    AfterSubmit {
        operation: String,
        source: Box<Error>,
    },
}

impl Error {
    /// JSON-RPC error code reported to callers for this error.
    pub fn rpc_code(&self) -> ErrorCode {
        match self {
            Error::UnknownTool(_) => ErrorCode::MethodNotFound,
            Error::InvalidParams(_) => ErrorCode::InvalidParams,
            Error::AfterSubmit { source, .. } => source.rpc_code(),
            _ => ErrorCode::ServerError,
        }
    }

    /// Operation id attached to the error, if the mutation was already submitted.
    pub fn operation(&self) -> Option<&str> {
        match self {
            Error::OperationFailed { operation, .. } | Error::AfterSubmit { operation, .. } => {
                Some(operation)
            }
            _ => None,
        }
    }

    /// Ties an error raised while tracking `operation` to that operation.
    pub fn after_submit(self, operation: &str) -> Self {
        if self.operation().is_some() {
            return self;
        }
        Error::AfterSubmit {
            operation: operation.to_string(),
            source: Box::new(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
