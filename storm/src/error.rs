use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that end the process at startup or end a single trial before it dispatches anything.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Invalid trial parameters: {0}")]
    InvalidParameters(String),
    #[error("Cannot load the native root certificates: {0}")]
    CannotLoadRootCertificates(String),
    #[error("Cannot read certificate file: {0}, {1}")]
    CannotReadCertificate(PathBuf, #[source] std::io::Error),
    #[error("Invalid certificate in file: {0}, {1}")]
    InvalidCertificate(PathBuf, String),
    #[error("Cannot open key log file: {0}, {1}")]
    CannotOpenKeyLog(PathBuf, #[source] std::io::Error),
    #[error("Invalid transport configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Cannot create transport: {0}")]
    CannotCreateTransport(String),
    #[error("Cannot initialize logging: {0}")]
    CannotInitLogging(String),
}

/// Failure reason recorded for one address. Never propagated past the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("cannot resolve {0}")]
    Resolve(String),
    #[error("cannot create endpoint: {0}")]
    Endpoint(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("request failed: {0}")]
    Request(String),
    #[error("reading response body failed: {0}")]
    Read(String),
    #[error("transport configuration failed: {0}")]
    Configuration(String),
    #[error("request task panicked: {0}")]
    Panicked(String),
    #[error("no outcome was recorded")]
    Missing,
}

impl RequestError {
    pub fn as_code(&self) -> &'static str {
        match self {
            RequestError::InvalidAddress(_) => "invalid_address",
            RequestError::Resolve(_) => "resolve",
            RequestError::Endpoint(_) => "endpoint",
            RequestError::Connect(_) => "connect",
            RequestError::Timeout(_) => "timeout",
            RequestError::Request(_) => "request",
            RequestError::Read(_) => "read",
            RequestError::Configuration(_) => "configuration",
            RequestError::Panicked(_) => "panicked",
            RequestError::Missing => "missing",
        }
    }
}
