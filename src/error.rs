use crate::transport::Endpoint;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    General(String),
    Other(String),
    Io(std::io::Error),
    Serde(serde_json::Error),
    InvalidProtocol(String),
    Connect {
        endpoint: Endpoint,
        source: std::io::Error,
    },
    Bind {
        endpoint: Endpoint,
        source: std::io::Error,
    },
    Timeout {
        endpoint: Endpoint,
    },
    /// The peer closed the connection before replying.
    Disconnected {
        endpoint: Endpoint,
    },
    LockPoisoned,
    TaskFailed(String),
}

impl core::fmt::Display for Error {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        match self {
            Error::Connect { endpoint, source } => {
                write!(fmt, "failed to connect to {endpoint}: {source}")
            }
            Error::Bind { endpoint, source } => write!(fmt, "failed to bind {endpoint}: {source}"),
            Error::Timeout { endpoint } => write!(fmt, "timed out waiting for reply from {endpoint}"),
            Error::Disconnected { endpoint } => {
                write!(fmt, "{endpoint} closed the connection before replying")
            }
            other => write!(fmt, "{other:?}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::LockPoisoned
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::TaskFailed(value.to_string())
    }
}
