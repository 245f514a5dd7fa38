use thiserror::Error;

use crate::gateway;

/// An error type for the blob-store crate.
///
/// Callers only ever see these variants, never a backend-specific error
/// shape.
#[derive(Error, Debug)]
pub enum Error {
    #[error("the path `{0}` was not found")]
    NotFound(String),
    #[error("the path `{0}` already exists")]
    AlreadyExists(String),
    #[error("the directory `{0}` is not empty")]
    DirectoryNotEmpty(String),
    #[error("invalid option: {0}")]
    InvalidOption(String),
    #[error("the requested range is not satisfiable for `{path}` ({length} bytes)")]
    RangeNotSatisfiable { path: String, length: u64 },
    #[error("a precondition failed for `{0}`")]
    PreconditionFailed(String),
    #[error("transient error: {0}")]
    Transient(#[source] anyhow::Error),
    #[error("fatal error: {0}")]
    Fatal(#[source] anyhow::Error),
    #[error("configuration error: {0}")]
    Configuration(#[from] Box<figment::Error>),
    #[error("the configuration section `{section}` does not exist")]
    MissingConfigurationSection { section: String },
}

impl Error {
    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Whether the error means the target path is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<gateway::Error> for Error {
    fn from(err: gateway::Error) -> Self {
        match err {
            gateway::Error::NotFound(path) => Self::NotFound(path),
            gateway::Error::AlreadyExists(path) => Self::AlreadyExists(path),
            gateway::Error::DirectoryNotEmpty(path) => Self::DirectoryNotEmpty(path),
            gateway::Error::InvalidOption(msg) => Self::InvalidOption(msg),
            gateway::Error::RangeNotSatisfiable { path, length } => {
                Self::RangeNotSatisfiable { path, length }
            }
            gateway::Error::PreconditionFailed(path) => Self::PreconditionFailed(path),
            gateway::Error::Unauthorized(msg) => {
                Self::Fatal(anyhow::anyhow!("unauthorized: {}", msg))
            }
            gateway::Error::Transient(err) => Self::Transient(err),
            gateway::Error::Fatal(err) => Self::Fatal(err),
            err @ gateway::Error::Io(_) => {
                if err.status() == gateway::Status::Transient {
                    Self::Transient(err.into())
                } else {
                    Self::Fatal(err.into())
                }
            }
        }
    }
}

/// A result type that can be used to indicate errors.
pub type Result<T, E = Error> = std::result::Result<T, E>;
