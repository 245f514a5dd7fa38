use thiserror::Error;

/// The status class of a backend error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    NotFound,
    Conflict,
    Unauthorized,
    Transient,
    Fatal,
}

/// An error returned by a backend gateway.
#[derive(Error, Debug)]
pub enum Error {
    #[error("the path `{0}` does not exist")]
    NotFound(String),
    #[error("the path `{0}` already exists")]
    AlreadyExists(String),
    #[error("the directory `{0}` is not empty")]
    DirectoryNotEmpty(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
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
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns the status class of the error.
    pub fn status(&self) -> Status {
        match self {
            Self::NotFound(_) => Status::NotFound,
            Self::AlreadyExists(_) | Self::DirectoryNotEmpty(_) | Self::PreconditionFailed(_) => {
                Status::Conflict
            }
            Self::Unauthorized(_) => Status::Unauthorized,
            Self::Transient(_) => Status::Transient,
            Self::Io(err) => match err.kind() {
                std::io::ErrorKind::Interrupted
                | std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::WouldBlock => Status::Transient,
                _ => Status::Fatal,
            },
            Self::InvalidOption(_) | Self::RangeNotSatisfiable { .. } | Self::Fatal(_) => {
                Status::Fatal
            }
        }
    }
}

/// A result type that can be used to indicate errors.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use std::io::ErrorKind;

    use super::*;

    fn io(kind: ErrorKind) -> Error {
        std::io::Error::new(kind, "i/o").into()
    }

    #[test]
    fn test_status() {
        let cases = [
            (Error::NotFound("c1/a".to_string()), Status::NotFound),
            (Error::AlreadyExists("c1/a".to_string()), Status::Conflict),
            (Error::DirectoryNotEmpty("c1/".to_string()), Status::Conflict),
            (Error::PreconditionFailed("c1/a".to_string()), Status::Conflict),
            (Error::Unauthorized("denied".to_string()), Status::Unauthorized),
            (Error::Transient(anyhow::anyhow!("busy")), Status::Transient),
            (Error::Fatal(anyhow::anyhow!("broken")), Status::Fatal),
            (Error::InvalidOption("max_results".to_string()), Status::Fatal),
            (
                Error::RangeNotSatisfiable {
                    path: "c1/a".to_string(),
                    length: 3,
                },
                Status::Fatal,
            ),
            (io(ErrorKind::Interrupted), Status::Transient),
            (io(ErrorKind::TimedOut), Status::Transient),
            (io(ErrorKind::WouldBlock), Status::Transient),
            (io(ErrorKind::PermissionDenied), Status::Fatal),
            (io(ErrorKind::NotFound), Status::Fatal),
        ];

        for (err, status) in cases {
            assert_eq!(err.status(), status, "{}", err);
        }
    }
}
