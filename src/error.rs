use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::io;

/// General purpose error type that can be sent across the wire.
///
/// Every fallible operation in this crate - local or remote - returns this type, so that a
/// failure raised inside a skeleton's implementation can be marshalled back to a stub and
/// re-raised there without any loss of information.
#[derive(Clone, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
#[display(fmt = "{}: {}", kind, description)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct Error {
    /// Label describing the kind of error
    pub kind: ErrorKind,

    /// Human-readable description of the error
    pub description: String,
}

impl std::error::Error for Error {}

impl Error {
    pub fn new(kind: ErrorKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }

    pub fn invalid_argument(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, description)
    }

    pub fn not_found(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, description)
    }

    pub fn illegal_state(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::IllegalState, description)
    }

    pub fn rmi(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::Rmi, description)
    }

    pub fn unknown_host(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownHost, description)
    }

    pub fn is_kind(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

impl From<io::Error> for Error {
    fn from(x: io::Error) -> Self {
        Self {
            kind: ErrorKind::from(x.kind()),
            description: format!("{}", x),
        }
    }
}

impl From<serde_cbor::Error> for Error {
    fn from(x: serde_cbor::Error) -> Self {
        Self {
            kind: ErrorKind::Rmi,
            description: format!("serialization failure: {}", x),
        }
    }
}

impl From<walkdir::Error> for Error {
    fn from(x: walkdir::Error) -> Self {
        if x.io_error().is_some() {
            x.into_io_error().map(Self::from).unwrap()
        } else {
            Self {
                kind: ErrorKind::InvalidArgument,
                description: format!("{}", x),
            }
        }
    }
}

/// All kinds of errors that can flow through the RMI fabric.
///
/// `Rmi` is the only kind the wire layer itself ever raises; every other kind originates in an
/// application-level implementation (the naming core, a storage server, a test double) and is
/// carried to the caller unchanged.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum ErrorKind {
    /// A local precondition was violated: a malformed path, a non-remote interface, a null-like
    /// argument, or the root path passed somewhere it is disallowed
    InvalidArgument,

    /// A named path or target is absent
    NotFound,

    /// A lifecycle invariant was violated: restart after stop, double registration, an
    /// unstarted skeleton, no storage servers registered
    IllegalState,

    /// Any failure of the wire layer itself: connect, serialize, read, or a descriptor that
    /// matches no method in the implementation's dispatch table
    Rmi,

    /// No local address could be discovered for a wildcard-bound skeleton
    UnknownHost,
}

impl From<io::ErrorKind> for ErrorKind {
    fn from(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::NotFound => Self::NotFound,
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => Self::InvalidArgument,
            _ => Self::Rmi,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
