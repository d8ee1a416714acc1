//! Bridge errors

use crate::backend::DiscoveryResult;

/// The error type for stack bridge operations
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    message: String,
}

impl Error {
    pub(crate) fn new(
        kind: ErrorKind,
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
        message: impl Into<String>,
    ) -> Self {
        Error {
            kind,
            source,
            message: message.into(),
        }
    }

    pub(crate) fn with_message(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error::new(kind, None, message)
    }

    /// Returns the corresponding [ErrorKind] for this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the message for this error.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.message.is_empty(), &self.source) {
            (true, None) => write!(f, "{}", &self.kind),
            (false, None) => write!(f, "{}: {}", &self.kind, &self.message),
            (true, Some(err)) => write!(f, "{}: {}", &self.kind, err),
            (false, Some(err)) => write!(f, "{}: {} ({})", &self.kind, &self.message, err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|x| {
            let x: &(dyn std::error::Error + 'static) = &**x;
            x
        })
    }
}

/// A list of general categories of bridge error.
#[non_exhaustive]
#[derive(Debug, displaydoc::Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKind {
    /// the Bluetooth stack has been torn down
    StackUnavailable,
    /// invalid or destroyed handle
    InvalidHandle,
    /// operation not valid in the current state
    InvalidState,
    /// the Bluetooth stack reported an error
    Stack,
    /// service discovery failed: {0}
    Discovery(DiscoveryResult),
    /// receive buffer overflown
    Overflow,
    /// a device inquiry is already running
    AlreadyInquiring,
    /// a service discovery is already running
    AlreadyDiscovering,
    /// connection failed
    ConnectionFailed,
    /// the connection is not connected
    NotConnected,
    /// invalid parameter
    InvalidParameter,
    /// timed out
    Timeout,
    /// error
    Other,
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error {
            kind,
            source: None,
            message: String::new(),
        }
    }
}

/// The extended error description reported by the stack for its last failed call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtendedError(pub String);

impl std::fmt::Display for ExtendedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stack error[{}]", self.0)
    }
}

impl std::error::Error for ExtendedError {}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        use std::io::ErrorKind as StdErrorKind;

        let kind = match err.kind {
            ErrorKind::InvalidHandle | ErrorKind::InvalidParameter => StdErrorKind::InvalidInput,
            ErrorKind::NotConnected | ErrorKind::InvalidState => StdErrorKind::NotConnected,
            ErrorKind::ConnectionFailed => StdErrorKind::ConnectionRefused,
            ErrorKind::StackUnavailable => StdErrorKind::BrokenPipe,
            ErrorKind::Timeout => StdErrorKind::TimedOut,
            _ => StdErrorKind::Other,
        };
        std::io::Error::new(kind, err)
    }
}
