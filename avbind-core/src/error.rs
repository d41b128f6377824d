//! Error types for the avbind crates.
//!
//! Every failure in the core maps onto one of the [`ErrorKind`] categories, and
//! every category has a negative status code for callers on the other side of
//! a binding boundary.

use thiserror::Error;

/// Main error type for the avbind crates.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed parameter (bad size, zero denominator, unknown option...).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation not valid in the current open/closed or read/write state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Missing or contradictory codec parameters at open time.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Allocation request above the configured ceiling.
    #[error("Out of memory: requested {requested} bytes, ceiling is {ceiling}")]
    OutOfMemory { requested: usize, ceiling: usize },

    /// Retryable read/write condition reported by an engine.
    #[error("Transient I/O condition: {0}")]
    TransientIo(String),

    /// A cancellation request was observed.
    #[error("Operation interrupted")]
    Interrupted,

    /// Fatal fault reported by a codec or container engine.
    #[error("Unrecoverable engine fault: {0}")]
    Unrecoverable(String),

    /// Codec errors (encoding/decoding).
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Container errors (demuxing/muxing).
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// End of stream reached.
    #[error("End of stream")]
    EndOfStream,
}

/// Codec errors.
#[derive(Error, Debug)]
pub enum CodecError {
    /// No engine is bound to the coder.
    #[error("No codec engine bound")]
    NoEngine,

    /// No factory registered for the codec.
    #[error("Codec not registered: {0}")]
    NotRegistered(String),

    /// Operation requires the other coding direction.
    #[error("Wrong direction: {0}")]
    WrongDirection(String),

    /// Operation requires the other media type.
    #[error("Wrong media type: {0}")]
    WrongMediaType(String),

    /// Engine failed to decode a unit.
    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    /// Engine failed to encode a unit.
    #[error("Encode failed: {0}")]
    EncodeFailed(String),

    /// Engine returned without consuming input or producing output.
    #[error("Decoder made no progress at offset {offset}")]
    NoProgress { offset: usize },

    /// Generic codec error message.
    #[error("{0}")]
    Other(String),
}

impl From<String> for CodecError {
    fn from(s: String) -> Self {
        CodecError::Other(s)
    }
}

impl From<&str> for CodecError {
    fn from(s: &str) -> Self {
        CodecError::Other(s.to_string())
    }
}

/// Container errors.
#[derive(Error, Debug)]
pub enum ContainerError {
    /// Stream not found in container.
    #[error("Stream {index} not found")]
    StreamNotFound { index: i32 },

    /// Packet dts went backwards on a stream.
    #[error("Non-monotonic dts on stream {stream}: {dts} after {last}")]
    NonMonotonicDts { stream: i32, dts: i64, last: i64 },

    /// Streams cannot be added in the current state.
    #[error("Cannot add stream: {0}")]
    StreamsLocked(String),

    /// Seek operation failed.
    #[error("Seek failed: {0}")]
    SeekFailed(String),

    /// Generic container error message.
    #[error("{0}")]
    Other(String),
}

impl From<String> for ContainerError {
    fn from(s: String) -> Self {
        ContainerError::Other(s)
    }
}

impl From<&str> for ContainerError {
    fn from(s: &str) -> Self {
        ContainerError::Other(s.to_string())
    }
}

/// Coarse error categories shared by every component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    InvalidState,
    InvalidConfiguration,
    OutOfMemory,
    TransientIo,
    Interrupted,
    Unrecoverable,
    EndOfStream,
}

impl ErrorKind {
    /// Negative status code for this kind.
    pub fn status_code(&self) -> i32 {
        match self {
            Self::InvalidArgument => -22,
            Self::InvalidState => -38,
            Self::InvalidConfiguration => -1_094_995_529,
            Self::OutOfMemory => -12,
            Self::TransientIo => -11,
            Self::Interrupted => -4,
            Self::Unrecoverable => -5,
            Self::EndOfStream => -541_478_725,
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an invalid argument error.
    pub fn invalid_arg(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Create an invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Error::InvalidConfiguration(msg.into())
    }

    /// Create a transient I/O error.
    pub fn transient(msg: impl Into<String>) -> Self {
        Error::TransientIo(msg.into())
    }

    /// Create an unrecoverable error.
    pub fn unrecoverable(msg: impl Into<String>) -> Self {
        Error::Unrecoverable(msg.into())
    }

    /// Map this error onto its category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::InvalidState(_) => ErrorKind::InvalidState,
            Error::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
            Error::OutOfMemory { .. } => ErrorKind::OutOfMemory,
            Error::TransientIo(_) => ErrorKind::TransientIo,
            Error::Interrupted => ErrorKind::Interrupted,
            Error::Unrecoverable(_) => ErrorKind::Unrecoverable,
            Error::EndOfStream => ErrorKind::EndOfStream,
            Error::Codec(CodecError::NoEngine) => ErrorKind::InvalidConfiguration,
            Error::Codec(CodecError::NotRegistered(_)) => ErrorKind::InvalidConfiguration,
            Error::Codec(CodecError::WrongDirection(_))
            | Error::Codec(CodecError::WrongMediaType(_)) => ErrorKind::InvalidState,
            Error::Codec(_) => ErrorKind::Unrecoverable,
            Error::Container(ContainerError::StreamNotFound { .. })
            | Error::Container(ContainerError::NonMonotonicDts { .. }) => {
                ErrorKind::InvalidArgument
            }
            Error::Container(ContainerError::StreamsLocked(_)) => ErrorKind::InvalidState,
            Error::Container(_) => ErrorKind::Unrecoverable,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted => {
                    ErrorKind::TransientIo
                }
                std::io::ErrorKind::UnexpectedEof => ErrorKind::EndOfStream,
                _ => ErrorKind::Unrecoverable,
            },
        }
    }

    /// Negative status code for this error.
    pub fn status_code(&self) -> i32 {
        self.kind().status_code()
    }

    /// Check if this is an end-of-stream error.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.kind() == ErrorKind::EndOfStream
    }

    /// Check if the operation may succeed when retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::TransientIo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidArgument("negative size".into());
        assert_eq!(err.to_string(), "Invalid argument: negative size");

        let err = Error::OutOfMemory {
            requested: 10,
            ceiling: 5,
        };
        assert_eq!(
            err.to_string(),
            "Out of memory: requested 10 bytes, ceiling is 5"
        );
    }

    #[test]
    fn test_codec_error_conversion() {
        let err: Error = CodecError::NoEngine.into();
        assert!(matches!(err, Error::Codec(CodecError::NoEngine)));
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn test_io_kinds() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::WouldBlock, "again").into();
        assert!(err.is_transient());

        let err: Error = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof").into();
        assert!(err.is_eof());
    }

    #[test]
    fn test_status_codes_are_negative() {
        let kinds = [
            ErrorKind::InvalidArgument,
            ErrorKind::InvalidState,
            ErrorKind::InvalidConfiguration,
            ErrorKind::OutOfMemory,
            ErrorKind::TransientIo,
            ErrorKind::Interrupted,
            ErrorKind::Unrecoverable,
            ErrorKind::EndOfStream,
        ];
        for kind in kinds {
            assert!(kind.status_code() < 0, "{kind:?}");
        }
        assert_eq!(Error::Interrupted.status_code(), -4);
    }
}
