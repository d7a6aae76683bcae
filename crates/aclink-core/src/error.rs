//! Error types for aclink.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport-layer, protocol-layer, and
//! adapter-layer errors are all captured here.

/// The error type for all aclink operations.
///
/// Variants cover the full range of failure modes encountered when
/// talking to an indoor unit over the half-duplex serial link: transport
/// failures, frame decode errors, timeouts, and unsupported commands.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Timed out waiting for a byte, a frame, or an ACK from the unit.
    ///
    /// This typically indicates the unit is powered off, the wiring is
    /// wrong, or the line settings (baud rate / parity) don't match.
    #[error("timeout waiting for response")]
    Timeout,

    /// The unit answered, but the frame didn't have the expected shape
    /// (wrong reply command class, short payload, malformed field).
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The received frame's checksum does not match the frame contents.
    #[error("checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    Checksum {
        /// Checksum computed over the received frame body.
        expected: u8,
        /// Checksum byte carried by the frame.
        actual: u8,
    },

    /// The command is not supported by the unit's protocol version or
    /// was rejected during command discovery. Never retried.
    #[error("command not supported: {0}")]
    CommandNotSupported(String),

    /// A protocol-level error (NAK received, reserved byte inside a
    /// frame body, negotiation contradiction).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An incoming frame exceeded the maximum frame length.
    #[error("receive buffer overflow")]
    BufferOverflow,

    /// An invalid parameter was passed to an engine or adapter call.
    /// Never retried, and surfaced before any bytes hit the wire.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A transport-level communication error (serial port gone, line
    /// error) that is not a plain timeout.
    #[error("communication error: {0}")]
    Communication(String),

    /// The unit reported an internal fault code.
    #[error("device error: code 0x{code:02X}")]
    Device {
        /// Raw fault code byte as reported by the unit.
        code: u8,
    },

    /// No connection to the unit has been established.
    #[error("not connected")]
    NotConnected,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A failure that doesn't fit any other category.
    #[error("unknown error")]
    Unknown,
}

/// Lightweight, copyable classification of an [`Error`].
///
/// Status trackers keep the kind of the last error without holding the
/// error value itself (which carries strings and is not `Clone`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`Error::Timeout`].
    Timeout,
    /// See [`Error::InvalidResponse`].
    InvalidResponse,
    /// See [`Error::Checksum`].
    Checksum,
    /// See [`Error::CommandNotSupported`].
    CommandNotSupported,
    /// See [`Error::Protocol`].
    Protocol,
    /// See [`Error::BufferOverflow`].
    BufferOverflow,
    /// See [`Error::InvalidParameter`].
    InvalidParameter,
    /// See [`Error::Communication`].
    Communication,
    /// See [`Error::Device`].
    Device,
    /// See [`Error::NotConnected`].
    NotConnected,
    /// See [`Error::Unknown`].
    Unknown,
}

impl Error {
    /// Returns `true` if this error class may be retried by the engine's
    /// bounded retry loop.
    ///
    /// `CommandNotSupported` and `InvalidParameter` are deterministic and
    /// surfaced immediately; everything else is treated as transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::CommandNotSupported(_) | Error::InvalidParameter(_)
        )
    }

    /// The copyable classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Timeout => ErrorKind::Timeout,
            Error::InvalidResponse(_) => ErrorKind::InvalidResponse,
            Error::Checksum { .. } => ErrorKind::Checksum,
            Error::CommandNotSupported(_) => ErrorKind::CommandNotSupported,
            Error::Protocol(_) => ErrorKind::Protocol,
            Error::BufferOverflow => ErrorKind::BufferOverflow,
            Error::InvalidParameter(_) => ErrorKind::InvalidParameter,
            Error::Communication(_) => ErrorKind::Communication,
            Error::Device { .. } => ErrorKind::Device,
            Error::NotConnected => ErrorKind::NotConnected,
            Error::Io(_) => ErrorKind::Communication,
            Error::Unknown => ErrorKind::Unknown,
        }
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
