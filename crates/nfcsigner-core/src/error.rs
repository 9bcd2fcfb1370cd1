//! Error types for the card engine.
//!
//! This module provides the [`enum@Error`] type that covers every failure mode
//! between a high-level card operation and the raw bytes on the wire.
//!
//! # Error Categories
//!
//! - **Validation errors**: malformed input rejected before any card I/O
//! - **Status-word errors**: the card answered, but not with `0x9000`
//! - **Transport errors**: USB/NFC failures and fatal CCID slot states
//! - **Chaining errors**: a CCID block or block chain could not be completed
//!
//! Transport and chaining errors are fatal to the in-flight exchange: the
//! caller must tear the session down (power off, reconnect) before retrying.
//! See [`Error::is_fatal`].
//!
//! # Example
//!
//! ```
//! use nfcsigner_core::Error;
//!
//! let err = Error::StatusWord { operation: "select applet", sw1: 0x6A, sw2: 0x82 };
//! assert_eq!(err.status_word(), Some((0x6A, 0x82)));
//! assert!(!err.is_fatal());
//! ```

use core::result::Result as CoreResult;
use std::io::Error as IoError;

use hex::FromHexError;
use thiserror::Error;

/// The main error type for the card engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Validation Errors
    // =========================================================================
    /// The applet identifier is not a valid AID.
    #[error("invalid applet id: {0}")]
    InvalidAid(String),

    /// The key role is not one of `sig`, `dec`, `aut`, `sm`.
    #[error("invalid key role: {0}")]
    InvalidKeyRole(String),

    /// The PIN cannot be encoded into a VERIFY command.
    #[error("invalid PIN: {0}")]
    InvalidPin(String),

    /// Command data does not fit into a short APDU.
    #[error("command data too long: {len} bytes (max {max})")]
    DataTooLong {
        /// Length of the rejected data.
        len: usize,
        /// Maximum accepted length.
        max: usize,
    },

    /// A pre-computed hash does not match its algorithm's digest size.
    #[error("digest length mismatch: expected {expected} bytes, got {actual}")]
    InvalidDigestLength {
        /// Digest size of the algorithm.
        expected: usize,
        /// Length supplied.
        actual: usize,
    },

    /// Failed to parse hex input.
    #[error("hex decoding failed: {0}")]
    HexDecodeFailed(String),

    // =========================================================================
    // Status-Word Errors
    // =========================================================================
    /// The card completed the exchange with a non-success status word.
    #[error("{operation} failed: SW={sw1:02X}{sw2:02X}")]
    StatusWord {
        /// The card operation that failed.
        operation: &'static str,
        /// Status word 1.
        sw1: u8,
        /// Status word 2.
        sw2: u8,
    },

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// No reader or card was found.
    #[error("no smart card reader found")]
    DeviceNotFound,

    /// Opening or claiming the device failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The transport has no open channel.
    #[error("transport not connected")]
    NotConnected,

    /// The underlying channel reported an I/O failure or timeout.
    #[error("I/O error: {0}")]
    Io(String),

    /// A bulk OUT transfer wrote fewer bytes than requested.
    #[error("short write: sent {sent} of {expected} bytes")]
    ShortWrite {
        /// Bytes actually written.
        sent: usize,
        /// Bytes that should have been written.
        expected: usize,
    },

    /// The reader did not return any bytes.
    #[error("no response received from reader")]
    NoResponse,

    /// A CCID message could not be decoded.
    #[error("malformed CCID message: {0}")]
    MalformedCcidMessage(String),

    /// The reader answered with a message type that was not expected.
    #[error("unexpected CCID message type: {0:#04x}")]
    UnexpectedMessageType(u8),

    /// Replies kept carrying another message's sequence number.
    #[error("CCID reply sequence {received} does not match request {expected}")]
    UnexpectedSequence {
        /// Sequence number of the request.
        expected: u8,
        /// Sequence number of the last reply read.
        received: u8,
    },

    /// The card is present but not powered.
    #[error("ICC present but inactive")]
    IccInactive,

    /// No card is present in the reader slot.
    #[error("no ICC present in slot")]
    IccNotPresent,

    /// The reader reported a failed command.
    #[error("CCID command failed: bStatus={status:#04x} bError={error:#04x}")]
    CcidCommandFailed {
        /// Raw `bStatus` byte.
        status: u8,
        /// Raw `bError` byte.
        error: u8,
    },

    /// The card requested more time extensions than allowed.
    #[error("card exceeded {0} time extensions")]
    TimeExtensionLimit(u32),

    /// The reader answered a data exchange with a slot status message.
    #[error("card needs a power cycle")]
    CardNeedsPowerCycle,

    /// A previous exchange failed fatally; the session must be torn down.
    #[error("session faulted; power cycle required")]
    SessionFaulted,

    // =========================================================================
    // Chaining Errors
    // =========================================================================
    /// A CCID block ended before its declared data length.
    #[error("truncated CCID block: declared {declared} bytes, received {received}")]
    TruncatedBlock {
        /// Payload length declared in the header.
        declared: usize,
        /// Payload bytes actually received.
        received: usize,
    },

    /// A CCID response chain did not terminate.
    #[error("CCID response chain exceeded {0} blocks")]
    ChainLimit(usize),
}

impl Error {
    /// Returns the status word carried by a [`Error::StatusWord`] failure.
    #[must_use]
    pub const fn status_word(&self) -> Option<(u8, u8)> {
        match self {
            Self::StatusWord { sw1, sw2, .. } => Some((*sw1, *sw2)),
            _ => None,
        }
    }

    /// Checks if this error was raised before any card I/O took place.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidAid(_)
                | Self::InvalidKeyRole(_)
                | Self::InvalidPin(_)
                | Self::DataTooLong { .. }
                | Self::InvalidDigestLength { .. }
                | Self::HexDecodeFailed(_)
        )
    }

    /// Checks if the exchange failed before any reply arrived.
    ///
    /// The channel is still in step, so the same command may be sent again
    /// on the same session.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::NoResponse)
    }

    /// Checks if the active session must be torn down after this error.
    ///
    /// Validation and status-word errors leave the channel usable; every
    /// transport or chaining failure does not.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.is_validation() && !matches!(self, Self::StatusWord { .. })
    }
}

impl From<FromHexError> for Error {
    fn from(err: FromHexError) -> Self {
        Self::HexDecodeFailed(err.to_string())
    }
}

impl From<IoError> for Error {
    fn from(err: IoError) -> Self {
        Self::Io(err.to_string())
    }
}

/// A specialized [`Result`] type for card engine operations.
pub type Result<T> = CoreResult<T, Error>;
