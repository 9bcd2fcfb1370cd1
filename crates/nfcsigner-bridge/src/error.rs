//! Bridge error types and their reason codes.
//!
//! Every failure that leaves the bridge carries a stable [`ErrorCode`] the
//! platform glue forwards as-is, plus optional [`ErrorDetails`] (status word,
//! remaining PIN tries).
//!
//! # Example
//!
//! ```
//! use nfcsigner_bridge::{BridgeError, ErrorCode};
//!
//! let err = BridgeError::AuthFailed { tries_left: 2 };
//! assert_eq!(err.code(), ErrorCode::AuthError);
//! assert_eq!(err.code().as_str(), "AUTH_ERROR");
//! ```

use core::fmt;

use nfcsigner_core::Error as CoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable reason code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// A request argument was missing or malformed.
    InvalidParameters,
    /// The card refused to select the applet.
    AppletNotSelected,
    /// The card rejected the PIN.
    AuthError,
    /// The card refused to sign.
    SigningError,
    /// The certificate could not be read.
    CertificateError,
    /// The card channel failed.
    CommunicationError,
    /// The USB reader could not be powered or reached.
    UsbConnectionFailed,
    /// The USB channel failed mid-session.
    UsbCommError,
}

impl ErrorCode {
    /// Returns the wire form of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidParameters => "INVALID_PARAMETERS",
            Self::AppletNotSelected => "APPLET_NOT_SELECTED",
            Self::AuthError => "AUTH_ERROR",
            Self::SigningError => "SIGNING_ERROR",
            Self::CertificateError => "CERTIFICATE_ERROR",
            Self::CommunicationError => "COMMUNICATION_ERROR",
            Self::UsbConnectionFailed => "USB_CONNECTION_FAILED",
            Self::UsbCommError => "USB_COMM_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for bridge requests.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BridgeError {
    /// A request argument was missing or malformed.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// SELECT did not complete with `90 00`.
    #[error("applet could not be selected")]
    AppletNotSelected,

    /// VERIFY was rejected.
    #[error("PIN verification failed, {tries_left} tries left")]
    AuthFailed {
        /// Tries remaining before the PIN blocks.
        tries_left: u8,
    },

    /// COMPUTE SIGNATURE was refused.
    #[error("signing failed: {0}")]
    SigningFailed(#[source] CoreError),

    /// The certificate could not be read.
    #[error("certificate unavailable: {0}")]
    CertificateUnavailable(#[source] CoreError),

    /// The card channel failed.
    #[error("card communication failed: {0}")]
    Communication(#[source] CoreError),

    /// The USB session could not be opened.
    #[error("USB reader connection failed: {0}")]
    UsbConnectionFailed(#[source] CoreError),

    /// The USB channel failed mid-session.
    #[error("USB communication failed: {0}")]
    UsbCommunication(#[source] CoreError),
}

impl BridgeError {
    /// Returns the reason code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidParameters(_) => ErrorCode::InvalidParameters,
            Self::AppletNotSelected => ErrorCode::AppletNotSelected,
            Self::AuthFailed { .. } => ErrorCode::AuthError,
            Self::SigningFailed(_) => ErrorCode::SigningError,
            Self::CertificateUnavailable(_) => ErrorCode::CertificateError,
            Self::Communication(_) => ErrorCode::CommunicationError,
            Self::UsbConnectionFailed(_) => ErrorCode::UsbConnectionFailed,
            Self::UsbCommunication(_) => ErrorCode::UsbCommError,
        }
    }

    /// Returns the status word or PIN counter behind the failure, if any.
    #[must_use]
    pub fn details(&self) -> Option<ErrorDetails> {
        match self {
            Self::AuthFailed { tries_left } => Some(ErrorDetails {
                tries_left: Some(*tries_left),
                ..ErrorDetails::default()
            }),
            Self::SigningFailed(err)
            | Self::CertificateUnavailable(err)
            | Self::Communication(err)
            | Self::UsbConnectionFailed(err)
            | Self::UsbCommunication(err) => {
                err.status_word().map(|(sw1, sw2)| ErrorDetails {
                    sw1: Some(sw1),
                    sw2: Some(sw2),
                    tries_left: None,
                })
            }
            Self::InvalidParameters(_) | Self::AppletNotSelected => None,
        }
    }

    /// Builds the serializable reply for the platform glue.
    #[must_use]
    pub fn to_reply(&self) -> ErrorReply {
        ErrorReply {
            code: self.code(),
            message: self.to_string(),
            details: self.details(),
        }
    }

    /// Re-labels a fatal card failure as a USB channel failure.
    pub(crate) fn over_usb(self) -> Self {
        match self {
            Self::Communication(err) if err.is_fatal() => Self::UsbCommunication(err),
            other => other,
        }
    }
}

impl From<CoreError> for BridgeError {
    fn from(error: CoreError) -> Self {
        if error.is_validation() {
            Self::InvalidParameters(error.to_string())
        } else {
            Self::Communication(error)
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(error: serde_json::Error) -> Self {
        Self::InvalidParameters(error.to_string())
    }
}

/// Extra context attached to an error reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    /// Status word 1 of the failing exchange.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sw1: Option<u8>,

    /// Status word 2 of the failing exchange.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sw2: Option<u8>,

    /// Remaining PIN tries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tries_left: Option<u8>,
}

/// The error half of a bridge reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    /// Reason code.
    pub code: ErrorCode,

    /// Human-readable message.
    pub message: String,

    /// Status word or PIN counter, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
}

/// Result type for bridge requests.
pub type BridgeResult<T> = Result<T, BridgeError>;
