//! NFC Signer Bridge
//!
//! The request surface between platform plugin glue (Flutter method
//! channels, desktop shells) and [`nfcsigner_core`].
//!
//! Each high-level operation arrives as a [`Request`], runs as one combined
//! flow against any [`Transport`](nfcsigner_core::Transport), and leaves as
//! either a [`Response`] or a [`BridgeError`] carrying a stable
//! [`ErrorCode`].
//!
//! # Operations
//!
//! | Method | Flow | Success |
//! |--------|------|---------|
//! | `selectAndVerify` | SELECT, VERIFY | `verified` |
//! | `generateSignature` | SELECT, VERIFY, COMPUTE SIGNATURE | signature bytes |
//! | `getRsaPublicKey` | SELECT, GET PUBLIC KEY | key bytes |
//! | `getCertificate` | SELECT, SELECT DATA, GET DATA | certificate bytes |
//! | `generateXMLSignature` | sign, then read the `sig` certificate | base64 `{certificate, signature}` |
//!
//! # Example
//!
//! ```ignore
//! use nfcsigner_bridge::{Request, dispatch};
//!
//! let request = Request::from_json(json)?;
//! let reply = match dispatch::execute_with_usb(&mut reader, &request) {
//!     Ok(response) => response.to_json()?,
//!     Err(err) => serde_json::to_string(&err.to_reply())?,
//! };
//! ```

pub mod dispatch;
pub mod error;
pub mod request;

pub use error::{BridgeError, BridgeResult, ErrorCode, ErrorDetails, ErrorReply};
pub use request::{Request, Response, SignedData};
