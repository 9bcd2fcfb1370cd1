//! Requests accepted from the platform glue and the replies sent back.
//!
//! Requests arrive as JSON objects naming a `method` and its `arguments`,
//! using the same argument names the mobile plugins pass:
//!
//! ```json
//! {
//!   "method": "generateSignature",
//!   "arguments": {
//!     "appletID": "A0000000011000",
//!     "pin": "12345678",
//!     "dataToSign": [48, 49, 48, 13],
//!     "keyIndex": 1
//!   }
//! }
//! ```

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::BridgeResult;

/// A high-level card operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "method",
    content = "arguments",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Request {
    /// Select the applet and verify the PIN.
    SelectAndVerify {
        /// Applet id in hex.
        #[serde(rename = "appletID")]
        applet_id: String,
        /// User PIN.
        pin: String,
    },

    /// Select, verify and sign `data_to_sign`.
    GenerateSignature {
        /// Applet id in hex.
        #[serde(rename = "appletID")]
        applet_id: String,
        /// User PIN.
        pin: String,
        /// Bytes passed to COMPUTE SIGNATURE, usually a `DigestInfo`.
        data_to_sign: Vec<u8>,
        /// Signing key index.
        key_index: i64,
    },

    /// Select and read the public key for a role.
    GetRsaPublicKey {
        /// Applet id in hex.
        #[serde(rename = "appletID")]
        applet_id: String,
        /// `sig`, `dec`, `aut` or `sm`.
        key_role: String,
    },

    /// Select and read the certificate for a role.
    GetCertificate {
        /// Applet id in hex.
        #[serde(rename = "appletID")]
        applet_id: String,
        /// `sig`, `dec`, `aut` or `sm`.
        key_role: String,
    },

    /// Select, verify, sign, then read the signing certificate.
    #[serde(rename = "generateXMLSignature")]
    SignWithCertificate {
        /// Applet id in hex.
        #[serde(rename = "appletID")]
        applet_id: String,
        /// User PIN.
        pin: String,
        /// Bytes passed to COMPUTE SIGNATURE.
        data_to_sign: Vec<u8>,
        /// Signing key index.
        key_index: i64,
    },
}

impl Request {
    /// Parses a request from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidParameters`](crate::BridgeError::InvalidParameters)
    /// if the method is unknown or an argument is missing.
    pub fn from_json(json: &str) -> BridgeResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Returns the method name as sent over the wire.
    #[must_use]
    pub const fn method(&self) -> &'static str {
        match self {
            Self::SelectAndVerify { .. } => "selectAndVerify",
            Self::GenerateSignature { .. } => "generateSignature",
            Self::GetRsaPublicKey { .. } => "getRsaPublicKey",
            Self::GetCertificate { .. } => "getCertificate",
            Self::SignWithCertificate { .. } => "generateXMLSignature",
        }
    }
}

/// A signature and the certificate that verifies it, both base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedData {
    /// DER certificate, base64 without line breaks.
    pub certificate: String,

    /// Raw signature, base64 without line breaks.
    pub signature: String,
}

impl SignedData {
    /// Encodes raw certificate and signature bytes.
    #[must_use]
    pub fn new(certificate: &[u8], signature: &[u8]) -> Self {
        Self {
            certificate: STANDARD.encode(certificate),
            signature: STANDARD.encode(signature),
        }
    }
}

/// The success half of a bridge reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Response {
    /// The applet is selected and the PIN verified.
    Verified,

    /// Raw bytes from the card: a signature, public key or certificate.
    Bytes(#[serde(serialize_with = "base64_bytes")] Vec<u8>),

    /// A signature with its certificate.
    Signed(SignedData),
}

impl Response {
    /// Serializes the reply as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error only if serialization itself fails.
    pub fn to_json(&self) -> BridgeResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

fn base64_bytes<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(bytes))
}
