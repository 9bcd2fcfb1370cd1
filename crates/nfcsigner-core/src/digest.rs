//! DER `DigestInfo` encoding for RSA PKCS#1 v1.5 signing.
//!
//! The card's COMPUTE SIGNATURE pads whatever it is given, so the host must
//! wrap the hash in a `DigestInfo` naming the hash algorithm:
//!
//! ```text
//! DigestInfo ::= SEQUENCE {
//!     digestAlgorithm AlgorithmIdentifier,   -- OID + NULL parameters
//!     digest          OCTET STRING
//! }
//! ```
//!
//! # Example
//!
//! ```
//! use nfcsigner_core::digest::{HashAlgorithm, digest_info_for_content};
//!
//! let info = digest_info_for_content(HashAlgorithm::Sha256, b"document");
//! assert_eq!(info.len(), 19 + 32);
//! assert_eq!(&info[..2], &[0x30, 0x31]);
//! ```

use core::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::error::{Error, Result};

/// A hash algorithm supported in `DigestInfo`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-256.
    #[default]
    Sha256,

    /// SHA-384.
    Sha384,

    /// SHA-512.
    Sha512,
}

impl HashAlgorithm {
    /// Returns the digest size in bytes.
    #[must_use]
    pub const fn digest_len(self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Returns the DER encoding of the algorithm's OID (2.16.840.1.101.3.4.2.x).
    #[must_use]
    pub const fn oid(self) -> [u8; 9] {
        let arc = match self {
            Self::Sha256 => 0x01,
            Self::Sha384 => 0x02,
            Self::Sha512 => 0x03,
        };
        [0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, arc]
    }

    /// Hashes `content`.
    #[must_use]
    pub fn digest(self, content: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => Sha256::digest(content).to_vec(),
            Self::Sha384 => Sha384::digest(content).to_vec(),
            Self::Sha512 => Sha512::digest(content).to_vec(),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        })
    }
}

/// Wraps a pre-computed `hash` in a `DigestInfo`.
///
/// # Errors
///
/// Returns [`Error::InvalidDigestLength`] if `hash` does not have the
/// algorithm's digest size.
pub fn digest_info(algorithm: HashAlgorithm, hash: &[u8]) -> Result<Vec<u8>> {
    let expected = algorithm.digest_len();
    if hash.len() != expected {
        return Err(Error::InvalidDigestLength {
            expected,
            actual: hash.len(),
        });
    }

    Ok(encode(algorithm, hash))
}

/// Hashes `content` and wraps the result in a `DigestInfo`.
#[must_use]
pub fn digest_info_for_content(algorithm: HashAlgorithm, content: &[u8]) -> Vec<u8> {
    encode(algorithm, &algorithm.digest(content))
}

#[expect(clippy::cast_possible_truncation, reason = "DER lengths here are below 0x80")]
fn encode(algorithm: HashAlgorithm, hash: &[u8]) -> Vec<u8> {
    let oid = algorithm.oid();
    // AlgorithmIdentifier: OID TLV + NULL
    let algorithm_id_len = 2 + oid.len() + 2;
    let body_len = 2 + algorithm_id_len + 2 + hash.len();

    let mut out = Vec::with_capacity(2 + body_len);
    out.extend_from_slice(&[0x30, body_len as u8]);
    out.extend_from_slice(&[0x30, algorithm_id_len as u8]);
    out.extend_from_slice(&[0x06, oid.len() as u8]);
    out.extend_from_slice(&oid);
    out.extend_from_slice(&[0x05, 0x00]);
    out.extend_from_slice(&[0x04, hash.len() as u8]);
    out.extend_from_slice(hash);
    out
}
