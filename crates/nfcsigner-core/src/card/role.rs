//! Key roles and signing key slots.
//!
//! The applet exposes four key roles for public key and certificate
//! retrieval, and up to three signing keys addressed by index through
//! `P2` of COMPUTE SIGNATURE.
//!
//! # Role Overview
//!
//! | Role  | Public key selector | Purpose                  |
//! |-------|---------------------|--------------------------|
//! | `sig` | `B6 00`             | Digital signature        |
//! | `dec` | `B8 00`             | Decipherment             |
//! | `aut` | `A4 00`             | Authentication           |
//! | `sm`  | `A6 00`             | Secure messaging         |
//!
//! # Example
//!
//! ```
//! use nfcsigner_core::card::{KeyRole, KeySlot};
//!
//! let role: KeyRole = "sig".parse().unwrap();
//! assert_eq!(role.public_key_selector(), [0xB6, 0x00]);
//! assert!("xyz".parse::<KeyRole>().is_err());
//!
//! assert_eq!(KeySlot::from_index(1).p2(), 0x9B);
//! ```

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Data object selector shared by every role's certificate (`7F21`).
const CERTIFICATE_SELECTOR: [u8; 6] = [0x60, 0x04, 0x5C, 0x02, 0x7F, 0x21];

/// A key role on the card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyRole {
    /// Digital signature key.
    Sig,

    /// Decipherment key.
    Dec,

    /// Authentication key.
    Aut,

    /// Secure messaging key.
    Sm,
}

impl KeyRole {
    /// Returns the control reference template selecting this role's public key.
    #[must_use]
    pub const fn public_key_selector(self) -> [u8; 2] {
        match self {
            Self::Sig => [0xB6, 0x00],
            Self::Dec => [0xB8, 0x00],
            Self::Aut => [0xA4, 0x00],
            Self::Sm => [0xA6, 0x00],
        }
    }

    /// Returns the SELECT DATA payload for this role's certificate object.
    #[must_use]
    pub const fn certificate_selector(self) -> [u8; 6] {
        CERTIFICATE_SELECTOR
    }

    /// Returns the role's wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sig => "sig",
            Self::Dec => "dec",
            Self::Aut => "aut",
            Self::Sm => "sm",
        }
    }

    /// Returns all roles.
    #[must_use]
    pub const fn all() -> [Self; 4] {
        [Self::Sig, Self::Dec, Self::Aut, Self::Sm]
    }
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sig" => Ok(Self::Sig),
            "dec" => Ok(Self::Dec),
            "aut" => Ok(Self::Aut),
            "sm" => Ok(Self::Sm),
            other => Err(Error::InvalidKeyRole(other.to_string())),
        }
    }
}

/// A signing key addressed through `P2` of COMPUTE SIGNATURE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum KeySlot {
    /// Default signing key (`9A`), used for any index other than 1 or 2.
    Default = 0x9A,

    /// Signing key 1 (`9B`).
    First = 0x9B,

    /// Signing key 2 (`9C`).
    Second = 0x9C,
}

impl KeySlot {
    /// Maps a caller-supplied key index to a slot.
    ///
    /// Index 1 selects `9B`, index 2 selects `9C`, anything else `9A`.
    #[must_use]
    pub const fn from_index(index: i64) -> Self {
        match index {
            1 => Self::First,
            2 => Self::Second,
            _ => Self::Default,
        }
    }

    /// Returns the `P2` byte.
    #[must_use]
    pub const fn p2(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_selectors() {
        assert_eq!(KeyRole::Sig.public_key_selector(), [0xB6, 0x00]);
        assert_eq!(KeyRole::Dec.public_key_selector(), [0xB8, 0x00]);
        assert_eq!(KeyRole::Aut.public_key_selector(), [0xA4, 0x00]);
        assert_eq!(KeyRole::Sm.public_key_selector(), [0xA6, 0x00]);
    }

    #[test]
    fn certificate_selector_is_shared() {
        for role in KeyRole::all() {
            assert_eq!(role.certificate_selector(), [0x60, 0x04, 0x5C, 0x02, 0x7F, 0x21]);
        }
    }

    #[test]
    fn role_parse() {
        for role in KeyRole::all() {
            assert_eq!(role.as_str().parse::<KeyRole>().unwrap(), role);
        }
        assert!(matches!("xyz".parse::<KeyRole>(), Err(Error::InvalidKeyRole(r)) if r == "xyz"));
        assert!("SIG".parse::<KeyRole>().is_err());
    }

    #[test]
    fn role_display() {
        assert_eq!(KeyRole::Aut.to_string(), "aut");
    }

    #[test]
    fn slot_from_index() {
        assert_eq!(KeySlot::from_index(1).p2(), 0x9B);
        assert_eq!(KeySlot::from_index(2).p2(), 0x9C);
        assert_eq!(KeySlot::from_index(0).p2(), 0x9A);
        assert_eq!(KeySlot::from_index(3).p2(), 0x9A);
        assert_eq!(KeySlot::from_index(-1).p2(), 0x9A);
    }
}
