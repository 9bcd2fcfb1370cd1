//! CCID interface identification and class descriptor parsing.

use core::fmt;

/// USB interface class for smart card readers.
pub const CLASS_SMART_CARD: u8 = 0x0B;

/// Vendor-specific interface class, used by some readers for their CCID function.
pub const CLASS_VENDOR_SPECIFIC: u8 = 0xFF;

/// Descriptor type of the CCID class descriptor.
const DESCRIPTOR_TYPE_CCID: u8 = 0x21;

/// Minimum length of a CCID class descriptor carrying `dwMaxCCIDMessageLength`.
const MIN_DESCRIPTOR_LEN: usize = 48;

/// Checks if an interface with this class and protocol speaks CCID.
///
/// Besides the standard smart card class, vendor-specific interfaces with
/// protocol 0 are accepted.
#[must_use]
pub const fn is_ccid_interface(class: u8, protocol: u8) -> bool {
    class == CLASS_SMART_CARD || (class == CLASS_VENDOR_SPECIFIC && protocol == 0)
}

/// APDU exchange level advertised in `dwFeatures`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeLevel {
    /// Extended APDU level exchange.
    ExtendedApdu,

    /// Short APDU level exchange.
    ShortApdu,

    /// TPDU level exchange.
    Tpdu,

    /// Character level exchange.
    Character,
}

impl fmt::Display for ExchangeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ExtendedApdu => "extended APDU",
            Self::ShortApdu => "short APDU",
            Self::Tpdu => "TPDU",
            Self::Character => "character",
        })
    }
}

/// The fields of a CCID class descriptor this crate reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CcidDescriptor {
    /// `dwFeatures`.
    pub features: u32,

    /// `dwMaxCCIDMessageLength`.
    pub max_message_length: u32,
}

impl CcidDescriptor {
    /// Finds the CCID class descriptor in the extra bytes that follow an
    /// interface descriptor.
    #[must_use]
    pub fn parse(extra: &[u8]) -> Option<Self> {
        let mut rest = extra;

        while let [len, kind, ..] = *rest {
            let len = usize::from(len);
            if len < 2 || len > rest.len() {
                return None;
            }
            if kind == DESCRIPTOR_TYPE_CCID && len >= MIN_DESCRIPTOR_LEN {
                let field = |at: usize| u32::from_le_bytes([rest[at], rest[at + 1], rest[at + 2], rest[at + 3]]);
                return Some(Self {
                    features: field(40),
                    max_message_length: field(44),
                });
            }
            rest = &rest[len..];
        }
        None
    }

    /// Returns the exchange level encoded in `dwFeatures`.
    #[must_use]
    pub const fn exchange_level(&self) -> ExchangeLevel {
        if self.features & 0x0004_0000 != 0 {
            ExchangeLevel::ExtendedApdu
        } else if self.features & 0x0002_0000 != 0 {
            ExchangeLevel::ShortApdu
        } else if self.features & 0x0001_0000 != 0 {
            ExchangeLevel::Tpdu
        } else {
            ExchangeLevel::Character
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class_descriptor(features: u32, max_len: u32) -> Vec<u8> {
        let mut desc = vec![0u8; 54];
        desc[0] = 54;
        desc[1] = 0x21;
        desc[40..44].copy_from_slice(&features.to_le_bytes());
        desc[44..48].copy_from_slice(&max_len.to_le_bytes());
        desc
    }

    #[test]
    fn identifies_ccid_interfaces() {
        assert!(is_ccid_interface(0x0B, 0));
        assert!(is_ccid_interface(0xFF, 0));
        assert!(!is_ccid_interface(0xFF, 1));
        assert!(!is_ccid_interface(0x08, 0));
    }

    #[test]
    fn parses_class_descriptor() {
        let desc = CcidDescriptor::parse(&class_descriptor(0x0002_04BA, 271)).unwrap();
        assert_eq!(desc.max_message_length, 271);
        assert_eq!(desc.exchange_level(), ExchangeLevel::ShortApdu);
    }

    #[test]
    fn skips_other_descriptors() {
        let mut extra = vec![0x05, 0x24, 0x00, 0x10, 0x01];
        extra.extend(class_descriptor(0x0004_0000, 3072));

        let desc = CcidDescriptor::parse(&extra).unwrap();
        assert_eq!(desc.exchange_level(), ExchangeLevel::ExtendedApdu);
        assert_eq!(desc.max_message_length, 3072);
    }

    #[test]
    fn rejects_truncated_input() {
        assert!(CcidDescriptor::parse(&[]).is_none());
        assert!(CcidDescriptor::parse(&[0x36, 0x21, 0x00]).is_none());
        assert!(CcidDescriptor::parse(&[0x00, 0x21]).is_none());
    }
}
