//! APDU (Application Protocol Data Unit) command and response types.
//!
//! This module provides the ISO 7816-4 command encoder and the
//! transport-agnostic response parser. The parser is used both for frames
//! coming straight from a contactless tag and for payloads extracted from
//! CCID data blocks.
//!
//! # APDU Command Structure
//!
//! ```text
//! | CLA | INS | P1 | P2 | Lc | Data | Le |
//! |-----|-----|----|----|----|----- |----|
//! | 1B  | 1B  | 1B | 1B | 1B | Var  | 1B |
//! ```
//!
//! Only short APDUs are produced: `Lc` is at most 255 and `Le = 256` is
//! encoded as `0x00`.
//!
//! # APDU Response Structure
//!
//! ```text
//! | Data | SW1 | SW2 |
//! |------|-----|-----|
//! | Var  | 1B  | 1B  |
//! ```
//!
//! # Example
//!
//! ```
//! use nfcsigner_core::card::{Apdu, ApduResponse};
//!
//! let apdu = Apdu::new(0x00, 0xA4, 0x04, 0x00, vec![0xA0, 0x00]);
//! assert_eq!(apdu.to_bytes(), vec![0x00, 0xA4, 0x04, 0x00, 0x02, 0xA0, 0x00]);
//!
//! let response = ApduResponse::parse(&[0x01, 0x02, 0x90, 0x00]);
//! assert!(response.is_success());
//! assert_eq!(response.data(), &[0x01, 0x02]);
//! ```

use crate::error::{Error, Result};

/// An APDU command.
///
/// Commands are immutable once built; the builders in
/// [`command`](super::command) validate their input before constructing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Apdu {
    /// Class byte.
    cla: u8,

    /// Instruction byte.
    ins: u8,

    /// Parameter 1.
    p1: u8,

    /// Parameter 2.
    p2: u8,

    /// Command data.
    data: Vec<u8>,

    /// Expected response length (0 = no `Le` byte, 256 = `0x00`).
    le: u16,
}

impl Apdu {
    /// Maximum short APDU data length.
    pub const MAX_SHORT_DATA: usize = 255;

    /// Creates a new APDU command without an `Le` byte.
    ///
    /// # Example
    ///
    /// ```
    /// use nfcsigner_core::card::Apdu;
    ///
    /// let apdu = Apdu::new(0x00, 0x20, 0x00, 0x81, b"1234".to_vec());
    /// assert_eq!(apdu.le(), 0);
    /// ```
    #[must_use]
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8, data: Vec<u8>) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data,
            le: 0,
        }
    }

    /// Creates a new APDU command with an expected response length.
    ///
    /// `le` of 256 is encoded as `0x00` ("as much as available").
    #[must_use]
    pub const fn with_le(cla: u8, ins: u8, p1: u8, p2: u8, data: Vec<u8>, le: u16) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data,
            le,
        }
    }

    /// Returns the class byte.
    #[must_use]
    pub const fn cla(&self) -> u8 {
        self.cla
    }

    /// Returns the instruction byte.
    #[must_use]
    pub const fn ins(&self) -> u8 {
        self.ins
    }

    /// Returns parameter 1.
    #[must_use]
    pub const fn p1(&self) -> u8 {
        self.p1
    }

    /// Returns parameter 2.
    #[must_use]
    pub const fn p2(&self) -> u8 {
        self.p2
    }

    /// Returns the command data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the expected response length.
    #[must_use]
    pub const fn le(&self) -> u16 {
        self.le
    }

    /// Serializes the APDU.
    ///
    /// Short form is used while the data fits in one `Lc` byte and `Le` is
    /// at most 256; otherwise `Lc` and `Le` switch to the three-byte
    /// extended form.
    ///
    /// # Example
    ///
    /// ```
    /// use nfcsigner_core::card::Apdu;
    ///
    /// let apdu = Apdu::with_le(0x00, 0xCA, 0x7F, 0x21, vec![], 256);
    /// assert_eq!(apdu.to_bytes(), vec![0x00, 0xCA, 0x7F, 0x21, 0x00]);
    /// ```
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(5 + self.data.len() + 3);

        bytes.extend_from_slice(&[self.cla, self.ins, self.p1, self.p2]);

        let use_extended = self.data.len() > Self::MAX_SHORT_DATA || self.le > 256;

        if use_extended {
            if !self.data.is_empty() {
                bytes.push(0x00); // Extended Lc marker
                bytes.push((self.data.len() >> 8) as u8);
                bytes.push(self.data.len() as u8);
                bytes.extend_from_slice(&self.data);
            }
            if self.le > 0 {
                if self.data.is_empty() {
                    bytes.push(0x00); // Extended Le marker
                }
                bytes.extend_from_slice(&self.le.to_be_bytes());
            }
        } else {
            if !self.data.is_empty() {
                bytes.push(self.data.len() as u8);
                bytes.extend_from_slice(&self.data);
            }
            if self.le > 0 {
                bytes.push(if self.le == 256 { 0x00 } else { self.le as u8 });
            }
        }

        bytes
    }
}

/// An APDU response from a smart card.
///
/// Equality is structural: two responses are equal when their data and
/// status bytes are equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ApduResponse {
    /// Response data.
    data: Vec<u8>,

    /// Status word 1.
    sw1: u8,

    /// Status word 2.
    sw2: u8,
}

impl ApduResponse {
    /// Success status word (0x9000).
    pub const SW_SUCCESS: u16 = 0x9000;

    /// `SW1` signalling that more response data can be fetched.
    pub const SW1_MORE_DATA: u8 = 0x61;

    /// `SW1` of a failed verification carrying a retry counter.
    pub const SW1_VERIFY_FAILED: u8 = 0x63;

    /// Parses raw response bytes.
    ///
    /// A frame shorter than two bytes decodes to an empty response with
    /// status `00 00`; otherwise the last two bytes are `SW1 SW2` and the
    /// rest is data.
    ///
    /// # Example
    ///
    /// ```
    /// use nfcsigner_core::card::ApduResponse;
    ///
    /// let short = ApduResponse::parse(&[0x90]);
    /// assert!(short.data().is_empty());
    /// assert_eq!(short.status_word(), 0x0000);
    /// ```
    #[must_use]
    pub fn parse(bytes: &[u8]) -> Self {
        match bytes {
            [data @ .., sw1, sw2] => Self {
                data: data.to_vec(),
                sw1: *sw1,
                sw2: *sw2,
            },
            _ => Self::default(),
        }
    }

    /// Creates a response from its parts.
    #[must_use]
    pub const fn from_parts(data: Vec<u8>, sw1: u8, sw2: u8) -> Self {
        Self { data, sw1, sw2 }
    }

    /// Returns the response data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the response and returns the data.
    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Returns status word 1.
    #[must_use]
    pub const fn sw1(&self) -> u8 {
        self.sw1
    }

    /// Returns status word 2.
    #[must_use]
    pub const fn sw2(&self) -> u8 {
        self.sw2
    }

    /// Returns the full status word as a [`u16`].
    #[must_use]
    pub const fn status_word(&self) -> u16 {
        ((self.sw1 as u16) << 8) | (self.sw2 as u16)
    }

    /// Checks if the response indicates success (`SW = 0x9000`).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status_word() == Self::SW_SUCCESS
    }

    /// Checks if more data is available (`SW1 = 0x61`).
    #[must_use]
    pub const fn has_more_data(&self) -> bool {
        self.sw1 == Self::SW1_MORE_DATA
    }

    /// Returns the number of remaining bytes if more data is available.
    #[must_use]
    pub const fn remaining_bytes(&self) -> Option<u8> {
        if self.has_more_data() {
            Some(self.sw2)
        } else {
            None
        }
    }

    /// Checks if this is an empty frame carrying neither success nor
    /// "more data".
    ///
    /// Composite USB readers occasionally return these for a continuation.
    #[must_use]
    pub fn is_spurious_empty(&self) -> bool {
        self.data.is_empty() && self.sw1 != 0x90 && !self.has_more_data()
    }

    /// Returns the remaining PIN tries encoded in a `63 Cx` status.
    ///
    /// Any other status yields 0.
    #[must_use]
    pub const fn pin_tries_left(&self) -> u8 {
        if self.sw1 == Self::SW1_VERIFY_FAILED && self.sw2 >= 0xC0 {
            self.sw2 - 0xC0
        } else {
            0
        }
    }

    /// Appends `next`'s data and adopts its status word.
    pub(crate) fn absorb(&mut self, next: Self) {
        self.data.extend_from_slice(&next.data);
        self.sw1 = next.sw1;
        self.sw2 = next.sw2;
    }

    /// Returns the data if successful, otherwise a status-word error
    /// naming `operation`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StatusWord`] if the status is not `0x9000`.
    pub fn into_result(self, operation: &'static str) -> Result<Vec<u8>> {
        if self.is_success() {
            Ok(self.data)
        } else {
            Err(Error::StatusWord {
                operation,
                sw1: self.sw1,
                sw2: self.sw2,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apdu_new() {
        let apdu = Apdu::new(0x00, 0xA4, 0x04, 0x00, vec![0xA0, 0x00]);

        assert_eq!(apdu.cla(), 0x00);
        assert_eq!(apdu.ins(), 0xA4);
        assert_eq!(apdu.p1(), 0x04);
        assert_eq!(apdu.p2(), 0x00);
        assert_eq!(apdu.data(), &[0xA0, 0x00]);
        assert_eq!(apdu.le(), 0);
    }

    #[test]
    fn apdu_to_bytes_short() {
        let apdu = Apdu::new(0x00, 0xA4, 0x04, 0x00, vec![0xA0, 0x00]);
        assert_eq!(apdu.to_bytes(), vec![0x00, 0xA4, 0x04, 0x00, 0x02, 0xA0, 0x00]);
    }

    #[test]
    fn apdu_to_bytes_no_data() {
        let apdu = Apdu::new(0x00, 0xA4, 0x04, 0x00, vec![]);
        assert_eq!(apdu.to_bytes(), vec![0x00, 0xA4, 0x04, 0x00]);
    }

    #[test]
    fn apdu_to_bytes_with_le() {
        let apdu = Apdu::with_le(0x00, 0xC0, 0x00, 0x00, vec![], 0x40);
        assert_eq!(apdu.to_bytes(), vec![0x00, 0xC0, 0x00, 0x00, 0x40]);

        // Le = 256 is encoded as 0x00 in short form
        let apdu = Apdu::with_le(0x00, 0x2A, 0x9E, 0x9A, vec![0x01], 256);
        assert_eq!(apdu.to_bytes(), vec![0x00, 0x2A, 0x9E, 0x9A, 0x01, 0x01, 0x00]);
    }

    #[test]
    fn apdu_to_bytes_extended() {
        let apdu = Apdu::new(0x00, 0x2A, 0x9E, 0x9A, vec![0xAB; 300]);
        let bytes = apdu.to_bytes();

        assert_eq!(bytes.len(), 4 + 3 + 300);
        assert_eq!(&bytes[..7], &[0x00, 0x2A, 0x9E, 0x9A, 0x00, 0x01, 0x2C]);
        assert!(bytes[7..].iter().all(|&b| b == 0xAB));

        let apdu = Apdu::with_le(0x00, 0x2A, 0x9E, 0x9A, vec![0x01; 256], 256);
        let bytes = apdu.to_bytes();
        assert_eq!(&bytes[4..7], &[0x00, 0x01, 0x00]);
        assert_eq!(&bytes[bytes.len() - 2..], &[0x01, 0x00]);

        let apdu = Apdu::with_le(0x00, 0xCA, 0x7F, 0x21, vec![], 1024);
        assert_eq!(apdu.to_bytes(), vec![0x00, 0xCA, 0x7F, 0x21, 0x00, 0x04, 0x00]);
    }

    #[test]
    fn response_parse() {
        let response = ApduResponse::parse(&[0x01, 0x02, 0x03, 0x90, 0x00]);

        assert_eq!(response.data(), &[0x01, 0x02, 0x03]);
        assert_eq!(response.sw1(), 0x90);
        assert_eq!(response.sw2(), 0x00);
        assert!(response.is_success());
    }

    #[test]
    fn response_parse_short_frames() {
        assert_eq!(ApduResponse::parse(&[]), ApduResponse::from_parts(vec![], 0, 0));
        assert_eq!(ApduResponse::parse(&[0x90]), ApduResponse::from_parts(vec![], 0, 0));
    }

    #[test]
    fn only_9000_is_success() {
        assert!(ApduResponse::parse(&[0x90, 0x00]).is_success());
        assert!(!ApduResponse::parse(&[0x90, 0x01]).is_success());
        assert!(!ApduResponse::parse(&[0x91, 0x00]).is_success());
        assert!(!ApduResponse::parse(&[0x61, 0x00]).is_success());
        assert!(!ApduResponse::parse(&[0x00, 0x90]).is_success());
    }

    #[test]
    fn response_more_data() {
        let response = ApduResponse::parse(&[0x61, 0x10]);

        assert!(!response.is_success());
        assert!(response.has_more_data());
        assert_eq!(response.remaining_bytes(), Some(0x10));
    }

    #[test]
    fn spurious_empty_frames() {
        assert!(ApduResponse::parse(&[]).is_spurious_empty());
        assert!(ApduResponse::parse(&[0x6F, 0x00]).is_spurious_empty());
        assert!(!ApduResponse::parse(&[0x90, 0x00]).is_spurious_empty());
        assert!(!ApduResponse::parse(&[0x61, 0x20]).is_spurious_empty());
        assert!(!ApduResponse::parse(&[0xAA, 0x6F, 0x00]).is_spurious_empty());
    }

    #[test]
    fn pin_tries_left() {
        assert_eq!(ApduResponse::parse(&[0x63, 0xC3]).pin_tries_left(), 3);
        assert_eq!(ApduResponse::parse(&[0x63, 0xC0]).pin_tries_left(), 0);
        assert_eq!(ApduResponse::parse(&[0x63, 0x00]).pin_tries_left(), 0);
        assert_eq!(ApduResponse::parse(&[0x69, 0x83]).pin_tries_left(), 0);
    }

    #[test]
    fn into_result() {
        let ok = ApduResponse::parse(&[0xAB, 0x90, 0x00]).into_result("read");
        assert_eq!(ok.unwrap(), vec![0xAB]);

        let err = ApduResponse::parse(&[0x6A, 0x82]).into_result("read").unwrap_err();
        assert_eq!(err.status_word(), Some((0x6A, 0x82)));
    }

    #[test]
    fn absorb_keeps_final_status() {
        let mut first = ApduResponse::parse(&[0x01, 0x61, 0x02]);
        first.absorb(ApduResponse::parse(&[0x02, 0x03, 0x90, 0x00]));

        assert_eq!(first.data(), &[0x01, 0x02, 0x03]);
        assert!(first.is_success());
    }
}
