//! Builders for the fixed command set.
//!
//! Every builder validates its input and returns an immutable [`Apdu`].
//! Validation failures never touch the card.

use super::apdu::Apdu;
use super::role::{KeyRole, KeySlot};
use crate::error::{Error, Result};

/// Instruction codes.
pub(crate) mod ins {
    /// `SELECT`.
    pub(crate) const SELECT: u8 = 0xA4;

    /// `VERIFY`.
    pub(crate) const VERIFY: u8 = 0x20;

    /// `PERFORM SECURITY OPERATION` (compute digital signature).
    pub(crate) const PSO: u8 = 0x2A;

    /// `GENERATE ASYMMETRIC KEY PAIR` (read mode).
    pub(crate) const GENERATE_ASYMMETRIC: u8 = 0x47;

    /// `SELECT DATA`.
    pub(crate) const SELECT_DATA: u8 = 0xA5;

    /// `GET DATA`.
    pub(crate) const GET_DATA: u8 = 0xCA;

    /// `GET RESPONSE`.
    pub(crate) const GET_RESPONSE: u8 = 0xC0;
}

/// Shortest and longest AID accepted by ISO 7816-5.
const AID_LEN: core::ops::RangeInclusive<usize> = 1..=16;

/// `Le` meaning "everything available".
const LE_MAX: u16 = 256;

/// Decodes a hex applet identifier.
///
/// # Errors
///
/// Returns [`Error::InvalidAid`] for odd-length, non-hex, empty or
/// over-long input.
///
/// # Example
///
/// ```
/// use nfcsigner_core::card::command::parse_aid;
///
/// assert_eq!(parse_aid("A0000000011000").unwrap(), vec![0xA0, 0, 0, 0, 0x01, 0x10, 0x00]);
/// assert!(parse_aid("A00").is_err());
/// ```
pub fn parse_aid(hex_aid: &str) -> Result<Vec<u8>> {
    let aid = hex::decode(hex_aid.trim()).map_err(|e| Error::InvalidAid(format!("{hex_aid:?}: {e}")))?;
    check_aid(&aid)?;
    Ok(aid)
}

fn check_aid(aid: &[u8]) -> Result<()> {
    if AID_LEN.contains(&aid.len()) {
        Ok(())
    } else {
        Err(Error::InvalidAid(format!("length {} outside 1..=16", aid.len())))
    }
}

fn check_data(data: &[u8]) -> Result<()> {
    if data.len() > Apdu::MAX_SHORT_DATA {
        return Err(Error::DataTooLong {
            len: data.len(),
            max: Apdu::MAX_SHORT_DATA,
        });
    }
    Ok(())
}

/// `SELECT` by AID: `00 A4 04 00 Lc AID 00`.
pub fn select_applet(aid: &[u8]) -> Result<Apdu> {
    check_aid(aid)?;
    Ok(Apdu::with_le(0x00, ins::SELECT, 0x04, 0x00, aid.to_vec(), LE_MAX))
}

/// `VERIFY` PIN: `00 20 00 81 Lc PIN`, PIN encoded as UTF-8.
pub fn verify_pin(pin: &str) -> Result<Apdu> {
    let pin_bytes = pin.as_bytes();
    if pin_bytes.is_empty() {
        return Err(Error::InvalidPin("PIN is empty".to_string()));
    }
    if pin_bytes.len() > Apdu::MAX_SHORT_DATA {
        return Err(Error::InvalidPin(format!("PIN is {} bytes long", pin_bytes.len())));
    }
    Ok(Apdu::new(0x00, ins::VERIFY, 0x00, 0x81, pin_bytes.to_vec()))
}

/// `COMPUTE DIGITAL SIGNATURE`: `00 2A 9E P2 Lc data 00`.
pub fn compute_signature(data: &[u8], slot: KeySlot) -> Result<Apdu> {
    check_data(data)?;
    Ok(Apdu::with_le(0x00, ins::PSO, 0x9E, slot.p2(), data.to_vec(), LE_MAX))
}

/// Read public key: `00 47 81 00 02 CRT 00`.
#[must_use]
pub fn get_public_key(role: KeyRole) -> Apdu {
    Apdu::with_le(
        0x00,
        ins::GENERATE_ASYMMETRIC,
        0x81,
        0x00,
        role.public_key_selector().to_vec(),
        LE_MAX,
    )
}

/// Select the certificate data object: `00 A5 02 04 06 60 04 5C 02 7F 21 00`.
#[must_use]
pub fn select_certificate(role: KeyRole) -> Apdu {
    Apdu::with_le(
        0x00,
        ins::SELECT_DATA,
        0x02,
        0x04,
        role.certificate_selector().to_vec(),
        LE_MAX,
    )
}

/// Read the selected certificate: `00 CA 7F 21 00`.
#[must_use]
pub fn get_certificate_data() -> Apdu {
    Apdu::with_le(0x00, ins::GET_DATA, 0x7F, 0x21, Vec::new(), LE_MAX)
}

/// `GET RESPONSE` for `remaining` bytes announced in `SW2` (0 = 256).
#[must_use]
pub fn get_response(remaining: u8) -> Apdu {
    let le = if remaining == 0 { LE_MAX } else { u16::from(remaining) };
    Apdu::with_le(0x00, ins::GET_RESPONSE, 0x00, 0x00, Vec::new(), le)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_applet_bytes() {
        let aid = parse_aid("A0000000011000").unwrap();
        let apdu = select_applet(&aid).unwrap();
        assert_eq!(
            apdu.to_bytes(),
            vec![0x00, 0xA4, 0x04, 0x00, 0x07, 0xA0, 0x00, 0x00, 0x00, 0x01, 0x10, 0x00, 0x00]
        );
    }

    #[test]
    fn select_applet_rejects_bad_aid() {
        assert!(matches!(select_applet(&[]), Err(Error::InvalidAid(_))));
        assert!(matches!(select_applet(&[0u8; 17]), Err(Error::InvalidAid(_))));
    }

    #[test]
    fn parse_aid_rejects_malformed_hex() {
        assert!(matches!(parse_aid("A0000"), Err(Error::InvalidAid(_))));
        assert!(matches!(parse_aid("ZZ"), Err(Error::InvalidAid(_))));
        assert!(matches!(parse_aid(""), Err(Error::InvalidAid(_))));
        assert_eq!(parse_aid(" a000 ").unwrap(), vec![0xA0, 0x00]);
    }

    #[test]
    fn verify_pin_bytes() {
        let apdu = verify_pin("12345678").unwrap();
        let mut expected = vec![0x00, 0x20, 0x00, 0x81, 0x08];
        expected.extend_from_slice(b"12345678");
        assert_eq!(apdu.to_bytes(), expected);
    }

    #[test]
    fn verify_pin_rejects_empty() {
        assert!(matches!(verify_pin(""), Err(Error::InvalidPin(_))));
    }

    #[test]
    fn compute_signature_bytes() {
        let apdu = compute_signature(&[0xDE, 0xAD], KeySlot::from_index(1)).unwrap();
        assert_eq!(apdu.to_bytes(), vec![0x00, 0x2A, 0x9E, 0x9B, 0x02, 0xDE, 0xAD, 0x00]);

        let apdu = compute_signature(&[0x01], KeySlot::from_index(7)).unwrap();
        assert_eq!(apdu.p2(), 0x9A);
    }

    #[test]
    fn compute_signature_rejects_long_data() {
        let err = compute_signature(&[0u8; 256], KeySlot::Default).unwrap_err();
        assert!(matches!(err, Error::DataTooLong { len: 256, max: 255 }));
    }

    #[test]
    fn public_key_bytes() {
        assert_eq!(
            get_public_key(KeyRole::Dec).to_bytes(),
            vec![0x00, 0x47, 0x81, 0x00, 0x02, 0xB8, 0x00, 0x00]
        );
    }

    #[test]
    fn certificate_bytes() {
        assert_eq!(
            select_certificate(KeyRole::Sig).to_bytes(),
            vec![0x00, 0xA5, 0x02, 0x04, 0x06, 0x60, 0x04, 0x5C, 0x02, 0x7F, 0x21, 0x00]
        );
        assert_eq!(get_certificate_data().to_bytes(), vec![0x00, 0xCA, 0x7F, 0x21, 0x00]);
    }

    #[test]
    fn get_response_bytes() {
        assert_eq!(get_response(0x40).to_bytes(), vec![0x00, 0xC0, 0x00, 0x00, 0x40]);
        assert_eq!(get_response(0x00).to_bytes(), vec![0x00, 0xC0, 0x00, 0x00, 0x00]);
    }
}
