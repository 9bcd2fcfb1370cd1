//! Request dispatch and reason-code mapping.

// Silence unused crate dependency warnings for test binary
use base64 as _;
use hex as _;
use serde as _;
use serde_json as _;
use thiserror as _;
use tracing as _;

use std::collections::VecDeque;
use std::time::Duration;

use nfcsigner_bridge::dispatch::{self, execute, execute_with_card, execute_with_usb};
use nfcsigner_bridge::{ErrorCode, ErrorDetails, Request, Response, SignedData};
use nfcsigner_core::ccid::{BulkPipe, CcidHeader};
use nfcsigner_core::transport::UsbReader;
use nfcsigner_core::{Apdu, ApduResponse, CardSession, Error, Result, SessionConfig, Transport};

const AID: &str = "A0000000011000";

/// A card answering from a queue.
#[derive(Default)]
struct QueueCard {
    answers: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    connected: bool,
    connects: usize,
}

impl QueueCard {
    fn answering(answers: &[&[u8]]) -> Self {
        Self {
            answers: answers.iter().map(|a| a.to_vec()).collect(),
            ..Self::default()
        }
    }

    fn instructions(&self) -> Vec<u8> {
        self.sent.iter().map(|apdu| apdu[1]).collect()
    }
}

impl Transport for QueueCard {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        self.connects += 1;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn transmit(&mut self, apdu: &Apdu) -> Result<ApduResponse> {
        self.sent.push(apdu.to_bytes());
        self.answers
            .pop_front()
            .map(|raw| ApduResponse::parse(&raw))
            .ok_or(Error::NoResponse)
    }
}

fn sign_request(pin: &str) -> Request {
    Request::GenerateSignature {
        applet_id: AID.into(),
        pin: pin.into(),
        data_to_sign: vec![0xAB; 32],
        key_index: 1,
    }
}

fn run(card: QueueCard, request: &Request) -> (nfcsigner_bridge::BridgeResult<Response>, QueueCard) {
    let mut session = CardSession::new(card);
    let result = execute(&mut session, request);
    (result, session.into_transport())
}

#[test]
fn signature_flow_returns_bytes() {
    let card = QueueCard::answering(&[&[0x90, 0x00], &[0x90, 0x00], &[0x01, 0x02, 0x03, 0x90, 0x00]]);
    let (result, card) = run(card, &sign_request("12345678"));

    assert_eq!(result.unwrap(), Response::Bytes(vec![0x01, 0x02, 0x03]));
    assert_eq!(card.instructions(), vec![0xA4, 0x20, 0x2A]);
    assert_eq!(card.sent[2][3], 0x9B);
}

#[test]
fn unselectable_applet_stops_the_flow() {
    let card = QueueCard::answering(&[&[0x6A, 0x82]]);
    let (result, card) = run(card, &sign_request("12345678"));

    let err = result.unwrap_err();
    assert_eq!(err.code(), ErrorCode::AppletNotSelected);
    assert_eq!(card.sent.len(), 1);
}

#[test]
fn rejected_pin_reports_tries_left() {
    let card = QueueCard::answering(&[&[0x90, 0x00], &[0x63, 0xC1]]);
    let (result, card) = run(card, &sign_request("0000"));

    let err = result.unwrap_err();
    assert_eq!(err.code(), ErrorCode::AuthError);
    assert_eq!(
        err.details(),
        Some(ErrorDetails {
            tries_left: Some(1),
            ..ErrorDetails::default()
        })
    );
    assert_eq!(card.instructions(), vec![0xA4, 0x20]);
}

#[test]
fn refused_signature_carries_status_word() {
    let card = QueueCard::answering(&[&[0x90, 0x00], &[0x90, 0x00], &[0x69, 0x82]]);
    let (result, _) = run(card, &sign_request("12345678"));

    let reply = result.unwrap_err().to_reply();
    assert_eq!(reply.code, ErrorCode::SigningError);
    let details = reply.details.unwrap();
    assert_eq!((details.sw1, details.sw2), (Some(0x69), Some(0x82)));
}

#[test]
fn bad_inputs_never_reach_the_card() {
    let requests = [
        Request::SelectAndVerify {
            applet_id: "A00".into(),
            pin: "1234".into(),
        },
        Request::SelectAndVerify {
            applet_id: "ZZ".into(),
            pin: "1234".into(),
        },
        Request::GetRsaPublicKey {
            applet_id: AID.into(),
            key_role: "xyz".into(),
        },
        Request::GetCertificate {
            applet_id: AID.into(),
            key_role: "SIG".into(),
        },
    ];

    for request in &requests {
        let (result, card) = run(QueueCard::default(), request);
        assert_eq!(result.unwrap_err().code(), ErrorCode::InvalidParameters);
        assert!(card.sent.is_empty(), "{request:?}");
    }
}

#[test]
fn public_key_for_role() {
    let card = QueueCard::answering(&[&[0x90, 0x00], &[0x7F, 0x49, 0x00, 0x90, 0x00]]);
    let request = Request::GetRsaPublicKey {
        applet_id: AID.into(),
        key_role: "aut".into(),
    };
    let (result, card) = run(card, &request);

    assert_eq!(result.unwrap(), Response::Bytes(vec![0x7F, 0x49, 0x00]));
    assert_eq!(card.sent[1], vec![0x00, 0x47, 0x81, 0x00, 0x02, 0xA4, 0x00, 0x00]);
}

#[test]
fn signature_with_certificate_is_base64() {
    let card = QueueCard::answering(&[
        &[0x90, 0x00],
        &[0x90, 0x00],
        &[0x01, 0x01, 0x01, 0x90, 0x00],
        &[0x90, 0x00],
        &[0x30, 0x82, 0x90, 0x00],
    ]);
    let request = Request::SignWithCertificate {
        applet_id: AID.into(),
        pin: "12345678".into(),
        data_to_sign: vec![0x42; 20],
        key_index: 0,
    };
    let (result, card) = run(card, &request);

    assert_eq!(
        result.unwrap(),
        Response::Signed(SignedData {
            certificate: "MII=".into(),
            signature: "AQEB".into(),
        })
    );
    assert_eq!(card.instructions(), vec![0xA4, 0x20, 0x2A, 0xA5, 0xCA]);
}

#[test]
fn missing_certificate_is_certificate_error() {
    let card = QueueCard::answering(&[
        &[0x90, 0x00],
        &[0x90, 0x00],
        &[0x01, 0x90, 0x00],
        &[0x6A, 0x82],
    ]);
    let request = Request::SignWithCertificate {
        applet_id: AID.into(),
        pin: "12345678".into(),
        data_to_sign: vec![0x42; 20],
        key_index: 0,
    };
    let (result, card) = run(card, &request);

    assert_eq!(result.unwrap_err().code(), ErrorCode::CertificateError);
    assert_eq!(card.sent.len(), 4);
}

#[test]
fn lost_card_is_communication_error() {
    let card = QueueCard::answering(&[&[0x90, 0x00]]);
    let (result, _) = run(card, &sign_request("12345678"));
    assert_eq!(result.unwrap_err().code(), ErrorCode::CommunicationError);
}

#[test]
fn card_channel_is_scoped_to_the_request() {
    let mut card = QueueCard::answering(&[&[0x90, 0x00], &[0x90, 0x00]]);
    let request = Request::SelectAndVerify {
        applet_id: AID.into(),
        pin: "12345678".into(),
    };

    let response = execute_with_card(&mut card, &SessionConfig::default(), &request).unwrap();
    assert_eq!(response, Response::Verified);
    assert_eq!(card.connects, 1);
    assert!(!card.is_connected());
}

#[test]
fn json_in_json_out() {
    let mut card = QueueCard::answering(&[
        &[0x90, 0x00],
        &[0x90, 0x00],
        &[0xDE, 0xAD, 0xBE, 0xEF, 0x90, 0x00],
    ]);
    let request = Request::from_json(
        r#"{"method":"getCertificate","arguments":{"appletID":"A0000000011000","keyRole":"sig"}}"#,
    )
    .unwrap();

    let response = execute_with_card(&mut card, &SessionConfig::default(), &request).unwrap();
    assert_eq!(response.to_json().unwrap(), r#"{"type":"bytes","value":"3q2+7w=="}"#);
}

/// A CCID reader that powers on (unless `dead`) and answers each
/// XfrBlock from a queue of APDU responses.
#[derive(Default)]
struct LoopbackReader {
    dead: bool,
    slot_status: bool,
    answers: VecDeque<Vec<u8>>,
    pending: VecDeque<Vec<u8>>,
    kinds: Vec<u8>,
}

impl LoopbackReader {
    fn reply(kind: u8, seq: u8, payload: &[u8]) -> Vec<u8> {
        let len = u32::try_from(payload.len()).unwrap();
        let mut out = CcidHeader::new(kind, len, seq, [0; 3]).to_bytes().to_vec();
        out.extend_from_slice(payload);
        out
    }
}

impl BulkPipe for LoopbackReader {
    fn write_bulk(&mut self, data: &[u8], _timeout: Duration) -> Result<usize> {
        let header = CcidHeader::parse(data)?;
        self.kinds.push(header.message_type());
        let seq = header.sequence();

        if !self.dead {
            let reply = match header.message_type() {
                0x62 => Self::reply(0x80, seq, &[0x3B, 0x00]),
                0x6F if self.slot_status => Self::reply(0x81, seq, &[]),
                0x6F => Self::reply(0x80, seq, &self.answers.pop_front().unwrap_or_default()),
                _ => Self::reply(0x81, seq, &[]),
            };
            self.pending.push_back(reply);
        }
        Ok(data.len())
    }

    fn read_bulk(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        match self.pending.pop_front() {
            Some(reply) => {
                buf[..reply.len()].copy_from_slice(&reply);
                Ok(reply.len())
            }
            None => Ok(0),
        }
    }
}

#[test]
fn usb_request_runs_in_its_own_session() {
    let pipe = LoopbackReader {
        answers: VecDeque::from([vec![0x90, 0x00], vec![0x90, 0x00], vec![0x0A, 0x90, 0x00]]),
        ..LoopbackReader::default()
    };
    let mut reader = UsbReader::new(pipe, SessionConfig::default());

    let response = execute_with_usb(&mut reader, &sign_request("12345678")).unwrap();
    assert_eq!(response, Response::Bytes(vec![0x0A]));
    assert_eq!(reader.pipe().kinds, vec![0x62, 0x6F, 0x6F, 0x6F, 0x63]);
}

#[test]
fn dead_reader_is_usb_connection_failure() {
    let pipe = LoopbackReader {
        dead: true,
        ..LoopbackReader::default()
    };
    let mut reader = UsbReader::new(pipe, SessionConfig::default());

    let err = execute_with_usb(&mut reader, &sign_request("12345678")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::UsbConnectionFailed);
}

#[test]
fn mid_session_failure_is_usb_comm_error() {
    let pipe = LoopbackReader {
        slot_status: true,
        ..LoopbackReader::default()
    };
    let mut reader = UsbReader::new(pipe, SessionConfig::default());

    let err = execute_with_usb(&mut reader, &sign_request("12345678")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::UsbCommError);
    assert_eq!(reader.pipe().kinds.last(), Some(&0x63));
}

#[test]
fn usb_auth_error_keeps_its_code() {
    let pipe = LoopbackReader {
        answers: VecDeque::from([vec![0x90, 0x00], vec![0x63, 0xC0]]),
        ..LoopbackReader::default()
    };
    let mut reader = UsbReader::new(pipe, SessionConfig::default());

    let err = dispatch::execute_with_usb(&mut reader, &sign_request("0000")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::AuthError);
}
