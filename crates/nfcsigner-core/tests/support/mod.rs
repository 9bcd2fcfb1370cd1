//! Simulated card readers shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::time::Duration;

use nfcsigner_core::ccid::message::{HEADER_LEN, message_type};
use nfcsigner_core::ccid::{BulkPipe, CcidHeader};
use nfcsigner_core::{Apdu, ApduResponse, Error, Result, Transport};

/// Encodes a reader-to-host message.
pub fn reader_message(kind: u8, seq: u8, status: u8, error: u8, chain: u8, payload: &[u8]) -> Vec<u8> {
    let len = u32::try_from(payload.len()).unwrap();
    let mut out = CcidHeader::new(kind, len, seq, [status, error, chain])
        .to_bytes()
        .to_vec();
    out.extend_from_slice(payload);
    out
}

/// A successful `RDR_to_PC_DataBlock`.
pub fn data_block(seq: u8, payload: &[u8]) -> Vec<u8> {
    reader_message(message_type::RDR_TO_PC_DATA_BLOCK, seq, 0, 0, 0, payload)
}

/// A CCID reader on the far side of a bulk pipe.
///
/// Each write releases the next scripted group of IN transfers. Once the
/// script runs out, power-on is answered with a short ATR and every
/// XfrBlock with `90 00`. Transfers larger than the read buffer are
/// delivered across several reads.
#[derive(Default)]
pub struct SimulatedReader {
    script: VecDeque<Vec<Vec<u8>>>,
    available: VecDeque<Vec<u8>>,
    pub writes: Vec<Vec<u8>>,
    pub reads: usize,
    pub short_write: bool,
}

impl SimulatedReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the IN transfers answering the next write.
    pub fn then(mut self, transfers: Vec<Vec<u8>>) -> Self {
        self.script.push_back(transfers);
        self
    }

    /// Queues a single-transfer answer to the next write.
    pub fn then_one(self, transfer: Vec<u8>) -> Self {
        self.then(vec![transfer])
    }

    /// Leaves bytes in the IN pipe from an earlier session.
    pub fn with_stale(mut self, bytes: Vec<u8>) -> Self {
        self.available.push_back(bytes);
        self
    }

    /// Message types written so far.
    pub fn kinds(&self) -> Vec<u8> {
        self.writes.iter().map(|w| w[0]).collect()
    }

    /// Sequence numbers written so far.
    pub fn sequences(&self) -> Vec<u8> {
        self.writes.iter().map(|w| w[6]).collect()
    }

    /// APDUs carried by non-empty XfrBlocks.
    pub fn apdus(&self) -> Vec<Vec<u8>> {
        self.writes
            .iter()
            .filter(|w| w[0] == 0x6F && w.len() > HEADER_LEN)
            .map(|w| w[HEADER_LEN..].to_vec())
            .collect()
    }

    fn auto_reply(data: &[u8]) -> Vec<u8> {
        let header = CcidHeader::parse(data).unwrap();
        let payload: &[u8] = match header.message_type() {
            0x62 => &[0x3B, 0x80, 0x80, 0x01, 0x01],
            0x6F => &[0x90, 0x00],
            _ => &[],
        };
        data_block(header.sequence(), payload)
    }
}

impl BulkPipe for SimulatedReader {
    fn write_bulk(&mut self, data: &[u8], _timeout: Duration) -> Result<usize> {
        self.writes.push(data.to_vec());
        match self.script.pop_front() {
            Some(transfers) => self.available.extend(transfers),
            None => self.available.push_back(Self::auto_reply(data)),
        }
        if self.short_write {
            Ok(data.len() - 1)
        } else {
            Ok(data.len())
        }
    }

    fn read_bulk(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        self.reads += 1;
        let Some(mut chunk) = self.available.pop_front() else {
            return Ok(0);
        };
        if chunk.len() > buf.len() {
            let rest = chunk.split_off(buf.len());
            self.available.push_front(rest);
        }
        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }
}

/// An APDU-level card that answers from a queue and records every command.
#[derive(Default)]
pub struct RecordingCard {
    pub answers: VecDeque<Vec<u8>>,
    pub sent: Vec<Vec<u8>>,
    connected: bool,
}

impl RecordingCard {
    pub fn answering(answers: &[&[u8]]) -> Self {
        Self {
            answers: answers.iter().map(|a| a.to_vec()).collect(),
            ..Self::default()
        }
    }
}

impl Transport for RecordingCard {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
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
