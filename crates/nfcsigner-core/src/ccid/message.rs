//! CCID bulk message framing.
//!
//! Every CCID message is a 10-byte header followed by an optional payload:
//!
//! ```text
//! Offset  Size  Description
//! 0       1     Message type
//! 1       4     Payload length (little-endian)
//! 5       1     Slot number (always 0)
//! 6       1     Sequence number
//! 7       3     Message-specific parameters
//! 10      N     Payload
//! ```
//!
//! For reader-to-host messages the three parameter bytes are `bStatus`,
//! `bError` and, for `RDR_to_PC_DataBlock`, `bChainParameter`.

use core::fmt;

use crate::error::{Error, Result};

/// CCID header size in bytes.
pub const HEADER_LEN: usize = 10;

/// CCID message types.
pub mod message_type {
    /// PC to Reader: ICC power on.
    pub const PC_TO_RDR_ICC_POWER_ON: u8 = 0x62;

    /// PC to Reader: ICC power off.
    pub const PC_TO_RDR_ICC_POWER_OFF: u8 = 0x63;

    /// PC to Reader: Transfer block (send APDU).
    pub const PC_TO_RDR_XFR_BLOCK: u8 = 0x6F;

    /// Reader to PC: Data block (ATR or APDU response).
    pub const RDR_TO_PC_DATA_BLOCK: u8 = 0x80;

    /// Reader to PC: Slot status.
    pub const RDR_TO_PC_SLOT_STATUS: u8 = 0x81;
}

/// `bError` slot error codes from USB CCID rev 1.1.
pub mod slot_error {
    /// Command aborted by the host.
    pub const CMD_ABORTED: u8 = 0xFF;

    /// The card did not answer in time.
    pub const ICC_MUTE: u8 = 0xFE;

    /// Parity error while talking to the card.
    pub const XFR_PARITY_ERROR: u8 = 0xFD;

    /// The card sent more data than expected.
    pub const XFR_OVERRUN: u8 = 0xFC;

    /// Reader hardware error.
    pub const HW_ERROR: u8 = 0xFB;

    /// Bad ATR TS byte.
    pub const BAD_ATR_TS: u8 = 0xF8;

    /// Bad ATR TCK byte.
    pub const BAD_ATR_TCK: u8 = 0xF7;

    /// Protocol not supported by the card.
    pub const ICC_PROTOCOL_NOT_SUPPORTED: u8 = 0xF6;

    /// Voltage class not supported by the card.
    pub const ICC_CLASS_NOT_SUPPORTED: u8 = 0xF5;

    /// Procedure byte conflict.
    pub const PROCEDURE_BYTE_CONFLICT: u8 = 0xF4;

    /// Protocol deactivated.
    pub const DEACTIVATED_PROTOCOL: u8 = 0xF3;

    /// The reader is busy with an automatic sequence.
    pub const BUSY_WITH_AUTO_SEQUENCE: u8 = 0xF2;

    /// Slot busy with another command.
    pub const CMD_SLOT_BUSY: u8 = 0xE0;

    /// Command not supported.
    pub const CMD_NOT_SUPPORTED: u8 = 0x00;

    /// Returns a short description of a `bError` value.
    #[must_use]
    pub const fn describe(code: u8) -> &'static str {
        match code {
            CMD_ABORTED => "command aborted",
            ICC_MUTE => "card mute",
            XFR_PARITY_ERROR => "parity error",
            XFR_OVERRUN => "overrun",
            HW_ERROR => "hardware error",
            BAD_ATR_TS => "bad ATR TS",
            BAD_ATR_TCK => "bad ATR TCK",
            ICC_PROTOCOL_NOT_SUPPORTED => "protocol not supported",
            ICC_CLASS_NOT_SUPPORTED => "class not supported",
            PROCEDURE_BYTE_CONFLICT => "procedure byte conflict",
            DEACTIVATED_PROTOCOL => "deactivated protocol",
            BUSY_WITH_AUTO_SEQUENCE => "busy with auto sequence",
            CMD_SLOT_BUSY => "slot busy",
            CMD_NOT_SUPPORTED => "command not supported",
            _ => "unknown error",
        }
    }
}

/// `wLevelParameter` asking the reader for the next block of a chained response.
pub const LEVEL_REQUEST_NEXT: u16 = 0x0010;

/// ICC status from bits 1:0 of `bStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IccStatus {
    /// Card present and active.
    Active,

    /// Card present but inactive.
    Inactive,

    /// No card present.
    NotPresent,

    /// Reserved value 3.
    Reserved,
}

/// Command status from bits 7:6 of `bStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// Processed without error.
    Ok,

    /// Failed; `bError` holds the reason.
    Failed,

    /// The card asked for more time.
    TimeExtension,

    /// Reserved value 3.
    Reserved,
}

/// A parsed CCID message header.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CcidHeader {
    message_type: u8,
    length: u32,
    slot: u8,
    sequence: u8,
    params: [u8; 3],
}

impl fmt::Debug for CcidHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CcidHeader")
            .field("message_type", &format_args!("{:#04x}", self.message_type))
            .field("length", &self.length)
            .field("slot", &self.slot)
            .field("sequence", &self.sequence)
            .field("params", &format_args!("{:02x?}", self.params))
            .finish()
    }
}

impl CcidHeader {
    /// Creates a host-to-reader header for slot 0.
    #[must_use]
    pub const fn new(message_type: u8, length: u32, sequence: u8, params: [u8; 3]) -> Self {
        Self {
            message_type,
            length,
            slot: 0,
            sequence,
            params,
        }
    }

    /// Parses the first [`HEADER_LEN`] bytes of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedCcidMessage`] if fewer than 10 bytes are given.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let [message_type, l0, l1, l2, l3, slot, sequence, p0, p1, p2, ..] = *bytes else {
            return Err(Error::MalformedCcidMessage(format!(
                "header needs {HEADER_LEN} bytes, got {}",
                bytes.len()
            )));
        };

        Ok(Self {
            message_type,
            length: u32::from_le_bytes([l0, l1, l2, l3]),
            slot,
            sequence,
            params: [p0, p1, p2],
        })
    }

    /// Encodes the header.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0] = self.message_type;
        out[1..5].copy_from_slice(&self.length.to_le_bytes());
        out[5] = self.slot;
        out[6] = self.sequence;
        out[7..].copy_from_slice(&self.params);
        out
    }

    /// Returns the message type.
    #[must_use]
    pub const fn message_type(&self) -> u8 {
        self.message_type
    }

    /// Returns the declared payload length.
    #[must_use]
    pub const fn length(&self) -> u32 {
        self.length
    }

    /// Returns the slot number.
    #[must_use]
    pub const fn slot(&self) -> u8 {
        self.slot
    }

    /// Returns the sequence number.
    #[must_use]
    pub const fn sequence(&self) -> u8 {
        self.sequence
    }

    /// Returns the raw `bStatus` byte.
    #[must_use]
    pub const fn status(&self) -> u8 {
        self.params[0]
    }

    /// Returns the raw `bError` byte.
    #[must_use]
    pub const fn error(&self) -> u8 {
        self.params[1]
    }

    /// Returns `bChainParameter` of a data block.
    #[must_use]
    pub const fn chain_parameter(&self) -> u8 {
        self.params[2]
    }

    /// Decodes bits 1:0 of `bStatus`.
    #[must_use]
    pub const fn icc_status(&self) -> IccStatus {
        match self.status() & 0x03 {
            0 => IccStatus::Active,
            1 => IccStatus::Inactive,
            2 => IccStatus::NotPresent,
            _ => IccStatus::Reserved,
        }
    }

    /// Decodes bits 7:6 of `bStatus`.
    #[must_use]
    pub const fn command_status(&self) -> CommandStatus {
        match self.status() >> 6 {
            0 => CommandStatus::Ok,
            1 => CommandStatus::Failed,
            2 => CommandStatus::TimeExtension,
            _ => CommandStatus::Reserved,
        }
    }

    /// Checks if `bChainParameter` announces further blocks.
    ///
    /// `01` (begin) and `03` (continue) are followed by more data, as is
    /// `10` (empty block, continue). `00` and `02` end the chain.
    #[must_use]
    pub const fn has_more_blocks(&self) -> bool {
        matches!(self.chain_parameter(), 0x01 | 0x03 | 0x10)
    }

    /// Returns a copy with `length` replaced.
    #[must_use]
    pub const fn with_length(self, length: u32) -> Self {
        Self { length, ..self }
    }
}

/// A complete reader-to-host message: header plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CcidBlock {
    header: CcidHeader,
    payload: Vec<u8>,
}

impl CcidBlock {
    /// Creates a block. The header's length is set to the payload length.
    #[must_use]
    pub fn new(header: CcidHeader, payload: Vec<u8>) -> Self {
        let length = u32::try_from(payload.len()).unwrap_or(u32::MAX);
        Self {
            header: header.with_length(length),
            payload,
        }
    }

    /// Returns the header.
    #[must_use]
    pub const fn header(&self) -> &CcidHeader {
        &self.header
    }

    /// Returns the payload.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Appends the payload of the next chained block and adopts its
    /// status parameters.
    pub fn append(&mut self, next: Self) {
        self.payload.extend_from_slice(&next.payload);
        let length = u32::try_from(self.payload.len()).unwrap_or(u32::MAX);
        self.header = CcidHeader {
            length,
            ..next.header
        };
    }

    /// Consumes the block and returns the payload.
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Encodes the block as it would appear on the wire.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.extend_from_slice(&self.header.to_bytes());
        out.extend_from_slice(&self.payload);
        out
    }
}

fn encode(message_type: u8, sequence: u8, params: [u8; 3], payload: &[u8]) -> Result<Vec<u8>> {
    let length = u32::try_from(payload.len())
        .map_err(|_| Error::MalformedCcidMessage(format!("payload of {} bytes", payload.len())))?;
    let header = CcidHeader::new(message_type, length, sequence, params);

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// `PC_to_RDR_IccPowerOn` with automatic voltage selection.
#[must_use]
pub fn power_on(sequence: u8) -> [u8; HEADER_LEN] {
    CcidHeader::new(message_type::PC_TO_RDR_ICC_POWER_ON, 0, sequence, [0; 3]).to_bytes()
}

/// `PC_to_RDR_IccPowerOff`.
#[must_use]
pub fn power_off(sequence: u8) -> [u8; HEADER_LEN] {
    CcidHeader::new(message_type::PC_TO_RDR_ICC_POWER_OFF, 0, sequence, [0; 3]).to_bytes()
}

/// `PC_to_RDR_XfrBlock` carrying `apdu`, zero `bBWI` and level parameter.
///
/// # Errors
///
/// Returns [`Error::MalformedCcidMessage`] if `apdu` does not fit a 32-bit length.
pub fn xfr_block(sequence: u8, apdu: &[u8]) -> Result<Vec<u8>> {
    encode(message_type::PC_TO_RDR_XFR_BLOCK, sequence, [0; 3], apdu)
}

/// Empty `PC_to_RDR_XfrBlock` requesting the next block of a chained response.
#[must_use]
pub fn next_block_request(sequence: u8) -> [u8; HEADER_LEN] {
    let [lo, hi] = LEVEL_REQUEST_NEXT.to_le_bytes();
    CcidHeader::new(message_type::PC_TO_RDR_XFR_BLOCK, 0, sequence, [0, lo, hi]).to_bytes()
}
