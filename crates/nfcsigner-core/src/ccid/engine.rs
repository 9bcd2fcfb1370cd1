//! The CCID protocol engine.
//!
//! [`CcidEngine`] drives one logical CCID session over a [`BulkPipe`]:
//!
//! ```text
//! Idle -> PoweredOn -> (Exchanging)* -> PoweredOff -> PoweredOn ...
//!                           |
//!                           +-> Faulted (power cycle required)
//! ```
//!
//! Beyond framing it handles the parts of the protocol that misbehaving
//! readers exercise: stale bytes left in the IN pipe, blocks split across
//! several bulk transfers, time extension requests, chained data blocks and
//! empty ATRs from composite devices.

use std::thread;

use super::message::{
    self, CcidBlock, CcidHeader, CommandStatus, HEADER_LEN, IccStatus, message_type, slot_error,
};
use super::pipe::BulkPipe;
use crate::config::CcidConfig;
use crate::error::{Error, Result};
use crate::logging::DebugLog;

/// Power state of a CCID session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Never powered.
    Idle,

    /// Card powered, no exchange yet.
    PoweredOn,

    /// At least one APDU exchanged since power-on.
    Exchanging,

    /// Card powered off.
    PoweredOff,

    /// A fatal error occurred; the card must be power cycled.
    Faulted,
}

/// USB CCID protocol engine.
#[derive(Debug)]
pub struct CcidEngine<P> {
    pipe: P,
    config: CcidConfig,
    state: EngineState,
    sequence: u8,
    log: DebugLog,
}

impl<P: BulkPipe> CcidEngine<P> {
    /// Creates an idle engine on `pipe`.
    #[must_use]
    pub const fn new(pipe: P, config: CcidConfig, log: DebugLog) -> Self {
        Self {
            pipe,
            config,
            state: EngineState::Idle,
            sequence: 0,
            log,
        }
    }

    /// Returns the session state.
    #[must_use]
    pub const fn state(&self) -> EngineState {
        self.state
    }

    /// Checks if the card is powered and usable.
    #[must_use]
    pub const fn is_powered(&self) -> bool {
        matches!(self.state, EngineState::PoweredOn | EngineState::Exchanging)
    }

    /// Returns the sequence number the next message will carry.
    #[must_use]
    pub const fn next_sequence_number(&self) -> u8 {
        self.sequence
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &CcidConfig {
        &self.config
    }

    /// Returns the pipe.
    #[must_use]
    pub const fn pipe(&self) -> &P {
        &self.pipe
    }

    /// Consumes the engine and returns the pipe.
    #[must_use]
    pub fn into_pipe(self) -> P {
        self.pipe
    }

    fn next_sequence(&mut self) -> u8 {
        let seq = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        seq
    }

    /// Discards stale bytes from the IN pipe and restarts sequencing at 0.
    pub fn reset_pipe(&mut self) {
        let discarded = self.drain();
        if discarded > 0 {
            self.log
                .debug(format_args!("drained {discarded} stale bytes from IN pipe"));
        }
        self.sequence = 0;
    }

    /// Reads with a short timeout until nothing arrives. Returns the number
    /// of bytes discarded.
    fn drain(&mut self) -> usize {
        let mut buf = vec![0u8; self.config.read_size.max(HEADER_LEN)];
        let mut discarded = 0;

        for _ in 0..self.config.max_drain_reads {
            match self.pipe.read_bulk(&mut buf, self.config.drain_timeout) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    self.log.frame("drain", &buf[..n]);
                    discarded += n;
                }
            }
        }
        discarded
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.log.frame("->", bytes);
        let sent = self.pipe.write_bulk(bytes, self.config.send_timeout)?;
        if sent == bytes.len() {
            Ok(())
        } else {
            Err(Error::ShortWrite {
                sent,
                expected: bytes.len(),
            })
        }
    }

    /// Reads one CCID block, issuing further bulk reads until the declared
    /// payload length has arrived.
    ///
    /// # Errors
    ///
    /// - [`Error::NoResponse`] if the first read delivers nothing
    /// - [`Error::MalformedCcidMessage`] if the first read is shorter than a
    ///   header, or the header declares more than
    ///   [`CcidConfig::max_block_length`] bytes
    /// - [`Error::TruncatedBlock`] if a continuation read stops early
    pub fn read_block(&mut self) -> Result<CcidBlock> {
        let read_size = self.config.read_size.max(HEADER_LEN);
        let mut buf = vec![0u8; read_size];

        let received = self.pipe.read_bulk(&mut buf, self.config.receive_timeout)?;
        if received == 0 {
            return Err(Error::NoResponse);
        }
        let header = CcidHeader::parse(&buf[..received])?;

        let limit = self.config.max_block_length;
        let total = usize::try_from(header.length())
            .ok()
            .filter(|&declared| declared <= limit)
            .and_then(|declared| declared.checked_add(HEADER_LEN))
            .ok_or_else(|| {
                Error::MalformedCcidMessage(format!(
                    "declared length {} exceeds {limit} bytes",
                    header.length()
                ))
            })?;
        let mut assembled = buf[..received].to_vec();

        while assembled.len() < total {
            let mut extra = vec![0u8; read_size];
            match self.pipe.read_bulk(&mut extra, self.config.receive_timeout) {
                Ok(0) => break,
                Ok(n) => assembled.extend_from_slice(&extra[..n]),
                Err(err) => {
                    self.log.debug(format_args!("continuation read failed: {err}"));
                    break;
                }
            }
        }
        self.log.frame("<-", &assembled);

        if assembled.len() < total {
            return Err(Error::TruncatedBlock {
                declared: total - HEADER_LEN,
                received: assembled.len() - HEADER_LEN,
            });
        }

        assembled.truncate(total);
        let payload = assembled.split_off(HEADER_LEN);
        Ok(CcidBlock::new(header, payload))
    }

    /// Reads the reply to the message sent with `sequence`, absorbing time
    /// extension requests and rejecting fatal slot states.
    ///
    /// Blocks carrying another sequence number are left over from an earlier
    /// exchange and are discarded, at most [`CcidConfig::max_drain_reads`]
    /// of them.
    fn read_reply(&mut self, sequence: u8) -> Result<CcidBlock> {
        let mut extensions = 0u32;
        let mut discarded = 0usize;

        loop {
            let block = self.read_block()?;
            let header = *block.header();

            if header.sequence() != sequence {
                discarded += 1;
                if discarded > self.config.max_drain_reads {
                    return Err(Error::UnexpectedSequence {
                        expected: sequence,
                        received: header.sequence(),
                    });
                }
                self.log.warn(format_args!(
                    "discarding block with sequence {}, expected {sequence}",
                    header.sequence()
                ));
                continue;
            }

            match header.icc_status() {
                IccStatus::Active => {}
                IccStatus::Inactive => return Err(Error::IccInactive),
                IccStatus::NotPresent | IccStatus::Reserved => return Err(Error::IccNotPresent),
            }

            match header.command_status() {
                CommandStatus::Ok => return Ok(block),
                CommandStatus::TimeExtension => {
                    extensions += 1;
                    if extensions > self.config.max_time_extensions {
                        return Err(Error::TimeExtensionLimit(self.config.max_time_extensions));
                    }
                    self.log.debug(format_args!(
                        "time extension {extensions}/{} requested",
                        self.config.max_time_extensions
                    ));
                }
                CommandStatus::Failed | CommandStatus::Reserved => {
                    self.log.debug(format_args!(
                        "slot error {:#04x}: {}",
                        header.error(),
                        slot_error::describe(header.error())
                    ));
                    return Err(Error::CcidCommandFailed {
                        status: header.status(),
                        error: header.error(),
                    });
                }
            }
        }
    }

    /// Powers the card on and returns its ATR.
    ///
    /// The IN pipe is drained and the sequence counter reset first.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the reader does not answer with an
    /// active data block. The engine is then [`EngineState::Faulted`].
    pub fn power_on(&mut self) -> Result<Vec<u8>> {
        self.reset_pipe();

        let result = self.try_power_on();
        self.state = match result {
            Ok(_) => EngineState::PoweredOn,
            Err(_) => EngineState::Faulted,
        };
        result
    }

    fn try_power_on(&mut self) -> Result<Vec<u8>> {
        let seq = self.next_sequence();
        self.send(&message::power_on(seq))?;

        let block = self.read_reply(seq)?;
        let kind = block.header().message_type();
        if kind != message_type::RDR_TO_PC_DATA_BLOCK {
            return Err(Error::UnexpectedMessageType(kind));
        }

        let atr = block.into_payload();
        self.log
            .debug(format_args!("ATR ({} bytes): {}", atr.len(), hex::encode(&atr)));
        Ok(atr)
    }

    /// Powers the card on, power cycling while the ATR is empty.
    ///
    /// After [`CcidConfig::atr_retries`] cycles an empty ATR is accepted:
    /// some composite readers never report one yet work normally.
    ///
    /// # Errors
    ///
    /// Propagates the first power-on failure.
    pub fn power_on_with_retry(&mut self) -> Result<Vec<u8>> {
        let mut atr = self.power_on()?;
        let mut attempt = 0;

        while atr.is_empty() && attempt < self.config.atr_retries {
            attempt += 1;
            self.log.debug(format_args!(
                "empty ATR, power cycling ({attempt}/{})",
                self.config.atr_retries
            ));
            self.power_off();
            thread::sleep(self.config.atr_retry_delay);
            atr = self.power_on()?;
        }

        if atr.is_empty() {
            self.log.warn(format_args!("proceeding with empty ATR"));
        }
        Ok(atr)
    }

    /// Powers the card off. Best effort: failures are logged, never returned.
    pub fn power_off(&mut self) {
        let seq = self.next_sequence();
        match self.send(&message::power_off(seq)) {
            Ok(()) => {
                if let Err(err) = self.read_block() {
                    self.log.debug(format_args!("power-off reply ignored: {err}"));
                }
            }
            Err(err) => self.log.debug(format_args!("power-off not sent: {err}")),
        }
        self.drain();
        self.state = EngineState::PoweredOff;
    }

    /// Sends one APDU and returns the complete response bytes.
    ///
    /// Chained data blocks are requested and concatenated before returning.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionFaulted`] if a previous exchange failed
    /// - [`Error::IccInactive`] if the card is not powered
    /// - [`Error::CardNeedsPowerCycle`] if the reader answers with a slot status
    /// - [`Error::NoResponse`] if nothing arrived within the receive timeout;
    ///   the session stays usable and a late reply is discarded by sequence
    /// - any other transport or chaining error; the engine is then faulted
    pub fn exchange(&mut self, apdu: &[u8]) -> Result<Vec<u8>> {
        match self.state {
            EngineState::PoweredOn | EngineState::Exchanging => {}
            EngineState::Faulted => return Err(Error::SessionFaulted),
            EngineState::Idle | EngineState::PoweredOff => return Err(Error::IccInactive),
        }

        self.state = EngineState::Exchanging;
        let result = self.transfer(apdu);
        match &result {
            Ok(_) => {}
            Err(err) if err.is_transient() => {
                self.log.debug(format_args!("exchange unanswered: {err}"));
            }
            Err(err) => {
                self.log.warn(format_args!("exchange failed, session faulted: {err}"));
                self.state = EngineState::Faulted;
            }
        }
        result
    }

    fn transfer(&mut self, apdu: &[u8]) -> Result<Vec<u8>> {
        let seq = self.next_sequence();
        self.send(&message::xfr_block(seq, apdu)?)?;
        let mut response = self.read_data_block(seq)?;

        let mut blocks = 1;
        while response.header().has_more_blocks() {
            if blocks >= self.config.max_chain_blocks {
                return Err(Error::ChainLimit(self.config.max_chain_blocks));
            }
            blocks += 1;
            self.log.debug(format_args!(
                "chained data block (bChainParameter={:#04x}), requesting block {blocks}",
                response.header().chain_parameter()
            ));

            let seq = self.next_sequence();
            self.send(&message::next_block_request(seq))?;
            response.append(self.read_data_block(seq)?);
        }

        Ok(response.into_payload())
    }

    fn read_data_block(&mut self, seq: u8) -> Result<CcidBlock> {
        let block = self.read_reply(seq)?;
        match block.header().message_type() {
            message_type::RDR_TO_PC_DATA_BLOCK => Ok(block),
            message_type::RDR_TO_PC_SLOT_STATUS => Err(Error::CardNeedsPowerCycle),
            other => Err(Error::UnexpectedMessageType(other)),
        }
    }
}
