//! `GET RESPONSE` chaining.
//!
//! A card answering `61 xx` has more data waiting. The [`Reassembler`]
//! keeps issuing `GET RESPONSE` with `Le = xx`, appending each frame's data,
//! until the status is anything other than `61`. The last status pair is
//! authoritative, so callers never observe an intermediate `61 xx`.
//!
//! Continuation frames that come back empty with neither `90` nor `61`, or
//! that go unanswered ([`Error::is_transient`](crate::Error::is_transient)), are retried a bounded
//! number of times with linearly increasing backoff. Composite USB readers
//! produce these when another interface of the same chip disturbs the card.
//! Any other transport error ends the chain at once and is returned as is.

use std::thread;

use super::apdu::{Apdu, ApduResponse};
use super::command;
use crate::config::ReassemblerConfig;
use crate::error::Result;
use crate::logging::DebugLog;

/// Turns a possibly chained exchange into one logical response.
#[derive(Debug, Clone, Copy)]
pub struct Reassembler {
    config: ReassemblerConfig,
    log: DebugLog,
}

impl Reassembler {
    /// Creates a reassembler.
    #[must_use]
    pub const fn new(config: ReassemblerConfig, log: DebugLog) -> Self {
        Self { config, log }
    }

    /// Follows `initial` through any `61 xx` continuations.
    ///
    /// `exchange` performs one protocol round trip for a `GET RESPONSE`
    /// command. A non-chained `initial` is returned unchanged without
    /// calling it.
    ///
    /// # Errors
    ///
    /// Propagates a transient transport error once retries are exhausted, and
    /// any other transport error immediately.
    pub fn complete<F>(&self, initial: ApduResponse, mut exchange: F) -> Result<ApduResponse>
    where
        F: FnMut(&Apdu) -> Result<ApduResponse>,
    {
        let mut response = initial;
        let mut rounds = 0u32;

        while let Some(remaining) = response.remaining_bytes() {
            rounds += 1;
            self.log.debug(format_args!(
                "chained response, fetching {remaining:#04x} more bytes (round {rounds})"
            ));
            let next = self.continuation(&command::get_response(remaining), &mut exchange)?;
            response.absorb(next);
        }

        Ok(response)
    }

    fn continuation<F>(&self, get_response: &Apdu, exchange: &mut F) -> Result<ApduResponse>
    where
        F: FnMut(&Apdu) -> Result<ApduResponse>,
    {
        let max = self.config.max_empty_retries;
        let mut attempt = 0u32;

        loop {
            match exchange(get_response) {
                Ok(frame) if frame.is_spurious_empty() && attempt < max => {
                    attempt += 1;
                    self.log.debug(format_args!(
                        "empty continuation frame (SW={:04X}), retry {attempt}/{max}",
                        frame.status_word()
                    ));
                }
                Ok(frame) => return Ok(frame),
                Err(err) if err.is_transient() && attempt < max => {
                    attempt += 1;
                    self.log
                        .debug(format_args!("continuation failed ({err}), retry {attempt}/{max}"));
                }
                Err(err) => return Err(err),
            }
            thread::sleep(self.config.retry_backoff * attempt);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use super::*;
    use crate::error::Error;

    fn reassembler() -> Reassembler {
        Reassembler::new(
            ReassemblerConfig {
                max_empty_retries: 2,
                retry_backoff: Duration::ZERO,
            },
            DebugLog::disabled("test"),
        )
    }

    fn scripted(frames: Vec<Result<ApduResponse>>) -> (VecDeque<Result<ApduResponse>>, Vec<Vec<u8>>) {
        (frames.into_iter().collect(), Vec::new())
    }

    #[test]
    fn non_chained_response_is_untouched() {
        let initial = ApduResponse::parse(&[0x01, 0x90, 0x00]);
        let mut calls = 0;

        let result = reassembler()
            .complete(initial.clone(), |_| {
                calls += 1;
                Ok(ApduResponse::default())
            })
            .unwrap();

        assert_eq!(result, initial);
        assert_eq!(calls, 0);
    }

    #[test]
    fn concatenates_chain_in_order() {
        let (mut frames, mut sent) = scripted(vec![
            Ok(ApduResponse::parse(&[0xB1, 0xB2, 0x61, 0x10])),
            Ok(ApduResponse::parse(&[0xC1, 0x90, 0x00])),
        ]);
        let initial = ApduResponse::parse(&[0xA1, 0x61, 0x40]);

        let result = reassembler()
            .complete(initial, |cmd| {
                sent.push(cmd.to_bytes());
                frames.pop_front().unwrap()
            })
            .unwrap();

        assert_eq!(result.data(), &[0xA1, 0xB1, 0xB2, 0xC1]);
        assert!(result.is_success());
        assert_eq!(
            sent,
            vec![vec![0x00, 0xC0, 0x00, 0x00, 0x40], vec![0x00, 0xC0, 0x00, 0x00, 0x10]]
        );
    }

    #[test]
    fn final_error_status_is_authoritative() {
        let initial = ApduResponse::parse(&[0xA1, 0x61, 0x02]);
        let result = reassembler()
            .complete(initial, |_| Ok(ApduResponse::parse(&[0xB1, 0x6A, 0x82])))
            .unwrap();

        assert_eq!(result.data(), &[0xA1, 0xB1]);
        assert_eq!(result.status_word(), 0x6A82);
    }

    #[test]
    fn retries_spurious_empty_frame() {
        let (mut frames, _) = scripted(vec![
            Ok(ApduResponse::parse(&[])),
            Ok(ApduResponse::parse(&[0xB1, 0x90, 0x00])),
        ]);
        let mut calls = 0;

        let result = reassembler()
            .complete(ApduResponse::parse(&[0x61, 0x01]), |_| {
                calls += 1;
                frames.pop_front().unwrap()
            })
            .unwrap();

        assert_eq!(calls, 2);
        assert_eq!(result.data(), &[0xB1]);
        assert!(result.is_success());
    }

    #[test]
    fn accepts_empty_frame_after_retries() {
        let mut calls = 0;
        let result = reassembler()
            .complete(ApduResponse::parse(&[0xAA, 0x61, 0x01]), |_| {
                calls += 1;
                Ok(ApduResponse::parse(&[0x6F, 0x00]))
            })
            .unwrap();

        assert_eq!(calls, 3);
        assert_eq!(result.data(), &[0xAA]);
        assert_eq!(result.status_word(), 0x6F00);
    }

    #[test]
    fn recovers_from_unanswered_continuation() {
        let (mut frames, _) = scripted(vec![
            Err(Error::NoResponse),
            Ok(ApduResponse::parse(&[0xB1, 0x90, 0x00])),
        ]);

        let result = reassembler()
            .complete(ApduResponse::parse(&[0x61, 0x01]), |_| frames.pop_front().unwrap())
            .unwrap();

        assert!(result.is_success());
    }

    #[test]
    fn fatal_error_is_returned_without_retry() {
        let mut calls = 0;
        let err = reassembler()
            .complete(ApduResponse::parse(&[0x61, 0x01]), |_| {
                calls += 1;
                Err(Error::TruncatedBlock {
                    declared: 10,
                    received: 4,
                })
            })
            .unwrap_err();

        assert_eq!(calls, 1);
        assert!(matches!(
            err,
            Error::TruncatedBlock {
                declared: 10,
                received: 4
            }
        ));
    }

    #[test]
    fn propagates_error_after_retries() {
        let mut calls = 0;
        let err = reassembler()
            .complete(ApduResponse::parse(&[0x61, 0x01]), |_| {
                calls += 1;
                Err(Error::NoResponse)
            })
            .unwrap_err();

        assert_eq!(calls, 3);
        assert!(matches!(err, Error::NoResponse));
    }
}
