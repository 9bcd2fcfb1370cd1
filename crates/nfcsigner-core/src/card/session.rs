//! Card session management and operations.
//!
//! This module provides the [`CardSession`] type for running the signing
//! applet's command sequences over any [`Transport`]. It handles:
//!
//! - Applet selection
//! - PIN verification
//! - Signature generation
//! - Public key and certificate retrieval
//!
//! Every response is run through the [`Reassembler`] before it is
//! interpreted, so no operation ever sees an intermediate `61 xx`.
//!
//! # Example
//!
//! ```ignore
//! use nfcsigner_core::card::CardSession;
//!
//! let mut session = CardSession::new(transport);
//!
//! // Select the applet
//! session.select_applet(&aid)?;
//!
//! // Verify PIN
//! let outcome = session.verify_pin("12345678")?;
//!
//! // Sign with key 1
//! let signature = session.generate_signature(&digest_info, 1)?;
//! ```

use std::fmt;

use serde::Serialize;

use super::Transport;
use super::apdu::{Apdu, ApduResponse};
use super::command;
use super::reassembler::Reassembler;
use super::role::{KeyRole, KeySlot};
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::logging::DebugLog;

/// The outcome of a PIN verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PinVerification {
    /// Whether the card accepted the PIN.
    pub verified: bool,

    /// Remaining tries reported by a `63 Cx` status, otherwise 0.
    pub tries_left: u8,
}

impl PinVerification {
    fn from_response(response: &ApduResponse) -> Self {
        if response.is_success() {
            Self {
                verified: true,
                tries_left: 0,
            }
        } else {
            Self {
                verified: false,
                tries_left: response.pin_tries_left(),
            }
        }
    }
}

/// A session with the signing applet.
///
/// The session owns its transport but never connects or disconnects it;
/// channel lifetime belongs to the caller.
pub struct CardSession<T: Transport> {
    /// The underlying transport.
    transport: T,

    /// Follows `61 xx` continuations.
    reassembler: Reassembler,

    /// Diagnostic log.
    log: DebugLog,
}

impl<T: Transport> fmt::Debug for CardSession<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardSession")
            .field("connected", &self.transport.is_connected())
            .field("reassembler", &self.reassembler)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> CardSession<T> {
    /// Creates a session with default configuration and logging disabled.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, &SessionConfig::default())
    }

    /// Creates a session with the given configuration.
    ///
    /// # Arguments
    ///
    /// * `transport` - The transport layer for communication
    /// * `config` - Retry tuning and the debug logging switch
    #[must_use]
    pub fn with_config(transport: T, config: &SessionConfig) -> Self {
        let log = DebugLog::new("session", config.debug_logging);
        Self {
            transport,
            reassembler: Reassembler::new(config.reassembler, log.child("reassembler")),
            log,
        }
    }

    /// Returns the transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the transport mutably.
    pub const fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consumes the session and returns the transport.
    #[must_use]
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Sends `apdu` and follows any `61 xx` chain to completion.
    fn exchange(&mut self, apdu: &Apdu) -> Result<ApduResponse> {
        let initial = self.transport.transmit(apdu)?;
        let transport = &mut self.transport;
        let response = self
            .reassembler
            .complete(initial, |next| transport.transmit(next))?;

        self.log.debug(format_args!(
            "INS {:#04x} -> SW={:04X}, {} bytes",
            apdu.ins(),
            response.status_word(),
            response.data().len()
        ));
        Ok(response)
    }

    /// Selects an applet by AID.
    ///
    /// # Returns
    ///
    /// `true` iff the card answered `90 00`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidAid`] if `aid` is empty or longer than 16 bytes
    /// - Transport errors if communication fails
    pub fn select_applet(&mut self, aid: &[u8]) -> Result<bool> {
        let apdu = command::select_applet(aid)?;
        let response = self.exchange(&apdu)?;
        Ok(response.is_success())
    }

    /// Verifies the user's PIN.
    ///
    /// A rejected PIN is not an error: the outcome carries the number of
    /// tries the card reports. No retry is attempted.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPin`] if the PIN is empty or too long
    /// - Transport errors if communication fails
    ///
    /// # Example
    ///
    /// ```ignore
    /// let outcome = session.verify_pin("12345678")?;
    /// if !outcome.verified {
    ///     println!("{} tries left", outcome.tries_left);
    /// }
    /// ```
    pub fn verify_pin(&mut self, pin: &str) -> Result<PinVerification> {
        let apdu = command::verify_pin(pin)?;
        let response = self.exchange(&apdu)?;
        let outcome = PinVerification::from_response(&response);

        if !outcome.verified {
            self.log.debug(format_args!(
                "PIN rejected: SW={:04X}, {} tries left",
                response.status_word(),
                outcome.tries_left
            ));
        }
        Ok(outcome)
    }

    /// Computes a signature over `data` with the key at `key_index`.
    ///
    /// Index 1 and 2 select the first and second signing keys; any other
    /// value selects the default key.
    ///
    /// # Errors
    ///
    /// - [`Error::DataTooLong`] if `data` does not fit a short APDU
    /// - [`Error::StatusWord`] if the card refuses to sign
    /// - Transport errors if communication fails
    pub fn generate_signature(&mut self, data: &[u8], key_index: i64) -> Result<Vec<u8>> {
        let apdu = command::compute_signature(data, KeySlot::from_index(key_index))?;
        self.exchange(&apdu)?.into_result("COMPUTE SIGNATURE")
    }

    /// Reads the public key for a role given by its wire name.
    ///
    /// The role is validated before any card I/O.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidKeyRole`] if `role` is not `sig`, `dec`, `aut` or `sm`
    /// - [`Error::StatusWord`] if the card refuses
    pub fn get_rsa_public_key(&mut self, role: &str) -> Result<Vec<u8>> {
        let role: KeyRole = role.parse()?;
        self.public_key(role)
    }

    /// Reads the public key for `role`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StatusWord`] if the card refuses, or a transport error.
    pub fn public_key(&mut self, role: KeyRole) -> Result<Vec<u8>> {
        self.exchange(&command::get_public_key(role))?
            .into_result("GET PUBLIC KEY")
    }

    /// Reads the certificate for a role given by its wire name.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidKeyRole`] if `role` is unknown
    /// - [`Error::StatusWord`] if either exchange fails
    pub fn get_certificate(&mut self, role: &str) -> Result<Vec<u8>> {
        let role: KeyRole = role.parse()?;
        self.certificate(role)
    }

    /// Reads the certificate for `role`.
    ///
    /// Selects the certificate data object, then reads it. Both exchanges
    /// must succeed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StatusWord`] naming the stage that failed, or a
    /// transport error.
    pub fn certificate(&mut self, role: KeyRole) -> Result<Vec<u8>> {
        self.exchange(&command::select_certificate(role))?
            .into_result("SELECT CERTIFICATE")?;
        self.exchange(&command::get_certificate_data())?
            .into_result("GET CERTIFICATE")
    }
}
