//! USB CCID transport.
//!
//! Two nested resources with different lifetimes:
//!
//! - [`UsbReader`] owns the claimed device interface ([`BulkPipe`]) and
//!   lives until explicitly released. Re-claiming composite devices makes
//!   host drivers re-attach, so the claim is kept across operations.
//! - [`UsbCcidTransport`] borrows the pipe for one logical CCID session:
//!   power-on on connect, power-off on disconnect or drop.
//!
//! # Example
//!
//! ```ignore
//! use nfcsigner_core::transport::UsbReader;
//!
//! let mut reader = UsbReader::new(pipe, SessionConfig::default());
//! let signature = reader.with_session(|card| {
//!     card.select_applet(&aid)?;
//!     card.verify_pin("12345678")?;
//!     card.generate_signature(&digest_info, 1)
//! })?;
//! ```

use crate::card::{Apdu, ApduResponse, CardSession, Transport};
use crate::ccid::{BulkPipe, CcidEngine, EngineState};
use crate::config::SessionConfig;
use crate::error::Result;
use crate::logging::DebugLog;

/// A claimed USB CCID reader.
#[derive(Debug)]
pub struct UsbReader<P> {
    pipe: P,
    config: SessionConfig,
}

impl<P: BulkPipe> UsbReader<P> {
    /// Takes ownership of a claimed reader's pipe.
    #[must_use]
    pub const fn new(pipe: P, config: SessionConfig) -> Self {
        Self { pipe, config }
    }

    /// Returns the session configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the pipe.
    #[must_use]
    pub const fn pipe(&self) -> &P {
        &self.pipe
    }

    /// Starts a logical CCID session. The card is powered on by
    /// [`Transport::connect`].
    #[must_use]
    pub fn session(&mut self) -> UsbCcidTransport<'_, P> {
        UsbCcidTransport::new(&mut self.pipe, &self.config)
    }

    /// Runs `op` inside a fresh CCID session.
    ///
    /// The card is powered on (retrying an empty ATR), `op` runs, and the
    /// card is powered off on every path. The device claim survives.
    ///
    /// # Errors
    ///
    /// Returns the power-on error or whatever `op` returns.
    pub fn with_session<'s, R, F>(&'s mut self, op: F) -> Result<R>
    where
        F: FnOnce(&mut CardSession<UsbCcidTransport<'s, P>>) -> Result<R>,
    {
        let config = self.config;
        let mut transport = UsbCcidTransport::new(&mut self.pipe, &config);
        transport.connect()?;

        let mut card = CardSession::with_config(transport, &config);
        let result = op(&mut card);
        card.into_transport().disconnect();
        result
    }

    /// Releases the reader, returning the pipe for the caller to drop.
    #[must_use]
    pub fn release(self) -> P {
        self.pipe
    }
}

/// One logical CCID session on a borrowed pipe.
#[derive(Debug)]
pub struct UsbCcidTransport<'r, P: BulkPipe> {
    engine: CcidEngine<&'r mut P>,
    atr: Vec<u8>,
    log: DebugLog,
}

impl<'r, P: BulkPipe> UsbCcidTransport<'r, P> {
    fn new(pipe: &'r mut P, config: &SessionConfig) -> Self {
        let log = DebugLog::new("usb", config.debug_logging);
        Self {
            engine: CcidEngine::new(pipe, config.ccid, log.child("ccid")),
            atr: Vec::new(),
            log,
        }
    }

    /// Returns the ATR from the last power-on.
    #[must_use]
    pub fn atr(&self) -> &[u8] {
        &self.atr
    }

    /// Returns the CCID session state.
    #[must_use]
    pub const fn state(&self) -> EngineState {
        self.engine.state()
    }

    const fn needs_power_off(&self) -> bool {
        matches!(
            self.engine.state(),
            EngineState::PoweredOn | EngineState::Exchanging | EngineState::Faulted
        )
    }
}

impl<P: BulkPipe> Transport for UsbCcidTransport<'_, P> {
    fn connect(&mut self) -> Result<()> {
        if self.engine.is_powered() {
            return Ok(());
        }
        self.atr = self.engine.power_on_with_retry()?;
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.needs_power_off() {
            self.engine.power_off();
        }
    }

    fn is_connected(&self) -> bool {
        self.engine.is_powered()
    }

    fn transmit(&mut self, apdu: &Apdu) -> Result<ApduResponse> {
        let command = apdu.to_bytes();
        self.log.frame("USB ->", &command);
        let raw = self.engine.exchange(&command)?;
        self.log.frame("USB <-", &raw);
        Ok(ApduResponse::parse(&raw))
    }
}

impl<P: BulkPipe> Drop for UsbCcidTransport<'_, P> {
    fn drop(&mut self) {
        if self.needs_power_off() {
            self.engine.power_off();
        }
    }
}
