//! PC/SC tag channel for desktop hosts.
//!
//! Lets the contactless transport reach a card through the system PC/SC
//! service (pcscd, WinSCard) on macOS, Linux and Windows.
//!
//! # Example
//!
//! ```ignore
//! use nfcsigner_core::transport::{ContactlessTransport, PcscChannel};
//!
//! let channel = PcscChannel::first_reader()?;
//! let mut transport = ContactlessTransport::new(channel, config, log);
//! transport.connect()?;
//! ```

use std::ffi::CString;
use std::fmt;
use std::time::{Duration, Instant};

use pcsc::{
    Card, Context, Disposition, MAX_BUFFER_SIZE_EXTENDED, Protocols, ReaderState, Scope, ShareMode,
    State,
};

use super::contactless::TagChannel;
use crate::error::{Error, Result};

/// A PC/SC reader used as a [`TagChannel`].
pub struct PcscChannel {
    /// The PC/SC context.
    context: Context,

    /// The reader name.
    reader: CString,

    /// The connected card, if any.
    card: Option<Card>,

    /// How long `connect` waits for a card to be presented.
    timeout: Duration,
}

impl fmt::Debug for PcscChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscChannel")
            .field("reader", &self.reader)
            .field("connected", &self.card.is_some())
            .finish_non_exhaustive()
    }
}

fn establish() -> Result<Context> {
    Context::establish(Scope::User)
        .map_err(|e| Error::ConnectionFailed(format!("failed to establish PC/SC context: {e}")))
}

fn readers(ctx: &Context) -> Result<Vec<CString>> {
    ctx.list_readers_owned()
        .map_err(|e| Error::ConnectionFailed(format!("failed to list readers: {e}")))
}

impl PcscChannel {
    /// Uses the first reader the PC/SC service reports.
    ///
    /// # Errors
    ///
    /// - [`Error::DeviceNotFound`] if no reader is attached
    /// - [`Error::ConnectionFailed`] if the service is unavailable
    pub fn first_reader() -> Result<Self> {
        let context = establish()?;
        let reader = readers(&context)?
            .into_iter()
            .next()
            .ok_or(Error::DeviceNotFound)?;

        Ok(Self {
            context,
            reader,
            card: None,
            timeout: Duration::ZERO,
        })
    }

    /// Lists all reader names.
    ///
    /// # Errors
    ///
    /// Returns an error if the PC/SC context cannot be established.
    pub fn list_readers() -> Result<Vec<String>> {
        let context = establish()?;
        Ok(readers(&context)?
            .into_iter()
            .map(|r| r.to_string_lossy().into_owned())
            .collect())
    }

    /// Returns the reader name.
    #[must_use]
    pub fn reader_name(&self) -> String {
        self.reader.to_string_lossy().into_owned()
    }

    /// Returns how long `connect` waits for a card.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Blocks until a card sits on the reader or the timeout runs out.
    fn wait_for_card(&self) -> Result<()> {
        let deadline = Instant::now() + self.timeout;
        let mut states = [ReaderState::new(self.reader.clone(), State::UNAWARE)];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.context.get_status_change(remaining, &mut states) {
                Ok(()) | Err(pcsc::Error::Timeout) => {}
                Err(e) => {
                    return Err(Error::ConnectionFailed(format!(
                        "failed to read reader state: {e}"
                    )));
                }
            }
            if states[0].event_state().contains(State::PRESENT) {
                return Ok(());
            }
            if remaining.is_zero() {
                return Err(Error::ConnectionFailed(format!(
                    "no card presented within {} ms",
                    self.timeout.as_millis()
                )));
            }
            states[0].sync_current_state();
        }
    }
}

impl TagChannel for PcscChannel {
    fn connect(&mut self) -> Result<()> {
        self.wait_for_card()?;
        let card = self
            .context
            .connect(&self.reader, ShareMode::Shared, Protocols::ANY)
            .map_err(|e| Error::ConnectionFailed(format!("failed to connect to card: {e}")))?;
        self.card = Some(card);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(card) = self.card.take() {
            let _ = card.disconnect(Disposition::LeaveCard);
        }
    }

    fn is_connected(&self) -> bool {
        self.card.as_ref().is_some_and(|card| card.status2_owned().is_ok())
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn transceive(&mut self, command: &[u8]) -> Result<Vec<u8>> {
        let card = self.card.as_ref().ok_or(Error::NotConnected)?;
        let mut buf = vec![0u8; MAX_BUFFER_SIZE_EXTENDED];

        let response = card
            .transmit(command, &mut buf)
            .map_err(|e| Error::Io(format!("transmit failed: {e}")))?;
        Ok(response.to_vec())
    }
}
