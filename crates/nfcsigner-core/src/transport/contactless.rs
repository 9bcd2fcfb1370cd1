//! Contactless (ISO-DEP) transport.
//!
//! The platform tag stack already performs ISO 7816 framing and chaining,
//! so this transport passes APDU bytes through unchanged.

use std::time::Duration;

use crate::card::{Apdu, ApduResponse, Transport};
use crate::config::ContactlessConfig;
use crate::error::{Error, Result};
use crate::logging::DebugLog;

/// A raw byte channel to a discovered tag.
pub trait TagChannel {
    /// Opens the channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the tag is gone or refuses the connection.
    fn connect(&mut self) -> Result<()>;

    /// Closes the channel. Never fails.
    fn close(&mut self);

    /// Checks if the channel is open.
    fn is_connected(&self) -> bool;

    /// Sets the inactivity timeout. Applied before [`TagChannel::connect`],
    /// so it also bounds how long opening the channel may wait for a tag.
    fn set_timeout(&mut self, timeout: Duration);

    /// Sends `command` and returns the tag's raw answer.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails.
    fn transceive(&mut self, command: &[u8]) -> Result<Vec<u8>>;
}

/// APDU transport over a [`TagChannel`].
#[derive(Debug)]
pub struct ContactlessTransport<C> {
    channel: C,
    config: ContactlessConfig,
    log: DebugLog,
}

impl<C: TagChannel> ContactlessTransport<C> {
    /// Wraps `channel`.
    #[must_use]
    pub const fn new(channel: C, config: ContactlessConfig, log: DebugLog) -> Self {
        Self {
            channel,
            config,
            log,
        }
    }

    /// Returns the channel.
    #[must_use]
    pub const fn channel(&self) -> &C {
        &self.channel
    }

    /// Consumes the transport and returns the channel.
    #[must_use]
    pub fn into_channel(self) -> C {
        self.channel
    }
}

impl<C: TagChannel> Transport for ContactlessTransport<C> {
    fn connect(&mut self) -> Result<()> {
        if self.channel.is_connected() {
            return Ok(());
        }
        self.channel.set_timeout(self.config.timeout);
        self.channel.connect()?;
        self.log.debug(format_args!(
            "tag connected, timeout {} ms",
            self.config.timeout.as_millis()
        ));
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.channel.is_connected() {
            self.channel.close();
            self.log.debug(format_args!("tag disconnected"));
        }
    }

    fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    fn transmit(&mut self, apdu: &Apdu) -> Result<ApduResponse> {
        if !self.channel.is_connected() {
            return Err(Error::NotConnected);
        }

        let command = apdu.to_bytes();
        self.log.frame("NFC ->", &command);
        let raw = self.channel.transceive(&command)?;
        self.log.frame("NFC <-", &raw);

        Ok(ApduResponse::parse(&raw))
    }
}
