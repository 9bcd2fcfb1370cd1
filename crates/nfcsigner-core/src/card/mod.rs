//! Card-level protocol: APDUs, chaining and the session manager.
//!
//! # Architecture
//!
//! - [`apdu`]: command encoding and response parsing
//! - [`command`]: builders for the supported command set
//! - [`reassembler`]: `GET RESPONSE` chaining with bounded retry
//! - [`role`]: key roles and signing key slots
//! - [`session`]: ordered card operations over any [`Transport`]
//!
//! # Transport Abstraction
//!
//! The [`Transport`] trait hides how APDUs reach the card:
//!
//! - contactless ISO-DEP through a tag byte channel
//! - USB CCID readers through the CCID engine
//!
//! [`CardSession`] never branches on which one it holds.
//!
//! # Example
//!
//! ```ignore
//! use nfcsigner_core::card::{CardSession, command};
//!
//! let mut session = CardSession::new(transport);
//! let aid = command::parse_aid("A0000000011000")?;
//!
//! if session.select_applet(&aid)? && session.verify_pin("12345678")?.verified {
//!     let signature = session.generate_signature(&digest_info, 1)?;
//! }
//! ```

pub mod apdu;
pub mod command;
pub mod reassembler;
pub mod role;
pub mod session;

pub use apdu::{Apdu, ApduResponse};
pub use reassembler::Reassembler;
pub use role::{KeyRole, KeySlot};
pub use session::{CardSession, PinVerification};

use crate::error::Result;

/// A channel that carries APDUs to a card.
pub trait Transport {
    /// Opens the physical channel.
    ///
    /// Calling this on a connected transport is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel cannot be opened.
    fn connect(&mut self) -> Result<()>;

    /// Closes the physical channel. Never fails.
    fn disconnect(&mut self);

    /// Checks if the transport is connected.
    fn is_connected(&self) -> bool;

    /// Sends an APDU command and receives one response frame.
    ///
    /// # Arguments
    ///
    /// * `apdu` - The APDU command to send
    ///
    /// # Returns
    ///
    /// The parsed response frame. `61 xx` chaining is left to the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if communication fails.
    fn transmit(&mut self, apdu: &Apdu) -> Result<ApduResponse>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn disconnect(&mut self) {
        (**self).disconnect();
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn transmit(&mut self, apdu: &Apdu) -> Result<ApduResponse> {
        (**self).transmit(apdu)
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn disconnect(&mut self) {
        (**self).disconnect();
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn transmit(&mut self, apdu: &Apdu) -> Result<ApduResponse> {
        (**self).transmit(apdu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// A mock transport for testing.
    struct MockTransport {
        responses: VecDeque<ApduResponse>,
        connected: bool,
    }

    impl MockTransport {
        fn new(responses: Vec<ApduResponse>) -> Self {
            Self {
                responses: responses.into_iter().collect(),
                connected: false,
            }
        }
    }

    impl Transport for MockTransport {
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

        fn transmit(&mut self, _apdu: &Apdu) -> Result<ApduResponse> {
            self.responses
                .pop_front()
                .ok_or(crate::error::Error::NoResponse)
        }
    }

    #[test]
    fn mock_transport() {
        let response = ApduResponse::parse(&[0x90, 0x00]);
        let mut transport = MockTransport::new(vec![response]);
        transport.connect().unwrap();

        let apdu = Apdu::new(0x00, 0xA4, 0x04, 0x00, vec![]);
        let result = transport.transmit(&apdu);

        assert!(result.unwrap().is_success());
        assert!(transport.is_connected());
    }

    #[test]
    fn boxed_transport_delegates() {
        let mut transport: Box<dyn Transport> = Box::new(MockTransport::new(vec![]));
        transport.connect().unwrap();
        assert!(transport.is_connected());

        let apdu = Apdu::new(0x00, 0xC0, 0x00, 0x00, vec![]);
        assert!(transport.transmit(&apdu).is_err());

        transport.disconnect();
        assert!(!transport.is_connected());
    }
}
