//! [`Transport`](crate::card::Transport) implementations.
//!
//! - [`ContactlessTransport`]: ISO-DEP pass-through over a [`TagChannel`]
//! - [`UsbCcidTransport`]: APDUs framed by the CCID engine, scoped by a
//!   long-lived [`UsbReader`]
//! - `PcscChannel`: a desktop [`TagChannel`] (feature `pcsc`)

pub mod contactless;
pub mod usb;

#[cfg(feature = "pcsc")]
pub mod pcsc_channel;

pub use contactless::{ContactlessTransport, TagChannel};
pub use usb::{UsbCcidTransport, UsbReader};

#[cfg(feature = "pcsc")]
pub use pcsc_channel::PcscChannel;
