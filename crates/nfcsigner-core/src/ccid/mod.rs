//! USB CCID class protocol.
//!
//! Implements the host side of the CCID (Chip Card Interface Device)
//! protocol on top of raw bulk transfers, so APDUs reach the card without
//! a PC/SC daemon.
//!
//! - [`message`]: 10-byte header framing and `bStatus` decoding
//! - [`pipe`]: the [`BulkPipe`] endpoint abstraction
//! - [`engine`]: power management, sequencing, block reassembly, time
//!   extensions and chained data blocks
//! - [`descriptor`]: CCID interface detection and class descriptor parsing
//! - `rusb_pipe`: a [`BulkPipe`] over `rusb` (feature `usb`)

pub mod descriptor;
pub mod engine;
pub mod message;
pub mod pipe;

#[cfg(feature = "usb")]
pub mod rusb_pipe;

pub use descriptor::{CcidDescriptor, ExchangeLevel};
pub use engine::{CcidEngine, EngineState};
pub use message::{CcidBlock, CcidHeader, CommandStatus, IccStatus};
pub use pipe::BulkPipe;

#[cfg(feature = "usb")]
pub use rusb_pipe::{ReaderInfo, RusbPipe};
