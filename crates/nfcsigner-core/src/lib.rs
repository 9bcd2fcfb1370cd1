//! NFC Signer Core Library
//!
//! This crate drives an ISO 7816-4 signing applet on a smart card reached
//! either over contactless NFC (ISO-DEP) or through a USB CCID reader.
//!
//! # Overview
//!
//! This library provides:
//!
//! - **APDU Codec**: command building and response parsing
//! - **Response Reassembly**: `GET RESPONSE` chaining with bounded retry
//! - **Transports**: a pass-through contactless transport and a USB CCID transport
//! - **CCID Engine**: power management, sequencing, block reassembly, time
//!   extensions and chained data blocks over raw bulk endpoints
//! - **Card Sessions**: applet selection, PIN verification, signing, public key
//!   and certificate retrieval
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    CardSession                              │
//! │  select applet · verify PIN · sign · public key · cert      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Command builders  │  Reassembler (61 xx)  │  ApduResponse  │
//! ├─────────────────────────────────────────────────────────────┤
//! │                 Transport (trait)                           │
//! │  ┌───────────────────────┐   ┌───────────────────────────┐  │
//! │  │ ContactlessTransport  │   │ UsbCcidTransport          │  │
//! │  │   TagChannel          │   │   CcidEngine -> BulkPipe  │  │
//! │  └───────────────────────┘   └───────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use nfcsigner_core::card::{CardSession, command};
//! use nfcsigner_core::digest::{HashAlgorithm, digest_info_for_content};
//! use nfcsigner_core::transport::UsbReader;
//!
//! let mut reader = UsbReader::new(pipe, SessionConfig::default());
//! let aid = command::parse_aid("A0000000011000")?;
//! let digest_info = digest_info_for_content(HashAlgorithm::Sha256, document);
//!
//! let signature = reader.with_session(|card| {
//!     card.select_applet(&aid)?;
//!     card.verify_pin("12345678")?;
//!     card.generate_signature(&digest_info, 1)
//! })?;
//! ```
//!
//! # Feature Flags
//!
//! - `usb`: native USB bulk pipe via `rusb` (`ccid::RusbPipe`)
//! - `pcsc`: desktop tag channel via the system PC/SC service
//!   (`transport::PcscChannel`)
//!
//! # Logging
//!
//! Diagnostics go through `tracing` and are switched per session with
//! [`SessionConfig::debug_logging`]. The library never installs a subscriber.

// Modules
pub mod card;
pub mod ccid;
pub mod config;
pub mod digest;
pub mod error;
pub mod logging;
pub mod transport;

// Re-exports for convenience
pub use card::{Apdu, ApduResponse, CardSession, KeyRole, KeySlot, PinVerification, Transport};
pub use config::{CcidConfig, ContactlessConfig, ReassemblerConfig, SessionConfig};
pub use error::{Error, Result};
pub use logging::DebugLog;

#[cfg(test)]
use tracing_subscriber as _;
