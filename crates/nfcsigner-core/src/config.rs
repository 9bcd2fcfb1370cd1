//! Per-session configuration.
//!
//! There is no configuration file: callers build a [`SessionConfig`] (or
//! deserialize one from the plugin layer) and pass it to each transport.
//! Every struct implements [`Default`] with the values used on real readers,
//! and all durations (de)serialize as milliseconds.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use nfcsigner_core::config::SessionConfig;
//!
//! let mut config = SessionConfig::default();
//! config.debug_logging = true;
//! config.ccid.receive_timeout = Duration::from_secs(30);
//! assert_eq!(config.ccid.max_time_extensions, 30);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for the USB CCID engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CcidConfig {
    /// Timeout for bulk OUT transfers.
    #[serde(with = "millis")]
    pub send_timeout: Duration,

    /// Timeout for bulk IN transfers carrying a response.
    #[serde(with = "millis")]
    pub receive_timeout: Duration,

    /// Timeout for the short reads that drain stale bytes from the IN pipe.
    #[serde(with = "millis")]
    pub drain_timeout: Duration,

    /// Upper bound on drain reads before a power-on.
    pub max_drain_reads: usize,

    /// Size of each bulk IN read buffer.
    pub read_size: usize,

    /// Maximum number of consecutive time extensions per exchange.
    pub max_time_extensions: u32,

    /// Power-off/power-on cycles attempted when the ATR comes back empty.
    pub atr_retries: u32,

    /// Delay between power-off and power-on during an ATR retry.
    #[serde(with = "millis")]
    pub atr_retry_delay: Duration,

    /// Maximum number of blocks in a CCID response chain.
    pub max_chain_blocks: usize,

    /// Largest payload a single CCID block may declare. Longer headers are
    /// rejected as malformed before any buffer is sized from them.
    pub max_block_length: usize,
}

impl Default for CcidConfig {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(5),
            receive_timeout: Duration::from_secs(15),
            drain_timeout: Duration::from_millis(100),
            max_drain_reads: 16,
            read_size: 1024,
            max_time_extensions: 30,
            atr_retries: 1,
            atr_retry_delay: Duration::from_millis(200),
            max_chain_blocks: 256,
            max_block_length: 65_538,
        }
    }
}

/// Settings for `GET RESPONSE` reassembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReassemblerConfig {
    /// Retries for a continuation frame that arrives empty or fails.
    pub max_empty_retries: u32,

    /// Backoff unit; retry `n` sleeps `n * retry_backoff`.
    #[serde(with = "millis")]
    pub retry_backoff: Duration,
}

impl Default for ReassemblerConfig {
    fn default() -> Self {
        Self {
            max_empty_retries: 2,
            retry_backoff: Duration::from_millis(100),
        }
    }
}

/// Settings for the contactless (ISO-DEP) transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactlessConfig {
    /// Inactivity timeout applied when the tag channel is connected.
    #[serde(with = "millis")]
    pub timeout: Duration,
}

impl Default for ContactlessConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
        }
    }
}

/// Everything a card session needs, bundled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Emit APDU/CCID diagnostics through `tracing`.
    pub debug_logging: bool,

    /// USB CCID engine settings.
    pub ccid: CcidConfig,

    /// `GET RESPONSE` reassembly settings.
    pub reassembler: ReassemblerConfig,

    /// Contactless transport settings.
    pub contactless: ContactlessConfig,
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
