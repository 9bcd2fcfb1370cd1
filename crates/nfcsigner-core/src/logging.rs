//! Injectable debug logging.
//!
//! Each transport, engine and session carries its own [`DebugLog`], enabled
//! or disabled from [`SessionConfig::debug_logging`](crate::config::SessionConfig).
//! A disabled log emits nothing, so frame dumps cost a single branch.
//! Output goes through `tracing`; installing a subscriber is up to the host.

use core::fmt;

/// A per-component switch in front of `tracing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugLog {
    component: &'static str,
    enabled: bool,
}

impl DebugLog {
    /// Creates a log for `component`.
    #[must_use]
    pub const fn new(component: &'static str, enabled: bool) -> Self {
        Self { component, enabled }
    }

    /// Creates a log that never emits.
    #[must_use]
    pub const fn disabled(component: &'static str) -> Self {
        Self::new(component, false)
    }

    /// Returns a log for another component sharing this log's switch.
    #[must_use]
    pub const fn child(self, component: &'static str) -> Self {
        Self::new(component, self.enabled)
    }

    /// Returns whether this log emits.
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        self.enabled
    }

    /// Logs a diagnostic message at debug level.
    pub fn debug(self, message: fmt::Arguments<'_>) {
        if self.enabled {
            tracing::debug!(component = self.component, "{message}");
        }
    }

    /// Logs a recoverable anomaly at warn level.
    pub fn warn(self, message: fmt::Arguments<'_>) {
        if self.enabled {
            tracing::warn!(component = self.component, "{message}");
        }
    }

    /// Dumps a frame as hex at trace level.
    pub fn frame(self, direction: &str, bytes: &[u8]) {
        if self.enabled {
            tracing::trace!(
                component = self.component,
                len = bytes.len(),
                "{direction} {}",
                hex::encode(bytes)
            );
        }
    }
}
