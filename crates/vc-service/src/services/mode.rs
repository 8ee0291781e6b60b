//! Realtime mode selection.
//!
//! The mode is read once per request and passed explicitly into the
//! workflows. It is backed by a watch channel so it can be flipped at
//! runtime; every request after the flip sees the new value.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Whether the provider is called or identifiers are synthesized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RealtimeMode {
    /// Never call the provider; use mock meeting IDs and tokens.
    Mock,
    /// Call the provider, falling back to mock values on failure.
    Real,
}

impl RealtimeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RealtimeMode::Mock => "mock",
            RealtimeMode::Real => "real",
        }
    }
}

/// Read side of the mode setting. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ModeSelector {
    receiver: watch::Receiver<RealtimeMode>,
}

/// Write side of the mode setting.
#[derive(Debug)]
pub struct ModeSwitch {
    sender: watch::Sender<RealtimeMode>,
}

impl ModeSelector {
    /// Create a selector together with the switch that controls it.
    pub fn channel(initial: RealtimeMode) -> (ModeSwitch, ModeSelector) {
        let (sender, receiver) = watch::channel(initial);
        (ModeSwitch { sender }, ModeSelector { receiver })
    }

    /// Create a selector that always yields `mode`.
    pub fn fixed(mode: RealtimeMode) -> Self {
        // The receiver keeps the last value after the sender is dropped
        let (_switch, selector) = Self::channel(mode);
        selector
    }

    /// Mode for the current request.
    pub fn current(&self) -> RealtimeMode {
        *self.receiver.borrow()
    }
}

impl ModeSwitch {
    /// Change the mode for all subsequent requests.
    pub fn set(&self, mode: RealtimeMode) {
        let previous = self.sender.send_replace(mode);
        if previous != mode {
            tracing::info!(
                target: "vc.services.mode",
                from = previous.as_str(),
                to = mode.as_str(),
                "Realtime mode changed"
            );
        }
    }

    /// Another selector following this switch.
    pub fn subscribe(&self) -> ModeSelector {
        ModeSelector {
            receiver: self.sender.subscribe(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_selector() {
        let selector = ModeSelector::fixed(RealtimeMode::Mock);
        assert_eq!(selector.current(), RealtimeMode::Mock);
        assert_eq!(selector.current(), RealtimeMode::Mock);
    }

    #[test]
    fn test_switch_changes_current_mode() {
        let (switch, selector) = ModeSelector::channel(RealtimeMode::Mock);
        let cloned = selector.clone();
        let subscribed = switch.subscribe();

        switch.set(RealtimeMode::Real);

        assert_eq!(selector.current(), RealtimeMode::Real);
        assert_eq!(cloned.current(), RealtimeMode::Real);
        assert_eq!(subscribed.current(), RealtimeMode::Real);
    }

    #[test]
    fn test_mode_as_str() {
        assert_eq!(RealtimeMode::Mock.as_str(), "mock");
        assert_eq!(RealtimeMode::Real.as_str(), "real");
    }
}
