//! Adapter power-state tracking.
//!
//! The monitor only records readiness. It never starts or stops a round.

use btleplug::api::CentralState;
use tracing::debug;

/// Power state of the local Bluetooth adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AdapterState {
    /// State not yet reported.
    #[default]
    Unknown,
    /// The adapter is resetting.
    Resetting,
    /// The platform has no BLE central support.
    Unsupported,
    /// The application is not allowed to use Bluetooth.
    Unauthorized,
    /// Bluetooth is switched off.
    PoweredOff,
    /// Bluetooth is on and usable.
    PoweredOn,
}

impl AdapterState {
    /// Check if the adapter can be used for a campaign.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::PoweredOn)
    }
}

impl std::fmt::Display for AdapterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            Self::Resetting => write!(f, "Resetting"),
            Self::Unsupported => write!(f, "Unsupported"),
            Self::Unauthorized => write!(f, "Unauthorized"),
            Self::PoweredOff => write!(f, "PoweredOff"),
            Self::PoweredOn => write!(f, "PoweredOn"),
        }
    }
}

impl From<CentralState> for AdapterState {
    fn from(state: CentralState) -> Self {
        match state {
            CentralState::PoweredOn => Self::PoweredOn,
            CentralState::PoweredOff => Self::PoweredOff,
            #[allow(unreachable_patterns)]
            _ => Self::Unknown,
        }
    }
}

/// Tracks the most recent adapter power state.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdapterMonitor {
    state: AdapterState,
}

impl AdapterMonitor {
    /// Create a monitor in the `Unknown` state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a power-state notification. Returns true if the state changed.
    pub fn update(&mut self, state: AdapterState) -> bool {
        let old = std::mem::replace(&mut self.state, state);
        if old != state {
            debug!("Adapter state changed: {} -> {}", old, state);
        }
        old != state
    }

    /// Last reported state.
    pub fn state(&self) -> AdapterState {
        self.state
    }

    /// Whether the radio is powered on.
    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }
}
