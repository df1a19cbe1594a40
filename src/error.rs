//! Error types for the timer-central crate.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// The radio has no record of the requested peripheral.
    #[error("Peripheral not found: {identifier}")]
    PeripheralNotFound {
        /// The identifier that was searched for.
        identifier: String,
    },

    /// Service not found on the device.
    #[error("Service not found: {uuid}")]
    ServiceNotFound {
        /// The UUID of the service that was not found.
        uuid: String,
    },

    /// Characteristic not found on the device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },

    /// Invalid data was received from the peripheral.
    #[error("Invalid data received: {context}")]
    InvalidData {
        /// Description of what was invalid about the data.
        context: String,
    },

    /// A wait on the central did not complete in time.
    #[error("Operation timed out")]
    Timeout,

    /// The central's event loop is no longer running.
    #[error("Central is not running")]
    NotRunning,

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Reasons a `go` command is rejected or a round ends early.
///
/// These never leave the session: they are logged and kept as the
/// `last_error` of the campaign status.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RoundError {
    /// `go` arrived while the radio was not powered on.
    #[error("adapter not ready")]
    AdapterNotReady,

    /// `go` arrived while a campaign was already in flight.
    #[error("campaign already in progress")]
    ReentrantStart,

    /// `go` arrived with a request budget of zero.
    #[error("no request budget")]
    NoBudget,

    /// No matching peripheral advertised before the scan deadline.
    #[error("scan timed out")]
    ScanTimeout,

    /// The platform refused or failed the connection attempt.
    #[error("connection failed: {reason}")]
    ConnectFailed {
        /// Reason reported by the radio.
        reason: String,
    },

    /// Service discovery reported an error or found nothing.
    #[error("service discovery failed: {reason}")]
    ServiceDiscoveryFailed {
        /// Reason reported by the radio.
        reason: String,
    },

    /// Characteristic discovery reported an error.
    #[error("characteristic discovery failed: {reason}")]
    CharacteristicDiscoveryFailed {
        /// Reason reported by the radio.
        reason: String,
    },

    /// Discovery finished without both request and response channels.
    #[error("request/response channels missing")]
    ChannelsMissing,

    /// The acknowledged write was rejected.
    #[error("write failed: {reason}")]
    WriteFailed {
        /// Reason reported by the radio.
        reason: String,
    },

    /// Reading the response channel failed.
    #[error("read failed: {reason}")]
    ReadFailed {
        /// Reason reported by the radio.
        reason: String,
    },

    /// The response bytes were not valid UTF-8 text.
    #[error("response decode failed: {reason}")]
    ResponseDecodeFailed {
        /// Decoder message.
        reason: String,
    },

    /// The peripheral dropped the link mid-round.
    #[error("link lost")]
    LinkLost,
}
