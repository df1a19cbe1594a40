//! Inbound events and outbound effects of the session.

use bytes::Bytes;
use std::time::Duration;
use uuid::Uuid;

use crate::ble::adapter::AdapterState;
use crate::ble::radio::{ChannelHandle, PeripheralHandle, ServiceHandle};

/// Result of an asynchronous radio operation, with the error flattened to text.
pub type Outcome<T> = std::result::Result<T, String>;

/// Everything the session reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// External command to start a campaign.
    Go,
    /// Adapter power state changed.
    PowerChanged(AdapterState),
    /// A peripheral advertising the target service was seen.
    PeripheralDiscovered {
        /// The advertiser.
        peripheral: PeripheralHandle,
    },
    /// Connection established.
    Connected {
        /// The connected peripheral.
        peripheral: PeripheralHandle,
    },
    /// Connection attempt failed.
    ConnectFailed {
        /// The peripheral we tried to reach.
        peripheral: PeripheralHandle,
        /// Reason reported by the radio.
        reason: String,
    },
    /// Service discovery finished.
    ServicesDiscovered {
        /// The peripheral.
        peripheral: PeripheralHandle,
        /// Discovered services.
        result: Outcome<Vec<ServiceHandle>>,
    },
    /// Characteristic discovery for one service finished.
    CharacteristicsDiscovered {
        /// The peripheral.
        peripheral: PeripheralHandle,
        /// The service that was searched.
        service: ServiceHandle,
        /// Discovered characteristics.
        result: Outcome<Vec<ChannelHandle>>,
    },
    /// Acknowledged write finished.
    WriteCompleted {
        /// The peripheral.
        peripheral: PeripheralHandle,
        /// Write outcome.
        result: Outcome<()>,
    },
    /// Response channel value arrived.
    ValueUpdated {
        /// The peripheral.
        peripheral: PeripheralHandle,
        /// Raw value.
        result: Outcome<Vec<u8>>,
    },
    /// The link to a peripheral went down.
    Disconnected {
        /// The peripheral.
        peripheral: PeripheralHandle,
    },
    /// A connection cancel requested by the session finished.
    ConnectionCancelled {
        /// The peripheral that was released.
        peripheral: PeripheralHandle,
    },
    /// Scan deadline of a round expired.
    TimerFired {
        /// Sequence number of the round that armed the timer.
        round: u64,
    },
    /// Inter-round delay expired.
    RetryElapsed {
        /// Sequence number of the round that scheduled the retry.
        round: u64,
    },
}

/// Commands the session asks the runtime to carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Stop any running discovery.
    StopScan,
    /// Start a filtered discovery.
    StartScan {
        /// Service filter.
        services: Vec<Uuid>,
    },
    /// Arm the one-shot scan deadline.
    ArmScanTimer {
        /// Round the timer belongs to.
        round: u64,
        /// Deadline.
        after: Duration,
    },
    /// Invalidate the scan deadline.
    CancelScanTimer,
    /// Connect to a peripheral.
    Connect {
        /// Target.
        peripheral: PeripheralHandle,
    },
    /// Drop the connection to a peripheral.
    CancelConnection {
        /// Target.
        peripheral: PeripheralHandle,
    },
    /// Discover services on the connected peripheral.
    DiscoverServices {
        /// Target.
        peripheral: PeripheralHandle,
        /// Service filter.
        services: Vec<Uuid>,
    },
    /// Discover characteristics of a service.
    DiscoverCharacteristics {
        /// Target.
        peripheral: PeripheralHandle,
        /// Service to search.
        service: ServiceHandle,
    },
    /// Write the request.
    WriteValue {
        /// Target.
        peripheral: PeripheralHandle,
        /// Request channel.
        channel: ChannelHandle,
        /// Encoded request.
        value: Bytes,
        /// Wait for delivery confirmation.
        ack_required: bool,
    },
    /// Read the response.
    ReadValue {
        /// Target.
        peripheral: PeripheralHandle,
        /// Response channel.
        channel: ChannelHandle,
    },
    /// Start the next round after a delay.
    ScheduleRetry {
        /// Round that just ended.
        round: u64,
        /// Delay.
        after: Duration,
    },
}

impl Effect {
    /// Short name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StopScan => "stop_scan",
            Self::StartScan { .. } => "start_scan",
            Self::ArmScanTimer { .. } => "arm_scan_timer",
            Self::CancelScanTimer => "cancel_scan_timer",
            Self::Connect { .. } => "connect",
            Self::CancelConnection { .. } => "cancel_connection",
            Self::DiscoverServices { .. } => "discover_services",
            Self::DiscoverCharacteristics { .. } => "discover_characteristics",
            Self::WriteValue { .. } => "write_value",
            Self::ReadValue { .. } => "read_value",
            Self::ScheduleRetry { .. } => "schedule_retry",
        }
    }
}
