//! Session, campaign and round state.

use chrono::{DateTime, Utc};

use crate::ble::adapter::AdapterState;
use crate::ble::radio::{ChannelHandle, PeripheralHandle};
use crate::error::RoundError;

/// Where the session is in the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SessionState {
    /// No campaign in flight.
    #[default]
    Idle,
    /// Waiting for a matching advertisement.
    Scanning,
    /// Connection requested.
    Connecting,
    /// Service discovery requested.
    DiscoveringServices,
    /// Characteristic discovery requested for every service.
    DiscoveringCharacteristics,
    /// Request written, waiting for the acknowledgement.
    RequestSent,
    /// Read issued on the response channel.
    AwaitingResponse,
    /// Tearing the round down.
    Disconnecting,
    /// Waiting for the inter-round delay.
    RetryPending,
}

impl SessionState {
    /// Check if the round holds an established link in this state.
    ///
    /// `Connecting` is excluded: a link that drops before it is up is
    /// reported by the connect operation itself.
    pub fn has_link(&self) -> bool {
        matches!(
            self,
            Self::DiscoveringServices
                | Self::DiscoveringCharacteristics
                | Self::RequestSent
                | Self::AwaitingResponse
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::Scanning => "Scanning",
            Self::Connecting => "Connecting",
            Self::DiscoveringServices => "DiscoveringServices",
            Self::DiscoveringCharacteristics => "DiscoveringCharacteristics",
            Self::RequestSent => "RequestSent",
            Self::AwaitingResponse => "AwaitingResponse",
            Self::Disconnecting => "Disconnecting",
            Self::RetryPending => "RetryPending",
        };
        f.write_str(name)
    }
}

/// Counters of the run started by one `go`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Campaign {
    /// True from `go` until the campaign ends.
    pub busy: bool,
    /// Scan attempts so far.
    pub request_count: u32,
    /// Responses received and decoded so far.
    pub response_count: u32,
    /// Scan budget.
    pub max_requests: u32,
    /// When the campaign started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the campaign ended.
    pub finished_at: Option<DateTime<Utc>>,
    /// Most recent round failure.
    pub last_error: Option<RoundError>,
    /// Most recent decoded response.
    pub last_response: Option<String>,
}

impl Campaign {
    pub(crate) fn start(max_requests: u32) -> Self {
        Self {
            busy: true,
            max_requests,
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub(crate) fn finish(&mut self) {
        self.busy = false;
        self.finished_at = Some(Utc::now());
    }

    /// Whether another round may be started.
    pub fn has_budget(&self) -> bool {
        self.request_count < self.max_requests
    }
}

/// Handles owned by the round in flight.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Round {
    pub(crate) seq: u64,
    pub(crate) peripheral: Option<PeripheralHandle>,
    pub(crate) request_channel: Option<ChannelHandle>,
    pub(crate) response_channel: Option<ChannelHandle>,
    pub(crate) pending_discoveries: usize,
}

impl Round {
    pub(crate) fn new(seq: u64) -> Self {
        Self {
            seq,
            ..Self::default()
        }
    }

    /// Drop every handle, keeping the sequence number.
    pub(crate) fn clear(&mut self) {
        self.peripheral = None;
        self.request_channel = None;
        self.response_channel = None;
        self.pending_discoveries = 0;
    }

    /// Sequence number, unique for the lifetime of the session.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Peripheral picked during discovery.
    pub fn peripheral(&self) -> Option<&PeripheralHandle> {
        self.peripheral.as_ref()
    }

    /// Request channel, once classified.
    pub fn request_channel(&self) -> Option<&ChannelHandle> {
        self.request_channel.as_ref()
    }

    /// Response channel, once classified.
    pub fn response_channel(&self) -> Option<&ChannelHandle> {
        self.response_channel.as_ref()
    }

    /// Check that no handle is live.
    pub fn is_clear(&self) -> bool {
        self.peripheral.is_none() && self.request_channel.is_none() && self.response_channel.is_none()
    }

    pub(crate) fn owns(&self, peripheral: &PeripheralHandle) -> bool {
        self.peripheral.as_ref() == Some(peripheral)
    }
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CampaignStatus {
    /// Current session state.
    pub state: SessionState,
    /// Last reported adapter state.
    pub adapter_state: AdapterState,
    /// Current or most recent campaign.
    pub campaign: Campaign,
}

impl CampaignStatus {
    /// Whether a campaign is in flight.
    pub fn is_busy(&self) -> bool {
        self.campaign.busy
    }
}
