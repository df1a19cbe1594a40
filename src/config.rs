//! Central configuration.

use std::time::Duration;

use crate::ble::uuids::Identities;
use crate::protocol::{Request, DEFAULT_REQUEST_TEXT};

/// How long a scan may run before the round ends by timeout.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(8);
/// Delay between the end of one round and the next scan.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);
/// Scan attempts allowed per campaign.
pub const DEFAULT_MAX_REQUESTS: u32 = 40;

/// Settings for a [`Central`](crate::Central) and its session.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CentralConfig {
    /// Scan deadline per round.
    #[cfg_attr(feature = "serde", serde(with = "duration_millis"))]
    pub scan_timeout: Duration,
    /// Delay before a retry round starts.
    #[cfg_attr(feature = "serde", serde(with = "duration_millis"))]
    pub retry_delay: Duration,
    /// Maximum scan attempts per campaign.
    pub max_requests: u32,
    /// Text written on the request channel.
    pub request_text: String,
    /// Service and channel identities.
    pub identities: Identities,
}

impl Default for CentralConfig {
    fn default() -> Self {
        Self {
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_requests: DEFAULT_MAX_REQUESTS,
            request_text: DEFAULT_REQUEST_TEXT.to_string(),
            identities: Identities::default(),
        }
    }
}

impl CentralConfig {
    /// Set the scan deadline.
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Set the inter-round delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the per-campaign scan budget.
    pub fn with_max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = max_requests;
        self
    }

    /// Set the request text.
    pub fn with_request_text(mut self, text: impl Into<String>) -> Self {
        self.request_text = text.into();
        self
    }

    /// Set the service and channel identities.
    pub fn with_identities(mut self, identities: Identities) -> Self {
        self.identities = identities;
        self
    }

    /// The request built from `request_text`.
    pub fn request(&self) -> Request {
        Request::new(self.request_text.clone())
    }
}

#[cfg(feature = "serde")]
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
