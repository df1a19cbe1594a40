//! BLE Service and Characteristic UUIDs.
//!
//! Contains the fixed identities of the request/response service and the
//! mapping from an identity to the role it plays in an exchange.

use uuid::Uuid;

/// Request/response service UUID advertised by the peripheral.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0xd5c677e9_7090_452b_8251_cb3ea027fe4f);
/// Request characteristic UUID (write with response).
pub const REQUEST_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x2b771f92_cbc8_4c69_816b_b844e87e9cd4);
/// Response characteristic UUID (read).
pub const RESPONSE_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0xcd565dae_c38b_42a7_957c_7d2aae75dd1d);

/// Role an attribute plays in the request/response exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CharacteristicRole {
    /// The request/response service itself.
    Service,
    /// Channel the request payload is written to.
    RequestChannel,
    /// Channel the response is read from.
    ResponseChannel,
    /// Anything else.
    #[default]
    Unknown,
}

impl CharacteristicRole {
    /// Short name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::RequestChannel => "requestCharacteristic",
            Self::ResponseChannel => "responseCharacteristic",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for CharacteristicRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The three identities a session looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Identities {
    /// Service to scan for and discover.
    pub service: Uuid,
    /// Request characteristic.
    pub request: Uuid,
    /// Response characteristic.
    pub response: Uuid,
}

impl Default for Identities {
    fn default() -> Self {
        Self {
            service: SERVICE_UUID,
            request: REQUEST_CHARACTERISTIC_UUID,
            response: RESPONSE_CHARACTERISTIC_UUID,
        }
    }
}

impl Identities {
    /// Map a UUID to its role.
    pub fn role_for(&self, uuid: &Uuid) -> CharacteristicRole {
        if *uuid == self.service {
            CharacteristicRole::Service
        } else if *uuid == self.request {
            CharacteristicRole::RequestChannel
        } else if *uuid == self.response {
            CharacteristicRole::ResponseChannel
        } else {
            CharacteristicRole::Unknown
        }
    }
}
