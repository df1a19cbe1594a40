//! The radio interface consumed by the central.
//!
//! A [`Radio`] covers both the adapter (power, scan, connect) and the
//! peripheral proxy (discovery, write, read). Long-running calls return their
//! result directly; unsolicited traffic (power changes, advertisements, link
//! loss) is pushed through the [`EventSink`] handed to [`Radio::subscribe`].

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

use crate::error::Result;
use crate::session::Event;

/// Opaque handle to a discovered peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeripheralHandle {
    id: String,
}

impl PeripheralHandle {
    /// Create a handle from the platform identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Platform identifier of the peripheral.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl std::fmt::Display for PeripheralHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

/// A discovered GATT service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServiceHandle {
    /// Service UUID.
    pub uuid: Uuid,
}

/// A discovered GATT characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelHandle {
    /// Characteristic UUID.
    pub uuid: Uuid,
    /// UUID of the service the characteristic belongs to.
    pub service_uuid: Uuid,
}

/// Sender half of the central's serial event queue.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSink {
    /// Wrap a channel sender.
    pub fn new(tx: mpsc::UnboundedSender<Event>) -> Self {
        Self { tx }
    }

    /// Queue an event. Returns false once the central has stopped.
    pub fn emit(&self, event: Event) -> bool {
        trace!("Queueing event: {:?}", event);
        self.tx.send(event).is_ok()
    }

    /// Check if the receiving side is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Adapter and peripheral operations used by a session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Radio: Send + Sync + 'static {
    /// Start forwarding power changes, matching advertisements and
    /// disconnections into `sink`. The current power state should be
    /// reported immediately.
    async fn subscribe(&self, sink: EventSink) -> Result<()>;

    /// Start a discovery filtered on `services`.
    async fn start_scan(&self, services: &[Uuid]) -> Result<()>;

    /// Stop any running discovery.
    async fn stop_scan(&self) -> Result<()>;

    /// Connect to a peripheral found during discovery.
    async fn connect(&self, peripheral: &PeripheralHandle) -> Result<()>;

    /// Tear down the connection (or pending connection) to a peripheral.
    async fn cancel_connection(&self, peripheral: &PeripheralHandle) -> Result<()>;

    /// Discover services, restricted to `services`.
    async fn discover_services(
        &self,
        peripheral: &PeripheralHandle,
        services: &[Uuid],
    ) -> Result<Vec<ServiceHandle>>;

    /// Discover all characteristics of `service`.
    async fn discover_characteristics(
        &self,
        peripheral: &PeripheralHandle,
        service: &ServiceHandle,
    ) -> Result<Vec<ChannelHandle>>;

    /// Write `value` to `channel`, waiting for the acknowledgement when
    /// `ack_required` is set.
    async fn write_value(
        &self,
        peripheral: &PeripheralHandle,
        channel: &ChannelHandle,
        value: &[u8],
        ack_required: bool,
    ) -> Result<()>;

    /// Read the current value of `channel`.
    async fn read_value(
        &self,
        peripheral: &PeripheralHandle,
        channel: &ChannelHandle,
    ) -> Result<Vec<u8>>;
}
