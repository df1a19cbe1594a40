// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # timer-central
//!
//! A Bluetooth Low Energy central that runs request/response campaigns
//! against a single peripheral.
//!
//! A campaign is started by [`Central::go`]. Each round scans for a
//! peripheral advertising the request/response service, connects, discovers
//! the request and response characteristics, writes a short text request
//! with acknowledgement, reads the response back and disconnects. Rounds
//! repeat until the scan budget is spent; a scan that finds nothing within
//! the deadline ends the campaign.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use timer_central::{Central, CentralConfig, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let central = Central::new(CentralConfig::default()).await?;
//!     central.wait_until_ready(Duration::from_secs(5)).await?;
//!
//!     central.go()?;
//!     tokio::time::sleep(Duration::from_secs(30)).await;
//!
//!     let status = central.status();
//!     println!(
//!         "{} requests, {} responses",
//!         status.campaign.request_count, status.campaign.response_count
//!     );
//!
//!     central.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Testing without a radio
//!
//! [`Session`] is a pure transition function from [`Event`] to [`Effect`]s,
//! and [`Central::with_radio`] accepts any [`Radio`], so campaigns can be
//! driven end to end with synthetic peripherals.
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for config and status types

// Public modules
pub mod ble;
pub mod central;
pub mod config;
pub mod error;
pub mod protocol;
pub mod session;
pub mod timer;

// Re-exports for convenience
pub use central::Central;
pub use config::CentralConfig;
pub use error::{Error, Result, RoundError};

pub use ble::adapter::AdapterState;
pub use ble::radio::{ChannelHandle, EventSink, PeripheralHandle, Radio, ServiceHandle};
pub use ble::uuids::{CharacteristicRole, Identities};
pub use protocol::{Request, Response};
pub use session::{Campaign, CampaignStatus, Effect, Event, Session, SessionState};
