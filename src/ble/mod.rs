//! BLE communication module.
//!
//! This module holds the radio interface the session drives, its btleplug
//! implementation, adapter power tracking and the fixed UUIDs.

pub mod adapter;
pub mod btleplug_radio;
pub mod radio;
pub mod uuids;

pub use adapter::{AdapterMonitor, AdapterState};
pub use btleplug_radio::BtleplugRadio;
pub use radio::{ChannelHandle, EventSink, PeripheralHandle, Radio, ServiceHandle};
pub use uuids::*;
