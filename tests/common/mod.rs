//! Scripted radio shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use timer_central::ble::uuids::{
    REQUEST_CHARACTERISTIC_UUID, RESPONSE_CHARACTERISTIC_UUID, SERVICE_UUID,
};
use timer_central::{
    AdapterState, CampaignStatus, Central, ChannelHandle, Error, Event, EventSink,
    PeripheralHandle, Radio, Result, ServiceHandle,
};

/// Radio call, as recorded by [`FakeRadio`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    StartScan(Vec<Uuid>),
    StopScan,
    Connect(PeripheralHandle),
    CancelConnection(PeripheralHandle),
    DiscoverServices(Vec<Uuid>),
    DiscoverCharacteristics(Uuid),
    Write { value: Vec<u8>, ack_required: bool },
    Read(Uuid),
}

/// What the fake peripheral does on every round.
#[derive(Debug, Clone)]
pub struct Script {
    pub power: AdapterState,
    pub advertise: bool,
    pub connect: std::result::Result<(), String>,
    pub services: std::result::Result<Vec<ServiceHandle>, String>,
    pub characteristics: std::result::Result<Vec<ChannelHandle>, String>,
    pub write: std::result::Result<(), String>,
    pub read: std::result::Result<Vec<u8>, String>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            power: AdapterState::PoweredOn,
            advertise: true,
            connect: Ok(()),
            services: Ok(vec![ServiceHandle { uuid: SERVICE_UUID }]),
            characteristics: Ok(vec![
                ChannelHandle {
                    uuid: REQUEST_CHARACTERISTIC_UUID,
                    service_uuid: SERVICE_UUID,
                },
                ChannelHandle {
                    uuid: RESPONSE_CHARACTERISTIC_UUID,
                    service_uuid: SERVICE_UUID,
                },
            ]),
            write: Ok(()),
            read: Ok(b"pong".to_vec()),
        }
    }
}

/// In-memory radio that answers every call from a [`Script`].
#[derive(Clone, Default)]
pub struct FakeRadio {
    script: Arc<Mutex<Script>>,
    calls: Arc<Mutex<Vec<Call>>>,
    sink: Arc<Mutex<Option<EventSink>>>,
}

impl FakeRadio {
    pub fn new(script: Script) -> Self {
        Self {
            script: Arc::new(Mutex::new(script)),
            ..Self::default()
        }
    }

    pub fn peripheral() -> PeripheralHandle {
        PeripheralHandle::new("fake-peripheral")
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| predicate(*c)).count()
    }

    pub fn scan_starts(&self) -> usize {
        self.count(|c| matches!(c, Call::StartScan(_)))
    }

    pub fn update(&self, f: impl FnOnce(&mut Script)) {
        f(&mut self.script.lock());
    }

    /// Push an unsolicited event, as the platform would.
    pub fn emit(&self, event: Event) {
        if let Some(sink) = self.sink.lock().as_ref() {
            sink.emit(event);
        }
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

fn to_error(reason: String) -> Error {
    Error::Internal(reason)
}

#[async_trait]
impl Radio for FakeRadio {
    async fn subscribe(&self, sink: EventSink) -> Result<()> {
        sink.emit(Event::PowerChanged(self.script.lock().power));
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    async fn start_scan(&self, services: &[Uuid]) -> Result<()> {
        self.record(Call::StartScan(services.to_vec()));
        if self.script.lock().advertise {
            self.emit(Event::PeripheralDiscovered {
                peripheral: Self::peripheral(),
            });
        }
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.record(Call::StopScan);
        Ok(())
    }

    async fn connect(&self, peripheral: &PeripheralHandle) -> Result<()> {
        self.record(Call::Connect(peripheral.clone()));
        self.script.lock().connect.clone().map_err(to_error)
    }

    async fn cancel_connection(&self, peripheral: &PeripheralHandle) -> Result<()> {
        self.record(Call::CancelConnection(peripheral.clone()));
        // The platform reports our own disconnects too.
        self.emit(Event::Disconnected {
            peripheral: peripheral.clone(),
        });
        Ok(())
    }

    async fn discover_services(
        &self,
        _peripheral: &PeripheralHandle,
        services: &[Uuid],
    ) -> Result<Vec<ServiceHandle>> {
        self.record(Call::DiscoverServices(services.to_vec()));
        self.script.lock().services.clone().map_err(to_error)
    }

    async fn discover_characteristics(
        &self,
        _peripheral: &PeripheralHandle,
        service: &ServiceHandle,
    ) -> Result<Vec<ChannelHandle>> {
        self.record(Call::DiscoverCharacteristics(service.uuid));
        self.script.lock().characteristics.clone().map_err(to_error)
    }

    async fn write_value(
        &self,
        _peripheral: &PeripheralHandle,
        _channel: &ChannelHandle,
        value: &[u8],
        ack_required: bool,
    ) -> Result<()> {
        self.record(Call::Write {
            value: value.to_vec(),
            ack_required,
        });
        self.script.lock().write.clone().map_err(to_error)
    }

    async fn read_value(
        &self,
        _peripheral: &PeripheralHandle,
        channel: &ChannelHandle,
    ) -> Result<Vec<u8>> {
        self.record(Call::Read(channel.uuid));
        self.script.lock().read.clone().map_err(to_error)
    }
}

/// Issue `go` and wait for the campaign it starts to end.
pub async fn run_campaign(central: &Central) -> CampaignStatus {
    let mut rx = central.subscribe();
    central.go().expect("central running");

    let mut started = false;
    loop {
        let received = tokio::time::timeout(Duration::from_secs(600), rx.recv())
            .await
            .expect("campaign did not finish");
        match received {
            Ok(status) if status.is_busy() => started = true,
            Ok(status) if started => return status,
            Ok(_) => {}
            Err(RecvError::Lagged(_)) => {
                started = true;
                let status = central.status();
                if !status.is_busy() {
                    return status;
                }
            }
            Err(RecvError::Closed) => panic!("central stopped"),
        }
    }
}
