//! The central runtime.
//!
//! One tokio task is the serial execution context: it owns the [`Session`],
//! pulls events off a single queue in arrival order and carries out the
//! returned effects. Scan start/stop run inline; connection, discovery,
//! write and read are spawned and report back through the same queue, so the
//! loop never waits on the peripheral.

use parking_lot::RwLock;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::ble::btleplug_radio::BtleplugRadio;
use crate::ble::radio::{EventSink, Radio};
use crate::config::CentralConfig;
use crate::error::{Error, Result};
use crate::session::{CampaignStatus, Effect, Event, Session};
use crate::timer::TimerSlot;

/// Runs campaigns against a [`Radio`].
pub struct Central {
    /// Queue into the event loop.
    sink: EventSink,
    /// Latest session snapshot.
    status: Arc<RwLock<CampaignStatus>>,
    /// Status change channel.
    status_tx: broadcast::Sender<CampaignStatus>,
    /// Stops the event loop.
    shutdown_tx: RwLock<Option<oneshot::Sender<()>>>,
    /// Event loop task.
    loop_handle: RwLock<Option<JoinHandle<()>>>,
    /// Running flag.
    is_running: Arc<AtomicBool>,
}

impl Central {
    /// Create a central on the first Bluetooth adapter of this system.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new(config: CentralConfig) -> Result<Self> {
        let radio = BtleplugRadio::new().await?;
        Self::with_radio(radio, config).await
    }

    /// Create a central on top of any [`Radio`].
    ///
    /// # Errors
    ///
    /// Returns an error if the radio refuses the event subscription.
    pub async fn with_radio<R: Radio>(radio: R, config: CentralConfig) -> Result<Self> {
        let radio = Arc::new(radio);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(event_tx);

        // Events reported during subscription wait in the queue for the loop.
        radio.subscribe(sink.clone()).await?;

        let session = Session::new(config);
        let status = Arc::new(RwLock::new(session.status()));
        let (status_tx, _) = broadcast::channel(64);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let is_running = Arc::new(AtomicBool::new(true));

        let driver = Driver {
            session,
            radio: radio.clone(),
            sink: sink.clone(),
            scan_timer: TimerSlot::new(),
            retry_timer: TimerSlot::new(),
            status: status.clone(),
            status_tx: status_tx.clone(),
        };

        let running = is_running.clone();
        let handle = tokio::spawn(async move {
            driver.run(event_rx, shutdown_rx).await;
            running.store(false, Ordering::SeqCst);
        });

        info!("Central started");

        Ok(Self {
            sink,
            status,
            status_tx,
            shutdown_tx: RwLock::new(Some(shutdown_tx)),
            loop_handle: RwLock::new(Some(handle)),
            is_running,
        })
    }

    /// Ask the session to start a campaign.
    ///
    /// The command is queued; a campaign already in flight or a radio that is
    /// not powered on makes it a logged no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotRunning`] after shutdown.
    pub fn go(&self) -> Result<()> {
        if !self.is_running() || !self.sink.emit(Event::Go) {
            return Err(Error::NotRunning);
        }
        Ok(())
    }

    /// Latest session snapshot.
    pub fn status(&self) -> CampaignStatus {
        self.status.read().clone()
    }

    /// Subscribe to session snapshots, sent on every change.
    pub fn subscribe(&self) -> broadcast::Receiver<CampaignStatus> {
        self.status_tx.subscribe()
    }

    /// Check if the event loop is running.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Wait until the adapter reports `PoweredOn`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BluetoothUnavailable`] if it does not within `timeout`.
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<()> {
        self.wait_for(timeout, |status| status.adapter_state.is_ready())
            .await
            .map(|_| ())
            .map_err(|e| match e {
                Error::Timeout => Error::BluetoothUnavailable,
                other => other,
            })
    }

    /// Wait until `predicate` holds for a snapshot and return that snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] on timeout and [`Error::NotRunning`] if the
    /// loop stops first.
    pub async fn wait_for<F>(&self, timeout: Duration, predicate: F) -> Result<CampaignStatus>
    where
        F: Fn(&CampaignStatus) -> bool,
    {
        let mut rx = self.subscribe();
        let current = self.status();
        if predicate(&current) {
            return Ok(current);
        }

        let wait = async {
            loop {
                match rx.recv().await {
                    Ok(status) if predicate(&status) => return Ok(status),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        let current = self.status();
                        if predicate(&current) {
                            return Ok(current);
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return Err(Error::NotRunning),
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| Error::Timeout)?
    }

    /// Stop the event loop, cancel pending timers and release the radio.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down central");

        if let Some(tx) = self.shutdown_tx.write().take() {
            let _ = tx.send(());
        }

        let handle = self.loop_handle.write().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Event loop ended abnormally: {}", e);
            }
        }

        self.is_running.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for Central {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.write().take() {
            let _ = tx.send(());
        }
    }
}

/// State owned by the event loop task.
struct Driver<R: Radio> {
    session: Session,
    radio: Arc<R>,
    sink: EventSink,
    scan_timer: TimerSlot,
    retry_timer: TimerSlot,
    status: Arc<RwLock<CampaignStatus>>,
    status_tx: broadcast::Sender<CampaignStatus>,
}

impl<R: Radio> Driver<R> {
    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<Event>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.dispatch(event).await,
                    None => break,
                },
                _ = &mut shutdown => break,
            }
        }

        self.teardown().await;
        debug!("Central event loop ended");
    }

    async fn dispatch(&mut self, event: Event) {
        debug!("Event: {:?}", event);
        let effects = self.session.handle(event);
        for effect in effects {
            self.execute(effect).await;
        }
        self.publish();
    }

    async fn execute(&mut self, effect: Effect) {
        debug!("Effect: {}", effect.name());
        match effect {
            Effect::StopScan => {
                if let Err(e) = self.radio.stop_scan().await {
                    warn!("Failed to stop scan: {}", e);
                }
            }
            Effect::StartScan { services } => {
                // A scan that never starts still ends by timeout.
                if let Err(e) = self.radio.start_scan(&services).await {
                    error!("Failed to start scan: {}", e);
                }
            }
            Effect::ArmScanTimer { round, after } => {
                self.scan_timer
                    .arm("scan timer", after, self.sink.clone(), Event::TimerFired { round });
            }
            Effect::CancelScanTimer => self.scan_timer.cancel(),
            Effect::Connect { peripheral } => {
                let radio = self.radio.clone();
                self.spawn_op(async move {
                    match radio.connect(&peripheral).await {
                        Ok(()) => Event::Connected { peripheral },
                        Err(e) => Event::ConnectFailed {
                            peripheral,
                            reason: e.to_string(),
                        },
                    }
                });
            }
            Effect::CancelConnection { peripheral } => {
                let radio = self.radio.clone();
                self.spawn_op(async move {
                    if let Err(e) = radio.cancel_connection(&peripheral).await {
                        warn!("Failed to disconnect {}: {}", peripheral, e);
                    }
                    Event::ConnectionCancelled { peripheral }
                });
            }
            Effect::DiscoverServices {
                peripheral,
                services,
            } => {
                let radio = self.radio.clone();
                self.spawn_op(async move {
                    let result = radio
                        .discover_services(&peripheral, &services)
                        .await
                        .map_err(|e| e.to_string());
                    Event::ServicesDiscovered { peripheral, result }
                });
            }
            Effect::DiscoverCharacteristics {
                peripheral,
                service,
            } => {
                let radio = self.radio.clone();
                self.spawn_op(async move {
                    let result = radio
                        .discover_characteristics(&peripheral, &service)
                        .await
                        .map_err(|e| e.to_string());
                    Event::CharacteristicsDiscovered {
                        peripheral,
                        service,
                        result,
                    }
                });
            }
            Effect::WriteValue {
                peripheral,
                channel,
                value,
                ack_required,
            } => {
                let radio = self.radio.clone();
                self.spawn_op(async move {
                    let result = radio
                        .write_value(&peripheral, &channel, &value, ack_required)
                        .await
                        .map_err(|e| e.to_string());
                    Event::WriteCompleted { peripheral, result }
                });
            }
            Effect::ReadValue {
                peripheral,
                channel,
            } => {
                let radio = self.radio.clone();
                self.spawn_op(async move {
                    let result = radio
                        .read_value(&peripheral, &channel)
                        .await
                        .map_err(|e| e.to_string());
                    Event::ValueUpdated { peripheral, result }
                });
            }
            Effect::ScheduleRetry { round, after } => {
                self.retry_timer
                    .arm("retry", after, self.sink.clone(), Event::RetryElapsed { round });
            }
        }
    }

    /// Run a radio operation off the loop and queue the event it yields.
    fn spawn_op<F>(&self, op: F)
    where
        F: Future<Output = Event> + Send + 'static,
    {
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let event = op.await;
            if !sink.emit(event) {
                debug!("Central stopped before operation completed");
            }
        });
    }

    fn publish(&self) {
        let status = self.session.status();
        let old = {
            let mut current = self.status.write();
            if *current == status {
                return;
            }
            std::mem::replace(&mut *current, status.clone())
        };

        if old.state != status.state {
            debug!("Session state changed: {} -> {}", old.state, status.state);
        }
        let _ = self.status_tx.send(status);
    }

    async fn teardown(&mut self) {
        self.scan_timer.cancel();
        self.retry_timer.cancel();

        let held = self
            .session
            .round()
            .peripheral()
            .or(self.session.closing())
            .cloned();
        if let Some(peripheral) = held {
            if let Err(e) = self.radio.cancel_connection(&peripheral).await {
                warn!("Failed to disconnect {}: {}", peripheral, e);
            }
        }
        if let Err(e) = self.radio.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }
    }
}
