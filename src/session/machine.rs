//! The session transition function.
//!
//! [`Session::handle`] consumes one [`Event`] and returns the [`Effect`]s the
//! runtime must carry out. It never blocks and never talks to the radio
//! itself, so every path can be driven with synthetic events.

use tracing::{debug, info, warn};

use crate::ble::adapter::{AdapterMonitor, AdapterState};
use crate::ble::radio::{ChannelHandle, PeripheralHandle, ServiceHandle};
use crate::ble::uuids::CharacteristicRole;
use crate::config::CentralConfig;
use crate::error::RoundError;
use crate::protocol::{Request, Response};
use crate::session::event::{Effect, Event, Outcome};
use crate::session::state::{Campaign, CampaignStatus, Round, SessionState};

/// Campaign and round sequencing for a single central.
#[derive(Debug, Clone)]
pub struct Session {
    config: CentralConfig,
    request: Request,
    adapter: AdapterMonitor,
    state: SessionState,
    campaign: Campaign,
    round: Round,
    round_seq: u64,
    /// Peripheral whose cancel is in flight while `Disconnecting`.
    closing: Option<PeripheralHandle>,
}

impl Session {
    /// Create an idle session.
    pub fn new(config: CentralConfig) -> Self {
        let request = config.request();
        Self {
            config,
            request,
            adapter: AdapterMonitor::new(),
            state: SessionState::Idle,
            campaign: Campaign::default(),
            round: Round::default(),
            round_seq: 0,
            closing: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Current or most recent campaign.
    pub fn campaign(&self) -> &Campaign {
        &self.campaign
    }

    /// Handles of the round in flight.
    pub fn round(&self) -> &Round {
        &self.round
    }

    /// Peripheral being released, if any.
    pub fn closing(&self) -> Option<&PeripheralHandle> {
        self.closing.as_ref()
    }

    /// Last reported adapter state.
    pub fn adapter_state(&self) -> AdapterState {
        self.adapter.state()
    }

    /// Whether a campaign is in flight.
    pub fn is_busy(&self) -> bool {
        self.campaign.busy
    }

    /// Configuration the session was built with.
    pub fn config(&self) -> &CentralConfig {
        &self.config
    }

    /// Snapshot for observers.
    pub fn status(&self) -> CampaignStatus {
        CampaignStatus {
            state: self.state,
            adapter_state: self.adapter.state(),
            campaign: self.campaign.clone(),
        }
    }

    /// Apply one event.
    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::Go => match self.go() {
                Ok(effects) => effects,
                Err(e) => {
                    warn!("go rejected: {}", e);
                    Vec::new()
                }
            },
            Event::PowerChanged(state) => {
                info!("Adapter state: {}", state);
                self.adapter.update(state);
                Vec::new()
            }
            Event::PeripheralDiscovered { peripheral } => self.on_discovered(peripheral),
            Event::Connected { peripheral } => self.on_connected(peripheral),
            Event::ConnectFailed { peripheral, reason } => {
                if !self.expects(SessionState::Connecting, &peripheral, "connect failure") {
                    return Vec::new();
                }
                self.end_round(Some(RoundError::ConnectFailed { reason }))
            }
            Event::ServicesDiscovered { peripheral, result } => {
                self.on_services(peripheral, result)
            }
            Event::CharacteristicsDiscovered {
                peripheral,
                service,
                result,
            } => self.on_characteristics(peripheral, service, result),
            Event::WriteCompleted { peripheral, result } => self.on_write(peripheral, result),
            Event::ValueUpdated { peripheral, result } => self.on_value(peripheral, result),
            Event::Disconnected { peripheral } => self.on_disconnected(peripheral),
            Event::ConnectionCancelled { peripheral } => self.on_cancelled(peripheral),
            Event::TimerFired { round } => self.on_timeout(round),
            Event::RetryElapsed { round } => self.on_retry(round),
        }
    }

    /// Start a campaign.
    ///
    /// # Errors
    ///
    /// [`RoundError::ReentrantStart`] while a campaign is in flight,
    /// [`RoundError::AdapterNotReady`] while the radio is not powered on and
    /// [`RoundError::NoBudget`] when the request budget is zero. None of them
    /// touches the session.
    pub fn go(&mut self) -> Result<Vec<Effect>, RoundError> {
        info!("go");
        if self.campaign.busy {
            return Err(RoundError::ReentrantStart);
        }
        if !self.adapter.is_ready() {
            return Err(RoundError::AdapterNotReady);
        }
        if self.config.max_requests == 0 {
            return Err(RoundError::NoBudget);
        }

        self.campaign = Campaign::start(self.config.max_requests);
        Ok(self.start_scan())
    }

    fn start_scan(&mut self) -> Vec<Effect> {
        self.campaign.request_count += 1;
        self.round_seq += 1;
        self.round = Round::new(self.round_seq);
        self.state = SessionState::Scanning;

        let service = self.config.identities.service;
        info!("making request {}", self.campaign.request_count);
        debug!(
            "Scanning for {} {} (round {})",
            self.config.identities.role_for(&service),
            service,
            self.round_seq
        );

        vec![
            Effect::ArmScanTimer {
                round: self.round_seq,
                after: self.config.scan_timeout,
            },
            Effect::StopScan,
            Effect::StartScan {
                services: vec![service],
            },
        ]
    }

    fn on_discovered(&mut self, peripheral: PeripheralHandle) -> Vec<Effect> {
        if self.state != SessionState::Scanning {
            debug!("Ignoring advertisement from {} in {}", peripheral, self.state);
            return Vec::new();
        }

        info!("Discovered peripheral {}", peripheral);
        self.state = SessionState::Connecting;
        self.round.peripheral = Some(peripheral.clone());

        vec![
            Effect::CancelScanTimer,
            Effect::StopScan,
            Effect::Connect { peripheral },
        ]
    }

    fn on_timeout(&mut self, round: u64) -> Vec<Effect> {
        if self.state != SessionState::Scanning || round != self.round.seq {
            debug!("Ignoring stale scan timer for round {}", round);
            return Vec::new();
        }

        warn!("timed out");
        self.round.clear();
        self.campaign.last_error = Some(RoundError::ScanTimeout);
        self.campaign.finish();
        self.state = SessionState::Idle;
        info!(
            "Campaign ended after {} requests, {} responses",
            self.campaign.request_count, self.campaign.response_count
        );

        vec![Effect::StopScan]
    }

    fn on_connected(&mut self, peripheral: PeripheralHandle) -> Vec<Effect> {
        if !self.expects(SessionState::Connecting, &peripheral, "connection") {
            return Vec::new();
        }

        info!("Connected to {}", peripheral);
        self.state = SessionState::DiscoveringServices;

        vec![Effect::DiscoverServices {
            peripheral,
            services: vec![self.config.identities.service],
        }]
    }

    fn on_services(
        &mut self,
        peripheral: PeripheralHandle,
        result: Outcome<Vec<ServiceHandle>>,
    ) -> Vec<Effect> {
        if !self.expects(SessionState::DiscoveringServices, &peripheral, "services") {
            return Vec::new();
        }

        let services = match result {
            Ok(services) if services.is_empty() => {
                return self.end_round(Some(RoundError::ServiceDiscoveryFailed {
                    reason: "no services found".to_string(),
                }));
            }
            Ok(services) => services,
            Err(reason) => {
                return self.end_round(Some(RoundError::ServiceDiscoveryFailed { reason }));
            }
        };

        self.state = SessionState::DiscoveringCharacteristics;
        self.round.pending_discoveries = services.len();

        services
            .into_iter()
            .map(|service| {
                debug!(
                    "service {} {}",
                    self.config.identities.role_for(&service.uuid),
                    service.uuid
                );
                Effect::DiscoverCharacteristics {
                    peripheral: peripheral.clone(),
                    service,
                }
            })
            .collect()
    }

    fn on_characteristics(
        &mut self,
        peripheral: PeripheralHandle,
        service: ServiceHandle,
        result: Outcome<Vec<ChannelHandle>>,
    ) -> Vec<Effect> {
        if !self.expects(
            SessionState::DiscoveringCharacteristics,
            &peripheral,
            "characteristics",
        ) {
            return Vec::new();
        }

        let characteristics = match result {
            Ok(characteristics) => characteristics,
            Err(reason) => {
                warn!("Characteristic discovery failed for {}", service.uuid);
                return self.end_round(Some(RoundError::CharacteristicDiscoveryFailed { reason }));
            }
        };

        for characteristic in characteristics {
            let role = self.config.identities.role_for(&characteristic.uuid);
            debug!("characteristic {} {}", role, characteristic.uuid);
            match role {
                CharacteristicRole::RequestChannel => {
                    self.round.request_channel = Some(characteristic)
                }
                CharacteristicRole::ResponseChannel => {
                    self.round.response_channel = Some(characteristic)
                }
                CharacteristicRole::Service | CharacteristicRole::Unknown => {}
            }
        }

        self.round.pending_discoveries = self.round.pending_discoveries.saturating_sub(1);
        if self.round.pending_discoveries > 0 {
            return Vec::new();
        }

        let (Some(channel), Some(_)) = (
            self.round.request_channel,
            self.round.response_channel,
        ) else {
            return self.end_round(Some(RoundError::ChannelsMissing));
        };

        info!("sendRequest");
        self.state = SessionState::RequestSent;

        vec![Effect::WriteValue {
            peripheral,
            channel,
            value: self.request.encode(),
            ack_required: true,
        }]
    }

    fn on_write(&mut self, peripheral: PeripheralHandle, result: Outcome<()>) -> Vec<Effect> {
        if !self.expects(SessionState::RequestSent, &peripheral, "write ack") {
            return Vec::new();
        }

        if let Err(reason) = result {
            return self.end_round(Some(RoundError::WriteFailed { reason }));
        }

        let Some(channel) = self.round.response_channel else {
            return self.end_round(Some(RoundError::ChannelsMissing));
        };

        debug!("Write acknowledged, reading response");
        self.state = SessionState::AwaitingResponse;

        vec![Effect::ReadValue {
            peripheral,
            channel,
        }]
    }

    fn on_value(&mut self, peripheral: PeripheralHandle, result: Outcome<Vec<u8>>) -> Vec<Effect> {
        if !self.expects(SessionState::AwaitingResponse, &peripheral, "value") {
            return Vec::new();
        }

        let data = match result {
            Ok(data) => data,
            Err(reason) => return self.end_round(Some(RoundError::ReadFailed { reason })),
        };

        match Response::decode(&data) {
            Ok(response) => {
                self.campaign.response_count += 1;
                info!(
                    "received response {}: {}",
                    self.campaign.response_count, response
                );
                self.campaign.last_response = Some(response.into_text());
                self.end_round(None)
            }
            Err(e) => self.end_round(Some(RoundError::ResponseDecodeFailed {
                reason: e.to_string(),
            })),
        }
    }

    fn on_disconnected(&mut self, peripheral: PeripheralHandle) -> Vec<Effect> {
        if !self.state.has_link() || !self.round.owns(&peripheral) {
            debug!("Ignoring disconnection of {} in {}", peripheral, self.state);
            return Vec::new();
        }

        self.end_round(Some(RoundError::LinkLost))
    }

    fn on_retry(&mut self, round: u64) -> Vec<Effect> {
        if self.state != SessionState::RetryPending || round != self.round.seq {
            debug!("Ignoring stale retry for round {}", round);
            return Vec::new();
        }

        self.start_scan()
    }

    fn on_cancelled(&mut self, peripheral: PeripheralHandle) -> Vec<Effect> {
        if self.state != SessionState::Disconnecting || self.closing.as_ref() != Some(&peripheral)
        {
            debug!("Ignoring cancel of {} in {}", peripheral, self.state);
            return Vec::new();
        }

        debug!("Released {}", peripheral);
        self.closing = None;
        self.after_round()
    }

    /// Tear the round down.
    ///
    /// The next step waits in `Disconnecting` until the cancel of the held
    /// peripheral completes, so its disconnection cannot reach the next round.
    fn end_round(&mut self, error: Option<RoundError>) -> Vec<Effect> {
        self.state = SessionState::Disconnecting;
        info!("disconnect");

        if let Some(error) = error {
            warn!("Round {} failed: {}", self.round.seq, error);
            self.campaign.last_error = Some(error);
        }

        let held = self.round.peripheral.take();
        self.round.clear();

        match held {
            Some(peripheral) => {
                self.closing = Some(peripheral.clone());
                vec![Effect::CancelConnection { peripheral }]
            }
            None => self.after_round(),
        }
    }

    /// Decide whether another round follows.
    fn after_round(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.campaign.has_budget() {
            self.state = SessionState::RetryPending;
            effects.push(Effect::ScheduleRetry {
                round: self.round.seq,
                after: self.config.retry_delay,
            });
        } else {
            self.campaign.finish();
            self.state = SessionState::Idle;
            info!(
                "Campaign complete: {} requests, {} responses",
                self.campaign.request_count, self.campaign.response_count
            );
        }

        effects
    }

    fn expects(&self, state: SessionState, peripheral: &PeripheralHandle, what: &str) -> bool {
        if self.state != state || !self.round.owns(peripheral) {
            debug!(
                "Ignoring {} from {} in {} (expected {})",
                what, peripheral, self.state, state
            );
            return false;
        }
        true
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(CentralConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::uuids::{
        REQUEST_CHARACTERISTIC_UUID, RESPONSE_CHARACTERISTIC_UUID, SERVICE_UUID,
    };
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use uuid::Uuid;

    fn peripheral() -> PeripheralHandle {
        PeripheralHandle::new("peripheral-1")
    }

    fn service() -> ServiceHandle {
        ServiceHandle { uuid: SERVICE_UUID }
    }

    fn request_channel() -> ChannelHandle {
        ChannelHandle {
            uuid: REQUEST_CHARACTERISTIC_UUID,
            service_uuid: SERVICE_UUID,
        }
    }

    fn response_channel() -> ChannelHandle {
        ChannelHandle {
            uuid: RESPONSE_CHARACTERISTIC_UUID,
            service_uuid: SERVICE_UUID,
        }
    }

    fn powered_session(max_requests: u32) -> Session {
        let mut session = Session::new(CentralConfig::default().with_max_requests(max_requests));
        session.handle(Event::PowerChanged(AdapterState::PoweredOn));
        session
    }

    /// Drive a session from `go` up to the point where the request is written.
    fn to_request_sent(session: &mut Session) {
        session.handle(Event::Go);
        session.handle(Event::PeripheralDiscovered {
            peripheral: peripheral(),
        });
        session.handle(Event::Connected {
            peripheral: peripheral(),
        });
        session.handle(Event::ServicesDiscovered {
            peripheral: peripheral(),
            result: Ok(vec![service()]),
        });
        session.handle(Event::CharacteristicsDiscovered {
            peripheral: peripheral(),
            service: service(),
            result: Ok(vec![request_channel(), response_channel()]),
        });
        assert_eq!(session.state(), SessionState::RequestSent);
    }

    /// Report the cancel of `peripheral()` as finished.
    fn release(session: &mut Session) -> Vec<Effect> {
        session.handle(Event::ConnectionCancelled {
            peripheral: peripheral(),
        })
    }

    #[test]
    fn test_go_rejected_when_not_ready() {
        let mut session = Session::default();
        assert_eq!(session.go(), Err(RoundError::AdapterNotReady));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.campaign().request_count, 0);
        assert!(!session.is_busy());
    }

    #[test]
    fn test_go_rejected_without_budget() {
        let mut session = powered_session(0);
        assert_eq!(session.go(), Err(RoundError::NoBudget));
        assert!(session.handle(Event::Go).is_empty());
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.campaign().request_count, 0);
        assert!(!session.is_busy());
    }

    #[test]
    fn test_go_starts_scan() {
        let mut session = powered_session(40);
        let effects = session.handle(Event::Go);

        assert_eq!(
            effects,
            vec![
                Effect::ArmScanTimer {
                    round: 1,
                    after: Duration::from_secs(8)
                },
                Effect::StopScan,
                Effect::StartScan {
                    services: vec![SERVICE_UUID]
                },
            ]
        );
        assert_eq!(session.state(), SessionState::Scanning);
        assert!(session.is_busy());
        assert_eq!(session.campaign().request_count, 1);
        assert!(session.round().is_clear());
    }

    #[test]
    fn test_second_go_while_scanning_is_noop() {
        let mut session = powered_session(40);
        session.handle(Event::Go);
        let before = session.status();

        assert_eq!(session.go(), Err(RoundError::ReentrantStart));
        assert!(session.handle(Event::Go).is_empty());
        assert_eq!(session.status(), before);
        assert_eq!(session.campaign().request_count, 1);
    }

    #[test]
    fn test_discovery_cancels_timer_and_connects() {
        let mut session = powered_session(40);
        session.handle(Event::Go);

        let effects = session.handle(Event::PeripheralDiscovered {
            peripheral: peripheral(),
        });
        assert_eq!(
            effects,
            vec![
                Effect::CancelScanTimer,
                Effect::StopScan,
                Effect::Connect {
                    peripheral: peripheral()
                },
            ]
        );
        assert_eq!(session.state(), SessionState::Connecting);
        assert_eq!(session.round().peripheral(), Some(&peripheral()));

        // A second advertisement in the same round is ignored.
        let effects = session.handle(Event::PeripheralDiscovered {
            peripheral: PeripheralHandle::new("peripheral-2"),
        });
        assert!(effects.is_empty());
        assert_eq!(session.round().peripheral(), Some(&peripheral()));
    }

    #[test]
    fn test_timeout_ends_campaign_without_retry() {
        let mut session = powered_session(40);
        session.handle(Event::Go);

        let effects = session.handle(Event::TimerFired { round: 1 });
        assert_eq!(effects, vec![Effect::StopScan]);
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.is_busy());
        assert_eq!(session.campaign().request_count, 1);
        assert_eq!(session.campaign().last_error, Some(RoundError::ScanTimeout));
    }

    #[test]
    fn test_stale_timer_ignored() {
        let mut session = powered_session(40);
        session.handle(Event::Go);
        session.handle(Event::PeripheralDiscovered {
            peripheral: peripheral(),
        });

        assert!(session.handle(Event::TimerFired { round: 1 }).is_empty());
        assert_eq!(session.state(), SessionState::Connecting);
        assert!(session.handle(Event::TimerFired { round: 99 }).is_empty());
    }

    #[test]
    fn test_connected_requests_filtered_service_discovery() {
        let mut session = powered_session(40);
        session.handle(Event::Go);
        session.handle(Event::PeripheralDiscovered {
            peripheral: peripheral(),
        });

        let effects = session.handle(Event::Connected {
            peripheral: peripheral(),
        });
        assert_eq!(
            effects,
            vec![Effect::DiscoverServices {
                peripheral: peripheral(),
                services: vec![SERVICE_UUID],
            }]
        );
        assert_eq!(session.state(), SessionState::DiscoveringServices);
    }

    #[test]
    fn test_connected_from_other_peripheral_ignored() {
        let mut session = powered_session(40);
        session.handle(Event::Go);
        session.handle(Event::PeripheralDiscovered {
            peripheral: peripheral(),
        });

        let effects = session.handle(Event::Connected {
            peripheral: PeripheralHandle::new("intruder"),
        });
        assert!(effects.is_empty());
        assert_eq!(session.state(), SessionState::Connecting);
    }

    #[test]
    fn test_empty_services_disconnects_and_retries() {
        let mut session = powered_session(40);
        session.handle(Event::Go);
        session.handle(Event::PeripheralDiscovered {
            peripheral: peripheral(),
        });
        session.handle(Event::Connected {
            peripheral: peripheral(),
        });

        let effects = session.handle(Event::ServicesDiscovered {
            peripheral: peripheral(),
            result: Ok(vec![]),
        });
        assert_eq!(
            effects,
            vec![Effect::CancelConnection {
                peripheral: peripheral()
            }]
        );
        assert_eq!(session.state(), SessionState::Disconnecting);
        assert!(session.is_busy());
        assert!(session.round().is_clear());
        assert_eq!(session.closing(), Some(&peripheral()));

        assert_eq!(
            release(&mut session),
            vec![Effect::ScheduleRetry {
                round: 1,
                after: Duration::from_millis(100)
            }]
        );
        assert_eq!(session.state(), SessionState::RetryPending);
        assert_eq!(session.closing(), None);
    }

    #[test]
    fn test_retry_waits_for_cancel() {
        let mut session = powered_session(40);
        session.handle(Event::Go);
        session.handle(Event::PeripheralDiscovered {
            peripheral: peripheral(),
        });
        session.handle(Event::Connected {
            peripheral: peripheral(),
        });
        session.handle(Event::ServicesDiscovered {
            peripheral: peripheral(),
            result: Ok(vec![]),
        });

        // Our own disconnection and a cancel for someone else change nothing.
        assert!(session
            .handle(Event::Disconnected {
                peripheral: peripheral()
            })
            .is_empty());
        assert!(session
            .handle(Event::ConnectionCancelled {
                peripheral: PeripheralHandle::new("peripheral-2"),
            })
            .is_empty());
        assert_eq!(session.state(), SessionState::Disconnecting);
        assert!(session.handle(Event::RetryElapsed { round: 1 }).is_empty());
        assert_eq!(session.campaign().request_count, 1);
    }

    #[test]
    fn test_late_disconnect_does_not_end_next_round() {
        let mut session = powered_session(40);
        session.handle(Event::Go);
        session.handle(Event::PeripheralDiscovered {
            peripheral: peripheral(),
        });
        session.handle(Event::Connected {
            peripheral: peripheral(),
        });
        session.handle(Event::ServicesDiscovered {
            peripheral: peripheral(),
            result: Ok(vec![]),
        });
        release(&mut session);
        session.handle(Event::RetryElapsed { round: 1 });
        session.handle(Event::PeripheralDiscovered {
            peripheral: peripheral(),
        });
        assert_eq!(session.state(), SessionState::Connecting);

        // Platform report of the previous round's disconnect.
        let effects = session.handle(Event::Disconnected {
            peripheral: peripheral(),
        });
        assert!(effects.is_empty());
        assert_eq!(session.state(), SessionState::Connecting);
        assert_eq!(session.round().peripheral(), Some(&peripheral()));

        let effects = session.handle(Event::Connected {
            peripheral: peripheral(),
        });
        assert_eq!(effects.len(), 1);
        assert_eq!(session.state(), SessionState::DiscoveringServices);
        assert_eq!(session.campaign().request_count, 2);
    }

    #[test]
    fn test_full_exchange() {
        let mut session = powered_session(40);
        to_request_sent(&mut session);
        assert_eq!(session.round().request_channel(), Some(&request_channel()));
        assert_eq!(session.round().response_channel(), Some(&response_channel()));

        let effects = session.handle(Event::WriteCompleted {
            peripheral: peripheral(),
            result: Ok(()),
        });
        assert_eq!(
            effects,
            vec![Effect::ReadValue {
                peripheral: peripheral(),
                channel: response_channel(),
            }]
        );
        assert_eq!(session.state(), SessionState::AwaitingResponse);

        let effects = session.handle(Event::ValueUpdated {
            peripheral: peripheral(),
            result: Ok(b"pong".to_vec()),
        });
        assert_eq!(
            effects,
            vec![Effect::CancelConnection {
                peripheral: peripheral()
            }]
        );
        assert_eq!(session.campaign().response_count, 1);
        assert_eq!(session.campaign().last_response.as_deref(), Some("pong"));
        assert_eq!(session.campaign().last_error, None);
        assert!(session.round().is_clear());
    }

    #[test]
    fn test_request_written_with_ack() {
        let mut session = powered_session(40);
        session.handle(Event::Go);
        session.handle(Event::PeripheralDiscovered {
            peripheral: peripheral(),
        });
        session.handle(Event::Connected {
            peripheral: peripheral(),
        });
        session.handle(Event::ServicesDiscovered {
            peripheral: peripheral(),
            result: Ok(vec![service()]),
        });

        let effects = session.handle(Event::CharacteristicsDiscovered {
            peripheral: peripheral(),
            service: service(),
            result: Ok(vec![response_channel(), request_channel()]),
        });
        assert_eq!(
            effects,
            vec![Effect::WriteValue {
                peripheral: peripheral(),
                channel: request_channel(),
                value: bytes::Bytes::from_static(b"Hello, world!"),
                ack_required: true,
            }]
        );
    }

    #[test]
    fn test_write_waits_for_every_service() {
        let other = ServiceHandle {
            uuid: Uuid::from_u128(0x1234),
        };
        let mut session = powered_session(40);
        session.handle(Event::Go);
        session.handle(Event::PeripheralDiscovered {
            peripheral: peripheral(),
        });
        session.handle(Event::Connected {
            peripheral: peripheral(),
        });
        session.handle(Event::ServicesDiscovered {
            peripheral: peripheral(),
            result: Ok(vec![service(), other]),
        });

        let effects = session.handle(Event::CharacteristicsDiscovered {
            peripheral: peripheral(),
            service: other,
            result: Ok(vec![]),
        });
        assert!(effects.is_empty());
        assert_eq!(session.state(), SessionState::DiscoveringCharacteristics);

        let effects = session.handle(Event::CharacteristicsDiscovered {
            peripheral: peripheral(),
            service: service(),
            result: Ok(vec![request_channel(), response_channel()]),
        });
        assert_eq!(effects.len(), 1);
        assert_eq!(session.state(), SessionState::RequestSent);
    }

    #[test]
    fn test_missing_channels_disconnects() {
        let mut session = powered_session(40);
        session.handle(Event::Go);
        session.handle(Event::PeripheralDiscovered {
            peripheral: peripheral(),
        });
        session.handle(Event::Connected {
            peripheral: peripheral(),
        });
        session.handle(Event::ServicesDiscovered {
            peripheral: peripheral(),
            result: Ok(vec![service()]),
        });

        session.handle(Event::CharacteristicsDiscovered {
            peripheral: peripheral(),
            service: service(),
            result: Ok(vec![request_channel()]),
        });
        assert_eq!(session.state(), SessionState::Disconnecting);
        release(&mut session);
        assert_eq!(session.state(), SessionState::RetryPending);
        assert_eq!(
            session.campaign().last_error,
            Some(RoundError::ChannelsMissing)
        );
    }

    #[test]
    fn test_write_failure_disconnects() {
        let mut session = powered_session(40);
        to_request_sent(&mut session);

        let effects = session.handle(Event::WriteCompleted {
            peripheral: peripheral(),
            result: Err("unlikely error".to_string()),
        });
        assert!(matches!(effects[0], Effect::CancelConnection { .. }));
        release(&mut session);
        assert_eq!(session.state(), SessionState::RetryPending);
        assert_eq!(session.campaign().response_count, 0);
    }

    #[test]
    fn test_decode_failure_does_not_count() {
        let mut session = powered_session(40);
        to_request_sent(&mut session);
        session.handle(Event::WriteCompleted {
            peripheral: peripheral(),
            result: Ok(()),
        });

        session.handle(Event::ValueUpdated {
            peripheral: peripheral(),
            result: Ok(vec![0xff, 0xfe]),
        });
        assert_eq!(session.campaign().response_count, 0);
        assert!(matches!(
            session.campaign().last_error,
            Some(RoundError::ResponseDecodeFailed { .. })
        ));
        release(&mut session);
        assert_eq!(session.state(), SessionState::RetryPending);
    }

    #[test]
    fn test_link_loss_ends_round() {
        let mut session = powered_session(40);
        to_request_sent(&mut session);

        let effects = session.handle(Event::Disconnected {
            peripheral: peripheral(),
        });
        assert_eq!(session.campaign().last_error, Some(RoundError::LinkLost));
        assert_eq!(session.state(), SessionState::Disconnecting);
        assert!(matches!(effects[0], Effect::CancelConnection { .. }));

        // The disconnect we caused ourselves is ignored.
        assert!(session
            .handle(Event::Disconnected {
                peripheral: peripheral()
            })
            .is_empty());
        release(&mut session);
        assert_eq!(session.state(), SessionState::RetryPending);
    }

    #[test]
    fn test_retry_starts_next_round() {
        let mut session = powered_session(40);
        session.handle(Event::Go);
        session.handle(Event::PeripheralDiscovered {
            peripheral: peripheral(),
        });
        session.handle(Event::ConnectFailed {
            peripheral: peripheral(),
            reason: "refused".to_string(),
        });
        release(&mut session);
        assert_eq!(session.state(), SessionState::RetryPending);

        // go during the retry window is rejected.
        assert_eq!(session.go(), Err(RoundError::ReentrantStart));

        let effects = session.handle(Event::RetryElapsed { round: 1 });
        assert_eq!(effects.len(), 3);
        assert_eq!(session.state(), SessionState::Scanning);
        assert_eq!(session.campaign().request_count, 2);
        assert_eq!(session.round().seq(), 2);
        assert!(session.round().is_clear());

        // The retry only fires once.
        assert!(session.handle(Event::RetryElapsed { round: 1 }).is_empty());
    }

    #[test]
    fn test_budget_exhausted_ends_campaign() {
        let mut session = powered_session(1);
        to_request_sent(&mut session);
        session.handle(Event::WriteCompleted {
            peripheral: peripheral(),
            result: Ok(()),
        });

        let effects = session.handle(Event::ValueUpdated {
            peripheral: peripheral(),
            result: Err("read not permitted".to_string()),
        });
        assert_eq!(
            effects,
            vec![Effect::CancelConnection {
                peripheral: peripheral()
            }]
        );
        assert!(session.is_busy());
        assert!(release(&mut session).is_empty());
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.is_busy());
        assert!(session.campaign().finished_at.is_some());
    }

    #[test]
    fn test_new_go_resets_counters() {
        let mut session = powered_session(40);
        session.handle(Event::Go);
        session.handle(Event::TimerFired { round: 1 });

        session.handle(Event::Go);
        assert_eq!(session.campaign().request_count, 1);
        assert_eq!(session.campaign().last_error, None);
        assert_eq!(session.round().seq(), 2);
    }

    #[test]
    fn test_power_change_does_not_stop_round() {
        let mut session = powered_session(40);
        session.handle(Event::Go);

        let effects = session.handle(Event::PowerChanged(AdapterState::PoweredOff));
        assert!(effects.is_empty());
        assert_eq!(session.state(), SessionState::Scanning);
        assert_eq!(session.adapter_state(), AdapterState::PoweredOff);
    }
}
