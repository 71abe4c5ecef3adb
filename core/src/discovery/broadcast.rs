// Broadcast role controller
//
// Owns the "am I advertising" state. Start requests are confirmed
// asynchronously by the adapter; stop requests take effect on submission.
// At most one start can be awaiting confirmation at a time. Each start is
// tagged with a fresh request id and only the confirmation carrying the
// pending id is applied, so a late answer to an abandoned start never lands
// on its successor.

use super::log::DiscoveryLog;
use crate::adapter::{
    AdapterError, AdapterPowerState, AdapterRole, AdapterState, AdvertisingRequestId,
    PowerTransition, RadioAdapter,
};
use crate::codec::{AdvertisementCodec, EncodingError};
use crate::identity::IdentityToken;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("Broadcast adapter not ready ({0})")]
    NotReady(AdapterPowerState),
    #[error("Cannot encode identity: {0}")]
    Encoding(#[from] EncodingError),
    #[error("A start request is already awaiting confirmation")]
    InFlight,
    #[error("Adapter failure: {0}")]
    AdapterFailure(#[from] AdapterError),
}

/// Broadcast lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastPhase {
    Idle,
    /// Start submitted, waiting for the adapter's confirmation
    Starting,
    Advertising,
}

/// What a successful toggle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    StartRequested,
    Stopped,
}

pub struct BroadcastController {
    token: IdentityToken,
    codec: AdvertisementCodec,
    phase: BroadcastPhase,
    /// Request awaiting confirmation; set only while `Starting`
    pending: Option<AdvertisingRequestId>,
    last_request: u64,
}

impl BroadcastController {
    pub fn new(token: IdentityToken, codec: AdvertisementCodec) -> Self {
        Self {
            token,
            codec,
            phase: BroadcastPhase::Idle,
            pending: None,
            last_request: 0,
        }
    }

    pub fn phase(&self) -> BroadcastPhase {
        self.phase
    }

    pub fn is_advertising(&self) -> bool {
        self.phase == BroadcastPhase::Advertising
    }

    /// Start advertising if idle, stop if advertising
    pub fn toggle(
        &mut self,
        adapter: &dyn RadioAdapter,
        state: &AdapterState,
        log: &mut DiscoveryLog,
    ) -> Result<ToggleOutcome, BroadcastError> {
        match self.phase {
            BroadcastPhase::Advertising => self.stop(adapter, log),
            BroadcastPhase::Starting => {
                debug!("Ignoring toggle: start already in flight");
                Err(BroadcastError::InFlight)
            }
            BroadcastPhase::Idle => self.start(adapter, state, log),
        }
    }

    fn start(
        &mut self,
        adapter: &dyn RadioAdapter,
        state: &AdapterState,
        log: &mut DiscoveryLog,
    ) -> Result<ToggleOutcome, BroadcastError> {
        let power = state.get(AdapterRole::Broadcast);
        if !power.is_powered_on() {
            log.record(format!(
                "Cannot start broadcast: Bluetooth is {}.",
                power.describe()
            ));
            return Err(BroadcastError::NotReady(power));
        }

        let payload = match self.codec.encode(&self.token) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("Failed to encode identity {}: {}", self.token, err);
                log.record(format!("Cannot start broadcast: {}.", err));
                return Err(err.into());
            }
        };

        self.last_request += 1;
        let request = AdvertisingRequestId(self.last_request);
        if let Err(err) = adapter.start_advertising(request, &payload) {
            warn!("Adapter rejected start_advertising {}: {}", request, err);
            log.record(format!("Failed to start advertising: {}.", err));
            return Err(err.into());
        }

        debug!(
            "Advertising {} requested ({} + {} bytes on air, {})",
            request,
            payload.advertising_data_len(),
            payload.scan_response_len(),
            self.codec.format()
        );
        self.phase = BroadcastPhase::Starting;
        self.pending = Some(request);
        Ok(ToggleOutcome::StartRequested)
    }

    fn stop(
        &mut self,
        adapter: &dyn RadioAdapter,
        log: &mut DiscoveryLog,
    ) -> Result<ToggleOutcome, BroadcastError> {
        if let Err(err) = adapter.stop_advertising() {
            warn!("Adapter rejected stop_advertising: {}", err);
            log.record(format!("Failed to stop advertising: {}.", err));
            return Err(err.into());
        }

        info!("Advertising stopped");
        self.phase = BroadcastPhase::Idle;
        log.record("Advertising stopped.");
        Ok(ToggleOutcome::Stopped)
    }

    /// Adapter confirmation for a start request. Anything but the pending
    /// request is stale and ignored.
    pub fn on_start_result(
        &mut self,
        request: AdvertisingRequestId,
        result: Result<(), String>,
        log: &mut DiscoveryLog,
    ) {
        if self.phase != BroadcastPhase::Starting || self.pending != Some(request) {
            debug!(
                "Ignoring stale advertising confirmation {} (pending {:?}): {:?}",
                request, self.pending, result
            );
            return;
        }
        self.pending = None;

        match result {
            Ok(()) => {
                info!("Advertising started for {}", self.token);
                self.phase = BroadcastPhase::Advertising;
                log.record(format!(
                    "Advertising started (user {}).",
                    self.token.user_id
                ));
            }
            Err(reason) => {
                warn!("Advertising failed: {}", reason);
                self.phase = BroadcastPhase::Idle;
                log.record(format!("Advertising failed: {}.", reason));
            }
        }
    }

    /// Stop any advertising before teardown. Nothing is logged.
    pub fn shutdown(&mut self, adapter: &dyn RadioAdapter) {
        if self.phase == BroadcastPhase::Idle {
            return;
        }
        if let Err(err) = adapter.stop_advertising() {
            warn!("Failed to stop advertising during shutdown: {}", err);
        }
        self.phase = BroadcastPhase::Idle;
        self.pending = None;
    }

    /// The adapter stops advertising on its own when the role loses power
    pub fn on_power_transition(&mut self, transition: &PowerTransition) {
        if transition.role != AdapterRole::Broadcast || transition.to.is_powered_on() {
            return;
        }
        if self.phase != BroadcastPhase::Idle {
            info!(
                "Broadcast adapter is {}, dropping {:?} phase",
                transition.to, self.phase
            );
            self.phase = BroadcastPhase::Idle;
            self.pending = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MockRadioAdapter;
    use crate::codec::{CodecLimits, PayloadFormat};

    fn controller() -> BroadcastController {
        BroadcastController::new(
            IdentityToken::new("test11_8i", "ajfi321"),
            AdvertisementCodec::default(),
        )
    }

    fn powered(state: AdapterPowerState) -> AdapterState {
        let mut adapter_state = AdapterState::new();
        adapter_state.apply(AdapterRole::Broadcast, state);
        adapter_state
    }

    #[test]
    fn test_toggle_not_ready_issues_no_command() {
        for state in [
            AdapterPowerState::Unknown,
            AdapterPowerState::Resetting,
            AdapterPowerState::Unsupported,
            AdapterPowerState::Unauthorized,
            AdapterPowerState::PoweredOff,
        ] {
            let mut adapter = MockRadioAdapter::new();
            adapter.expect_start_advertising().times(0);
            adapter.expect_stop_advertising().times(0);

            let mut log = DiscoveryLog::new();
            let mut ctl = controller();
            let result = ctl.toggle(&adapter, &powered(state), &mut log);

            assert_eq!(result, Err(BroadcastError::NotReady(state)));
            assert_eq!(ctl.phase(), BroadcastPhase::Idle);
            assert!(log.snapshot().starts_with("Cannot start broadcast"));
        }
    }

    #[test]
    fn test_toggle_starts_with_encoded_payload() {
        let mut adapter = MockRadioAdapter::new();
        adapter
            .expect_start_advertising()
            .withf(|request, payload| {
                *request == AdvertisingRequestId(1)
                    && payload.local_name.as_deref() == Some("test11_8i_ajfi321")
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let mut log = DiscoveryLog::new();
        let mut ctl = controller();
        let result = ctl.toggle(&adapter, &powered(AdapterPowerState::PoweredOn), &mut log);

        assert_eq!(result, Ok(ToggleOutcome::StartRequested));
        assert_eq!(ctl.phase(), BroadcastPhase::Starting);
        assert!(!ctl.is_advertising());
        // Nothing logged until the adapter confirms
        assert!(log.is_placeholder());
    }

    #[test]
    fn test_toggle_while_starting_is_rejected() {
        let mut adapter = MockRadioAdapter::new();
        adapter.expect_start_advertising().times(1).returning(|_, _| Ok(()));
        adapter.expect_stop_advertising().times(0);

        let state = powered(AdapterPowerState::PoweredOn);
        let mut log = DiscoveryLog::new();
        let mut ctl = controller();

        ctl.toggle(&adapter, &state, &mut log).expect("first toggle");
        assert_eq!(ctl.toggle(&adapter, &state, &mut log), Err(BroadcastError::InFlight));
    }

    #[test]
    fn test_confirmation_then_stop() {
        let mut adapter = MockRadioAdapter::new();
        adapter.expect_start_advertising().times(1).returning(|_, _| Ok(()));
        adapter.expect_stop_advertising().times(1).returning(|| Ok(()));

        let state = powered(AdapterPowerState::PoweredOn);
        let mut log = DiscoveryLog::new();
        let mut ctl = controller();

        ctl.toggle(&adapter, &state, &mut log).expect("start");
        ctl.on_start_result(AdvertisingRequestId(1), Ok(()), &mut log);
        assert!(ctl.is_advertising());
        assert_eq!(log.entries().next(), Some("Advertising started (user ajfi321)."));

        assert_eq!(ctl.toggle(&adapter, &state, &mut log), Ok(ToggleOutcome::Stopped));
        assert!(!ctl.is_advertising());
        assert_eq!(log.entries().next(), Some("Advertising stopped."));
    }

    #[test]
    fn test_failed_confirmation_logs_reason() {
        let mut adapter = MockRadioAdapter::new();
        adapter.expect_start_advertising().times(1).returning(|_, _| Ok(()));

        let mut log = DiscoveryLog::new();
        let mut ctl = controller();
        ctl.toggle(&adapter, &powered(AdapterPowerState::PoweredOn), &mut log)
            .expect("start");

        ctl.on_start_result(
            AdvertisingRequestId(1),
            Err("advertising data too large".to_string()),
            &mut log,
        );

        assert_eq!(ctl.phase(), BroadcastPhase::Idle);
        assert_eq!(
            log.snapshot(),
            "Advertising failed: advertising data too large."
        );
    }

    #[test]
    fn test_stale_confirmation_ignored() {
        let mut log = DiscoveryLog::new();
        let mut ctl = controller();

        ctl.on_start_result(AdvertisingRequestId(1), Ok(()), &mut log);

        assert_eq!(ctl.phase(), BroadcastPhase::Idle);
        assert!(log.is_placeholder());
    }

    #[test]
    fn test_late_result_for_abandoned_start_is_ignored() {
        let mut adapter = MockRadioAdapter::new();
        adapter.expect_start_advertising().times(2).returning(|_, _| Ok(()));
        adapter.expect_stop_advertising().times(1).returning(|| Ok(()));

        let mut state = powered(AdapterPowerState::PoweredOn);
        let mut log = DiscoveryLog::new();
        let mut ctl = controller();

        // Start #1 is dropped by a power cycle before the radio answers
        ctl.toggle(&adapter, &state, &mut log).expect("first start");
        let off = state
            .apply(AdapterRole::Broadcast, AdapterPowerState::PoweredOff)
            .expect("transition");
        ctl.on_power_transition(&off);
        state.apply(AdapterRole::Broadcast, AdapterPowerState::PoweredOn);

        assert_eq!(
            ctl.toggle(&adapter, &state, &mut log),
            Ok(ToggleOutcome::StartRequested)
        );

        // #1's answer arrives late and must not settle #2
        ctl.on_start_result(
            AdvertisingRequestId(1),
            Err("powered off".to_string()),
            &mut log,
        );
        assert_eq!(ctl.phase(), BroadcastPhase::Starting);

        ctl.on_start_result(AdvertisingRequestId(2), Ok(()), &mut log);
        assert!(ctl.is_advertising());
        assert_eq!(log.entries().next(), Some("Advertising started (user ajfi321)."));

        // Next toggle stops instead of issuing a third start
        assert_eq!(ctl.toggle(&adapter, &state, &mut log), Ok(ToggleOutcome::Stopped));
    }

    #[test]
    fn test_confirmation_is_applied_once() {
        let mut adapter = MockRadioAdapter::new();
        adapter.expect_start_advertising().times(1).returning(|_, _| Ok(()));

        let mut log = DiscoveryLog::new();
        let mut ctl = controller();
        ctl.toggle(&adapter, &powered(AdapterPowerState::PoweredOn), &mut log)
            .expect("start");

        ctl.on_start_result(AdvertisingRequestId(1), Ok(()), &mut log);
        let recorded = log.len();
        ctl.on_start_result(AdvertisingRequestId(1), Err("late".to_string()), &mut log);

        assert!(ctl.is_advertising());
        assert_eq!(log.len(), recorded);
    }

    #[test]
    fn test_adapter_rejection_logged() {
        let mut adapter = MockRadioAdapter::new();
        adapter
            .expect_start_advertising()
            .times(1)
            .returning(|_, _| Err(AdapterError::Rejected("busy".to_string())));

        let mut log = DiscoveryLog::new();
        let mut ctl = controller();
        let result = ctl.toggle(&adapter, &powered(AdapterPowerState::PoweredOn), &mut log);

        assert!(matches!(result, Err(BroadcastError::AdapterFailure(_))));
        assert_eq!(ctl.phase(), BroadcastPhase::Idle);
        assert!(log.snapshot().starts_with("Failed to start advertising"));
    }

    #[test]
    fn test_failed_stop_keeps_advertising() {
        let mut adapter = MockRadioAdapter::new();
        adapter.expect_start_advertising().returning(|_, _| Ok(()));
        adapter
            .expect_stop_advertising()
            .times(1)
            .returning(|| Err(AdapterError::Unavailable("gone".to_string())));

        let state = powered(AdapterPowerState::PoweredOn);
        let mut log = DiscoveryLog::new();
        let mut ctl = controller();
        ctl.toggle(&adapter, &state, &mut log).expect("start");
        ctl.on_start_result(AdvertisingRequestId(1), Ok(()), &mut log);

        assert!(ctl.toggle(&adapter, &state, &mut log).is_err());
        assert!(ctl.is_advertising());
    }

    #[test]
    fn test_encoding_failure_issues_no_command() {
        let mut adapter = MockRadioAdapter::new();
        adapter.expect_start_advertising().times(0);

        let codec = AdvertisementCodec::new(PayloadFormat::ManufacturerData, CodecLimits::default());
        let mut ctl = BroadcastController::new(IdentityToken::new("not-a-uuid", "ajfi321"), codec);
        let mut log = DiscoveryLog::new();

        let result = ctl.toggle(&adapter, &powered(AdapterPowerState::PoweredOn), &mut log);

        assert!(matches!(result, Err(BroadcastError::Encoding(_))));
        assert!(log.snapshot().starts_with("Cannot start broadcast"));
    }

    #[test]
    fn test_power_loss_clears_advertising() {
        let mut adapter = MockRadioAdapter::new();
        adapter.expect_start_advertising().returning(|_, _| Ok(()));

        let mut state = powered(AdapterPowerState::PoweredOn);
        let mut log = DiscoveryLog::new();
        let mut ctl = controller();
        ctl.toggle(&adapter, &state, &mut log).expect("start");
        ctl.on_start_result(AdvertisingRequestId(1), Ok(()), &mut log);

        let transition = state
            .apply(AdapterRole::Broadcast, AdapterPowerState::PoweredOff)
            .expect("transition");
        ctl.on_power_transition(&transition);

        assert!(!ctl.is_advertising());
        assert_eq!(ctl.phase(), BroadcastPhase::Idle);
    }

    #[test]
    fn test_shutdown_stops_pending_start() {
        let mut adapter = MockRadioAdapter::new();
        adapter.expect_start_advertising().returning(|_, _| Ok(()));
        adapter.expect_stop_advertising().times(1).returning(|| Ok(()));

        let mut log = DiscoveryLog::new();
        let mut ctl = controller();
        ctl.toggle(&adapter, &powered(AdapterPowerState::PoweredOn), &mut log)
            .expect("start");

        ctl.shutdown(&adapter);
        ctl.shutdown(&adapter);
        assert_eq!(ctl.phase(), BroadcastPhase::Idle);
    }

    #[test]
    fn test_scan_power_loss_does_not_touch_broadcast() {
        let mut adapter = MockRadioAdapter::new();
        adapter.expect_start_advertising().returning(|_, _| Ok(()));

        let mut state = powered(AdapterPowerState::PoweredOn);
        let mut log = DiscoveryLog::new();
        let mut ctl = controller();
        ctl.toggle(&adapter, &state, &mut log).expect("start");
        ctl.on_start_result(AdvertisingRequestId(1), Ok(()), &mut log);

        state.apply(AdapterRole::Scan, AdapterPowerState::PoweredOn);
        let transition = state
            .apply(AdapterRole::Scan, AdapterPowerState::PoweredOff)
            .expect("transition");
        ctl.on_power_transition(&transition);

        assert!(ctl.is_advertising());
    }
}
