// In-process radio adapter
//
// Stands in for a platform radio stack: records every command, confirms
// advertising through the event queue exactly like a real stack would, and
// lets the caller drive power states and deliver received advertisements.
// Used by the integration tests and by the CLI simulator.

use super::{
    AdapterCallbacks, AdapterError, AdapterPowerState, AdapterRole, AdvertisingRequestId,
    RadioAdapter, RawDiscoveryEvent, ScanOptions,
};
use crate::codec::AdvertisementPayload;
use parking_lot::Mutex;
use tracing::debug;

/// A command as received by the loopback adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterCommand {
    StartAdvertising(AdvertisementPayload),
    StopAdvertising,
    StartScanning(ScanOptions),
    StopScanning,
}

#[derive(Debug, Default)]
struct LoopbackState {
    commands: Vec<AdapterCommand>,
    broadcast_power: AdapterPowerState,
    scan_power: AdapterPowerState,
    advertisement: Option<AdvertisementPayload>,
    scanning: bool,
    next_advertising_failure: Option<String>,
}

/// Radio adapter that never leaves the process
pub struct LoopbackAdapter {
    callbacks: AdapterCallbacks,
    state: Mutex<LoopbackState>,
}

impl LoopbackAdapter {
    /// Create an adapter reporting into `callbacks`. Both roles start Unknown.
    pub fn new(callbacks: AdapterCallbacks) -> Self {
        Self {
            callbacks,
            state: Mutex::new(LoopbackState::default()),
        }
    }

    /// Simulate the radio reporting a new power state for one role
    pub fn set_power_state(&self, role: AdapterRole, power: AdapterPowerState) {
        {
            let mut state = self.state.lock();
            match role {
                AdapterRole::Broadcast => {
                    state.broadcast_power = power;
                    if !power.is_powered_on() {
                        state.advertisement = None;
                    }
                }
                AdapterRole::Scan => {
                    state.scan_power = power;
                    if !power.is_powered_on() {
                        state.scanning = false;
                    }
                }
            }
        }
        self.callbacks.power_state_changed(role, power);
    }

    /// Power on both roles
    pub fn power_on(&self) {
        self.set_power_state(AdapterRole::Broadcast, AdapterPowerState::PoweredOn);
        self.set_power_state(AdapterRole::Scan, AdapterPowerState::PoweredOn);
    }

    /// Make the next `start_advertising` confirm with a failure
    pub fn fail_next_advertising(&self, reason: impl Into<String>) {
        self.state.lock().next_advertising_failure = Some(reason.into());
    }

    /// Deliver a received advertisement. Dropped unless scanning, like a real radio.
    pub fn deliver(&self, event: RawDiscoveryEvent) -> bool {
        if !self.state.lock().scanning {
            debug!("Loopback adapter not scanning, dropping {}", event.device_identifier);
            return false;
        }
        self.callbacks.discovered(event)
    }

    /// Every command received so far, oldest first
    pub fn commands(&self) -> Vec<AdapterCommand> {
        self.state.lock().commands.clone()
    }

    pub fn count_commands(&self, predicate: impl Fn(&AdapterCommand) -> bool) -> usize {
        self.state.lock().commands.iter().filter(|c| predicate(c)).count()
    }

    /// Payload currently on air, if advertising
    pub fn current_advertisement(&self) -> Option<AdvertisementPayload> {
        self.state.lock().advertisement.clone()
    }

    pub fn is_scanning(&self) -> bool {
        self.state.lock().scanning
    }
}

impl RadioAdapter for LoopbackAdapter {
    fn start_advertising(
        &self,
        request: AdvertisingRequestId,
        payload: &AdvertisementPayload,
    ) -> Result<(), AdapterError> {
        let confirmation = {
            let mut state = self.state.lock();
            state
                .commands
                .push(AdapterCommand::StartAdvertising(payload.clone()));

            if !state.broadcast_power.is_powered_on() {
                return Err(AdapterError::Unavailable(format!(
                    "broadcast role is {}",
                    state.broadcast_power
                )));
            }

            match state.next_advertising_failure.take() {
                Some(reason) => Err(reason),
                None => {
                    state.advertisement = Some(payload.clone());
                    Ok(())
                }
            }
        };

        self.callbacks.advertising_started(request, confirmation);
        Ok(())
    }

    fn stop_advertising(&self) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        state.commands.push(AdapterCommand::StopAdvertising);
        state.advertisement = None;
        Ok(())
    }

    fn start_scanning(&self, options: ScanOptions) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        state.commands.push(AdapterCommand::StartScanning(options));
        if !state.scan_power.is_powered_on() {
            return Err(AdapterError::Unavailable(format!(
                "scan role is {}",
                state.scan_power
            )));
        }
        state.scanning = true;
        Ok(())
    }

    fn stop_scanning(&self) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        state.commands.push(AdapterCommand::StopScanning);
        state.scanning = false;
        Ok(())
    }
}
