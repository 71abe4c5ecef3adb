// Per-role adapter power state
//
// Both roles are tracked independently. Transitions are only ever applied in
// response to adapter reports; the core never moves a role on its own.

use super::{AdapterPowerState, AdapterRole};
use tracing::warn;

/// A state change that was actually applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerTransition {
    pub role: AdapterRole,
    pub from: AdapterPowerState,
    pub to: AdapterPowerState,
}

impl PowerTransition {
    pub fn entered_powered_on(&self) -> bool {
        self.to.is_powered_on()
    }

    pub fn left_powered_on(&self) -> bool {
        self.from.is_powered_on() && !self.to.is_powered_on()
    }

    /// Status line recorded in the discovery log
    pub fn status_message(&self) -> String {
        let subject = match self.role {
            AdapterRole::Broadcast => "Broadcast adapter",
            AdapterRole::Scan => "Scan adapter",
        };
        match (self.role, self.to) {
            (AdapterRole::Scan, AdapterPowerState::PoweredOn) => {
                format!("{}: Bluetooth is on. Starting scan...", subject)
            }
            (_, AdapterPowerState::PoweredOn) => format!("{}: Bluetooth is on.", subject),
            (_, state) => format!("{}: {} ({})", subject, state.describe(), state),
        }
    }
}

/// Power state of both roles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdapterState {
    broadcast: AdapterPowerState,
    scan: AdapterPowerState,
}

impl AdapterState {
    /// Both roles start in `Unknown`
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, role: AdapterRole) -> AdapterPowerState {
        match role {
            AdapterRole::Broadcast => self.broadcast,
            AdapterRole::Scan => self.scan,
        }
    }

    pub fn is_ready(&self, role: AdapterRole) -> bool {
        self.get(role).is_powered_on()
    }

    /// Apply an adapter report. Returns `None` when the role is already in
    /// the reported state.
    pub fn apply(&mut self, role: AdapterRole, to: AdapterPowerState) -> Option<PowerTransition> {
        let slot = match role {
            AdapterRole::Broadcast => &mut self.broadcast,
            AdapterRole::Scan => &mut self.scan,
        };
        let from = *slot;
        if from == to {
            return None;
        }

        // Unsupported means the hardware capability is absent; the adapter is
        // still authoritative, so apply the report but flag it.
        if from == AdapterPowerState::Unsupported {
            warn!("{} adapter left Unsupported state (now {})", role, to);
        }
        if to == AdapterPowerState::Unknown {
            warn!("{} adapter reported Unknown after {}", role, from);
        }

        *slot = to;
        Some(PowerTransition { role, from, to })
    }
}
