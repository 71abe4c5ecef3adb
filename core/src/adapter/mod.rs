//! Radio adapter capability
//!
//! The radio stack lives outside the core. The core talks to it through the
//! [`RadioAdapter`] trait (fire-and-forget commands) and hears back through
//! [`AdapterEvent`]s, which the platform layer pushes via [`AdapterCallbacks`]
//! from whatever thread its callbacks run on. Events are queued onto the
//! service task, so callbacks never touch core state directly.

pub mod loopback;
pub mod state;

pub use loopback::{AdapterCommand, LoopbackAdapter};
pub use state::{AdapterState, PowerTransition};

use crate::codec::{AdvertisementPayload, FieldKind, FieldValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

/// Which half of the radio a state or command refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdapterRole {
    /// Sender side (peripheral, advertising)
    Broadcast,
    /// Receiver side (central, scanning)
    Scan,
}

impl fmt::Display for AdapterRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterRole::Broadcast => write!(f, "Broadcast"),
            AdapterRole::Scan => write!(f, "Scan"),
        }
    }
}

/// Power/authorization state reported by the adapter for one role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AdapterPowerState {
    #[default]
    Unknown,
    Resetting,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
}

impl AdapterPowerState {
    pub fn is_powered_on(&self) -> bool {
        matches!(self, AdapterPowerState::PoweredOn)
    }

    /// Human-readable description used in status log entries
    pub fn describe(&self) -> &'static str {
        match self {
            AdapterPowerState::Unknown => "state unknown",
            AdapterPowerState::Resetting => "resetting",
            AdapterPowerState::Unsupported => "not supported on this device",
            AdapterPowerState::Unauthorized => "not authorized",
            AdapterPowerState::PoweredOff => "powered off",
            AdapterPowerState::PoweredOn => "powered on",
        }
    }
}

impl fmt::Display for AdapterPowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterPowerState::Unknown => write!(f, "Unknown"),
            AdapterPowerState::Resetting => write!(f, "Resetting"),
            AdapterPowerState::Unsupported => write!(f, "Unsupported"),
            AdapterPowerState::Unauthorized => write!(f, "Unauthorized"),
            AdapterPowerState::PoweredOff => write!(f, "PoweredOff"),
            AdapterPowerState::PoweredOn => write!(f, "PoweredOn"),
        }
    }
}

/// Scan request parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Report every received advertisement, not just the first per device.
    /// Duplicate suppression happens in the core instead.
    pub allow_duplicates: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            allow_duplicates: true,
        }
    }
}

/// Tag attached to a `start_advertising` request and echoed back in its
/// confirmation. Only the confirmation for the newest request is honored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdvertisingRequestId(pub u64);

impl fmt::Display for AdvertisingRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Immediate rejection of an adapter command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("Adapter unavailable: {0}")]
    Unavailable(String),
    #[error("Adapter rejected request: {0}")]
    Rejected(String),
}

/// Commands the core issues to the radio. Results arrive later as events.
#[cfg_attr(test, mockall::automock)]
pub trait RadioAdapter: Send + Sync {
    /// Submit an advertisement. The outcome must be reported later through
    /// [`AdapterCallbacks::advertising_started`] carrying the same `request`.
    fn start_advertising(
        &self,
        request: AdvertisingRequestId,
        payload: &AdvertisementPayload,
    ) -> Result<(), AdapterError>;
    fn stop_advertising(&self) -> Result<(), AdapterError>;
    fn start_scanning(&self, options: ScanOptions) -> Result<(), AdapterError>;
    fn stop_scanning(&self) -> Result<(), AdapterError>;
}

/// One received advertisement as reported by the scanner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDiscoveryEvent {
    /// Opaque per-device identifier assigned by the radio stack
    pub device_identifier: String,
    /// Device name from the radio stack's cache, if any
    pub device_name: Option<String>,
    /// Received signal strength in dBm
    pub signal_strength: i16,
    pub fields: BTreeMap<FieldKind, FieldValue>,
}

impl RawDiscoveryEvent {
    pub fn new(device_identifier: impl Into<String>, signal_strength: i16) -> Self {
        Self {
            device_identifier: device_identifier.into(),
            device_name: None,
            signal_strength,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }

    pub fn with_field(mut self, kind: FieldKind, value: FieldValue) -> Self {
        self.fields.insert(kind, value);
        self
    }

    /// Build the event a scanner would report on hearing `payload`
    pub fn from_payload(
        device_identifier: impl Into<String>,
        signal_strength: i16,
        payload: &AdvertisementPayload,
    ) -> Self {
        let mut event = Self::new(device_identifier, signal_strength);
        for kind in [FieldKind::LocalName, FieldKind::ManufacturerData] {
            if let Some(value) = payload.field(kind) {
                event.fields.insert(kind, value);
            }
        }
        event.device_name = payload.local_name.clone();
        event
    }

    pub fn field(&self, kind: FieldKind) -> Option<&FieldValue> {
        self.fields.get(&kind)
    }
}

/// Everything the adapter reports back to the core
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    /// Power/authorization state changed for one role
    PowerStateChanged {
        role: AdapterRole,
        state: AdapterPowerState,
    },
    /// Result of a previous `start_advertising` request
    AdvertisingStarted {
        request: AdvertisingRequestId,
        result: Result<(), String>,
    },
    /// An advertisement was received while scanning
    Discovered(RawDiscoveryEvent),
}

impl fmt::Display for AdapterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterEvent::PowerStateChanged { role, state } => {
                write!(f, "PowerStateChanged {{ role: {}, state: {} }}", role, state)
            }
            AdapterEvent::AdvertisingStarted { request, result: Ok(()) } => {
                write!(f, "AdvertisingStarted({}, ok)", request)
            }
            AdapterEvent::AdvertisingStarted { request, result: Err(reason) } => {
                write!(f, "AdvertisingStarted({}, failed: {})", request, reason)
            }
            AdapterEvent::Discovered(raw) => write!(
                f,
                "Discovered {{ device: {}, rssi: {}, fields: {} }}",
                raw.device_identifier,
                raw.signal_strength,
                raw.fields.len()
            ),
        }
    }
}

/// Receiving end of the adapter event queue, owned by the service task
pub type AdapterEventReceiver = mpsc::UnboundedReceiver<AdapterEvent>;

/// Cloneable entry point for adapter callbacks.
///
/// Every method is synchronous and never blocks, so it is safe to call from
/// radio-stack callback threads. Events are dropped (with a debug trace) once
/// the service has shut down.
#[derive(Debug, Clone)]
pub struct AdapterCallbacks {
    tx: mpsc::UnboundedSender<AdapterEvent>,
}

impl AdapterCallbacks {
    pub fn power_state_changed(&self, role: AdapterRole, state: AdapterPowerState) -> bool {
        self.push(AdapterEvent::PowerStateChanged { role, state })
    }

    pub fn advertising_started(
        &self,
        request: AdvertisingRequestId,
        result: Result<(), String>,
    ) -> bool {
        self.push(AdapterEvent::AdvertisingStarted { request, result })
    }

    pub fn discovered(&self, event: RawDiscoveryEvent) -> bool {
        self.push(AdapterEvent::Discovered(event))
    }

    /// Queue an event; returns false if the service is gone
    pub fn push(&self, event: AdapterEvent) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!("Dropping adapter event after shutdown: {}", err.0);
                false
            }
        }
    }
}

/// Create the adapter event queue
pub fn event_channel() -> (AdapterCallbacks, AdapterEventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (AdapterCallbacks { tx }, rx)
}
