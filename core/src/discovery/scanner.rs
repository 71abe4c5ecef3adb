/// Scan role controller
///
/// Starts a continuous scan once the scan adapter is powered on and filters the
/// stream of received advertisements down to new peers speaking this protocol.
/// Everything that does not pass the filter is dropped without a log entry.

use super::dedup::{DedupKey, DiscoveryDeduplicator};
use super::log::DiscoveryLog;
use super::DiscoveredDevice;
use crate::adapter::{AdapterError, RadioAdapter, RawDiscoveryEvent, ScanOptions};
use crate::codec::{AdvertisementCodec, DecodeError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

/// Scanner state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScannerState {
    /// Not scanning
    Idle,
    /// Scan requested and running
    Scanning,
}

/// Why a received advertisement was not surfaced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    NotScanning,
    /// The advertisement does not carry the configured field
    NoField,
    Malformed(DecodeError),
    /// Decoded fine but belongs to another application
    ForeignTag(String),
    Duplicate,
}

/// Result of processing one received advertisement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Accepted(DiscoveredDevice),
    Ignored(IgnoreReason),
}

impl ScanOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ScanOutcome::Accepted(_))
    }
}

pub struct ScanController {
    state: ScannerState,
    codec: AdvertisementCodec,
    expected_tag: String,
    dedup: DiscoveryDeduplicator,
    options: ScanOptions,
}

impl ScanController {
    /// Create a controller accepting peers that advertise `expected_tag`
    pub fn new(
        codec: AdvertisementCodec,
        expected_tag: impl Into<String>,
        dedup: DiscoveryDeduplicator,
    ) -> Self {
        Self {
            state: ScannerState::Idle,
            codec,
            expected_tag: expected_tag.into(),
            dedup,
            options: ScanOptions::default(),
        }
    }

    pub fn state(&self) -> ScannerState {
        self.state
    }

    pub fn is_scanning(&self) -> bool {
        self.state == ScannerState::Scanning
    }

    /// Number of distinct broadcasts surfaced so far
    pub fn seen_count(&self) -> usize {
        self.dedup.len()
    }

    /// Scan adapter reached PoweredOn. Returns true if a scan was started.
    pub fn on_adapter_powered_on(
        &mut self,
        adapter: &dyn RadioAdapter,
        log: &mut DiscoveryLog,
    ) -> bool {
        if self.state == ScannerState::Scanning {
            debug!("Scan already running, ignoring power-on");
            return false;
        }

        match adapter.start_scanning(self.options) {
            Ok(()) => {
                info!("Scanning started (allow_duplicates={})", self.options.allow_duplicates);
                self.state = ScannerState::Scanning;
                true
            }
            Err(err) => {
                warn!("Failed to start scanning: {}", err);
                log.record(format!("Failed to start scan: {}.", err));
                false
            }
        }
    }

    /// Scan adapter left PoweredOn; the radio has already stopped scanning
    pub fn on_power_lost(&mut self) {
        if self.state == ScannerState::Scanning {
            info!("Scan adapter lost power, scanner idle");
            self.state = ScannerState::Idle;
        }
    }

    /// Stop scanning if running
    pub fn stop(&mut self, adapter: &dyn RadioAdapter) -> Result<(), AdapterError> {
        if self.state == ScannerState::Idle {
            return Ok(());
        }
        adapter.stop_scanning()?;
        self.state = ScannerState::Idle;
        Ok(())
    }

    /// Filter, dedup and record one received advertisement
    pub fn on_discovery(
        &mut self,
        raw: RawDiscoveryEvent,
        observed_at: DateTime<Utc>,
        log: &mut DiscoveryLog,
    ) -> ScanOutcome {
        if self.state != ScannerState::Scanning {
            return ScanOutcome::Ignored(IgnoreReason::NotScanning);
        }

        let kind = self.codec.format().field_kind();
        let Some(field) = raw.field(kind) else {
            return ScanOutcome::Ignored(IgnoreReason::NoField);
        };

        let token = match self.codec.decode(field) {
            Ok(token) => token,
            Err(err) => {
                trace!("Undecodable advertisement from {}: {}", raw.device_identifier, err);
                return ScanOutcome::Ignored(IgnoreReason::Malformed(err));
            }
        };

        if token.app_tag != self.expected_tag {
            trace!("Foreign app tag {:?} from {}", token.app_tag, raw.device_identifier);
            return ScanOutcome::Ignored(IgnoreReason::ForeignTag(token.app_tag));
        }

        let key = DedupKey::derive(&raw.device_identifier, kind, field.as_bytes());
        if !self.dedup.check_and_mark(key) {
            return ScanOutcome::Ignored(IgnoreReason::Duplicate);
        }

        let device = DiscoveredDevice {
            device_identifier: raw.device_identifier,
            device_name: raw.device_name,
            token,
            signal_strength: raw.signal_strength,
            observed_at,
        };
        info!(
            "Discovered {} at {} dBm ({})",
            device.token, device.signal_strength, device.device_identifier
        );
        log.record(device.format_entry());
        ScanOutcome::Accepted(device)
    }
}
