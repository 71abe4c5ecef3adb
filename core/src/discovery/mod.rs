//! Discovery pipeline: broadcast and scan controllers, duplicate suppression
//! and the human-facing log.

pub mod broadcast;
pub mod dedup;
pub mod log;
pub mod scanner;

pub use broadcast::{BroadcastController, BroadcastError, BroadcastPhase, ToggleOutcome};
pub use dedup::{DedupKey, DiscoveryDeduplicator};
pub use log::{DiscoveryLog, DEFAULT_PLACEHOLDER};
pub use scanner::{IgnoreReason, ScanController, ScanOutcome, ScannerState};

use crate::identity::IdentityToken;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Header line of every discovery entry in the log
pub const ENTRY_HEADER: &str = "--- Discovered Device ---";

/// A peer that passed decoding, filtering and dedup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub device_identifier: String,
    pub device_name: Option<String>,
    pub token: IdentityToken,
    /// dBm
    pub signal_strength: i16,
    pub observed_at: DateTime<Utc>,
}

impl DiscoveredDevice {
    /// Multi-line log entry
    pub fn format_entry(&self) -> String {
        format!(
            "{}\nTime: {}\nName: {}\nRSSI: {} dBm\nApp Tag: {}\nUser ID: {}\nDevice: {}",
            ENTRY_HEADER,
            self.observed_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.device_name.as_deref().unwrap_or("Unknown"),
            self.signal_strength,
            self.token.app_tag,
            self.token.user_id,
            self.device_identifier,
        )
    }
}
