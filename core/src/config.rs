// Streetpass configuration
//
// One config describes one device: the identity it advertises, the payload
// format shared with its peers, and the limits of the discovery pipeline.

use crate::codec::{
    AdvertisementCodec, CodecLimits, EncodingError, PayloadFormat, DEFAULT_DISPLAY_NAME,
    DEFAULT_FIELD_BUDGET,
};
use crate::discovery::{DiscoveryDeduplicator, DEFAULT_PLACEHOLDER};
use crate::identity::IdentityToken;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// App tag advertised in the delimited format
pub const DEFAULT_APP_TAG: &str = "test11_8i";

/// App UUID advertised in the binary format
pub const DEFAULT_APP_UUID: &str = "bc407cce-aac9-5be2-07a5-e3b89f3055b5";

pub const DEFAULT_USER_ID: &str = "ajfi321";

/// Stock app tag for a payload format
pub fn default_app_tag(format: PayloadFormat) -> &'static str {
    match format {
        PayloadFormat::ManufacturerData => DEFAULT_APP_UUID,
        PayloadFormat::LocalName => DEFAULT_APP_TAG,
    }
}

/// Budgets may be tightened but never widened past what fits beside the flags
pub const MAX_FIELD_BUDGET: usize = DEFAULT_FIELD_BUDGET;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Identity cannot be advertised: {0}")]
    Identity(#[from] EncodingError),
    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreetpassConfig {
    pub app_tag: String,
    pub user_id: String,
    pub payload_format: PayloadFormat,
    /// Local name advertised next to manufacturer-data payloads
    pub display_name: String,
    pub limits: CodecLimits,
    /// Log text shown until the first event
    pub placeholder: String,
    /// Maximum remembered broadcasts; unbounded when absent
    pub dedup_capacity: Option<usize>,
}

impl Default for StreetpassConfig {
    fn default() -> Self {
        Self {
            app_tag: DEFAULT_APP_TAG.to_string(),
            user_id: DEFAULT_USER_ID.to_string(),
            payload_format: PayloadFormat::default(),
            display_name: DEFAULT_DISPLAY_NAME.to_string(),
            limits: CodecLimits::default(),
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
            dedup_capacity: None,
        }
    }
}

impl StreetpassConfig {
    /// Defaults for the binary manufacturer-data format
    pub fn manufacturer_data() -> Self {
        Self {
            app_tag: default_app_tag(PayloadFormat::ManufacturerData).to_string(),
            payload_format: PayloadFormat::ManufacturerData,
            ..Self::default()
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, budget) in [
            ("limits.manufacturer_data_budget", self.limits.manufacturer_data_budget),
            ("limits.local_name_budget", self.limits.local_name_budget),
        ] {
            if budget == 0 || budget > MAX_FIELD_BUDGET {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("must be between 1 and {} bytes", MAX_FIELD_BUDGET),
                });
            }
        }

        if self.placeholder.is_empty() {
            return Err(ConfigError::Invalid {
                field: "placeholder",
                reason: "cannot be empty".to_string(),
            });
        }

        if self.dedup_capacity == Some(0) {
            return Err(ConfigError::Invalid {
                field: "dedup_capacity",
                reason: "must be at least 1 when set".to_string(),
            });
        }

        if self.display_name.chars().any(char::is_control) {
            return Err(ConfigError::Invalid {
                field: "display_name",
                reason: "contains control characters".to_string(),
            });
        }

        // The identity must be advertisable under the configured format
        self.codec().encode(&self.token())?;
        Ok(())
    }

    pub fn token(&self) -> IdentityToken {
        IdentityToken::new(self.app_tag.clone(), self.user_id.clone())
    }

    pub fn codec(&self) -> AdvertisementCodec {
        AdvertisementCodec::new(self.payload_format, self.limits)
            .with_display_name(self.display_name.clone())
    }

    pub fn deduplicator(&self) -> DiscoveryDeduplicator {
        match self.dedup_capacity {
            Some(capacity) => DiscoveryDeduplicator::with_capacity_limit(capacity),
            None => DiscoveryDeduplicator::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = StreetpassConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.payload_format, PayloadFormat::LocalName);
        assert_eq!(config.token(), IdentityToken::new("test11_8i", "ajfi321"));
    }

    #[test]
    fn test_manufacturer_defaults_are_valid() {
        let config = StreetpassConfig::manufacturer_data();
        assert!(config.validate().is_ok());
        assert_eq!(config.app_tag, DEFAULT_APP_UUID);
    }

    #[test]
    fn test_delimited_tag_rejected_for_binary_format() {
        let config = StreetpassConfig {
            payload_format: PayloadFormat::ManufacturerData,
            ..StreetpassConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Identity(EncodingError::InvalidAppTag(_)))
        ));
    }

    #[test]
    fn test_user_id_with_delimiter_rejected() {
        let config = StreetpassConfig::default().with_user_id("a_b");
        assert!(matches!(config.validate(), Err(ConfigError::Identity(_))));
    }

    #[test]
    fn test_oversized_budget_rejected() {
        let mut config = StreetpassConfig::default();
        config.limits.local_name_budget = 64;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "limits.local_name_budget", .. })
        ));
    }

    #[test]
    fn test_display_name_must_fit_scan_response() {
        let config = StreetpassConfig {
            display_name: "StreetpassApp for a very long device".to_string(),
            ..StreetpassConfig::manufacturer_data()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Identity(EncodingError::PduOverflow { pdu: "Scan response", .. }))
        ));
    }

    #[test]
    fn test_zero_dedup_capacity_rejected() {
        let config = StreetpassConfig {
            dedup_capacity: Some(0),
            ..StreetpassConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: StreetpassConfig =
            serde_json::from_str(r#"{"user_id":"bob","payload_format":"local_name"}"#)
                .expect("parse");
        assert_eq!(config.user_id, "bob");
        assert_eq!(config.app_tag, DEFAULT_APP_TAG);
        assert_eq!(config.dedup_capacity, None);
    }
}
