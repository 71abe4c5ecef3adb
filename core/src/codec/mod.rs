/// Advertisement codec
///
/// Turns an [`IdentityToken`] into the fields of a single radio advertisement
/// and back. Two payload generations exist in the field:
///
/// - **manufacturer**: a 16-byte app UUID block followed by the UTF-8 user id,
///   carried as manufacturer data
/// - **local_name**: `tag_userid`, carried as the advertised local name
///
/// A codec is configured with exactly one [`PayloadFormat`] and only ever
/// decodes that format. The two layouts cannot be told apart from the bytes
/// alone, so the format acts as the discriminator.

pub mod local_name;
pub mod manufacturer;

use crate::identity::IdentityToken;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Payload of one legacy advertising PDU (advertising data or scan response)
pub const LEGACY_PDU_LEN: usize = 31;

const FLAGS_LEN: usize = 3;
const FIELD_HEADER_LEN: usize = 2;

/// Byte budget for the token field: a legacy advertisement minus the flags
/// structure and the field header.
pub const DEFAULT_FIELD_BUDGET: usize = LEGACY_PDU_LEN - FLAGS_LEN - FIELD_HEADER_LEN;

/// Local name advertised next to manufacturer-data payloads. It does not fit
/// beside the token, so it travels in the scan response.
pub const DEFAULT_DISPLAY_NAME: &str = "StreetpassApp";

/// Errors raised while encoding a token
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("Field {0} is empty")]
    EmptyField(&'static str),
    #[error("Field {field} contains the delimiter '{delimiter}'")]
    ContainsDelimiter { field: &'static str, delimiter: char },
    #[error("Field {0} contains control characters")]
    ControlCharacter(&'static str),
    #[error("App tag {0:?} is not a canonical UUID")]
    InvalidAppTag(String),
    #[error("Encoded field is {len} bytes, budget is {budget}")]
    TooLong { len: usize, budget: usize },
    #[error("{pdu} would be {len} bytes, a legacy PDU holds {}", LEGACY_PDU_LEN)]
    PduOverflow { pdu: &'static str, len: usize },
}

/// Errors raised while decoding a received field
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Payload too short: {len} bytes (minimum {min})")]
    TooShort { len: usize, min: usize },
    #[error("Payload is not valid UTF-8")]
    InvalidText,
    #[error("Payload has no delimiter")]
    NoDelimiter,
    #[error("Payload is missing a field")]
    MissingField,
}

/// Which advertisement field carries the token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadFormat {
    /// Binary UUID block + user id in manufacturer data
    ManufacturerData,
    /// Delimited `tag_userid` string in the local name
    #[default]
    LocalName,
}

impl PayloadFormat {
    /// The advertisement field this format reads and writes
    pub fn field_kind(&self) -> FieldKind {
        match self {
            PayloadFormat::ManufacturerData => FieldKind::ManufacturerData,
            PayloadFormat::LocalName => FieldKind::LocalName,
        }
    }
}

impl fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadFormat::ManufacturerData => write!(f, "manufacturer-data"),
            PayloadFormat::LocalName => write!(f, "local-name"),
        }
    }
}

impl FromStr for PayloadFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manufacturer_data" | "manufacturer-data" => Ok(PayloadFormat::ManufacturerData),
            "local_name" | "local-name" => Ok(PayloadFormat::LocalName),
            other => Err(format!(
                "unknown payload format '{}' (expected local_name or manufacturer_data)",
                other
            )),
        }
    }
}

/// Kinds of advertisement fields the core understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    LocalName,
    ManufacturerData,
}

/// Raw value of an advertisement field as handed over by the adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Bytes(Vec<u8>),
}

impl FieldValue {
    /// Raw bytes of the field, whatever its representation
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FieldValue::Text(text) => text.as_bytes(),
            FieldValue::Bytes(bytes) => bytes,
        }
    }
}

/// Per-field byte budgets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecLimits {
    pub manufacturer_data_budget: usize,
    pub local_name_budget: usize,
}

impl Default for CodecLimits {
    fn default() -> Self {
        Self {
            manufacturer_data_budget: DEFAULT_FIELD_BUDGET,
            local_name_budget: DEFAULT_FIELD_BUDGET,
        }
    }
}

/// Fields handed to the adapter for one advertisement
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AdvertisementPayload {
    pub local_name: Option<String>,
    pub manufacturer_data: Option<Vec<u8>>,
}

impl AdvertisementPayload {
    /// Fetch a single field as the adapter would report it on reception
    pub fn field(&self, kind: FieldKind) -> Option<FieldValue> {
        match kind {
            FieldKind::LocalName => self.local_name.clone().map(FieldValue::Text),
            FieldKind::ManufacturerData => self.manufacturer_data.clone().map(FieldValue::Bytes),
        }
    }

    /// On-air length of the advertising PDU: flags plus the token field.
    /// Manufacturer data takes that slot when present, otherwise the local name.
    pub fn advertising_data_len(&self) -> usize {
        let token_field = match (&self.manufacturer_data, &self.local_name) {
            (Some(data), _) => data.len(),
            (None, Some(name)) => name.len(),
            (None, None) => return FLAGS_LEN,
        };
        FLAGS_LEN + FIELD_HEADER_LEN + token_field
    }

    /// On-air length of the scan response, which only carries the local name
    /// when manufacturer data occupies the advertising PDU
    pub fn scan_response_len(&self) -> usize {
        match (&self.manufacturer_data, &self.local_name) {
            (Some(_), Some(name)) => FIELD_HEADER_LEN + name.len(),
            _ => 0,
        }
    }

    fn check_on_air(&self) -> Result<(), EncodingError> {
        for (pdu, len) in [
            ("Advertising data", self.advertising_data_len()),
            ("Scan response", self.scan_response_len()),
        ] {
            if len > LEGACY_PDU_LEN {
                return Err(EncodingError::PduOverflow { pdu, len });
            }
        }
        Ok(())
    }
}

/// Encoder/decoder bound to one payload format
#[derive(Debug, Clone)]
pub struct AdvertisementCodec {
    format: PayloadFormat,
    limits: CodecLimits,
    display_name: String,
}

impl AdvertisementCodec {
    /// Create a codec for the given format and limits
    pub fn new(format: PayloadFormat, limits: CodecLimits) -> Self {
        Self {
            format,
            limits,
            display_name: DEFAULT_DISPLAY_NAME.to_string(),
        }
    }

    /// Set the local name advertised alongside manufacturer-data payloads
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn format(&self) -> PayloadFormat {
        self.format
    }

    /// Encode a token into advertisement fields that fit a legacy
    /// advertisement plus scan response
    pub fn encode(&self, token: &IdentityToken) -> Result<AdvertisementPayload, EncodingError> {
        let payload = self.encode_fields(token)?;
        payload.check_on_air()?;
        Ok(payload)
    }

    fn encode_fields(&self, token: &IdentityToken) -> Result<AdvertisementPayload, EncodingError> {
        match self.format {
            PayloadFormat::ManufacturerData => {
                let data = manufacturer::encode(token, self.limits.manufacturer_data_budget)?;
                let local_name = if self.display_name.is_empty() {
                    None
                } else {
                    Some(self.display_name.clone())
                };
                Ok(AdvertisementPayload {
                    local_name,
                    manufacturer_data: Some(data),
                })
            }
            PayloadFormat::LocalName => {
                let name = local_name::encode(token, self.limits.local_name_budget)?;
                Ok(AdvertisementPayload {
                    local_name: Some(name),
                    manufacturer_data: None,
                })
            }
        }
    }

    /// Decode the field this codec's format is carried in
    pub fn decode(&self, field: &FieldValue) -> Result<IdentityToken, DecodeError> {
        match self.format {
            PayloadFormat::ManufacturerData => manufacturer::decode(field.as_bytes()),
            PayloadFormat::LocalName => match field {
                FieldValue::Text(text) => local_name::decode(text),
                FieldValue::Bytes(bytes) => local_name::decode_bytes(bytes),
            },
        }
    }
}

impl Default for AdvertisementCodec {
    fn default() -> Self {
        Self::new(PayloadFormat::default(), CodecLimits::default())
    }
}

pub(crate) fn reject_control_chars(field: &'static str, value: &str) -> Result<(), EncodingError> {
    if value.chars().any(char::is_control) {
        return Err(EncodingError::ControlCharacter(field));
    }
    Ok(())
}
