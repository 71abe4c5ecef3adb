// Manufacturer-data layout: [16-byte app UUID][UTF-8 user id]
//
// The UUID block is written in RFC 4122 byte order. The user id is not length
// prefixed; it runs to the end of the field.

use super::{reject_control_chars, DecodeError, EncodingError};
use crate::identity::IdentityToken;
use uuid::Uuid;

/// Size of the fixed app identifier block
pub const APP_TAG_LEN: usize = 16;

/// Encode a token whose tag is a canonical (lower-case, hyphenated) UUID
pub fn encode(token: &IdentityToken, budget: usize) -> Result<Vec<u8>, EncodingError> {
    let uuid = Uuid::parse_str(&token.app_tag)
        .map_err(|_| EncodingError::InvalidAppTag(token.app_tag.clone()))?;

    // Decoding renders the hyphenated lower-case form, anything else would not round-trip
    if uuid.hyphenated().to_string() != token.app_tag {
        return Err(EncodingError::InvalidAppTag(token.app_tag.clone()));
    }

    if token.user_id.is_empty() {
        return Err(EncodingError::EmptyField("user_id"));
    }
    reject_control_chars("user_id", &token.user_id)?;

    let len = APP_TAG_LEN + token.user_id.len();
    if len > budget {
        return Err(EncodingError::TooLong { len, budget });
    }

    let mut data = Vec::with_capacity(len);
    data.extend_from_slice(uuid.as_bytes());
    data.extend_from_slice(token.user_id.as_bytes());
    Ok(data)
}

/// Decode manufacturer data back into a token
pub fn decode(data: &[u8]) -> Result<IdentityToken, DecodeError> {
    let too_short = DecodeError::TooShort {
        len: data.len(),
        min: APP_TAG_LEN,
    };
    if data.len() < APP_TAG_LEN {
        return Err(too_short);
    }

    let (block, rest) = data.split_at(APP_TAG_LEN);
    let uuid = Uuid::from_slice(block).map_err(|_| too_short)?;
    let user_id = std::str::from_utf8(rest).map_err(|_| DecodeError::InvalidText)?;

    Ok(IdentityToken {
        app_tag: uuid.hyphenated().to_string(),
        user_id: user_id.to_string(),
    })
}
