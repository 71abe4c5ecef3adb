// Local-name layout: "<app_tag>_<user_id>"
//
// Decoding splits on the last delimiter, so the tag may itself contain '_'
// (the deployed tag is "test11_8i") while the user id may not.

use super::{reject_control_chars, DecodeError, EncodingError};
use crate::identity::IdentityToken;

/// Separator between tag and user id
pub const NAME_DELIMITER: char = '_';

/// Encode a token as a delimited local name
pub fn encode(token: &IdentityToken, budget: usize) -> Result<String, EncodingError> {
    if token.app_tag.is_empty() {
        return Err(EncodingError::EmptyField("app_tag"));
    }
    if token.user_id.is_empty() {
        return Err(EncodingError::EmptyField("user_id"));
    }
    if token.user_id.contains(NAME_DELIMITER) {
        return Err(EncodingError::ContainsDelimiter {
            field: "user_id",
            delimiter: NAME_DELIMITER,
        });
    }
    reject_control_chars("app_tag", &token.app_tag)?;
    reject_control_chars("user_id", &token.user_id)?;

    let name = format!("{}{}{}", token.app_tag, NAME_DELIMITER, token.user_id);
    if name.len() > budget {
        return Err(EncodingError::TooLong {
            len: name.len(),
            budget,
        });
    }
    Ok(name)
}

/// Decode a delimited local name
pub fn decode(name: &str) -> Result<IdentityToken, DecodeError> {
    let (app_tag, user_id) = name
        .rsplit_once(NAME_DELIMITER)
        .ok_or(DecodeError::NoDelimiter)?;

    if app_tag.is_empty() || user_id.is_empty() {
        return Err(DecodeError::MissingField);
    }

    Ok(IdentityToken::new(app_tag, user_id))
}

/// Decode a local name that arrived as raw bytes
pub fn decode_bytes(bytes: &[u8]) -> Result<IdentityToken, DecodeError> {
    let name = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidText)?;
    decode(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DEFAULT_FIELD_BUDGET;
    use proptest::prelude::*;

    #[test]
    fn test_encode_joins_with_delimiter() {
        let token = IdentityToken::new("test11_8i", "ajfi321");
        assert_eq!(
            encode(&token, DEFAULT_FIELD_BUDGET),
            Ok("test11_8i_ajfi321".to_string())
        );
    }

    #[test]
    fn test_decode_splits_on_last_delimiter() {
        let token = decode("test11_8i_ajfi321").expect("Decoding should succeed");
        assert_eq!(token.app_tag, "test11_8i");
        assert_eq!(token.user_id, "ajfi321");
    }

    #[test]
    fn test_decode_no_delimiter() {
        assert_eq!(decode("abc"), Err(DecodeError::NoDelimiter));
        assert_eq!(decode(""), Err(DecodeError::NoDelimiter));
    }

    #[test]
    fn test_decode_missing_field() {
        assert_eq!(decode("abc_"), Err(DecodeError::MissingField));
        assert_eq!(decode("_abc"), Err(DecodeError::MissingField));
        assert_eq!(decode("_"), Err(DecodeError::MissingField));
    }

    #[test]
    fn test_decode_bytes_invalid_text() {
        assert_eq!(decode_bytes(&[0x61, 0x5f, 0xff]), Err(DecodeError::InvalidText));
        assert!(decode_bytes(b"tag_user").is_ok());
    }

    #[test]
    fn test_encode_rejects_delimiter_in_user_id() {
        let token = IdentityToken::new("tag", "a_b");
        assert_eq!(
            encode(&token, DEFAULT_FIELD_BUDGET),
            Err(EncodingError::ContainsDelimiter {
                field: "user_id",
                delimiter: '_'
            })
        );
    }

    #[test]
    fn test_encode_rejects_empty_fields() {
        assert_eq!(
            encode(&IdentityToken::new("", "user"), DEFAULT_FIELD_BUDGET),
            Err(EncodingError::EmptyField("app_tag"))
        );
        assert_eq!(
            encode(&IdentityToken::new("tag", ""), DEFAULT_FIELD_BUDGET),
            Err(EncodingError::EmptyField("user_id"))
        );
    }

    #[test]
    fn test_encode_rejects_control_characters() {
        assert_eq!(
            encode(&IdentityToken::new("tag", "us\ner"), DEFAULT_FIELD_BUDGET),
            Err(EncodingError::ControlCharacter("user_id"))
        );
    }

    #[test]
    fn test_encode_enforces_budget() {
        let token = IdentityToken::new("test11_8i", "a".repeat(17));
        assert_eq!(
            encode(&token, DEFAULT_FIELD_BUDGET),
            Err(EncodingError::TooLong { len: 27, budget: 26 })
        );
        assert!(encode(&token, 27).is_ok());
    }

    #[test]
    fn test_budget_counts_bytes_not_chars() {
        // "é" is two bytes in UTF-8
        let fits = IdentityToken::new("t", "é".repeat(12));
        assert!(encode(&fits, DEFAULT_FIELD_BUDGET).is_ok());

        let overflows = IdentityToken::new("t", "é".repeat(13));
        assert_eq!(
            encode(&overflows, DEFAULT_FIELD_BUDGET),
            Err(EncodingError::TooLong { len: 28, budget: 26 })
        );
    }

    proptest! {
        #[test]
        fn prop_round_trip(app_tag in "[a-z0-9_]{1,12}", user_id in "[a-zA-Z0-9]{1,12}") {
            let token = IdentityToken::new(app_tag, user_id);
            let name = encode(&token, DEFAULT_FIELD_BUDGET).expect("token fits the budget");
            prop_assert_eq!(decode(&name), Ok(token));
        }

        #[test]
        fn prop_undelimited_names_rejected(name in "[a-zA-Z0-9 .-]{0,26}") {
            prop_assert_eq!(decode(&name), Err(DecodeError::NoDelimiter));
        }
    }
}
