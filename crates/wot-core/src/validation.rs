// crates/wot-core/src/validation.rs
//
// Input limits for identity attributes and trust rows. Every mutation entry
// point runs these before touching the store.

use crate::error::WotError;

pub const MIN_TRUST_VALUE: i8 = -100;
pub const MAX_TRUST_VALUE: i8 = 100;
pub const MAX_TRUST_COMMENT_LENGTH: usize = 256;
pub const MAX_TRUST_LIST_SIZE: usize = 512;

pub const MAX_NICKNAME_LENGTH: usize = 30;
pub const MAX_CONTEXT_NAME_LENGTH: usize = 32;
pub const MAX_CONTEXT_AMOUNT: usize = 32;
pub const MAX_PROPERTY_NAME_LENGTH: usize = 256;
pub const MAX_PROPERTY_VALUE_LENGTH: usize = 10 * 1024;
pub const MAX_PROPERTY_AMOUNT: usize = 64;

pub fn validate_trust_value(value: i8) -> Result<(), WotError> {
    if (MIN_TRUST_VALUE..=MAX_TRUST_VALUE).contains(&value) {
        Ok(())
    } else {
        Err(WotError::TrustValueOutOfRange {
            value: i32::from(value),
        })
    }
}

pub fn validate_trust_comment(comment: &str) -> Result<(), WotError> {
    if comment.chars().count() > MAX_TRUST_COMMENT_LENGTH {
        return Err(WotError::invalid(
            "trust comment",
            format!("longer than {} characters", MAX_TRUST_COMMENT_LENGTH),
        ));
    }
    Ok(())
}

/// Nicknames: 1..=30 characters, no control or whitespace-only content.
pub fn validate_nickname(nickname: &str) -> Result<(), WotError> {
    let length = nickname.chars().count();
    if length == 0 || length > MAX_NICKNAME_LENGTH {
        return Err(WotError::invalid(
            "nickname",
            format!("length {} not in 1..={}", length, MAX_NICKNAME_LENGTH),
        ));
    }
    if nickname.chars().any(char::is_control) {
        return Err(WotError::invalid("nickname", "contains control characters"));
    }
    if nickname.trim().is_empty() {
        return Err(WotError::invalid("nickname", "is blank"));
    }
    Ok(())
}

/// Context names: 1..=32 ASCII letters or digits.
pub fn validate_context_name(context: &str) -> Result<(), WotError> {
    if context.is_empty() || context.len() > MAX_CONTEXT_NAME_LENGTH {
        return Err(WotError::invalid(
            "context",
            format!("length {} not in 1..={}", context.len(), MAX_CONTEXT_NAME_LENGTH),
        ));
    }
    if !context.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(WotError::invalid("context", "must be ASCII letters or digits"));
    }
    Ok(())
}

pub fn validate_property(name: &str, value: &str) -> Result<(), WotError> {
    let name_length = name.chars().count();
    if name_length == 0 || name_length > MAX_PROPERTY_NAME_LENGTH {
        return Err(WotError::invalid(
            "property name",
            format!("length {} not in 1..={}", name_length, MAX_PROPERTY_NAME_LENGTH),
        ));
    }
    if name.chars().any(char::is_control) {
        return Err(WotError::invalid("property name", "contains control characters"));
    }
    if value.len() > MAX_PROPERTY_VALUE_LENGTH {
        return Err(WotError::invalid(
            "property value",
            format!("{} bytes exceeds {}", value.len(), MAX_PROPERTY_VALUE_LENGTH),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_trust_value_bounds() {
        assert!(validate_trust_value(100).is_ok());
        assert!(validate_trust_value(-100).is_ok());
        assert!(validate_trust_value(0).is_ok());
        let err = validate_trust_value(101).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(validate_trust_value(-128).is_err());
    }

    #[test]
    fn test_comment_length() {
        assert!(validate_trust_comment("fine").is_ok());
        assert!(validate_trust_comment(&"x".repeat(257)).is_err());
    }

    #[test]
    fn test_nickname_rules() {
        assert!(validate_nickname("alice").is_ok());
        assert!(validate_nickname("").is_err());
        assert!(validate_nickname("   ").is_err());
        assert!(validate_nickname("bad\nname").is_err());
        assert!(validate_nickname(&"n".repeat(31)).is_err());
    }

    #[test]
    fn test_context_rules() {
        assert!(validate_context_name("Introduction").is_ok());
        assert!(validate_context_name("with space").is_err());
        assert!(validate_context_name("").is_err());
        assert!(validate_context_name(&"c".repeat(33)).is_err());
    }

    #[test]
    fn test_property_rules() {
        assert!(validate_property("IntroductionPuzzleCount", "10").is_ok());
        assert!(validate_property("", "x").is_err());
        assert!(validate_property("big", &"v".repeat(MAX_PROPERTY_VALUE_LENGTH + 1)).is_err());
    }
}
