//! Input validation for account names, display names, player ids and stored JSON.

use std::collections::HashSet;
use std::fmt::Write;

/// Account and display name validation errors with helpful messages
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("Name is empty")]
    Empty,

    #[error("Name is too short (minimum {min} characters)")]
    TooShort { min: usize },

    #[error("Name is too long (maximum {max} characters)")]
    TooLong { max: usize },

    #[error("Name contains invalid characters: {chars}")]
    InvalidCharacters { chars: String },

    #[error("Name contains path separators (/ or \\)")]
    PathTraversal,

    #[error("Name is a reserved system name")]
    Reserved,
}

/// Problems with a stored JSON payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("payload exceeds limit ({limit} bytes)")]
    TooLarge { limit: usize },

    #[error("invalid payload: {0}")]
    InvalidFormat(String),
}

pub const ACCOUNT_NAME_MIN: usize = 2;
pub const ACCOUNT_NAME_MAX: usize = 30;
pub const DISPLAY_NAME_MAX: usize = 30;
pub const PLAYER_ID_MAX: usize = 128;

/// Generate safe filename from an account name using URL encoding
pub fn safe_filename(name: &str) -> String {
    use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
    utf8_percent_encode(name, NON_ALPHANUMERIC).to_string()
}

fn reserved_names() -> HashSet<&'static str> {
    [
        "admin", "administrator", "root", "system", "operator", "guest", "anonymous",
        "con", "prn", "aux", "nul", "com1", "com2", "com3", "lpt1", "lpt2", "lpt3",
        "device",
    ]
    .iter()
    .copied()
    .collect()
}

fn describe_controls(name: &str) -> Option<String> {
    let controls: Vec<String> = name
        .chars()
        .filter(|c| c.is_control())
        .map(|c| format!("\\u{{{:04x}}}", c as u32))
        .collect();
    if controls.is_empty() {
        None
    } else {
        Some(controls.join(", "))
    }
}

/// Validate a local account login name. ASCII letters, digits, `_`, `-` and `.`
/// only; compared case-insensitively elsewhere.
pub fn validate_account_name(name: &str) -> Result<String, NameError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(NameError::Empty);
    }
    let length = trimmed.chars().count();
    if length < ACCOUNT_NAME_MIN {
        return Err(NameError::TooShort {
            min: ACCOUNT_NAME_MIN,
        });
    }
    if length > ACCOUNT_NAME_MAX {
        return Err(NameError::TooLong {
            max: ACCOUNT_NAME_MAX,
        });
    }
    if trimmed.contains("..") || trimmed.contains('/') || trimmed.contains('\\') {
        return Err(NameError::PathTraversal);
    }
    if reserved_names().contains(trimmed.to_ascii_lowercase().as_str()) {
        return Err(NameError::Reserved);
    }
    if let Some(chars) = describe_controls(trimmed) {
        return Err(NameError::InvalidCharacters { chars });
    }

    let invalid: HashSet<char> = trimmed
        .chars()
        .filter(|ch| !(ch.is_ascii_alphanumeric() || *ch == '_' || *ch == '-' || *ch == '.'))
        .collect();
    if !invalid.is_empty() {
        let mut chars: Vec<char> = invalid.into_iter().collect();
        chars.sort_unstable();
        return Err(NameError::InvalidCharacters {
            chars: chars.into_iter().collect(),
        });
    }

    Ok(trimmed.to_string())
}

/// Validate a user-facing display name before it is sent to the identity
/// provider. Unicode and spaces are fine; control characters are not.
pub fn validate_display_name(name: &str) -> Result<String, NameError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(NameError::Empty);
    }
    if trimmed.chars().count() > DISPLAY_NAME_MAX {
        return Err(NameError::TooLong {
            max: DISPLAY_NAME_MAX,
        });
    }
    if let Some(chars) = describe_controls(trimmed) {
        return Err(NameError::InvalidCharacters { chars });
    }
    Ok(trimmed.to_string())
}

/// Player ids come from the identity provider and end up inside storage keys.
pub fn validate_player_id(id: &str) -> Result<&str, NameError> {
    if id.is_empty() {
        return Err(NameError::Empty);
    }
    if id.len() > PLAYER_ID_MAX {
        return Err(NameError::TooLong { max: PLAYER_ID_MAX });
    }
    if let Some(chars) = describe_controls(id) {
        return Err(NameError::InvalidCharacters { chars });
    }
    Ok(id)
}

/// Parse JSON with a size limit. Leading NULs left behind by an interrupted
/// write are stripped first; valid JSON never starts with one.
pub fn secure_json_parse<T>(content: &str, max_bytes: usize) -> Result<T, PayloadError>
where
    T: serde::de::DeserializeOwned,
{
    if content.len() > max_bytes {
        return Err(PayloadError::TooLarge { limit: max_bytes });
    }
    let normalized = content.trim_start_matches('\0');
    serde_json::from_str(normalized).map_err(|e| PayloadError::InvalidFormat(e.to_string()))
}

/// Escape a user-supplied string for single-line logging. Control characters
/// become escapes and anything past 120 characters is cut with an ellipsis.
pub fn escape_log(s: &str) -> String {
    const MAX_PREVIEW: usize = 120;
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_name_validation() {
        assert_eq!(validate_account_name("martin").unwrap(), "martin");
        assert_eq!(validate_account_name("  rook_42 ").unwrap(), "rook_42");
        assert!(validate_account_name("a.b-c").is_ok());

        assert_eq!(validate_account_name(""), Err(NameError::Empty));
        assert!(matches!(
            validate_account_name("x"),
            Err(NameError::TooShort { .. })
        ));
        assert!(matches!(
            validate_account_name(&"n".repeat(31)),
            Err(NameError::TooLong { max: 30 })
        ));
        assert_eq!(validate_account_name("../etc"), Err(NameError::PathTraversal));
        assert_eq!(validate_account_name("Admin"), Err(NameError::Reserved));
        assert!(matches!(
            validate_account_name("José"),
            Err(NameError::InvalidCharacters { .. })
        ));
        assert!(matches!(
            validate_account_name("two words"),
            Err(NameError::InvalidCharacters { .. })
        ));
    }

    #[test]
    fn test_display_name_validation() {
        assert_eq!(validate_display_name(" José María ").unwrap(), "José María");
        assert!(validate_display_name("🚀 Pilot").is_ok());
        assert_eq!(validate_display_name("   "), Err(NameError::Empty));
        assert!(matches!(
            validate_display_name("bad\u{7}name"),
            Err(NameError::InvalidCharacters { .. })
        ));
        assert!(validate_display_name(&"ñ".repeat(30)).is_ok());
        assert!(validate_display_name(&"ñ".repeat(31)).is_err());
    }

    #[test]
    fn test_player_id_validation() {
        assert!(validate_player_id("2d6c1f0e-94d5-4a51-8f0a-000000000001").is_ok());
        assert_eq!(validate_player_id(""), Err(NameError::Empty));
        assert!(validate_player_id("id\nwith-newline").is_err());
        assert!(validate_player_id(&"x".repeat(129)).is_err());
    }

    #[test]
    fn test_safe_filename() {
        assert_eq!(safe_filename("martin"), "martin");
        assert_eq!(safe_filename("a.b"), "a%2Eb");
        assert!(!safe_filename("user/file").contains('/'));
    }

    #[test]
    fn test_secure_json_parse() {
        let parsed: Vec<u32> = secure_json_parse("\0\0[1,2]", 64).unwrap();
        assert_eq!(parsed, vec![1, 2]);
        assert_eq!(
            secure_json_parse::<Vec<u32>>("[1,2,3]", 3),
            Err(PayloadError::TooLarge { limit: 3 })
        );
        assert!(matches!(
            secure_json_parse::<Vec<u32>>("{", 64),
            Err(PayloadError::InvalidFormat(_))
        ));
    }

    #[test]
    fn escapes_newlines_and_truncates() {
        assert_eq!(escape_log("Line1\nLine2\r\tEnd"), "Line1\\nLine2\\r\\tEnd");
        let long = "x".repeat(200);
        assert!(escape_log(&long).ends_with('…'));
    }
}
