//! Input validation and identifier generation.

use crate::errors::*;
use std::collections::BTreeMap;

/// Display-name length bounds (inclusive).
pub const NAME_MIN_LEN: usize = 2;
pub const NAME_MAX_LEN: usize = 100;

/// Metadata keys the service accepts.
pub const METADATA_KEY_WHITELIST: &[&str] = &[
    "department",
    "position",
    "location",
    "information",
    "details",
    "profile",
    "data",
    "notes",
];

/// Validate and trim a display name.
///
/// Names are 2–100 characters of letters, spaces, hyphens, apostrophes and
/// periods, and must contain at least one letter.
pub fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    let len = trimmed.chars().count();

    if len < NAME_MIN_LEN || len > NAME_MAX_LEN {
        return Err(IdentityError::Validation(format!(
            "name must be {}-{} characters, got {}",
            NAME_MIN_LEN, NAME_MAX_LEN, len
        )));
    }

    let valid_chars = trimmed
        .chars()
        .all(|c| c.is_ascii_alphabetic() || matches!(c, ' ' | '-' | '\'' | '.'));
    if !valid_chars {
        return Err(IdentityError::Validation(
            "name may only contain letters, spaces, hyphens, apostrophes and periods".to_string(),
        ));
    }

    if !trimmed.chars().any(|c| c.is_ascii_alphabetic()) {
        return Err(IdentityError::Validation(
            "name must contain at least one letter".to_string(),
        ));
    }

    Ok(trimmed.to_string())
}

/// Validate metadata keys against the whitelist. Values pass through.
pub fn validate_metadata(metadata: &BTreeMap<String, String>) -> Result<()> {
    for key in metadata.keys() {
        if !METADATA_KEY_WHITELIST.contains(&key.as_str()) {
            return Err(IdentityError::Validation(format!(
                "metadata key '{}' is not allowed",
                key
            )));
        }
    }
    Ok(())
}

/// Lowercase slug of a validated name: runs of non-alphanumerics collapse to
/// single underscores.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_sep = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            slug.push('_');
            last_was_sep = true;
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    slug
}

/// Smallest `{slug}_{n}` not present in `taken`.
pub fn next_user_id(slug: &str, taken: &[String]) -> String {
    let mut n = 1usize;
    loop {
        let candidate = format!("{}_{}", slug, n);
        if !taken.iter().any(|id| id == &candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Decode base64 image data, tolerating a data-URL prefix.
pub fn decode_image_data(image_data: &str) -> Result<Vec<u8>> {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    let payload = match image_data.split_once(',') {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => image_data,
    };

    STANDARD
        .decode(payload.trim())
        .map_err(|e| IdentityError::Validation(format!("invalid base64 image data: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_length_bounds() {
        assert!(validate_name("Al").is_ok());
        assert!(validate_name("A").is_err());

        let max = "A".repeat(100);
        assert!(validate_name(&max).is_ok());
        let over = "A".repeat(101);
        assert!(validate_name(&over).is_err());
    }

    #[test]
    fn test_name_charset() {
        assert!(validate_name("Mary-Jane O'Neil Jr.").is_ok());
        assert!(validate_name("Jane123").is_err());
        assert!(validate_name("Jane_Doe").is_err());
        assert!(validate_name("--").is_err());
    }

    #[test]
    fn test_name_trimmed() {
        assert_eq!(validate_name("  John Smith  ").unwrap(), "John Smith");
    }

    #[test]
    fn test_metadata_whitelist() {
        let mut ok = BTreeMap::new();
        ok.insert("department".to_string(), "Engineering".to_string());
        assert!(validate_metadata(&ok).is_ok());

        let mut bad = BTreeMap::new();
        bad.insert("ssn".to_string(), "123".to_string());
        assert!(validate_metadata(&bad).is_err());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("John Smith"), "john_smith");
        assert_eq!(slugify("Mary-Jane O'Neil"), "mary_jane_o_neil");
        assert_eq!(slugify("A.  B."), "a_b");
    }

    #[test]
    fn test_next_user_id_picks_smallest_free() {
        let taken = vec!["john_smith_1".to_string(), "john_smith_3".to_string()];
        assert_eq!(next_user_id("john_smith", &taken), "john_smith_2");
        assert_eq!(next_user_id("jane_doe", &taken), "jane_doe_1");
    }

    #[test]
    fn test_decode_image_data_plain_and_data_url() {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;

        let encoded = STANDARD.encode(b"pixels");
        assert_eq!(decode_image_data(&encoded).unwrap(), b"pixels");

        let with_prefix = format!("data:image/jpeg;base64,{}", encoded);
        assert_eq!(decode_image_data(&with_prefix).unwrap(), b"pixels");

        assert!(decode_image_data("!!!not base64!!!").is_err());
    }
}
