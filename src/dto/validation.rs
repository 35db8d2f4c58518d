//! Validation helpers for DTOs.

use validator::ValidationError;

const MAX_UID_LEN: usize = 128;

/// Validates a uid handed over by the identity provider.
///
/// Uids end up in document ids and cache keys, so they must be non-empty,
/// bounded, and free of whitespace, control characters and `/`.
pub fn validate_uid(uid: &str) -> Result<(), ValidationError> {
    if uid.is_empty() || uid.len() > MAX_UID_LEN {
        let mut err = ValidationError::new("uid_length");
        err.message = Some(
            format!(
                "uid must be between 1 and {MAX_UID_LEN} bytes (got {})",
                uid.len()
            )
            .into(),
        );
        return Err(err);
    }

    if uid
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || c == '/')
    {
        let mut err = ValidationError::new("uid_format");
        err.message = Some("uid must not contain whitespace, control characters or '/'".into());
        return Err(err);
    }

    Ok(())
}
