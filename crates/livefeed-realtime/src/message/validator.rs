//! Message validation rules.

use livefeed_core::error::AppError;

/// Validates a raw inbound frame before it is parsed.
pub fn validate_inbound(raw: &str, max_bytes: usize) -> Result<(), AppError> {
    if raw.len() > max_bytes {
        return Err(AppError::validation(format!(
            "Message exceeds maximum size of {max_bytes} bytes"
        )));
    }

    if raw.trim().is_empty() {
        return Err(AppError::validation("Empty message"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use livefeed_core::error::ErrorKind;

    #[test]
    fn test_rejects_oversized_frame() {
        let raw = "x".repeat(17);
        let err = validate_inbound(&raw, 16).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(validate_inbound(&raw[..16], 16).is_ok());
    }

    #[test]
    fn test_rejects_blank_frame() {
        assert!(validate_inbound("  \n", 1024).is_err());
    }
}
