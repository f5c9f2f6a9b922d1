//! Input validation and key sanitization
//!
//! Customer ids travel into filesystem paths, ledger keys and graph-database
//! property maps, so they are validated up front and sanitized before being
//! used as a path component.

use crate::errors::{PipelineError, Result};

/// Maximum allowed length for customer identifiers
pub const MAX_CUSTOMER_ID_LENGTH: usize = 128;

/// Maximum length of a sanitized path/key component
pub const MAX_KEY_COMPONENT_LENGTH: usize = 50;

/// Validate a customer id: non-empty, bounded length, safe charset
///
/// Allowed characters: alphanumeric, hyphen, underscore, at-sign, period.
/// Anything else is rejected before it can reach a path or ledger key.
pub fn validate_customer_id(customer_id: &str) -> Result<()> {
    if customer_id.is_empty() {
        return Err(PipelineError::InvalidInput {
            field: "customer_id".to_string(),
            reason: "must not be empty".to_string(),
        });
    }

    if customer_id.len() > MAX_CUSTOMER_ID_LENGTH {
        return Err(PipelineError::InvalidInput {
            field: "customer_id".to_string(),
            reason: format!(
                "length {} exceeds maximum {}",
                customer_id.len(),
                MAX_CUSTOMER_ID_LENGTH
            ),
        });
    }

    if !customer_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '@' | '.'))
    {
        return Err(PipelineError::InvalidInput {
            field: "customer_id".to_string(),
            reason: "contains characters outside [a-zA-Z0-9-_@.]".to_string(),
        });
    }

    Ok(())
}

/// Validate an extraction id produced by this pipeline
pub fn validate_extraction_id(extraction_id: &str) -> Result<()> {
    if extraction_id.is_empty() {
        return Err(PipelineError::InvalidInput {
            field: "extraction_id".to_string(),
            reason: "must not be empty".to_string(),
        });
    }

    if !extraction_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
    {
        return Err(PipelineError::InvalidInput {
            field: "extraction_id".to_string(),
            reason: "contains characters outside [a-zA-Z0-9-_]".to_string(),
        });
    }

    Ok(())
}

/// Replace unsafe characters with underscores and cap the length
///
/// Used for any value interpolated into a store path or ledger key that did
/// not already pass strict validation (e.g. ids sourced from older records).
pub fn sanitize_key_component(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    cleaned.chars().take(MAX_KEY_COMPONENT_LENGTH).collect()
}

/// Clamp a confidence score into [0.0, 1.0], mapping NaN to 0.0
pub fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_customer_ids() {
        assert!(validate_customer_id("cust_12345").is_ok());
        assert!(validate_customer_id("tim.wolff@example.com").is_ok());
        assert!(validate_customer_id("abc-DEF-123").is_ok());
    }

    #[test]
    fn test_invalid_customer_ids() {
        assert!(validate_customer_id("").is_err());
        assert!(validate_customer_id("has space").is_err());
        assert!(validate_customer_id("path/../traversal").is_err());
        assert!(validate_customer_id(&"x".repeat(200)).is_err());
    }

    #[test]
    fn test_sanitize_key_component() {
        assert_eq!(sanitize_key_component("  cust/1 "), "cust_1");
        assert_eq!(sanitize_key_component("a b:c"), "a_b_c");
        let long = "y".repeat(80);
        assert_eq!(sanitize_key_component(&long).len(), MAX_KEY_COMPONENT_LENGTH);
    }

    #[test]
    fn test_clamp_confidence() {
        assert_eq!(clamp_confidence(1.5), 1.0);
        assert_eq!(clamp_confidence(-0.2), 0.0);
        assert_eq!(clamp_confidence(f32::NAN), 0.0);
        assert_eq!(clamp_confidence(0.7), 0.7);
    }
}
