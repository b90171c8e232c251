// ID handling for locally generated rows
use crate::error::{CoreError, Result};

pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Short random suffix used when a name has run out of numbered variants.
pub fn short_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..6].to_string()
}

/// Accepts UUIDs and the `[A-Za-z0-9._-]{1,64}` ids cloud endpoints hand out.
pub fn validate_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(CoreError::invalid_id(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_valid_and_unique() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
        assert!(validate_id(&a).is_ok());
    }

    #[test]
    fn test_validate_id_rejects_garbage() {
        assert!(validate_id("").is_err());
        assert!(validate_id("acl/1").is_err());
        assert!(validate_id(&"x".repeat(65)).is_err());
        assert!(validate_id("acl-2ze7f.x_1").is_ok());
    }

    #[test]
    fn test_short_suffix_len() {
        assert_eq!(short_suffix().len(), 6);
    }
}
