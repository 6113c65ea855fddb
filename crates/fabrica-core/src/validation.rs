//! # Validation Rules
//!
//! Input validation for lojista registration and product snapshots.
//! All checks run before any persistence or network work.

use url::Url;

use crate::error::ValidationError;
use crate::types::{Product, ProductVariation};

/// Maximum length for display names.
pub const MAX_NAME_LEN: usize = 120;

/// Maximum length for SKUs.
pub const MAX_SKU_LEN: usize = 64;

// =============================================================================
// Lojista Registration
// =============================================================================

/// Validates a lojista registration request.
///
/// ## Rules
/// - name: required, bounded length
/// - base_url: required, parseable, http or https scheme, has a host
/// - api_key: required
pub fn validate_registration(
    name: &str,
    base_url: &str,
    api_key: &str,
) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: MAX_NAME_LEN,
        });
    }

    validate_base_url(base_url)?;

    if api_key.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "api_key".to_string(),
        });
    }

    Ok(())
}

/// Validates a lojista base URL.
pub fn validate_base_url(base_url: &str) -> Result<(), ValidationError> {
    if base_url.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "base_url".to_string(),
        });
    }

    let parsed = Url::parse(base_url).map_err(|e| ValidationError::InvalidFormat {
        field: "base_url".to_string(),
        reason: e.to_string(),
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ValidationError::InvalidFormat {
            field: "base_url".to_string(),
            reason: format!("scheme must be http or https, got '{}'", parsed.scheme()),
        });
    }

    if parsed.host_str().is_none() {
        return Err(ValidationError::InvalidFormat {
            field: "base_url".to_string(),
            reason: "missing host".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Product Snapshot
// =============================================================================

/// Validates a canonical product snapshot before it enters the catalog.
pub fn validate_product(product: &Product) -> Result<(), ValidationError> {
    validate_product_input(
        &product.sku,
        &product.title,
        product.price_cents,
        &product.variations,
    )
}

/// Field-level variant of [`validate_product`], for callers that validate
/// a snapshot before the full entity (id, timestamps) exists.
///
/// ## Rules
/// - sku: required, bounded length (variations too)
/// - title: required
/// - price_cents: never negative (variations too)
pub fn validate_product_input(
    sku: &str,
    title: &str,
    price_cents: i64,
    variations: &[ProductVariation],
) -> Result<(), ValidationError> {
    validate_sku(sku, "sku")?;

    if title.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "title".to_string(),
        });
    }

    if price_cents < 0 {
        return Err(ValidationError::Negative {
            field: "price_cents".to_string(),
        });
    }

    for variation in variations {
        validate_variation(variation)?;
    }

    Ok(())
}

fn validate_variation(variation: &ProductVariation) -> Result<(), ValidationError> {
    validate_sku(&variation.sku, "variation.sku")?;
    if variation.price_cents < 0 {
        return Err(ValidationError::Negative {
            field: "variation.price_cents".to_string(),
        });
    }
    Ok(())
}

fn validate_sku(sku: &str, field: &str) -> Result<(), ValidationError> {
    if sku.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    if sku.len() > MAX_SKU_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_SKU_LEN,
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_product() -> Product {
        Product {
            id: "p-1".to_string(),
            sku: "SHIRT-001".to_string(),
            title: "Linen Shirt".to_string(),
            description: None,
            price_cents: 4990,
            stock: 10,
            variations: vec![],
            images: vec![],
            categories: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_valid_registration() {
        assert!(validate_registration("Loja Centro", "https://loja.example.com", "key-123").is_ok());
    }

    #[test]
    fn test_registration_requires_credential() {
        let err = validate_registration("Loja", "https://loja.example.com", "  ").unwrap_err();
        assert!(matches!(err, ValidationError::Required { ref field } if field == "api_key"));
    }

    #[test]
    fn test_registration_rejects_bad_scheme() {
        let err = validate_registration("Loja", "ftp://loja.example.com", "key").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat { .. }));
    }

    #[test]
    fn test_registration_rejects_unparseable_url() {
        let err = validate_registration("Loja", "not a url", "key").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat { .. }));
    }

    #[test]
    fn test_product_negative_price_rejected() {
        let mut product = sample_product();
        product.price_cents = -1;
        assert!(matches!(
            validate_product(&product).unwrap_err(),
            ValidationError::Negative { .. }
        ));
    }

    #[test]
    fn test_variation_sku_required() {
        let mut product = sample_product();
        product.variations.push(ProductVariation {
            sku: "".to_string(),
            price_cents: 100,
            stock: 1,
            attributes: serde_json::Value::Null,
        });
        assert!(matches!(
            validate_product(&product).unwrap_err(),
            ValidationError::Required { .. }
        ));
    }
}
