//! Row normalizer
//!
//! Canonicalizes the raw cell values that arrive in every imaginable
//! format: phone numbers with country codes and punctuation, TPS numbers
//! without their leading zeros, NIKs pasted with spaces. All failures are
//! returned as values and collected per row, never thrown.

use crate::types::{Field, ImportError, TpsPolicy};

/// Accepted length range for a normalized phone number, digits including
/// the leading `08`.
const PHONE_MIN_DIGITS: usize = 10;
const PHONE_MAX_DIGITS: usize = 13;

/// Sentinel stored when a coordinator sheet leaves TPS empty.
pub const TPS_SENTINEL: &str = "000";

/// Normalize an Indonesian mobile number to the local `08…` form.
///
/// Strips everything that is not a digit, then rewrites the `62` country
/// prefix (with or without `+`) to the `0` trunk prefix, and prepends `0`
/// to numbers written bare as `8…`. Idempotent on its own output.
pub fn normalize_phone(raw: &str) -> Result<String, ImportError> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    let local = if let Some(rest) = digits.strip_prefix("62") {
        format!("0{rest}")
    } else if digits.starts_with('8') {
        format!("0{digits}")
    } else {
        digits
    };

    if !local.starts_with("08")
        || local.len() < PHONE_MIN_DIGITS
        || local.len() > PHONE_MAX_DIGITS
    {
        return Err(ImportError::InvalidPhone {
            value: raw.trim().to_string(),
        });
    }

    Ok(local)
}

/// Normalize a TPS (polling station) number: left-pad to 3 digits.
///
/// An empty cell defaults to [`TPS_SENTINEL`] or rejects the row,
/// depending on the import variant.
pub fn normalize_tps(raw: &str, policy: TpsPolicy) -> Result<String, ImportError> {
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return match policy {
            TpsPolicy::DefaultSentinel => Ok(TPS_SENTINEL.to_string()),
            TpsPolicy::Required => Err(ImportError::MissingField {
                label: Field::Tps.label(),
            }),
        };
    }

    if !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(ImportError::FieldValidationFailed {
            message: format!("TPS harus berupa angka: '{trimmed}'"),
        });
    }

    Ok(format!("{trimmed:0>3}"))
}

/// Validate a NIK: exactly 16 digits, no other transformation.
pub fn validate_nik(raw: &str) -> Result<String, ImportError> {
    let trimmed = raw.trim();

    if trimmed.len() == 16 && trimmed.chars().all(|c| c.is_ascii_digit()) {
        Ok(trimmed.to_string())
    } else {
        Err(ImportError::InvalidNationalId {
            value: trimmed.to_string(),
        })
    }
}
