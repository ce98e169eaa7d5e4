// src/matching/pair_key.rs
//
// Canonical supplier identifiers and the composite join key built from them.
use std::fmt;

use crate::errors::IdentifierError;

/// Anything that can stand in for a supplier identifier. Every representation
/// of the same integer ("1", "1.0", 1, 1.0) canonicalizes to the same string.
/// `Ok(None)` means the identifier is absent and the row can never join.
pub trait SupplierIdentifier {
    fn canonical(&self) -> Result<Option<String>, IdentifierError>;
}

impl SupplierIdentifier for str {
    fn canonical(&self) -> Result<Option<String>, IdentifierError> {
        normalize_supplier_key(self)
    }
}

impl SupplierIdentifier for String {
    fn canonical(&self) -> Result<Option<String>, IdentifierError> {
        normalize_supplier_key(self)
    }
}

impl SupplierIdentifier for i64 {
    fn canonical(&self) -> Result<Option<String>, IdentifierError> {
        Ok(Some(self.to_string()))
    }
}

impl SupplierIdentifier for u64 {
    fn canonical(&self) -> Result<Option<String>, IdentifierError> {
        Ok(Some(self.to_string()))
    }
}

impl SupplierIdentifier for f64 {
    fn canonical(&self) -> Result<Option<String>, IdentifierError> {
        if self.is_nan() {
            return Ok(None);
        }
        float_to_canonical(*self, &self.to_string()).map(Some)
    }
}

/// Blank and NaN keys are absent; anything else must be integer-valued.
pub fn normalize_supplier_key(raw: &str) -> Result<Option<String>, IdentifierError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    if let Ok(value) = trimmed.parse::<i64>() {
        return Ok(Some(value.to_string()));
    }
    match trimmed.parse::<f64>() {
        Ok(value) => float_to_canonical(value, raw).map(Some),
        Err(_) => Err(IdentifierError::NotNumeric {
            raw: raw.to_string(),
        }),
    }
}

fn float_to_canonical(value: f64, raw: &str) -> Result<String, IdentifierError> {
    if !value.is_finite() {
        return Err(IdentifierError::NotNumeric {
            raw: raw.to_string(),
        });
    }
    if value.fract() != 0.0 || value.abs() >= i64::MAX as f64 {
        return Err(IdentifierError::NotIntegral {
            raw: raw.to_string(),
        });
    }
    Ok((value as i64).to_string())
}

/// Registration numbers are compared numerically when they look numeric,
/// otherwise as trimmed upper-case text ("sc123456" == "SC123456").
pub fn normalize_registration_number(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return None;
    }
    match normalize_supplier_key(trimmed) {
        Ok(Some(canonical)) => Some(canonical),
        _ => Some(trimmed.to_uppercase()),
    }
}

/// `<canonical supplier key>+<lowercased counterparty name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey(String);

impl PairKey {
    pub fn new(canonical_key: &str, counterparty_name: &str) -> Self {
        PairKey(format!("{}+{}", canonical_key, counterparty_name.to_lowercase()))
    }

    /// Normalizes the raw identifier first. Absent identifiers yield no key.
    pub fn from_raw<I: SupplierIdentifier + ?Sized>(
        identifier: &I,
        counterparty_name: &str,
    ) -> Result<Option<Self>, IdentifierError> {
        Ok(identifier
            .canonical()?
            .map(|key| PairKey::new(&key, counterparty_name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_representations_agree() {
        let expected = Some("1".to_string());
        assert_eq!(1i64.canonical().unwrap(), expected);
        assert_eq!("1".canonical().unwrap(), expected);
        assert_eq!("1.0".canonical().unwrap(), expected);
        assert_eq!(1.0f64.canonical().unwrap(), expected);
        assert_eq!(" 1 ".to_string().canonical().unwrap(), expected);
    }

    #[test]
    fn test_pair_keys_join_across_representations() {
        let from_int = PairKey::from_raw(&1i64, "Cabinet Office").unwrap();
        let from_float_text = PairKey::from_raw("1.0", "CABINET OFFICE").unwrap();
        let from_float = PairKey::from_raw(&1.0f64, "cabinet office").unwrap();
        assert_eq!(from_int, from_float_text);
        assert_eq!(from_int, from_float);
        assert_eq!(from_int.unwrap().as_str(), "1+cabinet office");
    }

    #[test]
    fn test_absent_identifiers() {
        assert_eq!(normalize_supplier_key("").unwrap(), None);
        assert_eq!(normalize_supplier_key("   ").unwrap(), None);
        assert_eq!(normalize_supplier_key("NaN").unwrap(), None);
        assert_eq!(f64::NAN.canonical().unwrap(), None);
        assert_eq!(PairKey::from_raw("", "Home Office").unwrap(), None);
    }

    #[test]
    fn test_bad_identifiers_fail_loudly() {
        assert_eq!(
            normalize_supplier_key("ABC-1"),
            Err(IdentifierError::NotNumeric {
                raw: "ABC-1".to_string()
            })
        );
        assert_eq!(
            normalize_supplier_key("3.5"),
            Err(IdentifierError::NotIntegral {
                raw: "3.5".to_string()
            })
        );
        assert!(normalize_supplier_key("inf").is_err());
    }

    #[test]
    fn test_registration_number_normalization() {
        assert_eq!(normalize_registration_number("01234567"), Some("1234567".into()));
        assert_eq!(normalize_registration_number("1234567.0"), Some("1234567".into()));
        assert_eq!(normalize_registration_number(" sc123456 "), Some("SC123456".into()));
        assert_eq!(normalize_registration_number(""), None);
    }
}
