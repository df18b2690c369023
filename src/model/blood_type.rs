use crate::error::{BankError, BankResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

/// Sentinel label that legacy rows with a blank blood type are filed under.
pub const UNKNOWN_LABEL: &str = "UNKNOWN";

static STANDARD_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(A|B|AB|O)[+-]$").expect("valid ABO/Rh pattern"));

/// Identifier of a row in `blood_types`; assigned once, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BloodTypeRef(pub i64);

impl BloodTypeRef {
    pub fn id(self) -> i64 {
        self.0
    }
}

impl fmt::Display for BloodTypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Trim and upper-case a raw label. May return an empty string.
pub fn normalize_label(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// A canonical, non-empty blood-type label such as `O+` or `AB-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BloodTypeLabel(String);

impl BloodTypeLabel {
    /// Normalize `raw`, rejecting labels that are blank after trimming.
    pub fn parse(raw: &str) -> BankResult<Self> {
        let label = normalize_label(raw);
        if label.is_empty() {
            return Err(BankError::invalid("blood type is required"));
        }
        Ok(Self(label))
    }

    pub fn unknown() -> Self {
        Self(UNKNOWN_LABEL.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// One of the eight ABO/Rh groups.
    pub fn is_standard(&self) -> bool {
        STANDARD_LABEL.is_match(&self.0)
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_LABEL
    }

    /// Wrap a label read back from `blood_types`, which is already canonical.
    pub(crate) fn from_stored(label: String) -> Self {
        Self(label)
    }
}

impl fmt::Display for BloodTypeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BloodTypeLabel {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_and_uppercases() {
        let label = BloodTypeLabel::parse("  ab- ").expect("valid");
        assert_eq!(label.as_str(), "AB-");
        assert!(label.is_standard());
    }

    #[test]
    fn test_parse_rejects_blank() {
        assert!(matches!(
            BloodTypeLabel::parse("   "),
            Err(BankError::InvalidArgument(_))
        ));
        assert!(BloodTypeLabel::parse("").is_err());
    }

    #[test]
    fn test_non_standard_labels_are_kept() {
        let label = BloodTypeLabel::parse("o positive").expect("valid");
        assert_eq!(label.as_str(), "O POSITIVE");
        assert!(!label.is_standard());
    }

    #[test]
    fn test_standard_groups() {
        for raw in ["A+", "A-", "B+", "B-", "AB+", "AB-", "O+", "O-"] {
            assert!(BloodTypeLabel::parse(raw).expect("valid").is_standard(), "{raw}");
        }
        assert!(!BloodTypeLabel::parse("C+").expect("valid").is_standard());
        assert!(!BloodTypeLabel::unknown().is_standard());
        assert!(BloodTypeLabel::unknown().is_unknown());
    }
}
