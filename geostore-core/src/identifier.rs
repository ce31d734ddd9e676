//! Human-facing identifier generation rules.
//!
//! A rule only produces candidates; uniqueness is decided by the store's
//! unique index when the candidate is inserted.
//!
//! ```rust
//! use chrono::NaiveDate;
//! use geostore_core::identifier::IdentifierRule;
//!
//! let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
//! let rule = IdentifierRule::booking_number(date);
//! assert_eq!(rule.sequence_candidate(7), "BK-20240309-0007");
//!
//! let token = IdentifierRule::professional_booking().random_candidate();
//! assert!(token.starts_with("PROF-"));
//! assert_eq!(token.len(), "PROF-".len() + 8);
//! ```

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

/// Longest random token a v4 UUID can supply (hex digits).
pub const MAX_TOKEN_LENGTH: usize = 32;

/// Widest zero-padding accepted for sequence numbers.
pub const MAX_SEQUENCE_WIDTH: usize = 20;

/// How candidate identifiers are produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IdentifierRule {
    /// `{prefix}-{n}` with `n` zero-padded to `width` digits, increasing per scope.
    Sequence {
        /// Fixed prefix.
        prefix: SmolStr,
        /// Minimum number of digits.
        width: usize,
    },
    /// `{prefix}-{HEX}` with `length` uppercase hex digits from a v4 UUID.
    RandomToken {
        /// Fixed prefix.
        prefix: SmolStr,
        /// Number of hex digits.
        length: usize,
    },
}

impl IdentifierRule {
    /// Sequence rule.
    pub fn sequence(prefix: impl Into<SmolStr>, width: usize) -> Self {
        Self::Sequence {
            prefix: prefix.into(),
            width,
        }
    }

    /// Random token rule.
    pub fn random_token(prefix: impl Into<SmolStr>, length: usize) -> Self {
        Self::RandomToken {
            prefix: prefix.into(),
            length,
        }
    }

    /// Venue booking numbers: `BK-YYYYMMDD-NNNN`, numbered per day.
    pub fn booking_number(date: NaiveDate) -> Self {
        Self::sequence(format!("BK-{}", date.format("%Y%m%d")), 4)
    }

    /// Professional booking numbers: `PROF-XXXXXXXX`.
    pub fn professional_booking() -> Self {
        Self::random_token("PROF", 8)
    }

    /// Check the rule's parameters.
    pub fn validate(&self) -> StoreResult<()> {
        match self {
            Self::Sequence { width, .. } if *width > MAX_SEQUENCE_WIDTH => Err(
                StoreError::invalid_query(format!(
                    "sequence width {} exceeds {}",
                    width, MAX_SEQUENCE_WIDTH
                )),
            ),
            Self::RandomToken { length, .. } if *length == 0 || *length > MAX_TOKEN_LENGTH => {
                Err(StoreError::invalid_query(format!(
                    "token length must be within 1..={}, got {}",
                    MAX_TOKEN_LENGTH, length
                )))
            }
            _ => Ok(()),
        }
    }

    /// Whether candidates come from a per-scope counter.
    pub fn is_sequence(&self) -> bool {
        matches!(self, Self::Sequence { .. })
    }

    /// The rule's prefix.
    pub fn prefix(&self) -> &str {
        match self {
            Self::Sequence { prefix, .. } | Self::RandomToken { prefix, .. } => prefix,
        }
    }

    /// Format the `n`-th sequence identifier.
    ///
    /// Random token rules ignore `n` and draw a fresh token.
    pub fn sequence_candidate(&self, n: u64) -> String {
        match self {
            Self::Sequence { prefix, width } => join(prefix, &format!("{:0width$}", n, width = *width)),
            Self::RandomToken { .. } => self.random_candidate(),
        }
    }

    /// Draw a random candidate.
    ///
    /// Sequence rules fall back to their first value.
    pub fn random_candidate(&self) -> String {
        match self {
            Self::RandomToken { prefix, length } => {
                let hex = Uuid::new_v4().simple().to_string().to_uppercase();
                let length = (*length).clamp(1, MAX_TOKEN_LENGTH);
                join(prefix, &hex[..length])
            }
            Self::Sequence { .. } => self.sequence_candidate(1),
        }
    }
}

fn join(prefix: &str, body: &str) -> String {
    if prefix.is_empty() {
        body.to_string()
    } else {
        format!("{}-{}", prefix, body)
    }
}

/// An identifier confirmed unique by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    /// The identifier text.
    pub value: String,
    /// Sequence number, for sequence rules.
    pub sequence: Option<u64>,
    /// Attempts spent, including the successful one.
    pub attempts: u32,
}

impl Identifier {
    /// The identifier text.
    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_booking_number_format() {
        let date = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
        let rule = IdentifierRule::booking_number(date);
        assert_eq!(rule.prefix(), "BK-20251231");
        assert_eq!(rule.sequence_candidate(1), "BK-20251231-0001");
        assert_eq!(rule.sequence_candidate(12345), "BK-20251231-12345");
        assert!(rule.is_sequence());
    }

    #[test]
    fn test_random_tokens() {
        let rule = IdentifierRule::professional_booking();
        let a = rule.random_candidate();
        let b = rule.random_candidate();
        assert_ne!(a, b);
        let body = a.strip_prefix("PROF-").unwrap();
        assert_eq!(body.len(), 8);
        assert!(body.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_empty_prefix() {
        let rule = IdentifierRule::sequence("", 3);
        assert_eq!(rule.sequence_candidate(5), "005");
    }

    #[test]
    fn test_validate() {
        assert!(IdentifierRule::random_token("X", 0).validate().is_err());
        assert!(IdentifierRule::random_token("X", 33).validate().is_err());
        assert!(IdentifierRule::random_token("X", 32).validate().is_ok());
        assert!(IdentifierRule::sequence("X", 21).validate().is_err());
        assert!(IdentifierRule::professional_booking().validate().is_ok());
    }

    #[test]
    fn test_rule_serde() {
        let rule = IdentifierRule::sequence("BK", 4);
        let json = serde_json::to_string(&rule).unwrap();
        assert_eq!(json, r#"{"kind":"sequence","prefix":"BK","width":4}"#);
        let back: IdentifierRule = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rule);
    }
}
