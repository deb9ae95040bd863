//! Identifier generation: ICCID and MSISDN candidates.
//!
//! This module owns *generation* only. Store-wide uniqueness is enforced by
//! the store's unique constraints at insert time, never by an in-process
//! cache, because allocation may be called from multiple concurrent
//! importers. The bounded insert-and-retry loop lives in
//! [`crate::lifecycle::LifecycleManager::create`], where the transaction is.
//!
//! The Luhn checksum is a format invariant of every stored ICCID, not just a
//! generation convenience: direct input paths (import) re-check it via
//! [`IdentifierAllocator::validate_iccid`].

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::{IdentifierKind, Result, SimError};

/// Default bound on insert attempts per allocated identifier.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;

/// Verify a full digit string against the Luhn checksum.
///
/// Walking from the rightmost digit, every second digit is doubled (with
/// digits of the doubled value summed); the grand total must be divisible
/// by 10. Non-digit or empty input is simply invalid.
#[must_use]
pub fn is_luhn_valid(digits: &str) -> bool {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let mut total = 0u32;
    for (i, b) in digits.bytes().rev().enumerate() {
        let d = u32::from(b - b'0');
        total += if i % 2 == 1 {
            let doubled = d * 2;
            if doubled > 9 { doubled - 9 } else { doubled }
        } else {
            d
        };
    }
    total % 10 == 0
}

/// Compute the check digit that makes `payload` + digit pass
/// [`is_luhn_valid`].
///
/// Returns `None` for empty or non-digit input.
#[must_use]
pub fn luhn_check_digit(payload: &str) -> Option<u8> {
    if payload.is_empty() || !payload.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut total = 0u32;
    for (i, b) in payload.bytes().rev().enumerate() {
        let d = u32::from(b - b'0');
        // Once the check digit is appended, these positions shift by one,
        // so the parity here is the inverse of the validation parity.
        total += if i % 2 == 0 {
            let doubled = d * 2;
            if doubled > 9 { doubled - 9 } else { doubled }
        } else {
            d
        };
    }
    u8::try_from((10 - (total % 10)) % 10).ok()
}

/// ICCID shape: fixed prefix, operator code, random fill, Luhn check digit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IccidConfig {
    /// Major industry identifier plus country code ("89" + "385").
    pub prefix: String,
    /// Operator codes to pick from (HT=01, A1=10, Telemach=02).
    pub operator_codes: Vec<String>,
    /// Total length including the check digit.
    pub length: usize,
}

impl Default for IccidConfig {
    fn default() -> Self {
        Self {
            prefix: "89385".to_string(),
            operator_codes: vec!["01".to_string(), "10".to_string(), "02".to_string()],
            length: 19,
        }
    }
}

/// MSISDN shape: country calling code, mobile prefix, random subscriber part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsisdnConfig {
    /// E.164 country calling code, including the leading `+`.
    pub country_code: String,
    /// Valid mobile prefixes to pick from.
    pub prefixes: Vec<String>,
    /// Number of random subscriber digits after the prefix.
    pub subscriber_digits: usize,
}

impl Default for MsisdnConfig {
    fn default() -> Self {
        Self {
            country_code: "+385".to_string(),
            prefixes: vec![
                "91".to_string(),
                "92".to_string(),
                "95".to_string(),
                "97".to_string(),
                "98".to_string(),
                "99".to_string(),
            ],
            subscriber_digits: 7,
        }
    }
}

/// Identifier candidate generator and format validator.
///
/// # Examples
///
/// ```
/// use simtrack_core::allocator::{IdentifierAllocator, is_luhn_valid};
///
/// let allocator = IdentifierAllocator::default();
/// let iccid = allocator.generate_iccid(&mut rand::thread_rng()).unwrap();
/// assert_eq!(iccid.len(), 19);
/// assert!(is_luhn_valid(&iccid));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierAllocator {
    /// ICCID shape.
    pub iccid: IccidConfig,
    /// MSISDN shape.
    pub msisdn: MsisdnConfig,
    /// Bound on insert attempts per allocated identifier; exceeding it is
    /// [`SimError::IdentifierSpaceExhausted`].
    pub max_attempts: u32,
}

impl Default for IdentifierAllocator {
    fn default() -> Self {
        Self {
            iccid: IccidConfig::default(),
            msisdn: MsisdnConfig::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl IdentifierAllocator {
    /// Override the ICCID shape.
    #[must_use]
    pub fn with_iccid(mut self, config: IccidConfig) -> Self {
        self.iccid = config;
        self
    }

    /// Override the MSISDN shape.
    #[must_use]
    pub fn with_msisdn(mut self, config: MsisdnConfig) -> Self {
        self.msisdn = config;
        self
    }

    /// Override the insert attempt bound.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Generate one ICCID candidate: prefix + operator code + random fill +
    /// Luhn check digit.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidIdentifier`] if the configured prefix or
    /// operator codes contain non-digit characters, which would make the
    /// checksum undefined.
    pub fn generate_iccid(&self, rng: &mut impl Rng) -> Result<String> {
        let operator = self
            .iccid
            .operator_codes
            .choose(rng)
            .map(String::as_str)
            .unwrap_or_default();
        let base = format!("{}{operator}", self.iccid.prefix);
        let fill = self.iccid.length.saturating_sub(base.len() + 1);
        let mut payload = base;
        payload.reserve(fill);
        for _ in 0..fill {
            payload.push(char::from(b'0' + rng.gen_range(0..10u8)));
        }
        let check = luhn_check_digit(&payload).ok_or_else(|| SimError::InvalidIdentifier {
            kind: IdentifierKind::Iccid,
            value: payload.clone(),
            reason: "configured prefix must be all digits".to_string(),
        })?;
        payload.push(char::from(b'0' + check));
        Ok(payload)
    }

    /// Generate one MSISDN candidate: country code + mobile prefix + random
    /// subscriber digits.
    pub fn generate_msisdn(&self, rng: &mut impl Rng) -> String {
        let prefix = self
            .msisdn
            .prefixes
            .choose(rng)
            .map(String::as_str)
            .unwrap_or_default();
        let mut out = format!("{}{prefix}", self.msisdn.country_code);
        for _ in 0..self.msisdn.subscriber_digits {
            out.push(char::from(b'0' + rng.gen_range(0..10u8)));
        }
        out
    }

    /// Validate an externally supplied ICCID: all digits, configured length,
    /// Luhn-valid.
    ///
    /// Prefix is deliberately not checked: imported inventory may come from
    /// another issuer.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidIdentifier`] describing the first failed
    /// check.
    pub fn validate_iccid(&self, iccid: &str) -> Result<()> {
        let reject = |reason: &str| SimError::InvalidIdentifier {
            kind: IdentifierKind::Iccid,
            value: iccid.to_string(),
            reason: reason.to_string(),
        };
        if !iccid.bytes().all(|b| b.is_ascii_digit()) || iccid.is_empty() {
            return Err(reject("must be all digits"));
        }
        if iccid.len() != self.iccid.length {
            return Err(reject("wrong length"));
        }
        if !is_luhn_valid(iccid) {
            return Err(reject("checksum mismatch"));
        }
        Ok(())
    }

    /// Validate an externally supplied MSISDN: `+` followed by 8 to 15
    /// digits (E.164 shape).
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidIdentifier`] describing the first failed
    /// check.
    pub fn validate_msisdn(&self, msisdn: &str) -> Result<()> {
        let reject = |reason: &str| SimError::InvalidIdentifier {
            kind: IdentifierKind::Msisdn,
            value: msisdn.to_string(),
            reason: reason.to_string(),
        };
        let Some(digits) = msisdn.strip_prefix('+') else {
            return Err(reject("must start with '+'"));
        };
        if !digits.bytes().all(|b| b.is_ascii_digit()) || digits.is_empty() {
            return Err(reject("must be '+' followed by digits"));
        }
        if !(8..=15).contains(&digits.len()) {
            return Err(reject("must contain 8 to 15 digits"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn luhn_accepts_known_valid_number() {
        assert!(is_luhn_valid("79927398713"));
        assert!(!is_luhn_valid("79927398714"));
        assert!(!is_luhn_valid(""));
        assert!(!is_luhn_valid("79x27398713"));
    }

    #[test]
    fn check_digit_matches_known_value() {
        assert_eq!(luhn_check_digit("7992739871"), Some(3));
        assert_eq!(luhn_check_digit(""), None);
        assert_eq!(luhn_check_digit("12a4"), None);
    }

    #[test]
    fn generated_iccid_has_configured_shape() {
        let allocator = IdentifierAllocator::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let iccid = allocator.generate_iccid(&mut rng).unwrap();
            assert_eq!(iccid.len(), 19);
            assert!(iccid.starts_with("89385"));
            assert!(is_luhn_valid(&iccid));
            allocator.validate_iccid(&iccid).unwrap();
        }
    }

    #[test]
    fn generated_msisdn_has_configured_shape() {
        let allocator = IdentifierAllocator::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let msisdn = allocator.generate_msisdn(&mut rng);
            assert!(msisdn.starts_with("+385"));
            assert_eq!(msisdn.len(), "+385".len() + 2 + 7);
            allocator.validate_msisdn(&msisdn).unwrap();
        }
    }

    #[test]
    fn validation_rejects_malformed_input() {
        let allocator = IdentifierAllocator::default();
        // wrong length
        assert!(allocator.validate_iccid("8938501123").is_err());
        // right length, broken checksum
        let mut rng = StdRng::seed_from_u64(1);
        let mut iccid = allocator.generate_iccid(&mut rng).unwrap();
        let last = iccid.pop().unwrap();
        let flipped = char::from_digit((last.to_digit(10).unwrap() + 1) % 10, 10).unwrap();
        iccid.push(flipped);
        assert!(matches!(
            allocator.validate_iccid(&iccid),
            Err(SimError::InvalidIdentifier {
                kind: IdentifierKind::Iccid,
                ..
            })
        ));
        // msisdn shapes
        assert!(allocator.validate_msisdn("385911234567").is_err());
        assert!(allocator.validate_msisdn("+385 91 123").is_err());
        assert!(allocator.validate_msisdn("+1234567").is_err());
    }

    proptest! {
        #[test]
        fn check_digit_always_completes_a_valid_number(payload in "[0-9]{5,30}") {
            let digit = luhn_check_digit(&payload).unwrap();
            prop_assert!(digit < 10);
            let full = format!("{}{}", payload, digit);
            prop_assert!(is_luhn_valid(&full));
        }
    }
}
