//! Order number generation for Mokkalab orders.
//!
//! Order numbers are human-readable and date-based so support staff can
//! eyeball when an order was placed: `ML<YYMMDD>-<4 random base36 chars>`,
//! e.g. `ML250614-K8Z0`. Uniqueness is ultimately enforced by the database;
//! the random suffix only has to make collisions rare, not impossible.

use chrono::{DateTime, Utc};
use rand::Rng;

/// Brand prefix carried by every order number.
pub const ORDER_NUMBER_PREFIX: &str = "ML";

const BASE36: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Source of randomness for order-number suffixes, referral codes and
/// reward product selection.
///
/// Injected instead of calling the global RNG directly so tests can pin
/// the generated values.
pub trait RandomSource: Send + Sync {
    /// Returns `len` uppercase base36 characters (A-Z, 0-9).
    fn base36(&self, len: usize) -> String;

    /// Returns an index in `0..len`. `len` must be non-zero.
    fn pick_index(&self, len: usize) -> usize;
}

/// Production randomness backed by the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngSource;

impl RandomSource for ThreadRngSource {
    fn base36(&self, len: usize) -> String {
        let mut rng = rand::thread_rng();
        (0..len)
            .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
            .collect()
    }

    fn pick_index(&self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len)
    }
}

/// Generate an order number for the given point in time.
pub fn generate_order_number(at: DateTime<Utc>, rng: &dyn RandomSource) -> String {
    format!(
        "{}{}-{}",
        ORDER_NUMBER_PREFIX,
        at.format("%y%m%d"),
        rng.base36(4)
    )
}

/// Cheap format check used to reject garbage before hitting the database.
///
/// Validates `ML` + 6 digits + `-` + 4 base36 characters.
pub fn is_valid_order_number(s: &str) -> bool {
    let Some(rest) = s.strip_prefix(ORDER_NUMBER_PREFIX) else {
        return false;
    };
    let mut parts = rest.splitn(2, '-');
    let (Some(date), Some(suffix)) = (parts.next(), parts.next()) else {
        return false;
    };
    date.len() == 6
        && date.chars().all(|c| c.is_ascii_digit())
        && suffix.len() == 4
        && suffix
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct FixedSource(&'static str);

    impl RandomSource for FixedSource {
        fn base36(&self, len: usize) -> String {
            self.0.chars().take(len).collect()
        }

        fn pick_index(&self, _len: usize) -> usize {
            0
        }
    }

    #[test]
    fn test_order_number_format() {
        let at = Utc.with_ymd_and_hms(2025, 6, 14, 9, 30, 0).unwrap();
        let number = generate_order_number(at, &FixedSource("K8Z0"));
        assert_eq!(number, "ML250614-K8Z0");
    }

    #[test]
    fn test_generated_numbers_are_valid() {
        let number = generate_order_number(Utc::now(), &ThreadRngSource);
        assert!(is_valid_order_number(&number), "got: {}", number);
        assert_eq!(number.len(), 13);
    }

    #[test]
    fn test_suffix_charset_is_base36() {
        for _ in 0..200 {
            let number = generate_order_number(Utc::now(), &ThreadRngSource);
            let suffix = number.rsplit('-').next().unwrap();
            assert!(suffix
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn test_is_valid_order_number() {
        assert!(is_valid_order_number("ML250614-K8Z0"));
        assert!(is_valid_order_number("ML991231-0000"));

        assert!(!is_valid_order_number(""));
        assert!(!is_valid_order_number("ML250614K8Z0")); // missing dash
        assert!(!is_valid_order_number("XX250614-K8Z0")); // wrong prefix
        assert!(!is_valid_order_number("ML2506-K8Z0")); // short date
        assert!(!is_valid_order_number("ML250614-K8Z")); // short suffix
        assert!(!is_valid_order_number("ML250614-k8z0")); // lowercase suffix
        assert!(!is_valid_order_number("ML25A614-K8Z0")); // non-digit date
    }
}
