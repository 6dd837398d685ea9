//! Fixed-Point Scaling
//!
//! power.trade publishes prices and quantities as fixed-point integers. Each
//! tradeable entity has a pair of power-of-ten divisors that rescale them to
//! human-scaled decimals.

use std::str::FromStr;

use rust_decimal::Decimal;

use super::streaming::ABSENT_VALUE;

/// Largest exponent accepted for a scale factor (`10^18` fits in `u64`).
pub const MAX_EXPONENT: u32 = 18;

/// Power-of-ten price and quantity divisors for one tradeable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScaleFactors {
    price_exponent: u32,
    quantity_exponent: u32,
}

impl Default for ScaleFactors {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl ScaleFactors {
    /// No rescaling: `(1, 1)`.
    pub const IDENTITY: Self = Self {
        price_exponent: 0,
        quantity_exponent: 0,
    };

    /// Build factors from decimal exponents.
    ///
    /// # Errors
    ///
    /// Returns [`ScaleError::ExponentOutOfRange`] if either exponent exceeds
    /// [`MAX_EXPONENT`].
    pub const fn from_exponents(
        price_exponent: u32,
        quantity_exponent: u32,
    ) -> Result<Self, ScaleError> {
        if price_exponent > MAX_EXPONENT {
            return Err(ScaleError::ExponentOutOfRange(price_exponent));
        }
        if quantity_exponent > MAX_EXPONENT {
            return Err(ScaleError::ExponentOutOfRange(quantity_exponent));
        }
        Ok(Self {
            price_exponent,
            quantity_exponent,
        })
    }

    /// Price divisor, `10^price_exponent`.
    #[must_use]
    pub const fn price_scale(self) -> u64 {
        10_u64.pow(self.price_exponent)
    }

    /// Quantity divisor, `10^quantity_exponent`.
    #[must_use]
    pub const fn quantity_scale(self) -> u64 {
        10_u64.pow(self.quantity_exponent)
    }

    /// `(price_scale, quantity_scale)`.
    #[must_use]
    pub const fn as_pair(self) -> (u64, u64) {
        (self.price_scale(), self.quantity_scale())
    }

    /// Rescale a raw price string.
    ///
    /// # Errors
    ///
    /// See [`rescale`].
    pub fn convert_price(self, raw: &str) -> Result<Decimal, ScaleError> {
        rescale(raw, self.price_scale())
    }

    /// Rescale a raw quantity string.
    ///
    /// # Errors
    ///
    /// See [`rescale`].
    pub fn convert_quantity(self, raw: &str) -> Result<Decimal, ScaleError> {
        rescale(raw, self.quantity_scale())
    }
}

/// Convert a raw fixed-point string to a decimal by dividing by `scale`.
///
/// The absent-value sentinel converts to zero without any division.
///
/// # Errors
///
/// Returns [`ScaleError::NotNumeric`] if `raw` is neither the sentinel nor a
/// decimal number, and [`ScaleError::Overflow`] if the division cannot be
/// represented.
pub fn rescale(raw: &str, scale: u64) -> Result<Decimal, ScaleError> {
    if raw == ABSENT_VALUE {
        return Ok(Decimal::ZERO);
    }

    let value = parse_decimal(raw)?;
    value
        .checked_div(Decimal::from(scale))
        .ok_or_else(|| ScaleError::Overflow {
            value: raw.to_string(),
            scale,
        })
}

fn parse_decimal(raw: &str) -> Result<Decimal, ScaleError> {
    let trimmed = raw.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| ScaleError::NotNumeric(raw.to_string()))
}

/// Scaling errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScaleError {
    /// Exponent too large for a `u64` divisor.
    #[error("scale exponent {0} exceeds maximum of {MAX_EXPONENT}")]
    ExponentOutOfRange(u32),

    /// Raw value is not a number.
    #[error("not a numeric value: {0:?}")]
    NotNumeric(String),

    /// Division result not representable.
    #[error("cannot rescale {value} by {scale}")]
    Overflow {
        /// Raw value.
        value: String,
        /// Divisor.
        scale: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test]
    fn identity_is_one_one() {
        assert_eq!(ScaleFactors::IDENTITY.as_pair(), (1, 1));
        assert_eq!(ScaleFactors::default(), ScaleFactors::IDENTITY);
    }

    #[test]
    fn exponents_become_powers_of_ten() {
        let factors = ScaleFactors::from_exponents(1, 2).unwrap();
        assert_eq!(factors.as_pair(), (10, 100));

        let max = ScaleFactors::from_exponents(MAX_EXPONENT, 0).unwrap();
        assert_eq!(max.price_scale(), 1_000_000_000_000_000_000);
    }

    #[test]
    fn exponent_out_of_range_rejected() {
        assert_eq!(
            ScaleFactors::from_exponents(19, 0),
            Err(ScaleError::ExponentOutOfRange(19))
        );
        assert_eq!(
            ScaleFactors::from_exponents(0, 40),
            Err(ScaleError::ExponentOutOfRange(40))
        );
    }

    #[test_case("10", 10 => Decimal::new(1, 0) ; "price by ten")]
    #[test_case("1", 100 => Decimal::new(1, 2) ; "quantity by hundred")]
    #[test_case("none", 100 => Decimal::ZERO ; "absent value")]
    #[test_case(" 2500 ", 1000 => Decimal::new(25, 1) ; "surrounding whitespace")]
    #[test_case("1e3", 10 => Decimal::new(100, 0) ; "scientific notation")]
    #[test_case("-15", 10 => Decimal::new(-15, 1) ; "negative value")]
    #[test_case("12.5", 1 => Decimal::new(125, 1) ; "identity scale")]
    fn rescale_values(raw: &str, scale: u64) -> Decimal {
        rescale(raw, scale).unwrap()
    }

    #[test_case("abc" ; "letters")]
    #[test_case("" ; "empty")]
    #[test_case("None" ; "sentinel is case sensitive")]
    #[test_case("1,000" ; "thousands separator")]
    fn rescale_rejects_non_numeric(raw: &str) {
        assert_eq!(
            rescale(raw, 10),
            Err(ScaleError::NotNumeric(raw.to_string()))
        );
    }

    #[test]
    fn convert_uses_matching_scale() {
        let factors = ScaleFactors::from_exponents(1, 2).unwrap();
        assert_eq!(factors.convert_price("10").unwrap(), Decimal::new(1, 0));
        assert_eq!(factors.convert_quantity("1").unwrap(), Decimal::new(1, 2));
    }

    proptest! {
        #[test]
        fn rescale_shifts_decimal_point(raw in 0_u64..=u64::MAX, exponent in 0_u32..=MAX_EXPONENT) {
            let factors = ScaleFactors::from_exponents(exponent, exponent).unwrap();
            let converted = factors.convert_price(&raw.to_string()).unwrap();
            prop_assert_eq!(converted, Decimal::from_i128_with_scale(i128::from(raw), exponent));
        }
    }
}
