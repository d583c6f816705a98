//! Fixed-point "exp10" floats: `mantissa: i32` scaled by `10^exponent: i16`

use crate::{Error, Result};

/// Maximum number of decimal scaling steps tried in either direction.
const MAX_STEPS: i16 = 6;

/// Relative tolerance for treating a scaled value as integral.
const EPSILON: f64 = 1e-9;

/// Encodings real files use for NTSC-family rates, keyed by the exact rate.
const PREFERRED: &[(f64, i32, i16)] = &[
    (24000.0 / 1001.0, 23976, -3),
    (30000.0 / 1001.0, 2997, -2),
    (48000.0 / 1001.0, 47952, -3),
    (60000.0 / 1001.0, 5994, -2),
    (120000.0 / 1001.0, 11988, -2),
];

pub fn decode(mantissa: i32, exponent: i16) -> f64 {
    // Dividing keeps e.g. 2997e-2 identical to the literal 29.97.
    if exponent < 0 {
        mantissa as f64 / 10f64.powi(-(exponent as i32))
    } else {
        mantissa as f64 * 10f64.powi(exponent as i32)
    }
}

/// Finds the encoding with the fewest decimal steps that represents `value`.
pub fn encode(value: f64) -> Result<(i32, i16)> {
    if !value.is_finite() {
        return Err(Error::UnencodableFloat(value));
    }
    if value == 0.0 {
        return Ok((0, 0));
    }
    if let Some(&(_, mantissa, exponent)) = PREFERRED
        .iter()
        .find(|(rate, _, _)| (rate - value).abs() <= EPSILON * rate.abs())
    {
        return Ok((mantissa, exponent));
    }

    let limit = i32::MAX as f64;

    // Too large for the mantissa: shift digits into the exponent.
    if value.abs() > limit {
        for exponent in 1..=MAX_STEPS {
            let scaled = value / 10f64.powi(exponent as i32);
            if scaled.abs() <= limit {
                return Ok((scaled.round() as i32, exponent));
            }
        }
        return Err(Error::UnencodableFloat(value));
    }

    let mut best = (value.round() as i32, 0);
    for step in 0..=MAX_STEPS {
        let scaled = value * 10f64.powi(step as i32);
        if scaled.abs() > limit {
            break;
        }
        best = (scaled.round() as i32, -step);
        if (scaled - scaled.round()).abs() <= EPSILON * scaled.abs().max(1.0) {
            break;
        }
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_common_rates() {
        assert_eq!(encode(25.0).unwrap(), (25, 0));
        assert_eq!(encode(24.0).unwrap(), (24, 0));
        assert_eq!(encode(29.97).unwrap(), (2997, -2));
        assert_eq!(encode(59.94).unwrap(), (5994, -2));
        assert_eq!(encode(23.976).unwrap(), (23976, -3));
        assert_eq!(encode(0.0).unwrap(), (0, 0));
        assert_eq!(encode(-12.5).unwrap(), (-125, -1));
    }

    #[test]
    fn test_preferred_table() {
        assert_eq!(encode(30000.0 / 1001.0).unwrap(), (2997, -2));
        assert_eq!(encode(60000.0 / 1001.0).unwrap(), (5994, -2));
        assert_eq!(encode(24000.0 / 1001.0).unwrap(), (23976, -3));
    }

    #[test]
    fn test_decode_law_for_rates() {
        for rate in [23.976, 24.0, 25.0, 29.97, 30.0, 48.0, 50.0, 59.94, 60.0] {
            let (m, e) = encode(rate).unwrap();
            assert!((decode(m, e) - rate).abs() < 1e-9, "rate {rate}");
        }
    }

    #[test]
    fn test_large_values_use_positive_exponent() {
        let (m, e) = encode(48_000_000_000.0).unwrap();
        assert_eq!(e, 2);
        assert_eq!(decode(m, e), 48_000_000_000.0);
    }

    #[test]
    fn test_non_finite_rejected() {
        assert!(encode(f64::NAN).is_err());
        assert!(encode(f64::INFINITY).is_err());
    }

    proptest! {
        #[test]
        fn prop_hundredths_roundtrip(cents in -10_000_000i32..10_000_000) {
            let value = cents as f64 / 100.0;
            let (m, e) = encode(value).unwrap();
            prop_assert!(e >= -2);
            prop_assert!((decode(m, e) - value).abs() < 1e-6);
        }
    }
}
