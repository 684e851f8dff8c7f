//! Conversion between whole-token amounts and base units

/// Whole tokens to base units, truncating toward zero.
///
/// Never rounds up, so a request can't exceed the balance it was sized from.
/// Non-finite or non-positive amounts give zero.
pub fn to_base_units(amount: f64, decimals: u8) -> u64 {
    if !amount.is_finite() || amount <= 0.0 {
        return 0;
    }
    let scaled = (amount * 10f64.powi(decimals as i32)).floor();
    if scaled >= u64::MAX as f64 {
        u64::MAX
    } else {
        scaled as u64
    }
}

/// Base units to whole tokens
pub fn from_base_units(amount: u64, decimals: u8) -> f64 {
    amount as f64 / 10f64.powi(decimals as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncates_instead_of_rounding() {
        assert_eq!(to_base_units(1.999_999_9, 6), 1_999_999);
        assert_eq!(to_base_units(60.0, 6), 60_000_000);
        assert_eq!(to_base_units(0.000_000_9, 6), 0);
        assert_eq!(to_base_units(2.5, 0), 2);
    }

    #[test]
    fn test_rejects_invalid_amounts() {
        assert_eq!(to_base_units(0.0, 9), 0);
        assert_eq!(to_base_units(-3.0, 9), 0);
        assert_eq!(to_base_units(f64::NAN, 9), 0);
        assert_eq!(to_base_units(f64::INFINITY, 9), 0);
    }

    #[test]
    fn test_from_base_units() {
        assert_eq!(from_base_units(1_500_000, 6), 1.5);
        assert_eq!(from_base_units(7, 0), 7.0);
    }
}
