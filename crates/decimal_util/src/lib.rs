use alloy_primitives::U256;

pub fn pow10(decimals: u8) -> U256 {
    U256::from(10u8).pow(U256::from(decimals))
}

/// Rescales a fixed-point integer between decimal precisions.
///
/// Scaling down floors the value; scaling up saturates instead of wrapping.
pub fn adjust_decimals(value: U256, from: u8, to: u8) -> U256 {
    if from > to {
        value / pow10(from - to)
    } else {
        value.saturating_mul(pow10(to - from))
    }
}

/// Renders a fixed-point integer as a human-readable decimal string.
///
/// The fractional part is truncated to `max_dp` places (round down) and
/// trailing zeros are trimmed.
pub fn to_decimal_string(value: U256, decimals: u8, max_dp: usize) -> String {
    let base = pow10(decimals);
    let whole = value / base;
    let frac = value % base;

    if frac.is_zero() || max_dp == 0 {
        return whole.to_string();
    }

    let mut frac_str = format!("{:0>width$}", frac.to_string(), width = decimals as usize);
    frac_str.truncate(max_dp);
    let frac_str = frac_str.trim_end_matches('0');

    if frac_str.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{frac_str}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u(v: u128) -> U256 {
        U256::from(v)
    }

    #[test]
    fn test_adjust_decimals_up() {
        assert_eq!(adjust_decimals(u(100_000_000), 6, 18), u(100_000_000_000_000_000_000));
    }

    #[test]
    fn test_adjust_decimals_down_floors() {
        // 1.999999 at 6 decimals down to 0 decimals floors to 1
        assert_eq!(adjust_decimals(u(1_999_999), 6, 0), u(1));
        assert_eq!(adjust_decimals(u(123_456_789), 8, 4), u(12_345));
    }

    #[test]
    fn test_adjust_decimals_identity() {
        assert_eq!(adjust_decimals(u(42), 9, 9), u(42));
    }

    #[test]
    fn test_to_decimal_string_pads_leading_zeros() {
        assert_eq!(to_decimal_string(u(1_050_000), 6, 6), "1.05");
        assert_eq!(to_decimal_string(u(1), 18, 18), "0.000000000000000001");
    }

    #[test]
    fn test_to_decimal_string_truncates_round_down() {
        // 1.999 truncated to 2 places, not rounded to 2.00
        assert_eq!(to_decimal_string(u(1_999), 3, 2), "1.99");
    }

    #[test]
    fn test_to_decimal_string_whole_values() {
        assert_eq!(to_decimal_string(u(5_000_000), 6, 6), "5");
        assert_eq!(to_decimal_string(U256::ZERO, 18, 4), "0");
    }
}
