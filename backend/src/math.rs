//! Rounding helpers. Half-way cases round away from zero everywhere so that
//! labels and values agree with what the dashboard has always displayed.

use rust_decimal::{Decimal, RoundingStrategy};

/// Round to `places` decimal places
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

pub fn round_dec(value: Decimal, places: u32) -> Decimal {
    value.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// `1234567` → `"1,234,567"`
pub fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        grouped.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.046, 2), 1.05);
        assert_eq!(round_to(60.335, 1), 60.3);
        assert_eq!(round_to(-12.35, 0), -12.0);
    }

    #[test]
    fn test_round_dec_half_away_from_zero() {
        assert_eq!(round_dec(dec!(3.125), 2), dec!(3.13));
        assert_eq!(round_dec(dec!(-0.285), 2), dec!(-0.29));
        assert_eq!(round_dec(dec!(2.5), 0), dec!(3));
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(65188), "65,188");
        assert_eq!(group_thousands(-184616), "-184,616");
        assert_eq!(group_thousands(1234567), "1,234,567");
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[1.0, 2.0, 6.0]), 3.0);
    }
}
