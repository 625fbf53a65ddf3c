//! Rupee rendering for reports and ticket narratives. Indian digit grouping
//! keeps the last three digits together and groups by two after that, so
//! 1234567.89 renders as ₹12,34,567.89. Evidence values stay plain decimals;
//! formatting is presentation only.

use rust_decimal::Decimal;

const RUPEE: &str = "\u{20b9}";

/// Full amount with Indian grouping and exactly two decimal places.
pub fn format_inr(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    let (int_part, frac_part) = split_two_decimals(rounded.abs());
    format!("{sign}{RUPEE}{}.{frac_part}", group_indian(&int_part))
}

/// Compact form for headlines: thousands as `K`, lakhs as `L`, crores as `Cr`.
pub fn format_inr_compact(amount: Decimal) -> String {
    let unsigned = amount.abs();
    let sign = if amount.is_sign_negative() && !amount.is_zero() { "-" } else { "" };

    let crore = Decimal::new(10_000_000, 0);
    let lakh = Decimal::new(100_000, 0);
    let thousand = Decimal::new(1_000, 0);

    if unsigned >= crore {
        let (int_part, frac_part) = split_two_decimals((unsigned / crore).round_dp(2));
        format!("{sign}{RUPEE}{int_part}.{frac_part} Cr")
    } else if unsigned >= lakh {
        let (int_part, frac_part) = split_two_decimals((unsigned / lakh).round_dp(2));
        format!("{sign}{RUPEE}{int_part}.{frac_part} L")
    } else if unsigned >= thousand {
        let (int_part, frac_part) = split_two_decimals((unsigned / thousand).round_dp(2));
        format!("{sign}{RUPEE}{int_part}.{frac_part}K")
    } else {
        format_inr(amount)
    }
}

fn split_two_decimals(amount: Decimal) -> (String, String) {
    let text = amount.to_string();
    match text.split_once('.') {
        Some((int_part, frac_part)) => {
            let mut frac = frac_part.to_string();
            frac.truncate(2);
            while frac.len() < 2 {
                frac.push('0');
            }
            (int_part.to_string(), frac)
        }
        None => (text, "00".to_string()),
    }
}

fn group_indian(digits: &str) -> String {
    if digits.len() <= 3 {
        return digits.to_string();
    }

    let (head, tail) = digits.split_at(digits.len() - 3);
    let head_chars: Vec<char> = head.chars().collect();
    let mut groups: Vec<String> = Vec::new();
    let mut idx = head_chars.len();
    while idx > 2 {
        groups.push(head_chars[idx - 2..idx].iter().collect());
        idx -= 2;
    }
    groups.push(head_chars[..idx].iter().collect());
    groups.reverse();
    format!("{},{}", groups.join(","), tail)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{format_inr, format_inr_compact};

    #[test]
    fn groups_by_two_after_the_last_three_digits() {
        assert_eq!(format_inr(Decimal::new(123456789, 2)), "\u{20b9}12,34,567.89");
        assert_eq!(format_inr(Decimal::new(100000, 0)), "\u{20b9}1,00,000.00");
        assert_eq!(format_inr(Decimal::new(1234, 0)), "\u{20b9}1,234.00");
    }

    #[test]
    fn small_amounts_stay_ungrouped() {
        assert_eq!(format_inr(Decimal::new(999, 0)), "\u{20b9}999.00");
        assert_eq!(format_inr(Decimal::ZERO), "\u{20b9}0.00");
    }

    #[test]
    fn negative_amounts_carry_a_leading_sign() {
        assert_eq!(format_inr(Decimal::new(-123450, 2)), "-\u{20b9}1,234.50");
    }

    #[test]
    fn compact_forms_step_through_k_l_and_cr() {
        assert_eq!(format_inr_compact(Decimal::new(950, 0)), "\u{20b9}950.00");
        assert_eq!(format_inr_compact(Decimal::new(12_000, 0)), "\u{20b9}12.00K");
        assert_eq!(format_inr_compact(Decimal::new(2_500_000, 0)), "\u{20b9}25.00 L");
        assert_eq!(format_inr_compact(Decimal::new(15_000_000, 0)), "\u{20b9}1.50 Cr");
    }
}
