//! Display helpers shared by the CLI and services.

use rust_decimal::{Decimal, RoundingStrategy};

/// Formats an amount as Indian rupees: two decimals, lakh/crore digit grouping.
///
/// Display only; sums are always taken on the unrounded values.
pub fn format_inr(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let text = format!("{:.2}", rounded.abs());
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    format!(
        "{}₹{}.{}",
        if negative { "-" } else { "" },
        group_indian(int_part),
        frac_part
    )
}

fn group_indian(digits: &str) -> String {
    if digits.len() <= 3 {
        return digits.to_string();
    }
    let (head, last3) = digits.split_at(digits.len() - 3);
    let mut groups: Vec<&str> = Vec::new();
    let mut end = head.len();
    while end > 0 {
        let start = end.saturating_sub(2);
        groups.push(&head[start..end]);
        end = start;
    }
    groups.reverse();
    format!("{},{}", groups.join(","), last3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(dec!(0), "₹0.00")]
    #[case(dec!(999.5), "₹999.50")]
    #[case(dec!(1000), "₹1,000.00")]
    #[case(dec!(123456.705), "₹1,23,456.71")]
    #[case(dec!(12345678.9), "₹1,23,45,678.90")]
    #[case(dec!(-354), "-₹354.00")]
    fn formats_with_indian_grouping(#[case] amount: Decimal, #[case] expected: &str) {
        assert_eq!(format_inr(amount), expected);
    }
}
