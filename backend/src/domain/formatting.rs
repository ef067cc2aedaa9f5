//! Amount formatting for summaries, lists and chart tooltips.

use shared::FinancialRecord;

const CURRENCY_SYMBOL: &str = "₫";

/// Compact form used on summary cards and list rows: `1.5B₫`, `2.0M₫`,
/// `12.3k₫`, `999₫`
pub fn format_short(amount: u64) -> String {
    let value = amount as f64;
    if amount >= 1_000_000_000 {
        format!("{:.1}B{}", value / 1_000_000_000.0, CURRENCY_SYMBOL)
    } else if amount >= 1_000_000 {
        format!("{:.1}M{}", value / 1_000_000.0, CURRENCY_SYMBOL)
    } else if amount >= 1_000 {
        format!("{:.1}k{}", value / 1_000.0, CURRENCY_SYMBOL)
    } else {
        format!("{}{}", amount, CURRENCY_SYMBOL)
    }
}

/// Full amount with thousands separators: `1,234,567₫`
pub fn format_full(amount: u64) -> String {
    format!("{}{}", group_thousands(amount), CURRENCY_SYMBOL)
}

/// Full form of a value that may be negative (yearly remainder)
pub fn format_balance(value: i64) -> String {
    if value < 0 {
        format!("-{}", format_full(value.unsigned_abs()))
    } else {
        format_full(value as u64)
    }
}

/// List row amount: salaries are shown with `+`, expenses with `-`
pub fn format_signed(record: &FinancialRecord) -> String {
    let sign = if record.is_salary() { '+' } else { '-' };
    format!("{}{}", sign, format_short(record.amount))
}

fn group_thousands(amount: u64) -> String {
    let digits = amount.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use shared::RecordKind;

    #[test]
    fn test_format_short_thresholds() {
        assert_eq!(format_short(0), "0₫");
        assert_eq!(format_short(999), "999₫");
        assert_eq!(format_short(1_000), "1.0k₫");
        assert_eq!(format_short(12_345), "12.3k₫");
        assert_eq!(format_short(2_000_000), "2.0M₫");
        assert_eq!(format_short(1_500_000_000), "1.5B₫");
    }

    #[test]
    fn test_format_full_groups_digits() {
        assert_eq!(format_full(0), "0₫");
        assert_eq!(format_full(100), "100₫");
        assert_eq!(format_full(1_000), "1,000₫");
        assert_eq!(format_full(1_234_567), "1,234,567₫");
        assert_eq!(format_balance(-50_000), "-50,000₫");
    }

    #[test]
    fn test_format_signed_by_kind() {
        let mut record = FinancialRecord {
            id: "record::1".to_string(),
            owner_id: "u1".to_string(),
            kind: RecordKind::Salary,
            label: String::new(),
            amount: 50_000,
            occurred_on: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            month: 5,
            year: 2024,
            pinned: false,
            created_at: Utc::now(),
        };
        assert_eq!(format_signed(&record), "+50.0k₫");
        record.kind = RecordKind::Expense;
        assert_eq!(format_signed(&record), "-50.0k₫");
    }
}
