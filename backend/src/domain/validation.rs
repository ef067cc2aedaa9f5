//! Record form validation.
//!
//! All checks are synchronous and run before the gateway is called, in a
//! fixed order: label, amount, date. The first failing check wins. Storage
//! never re-validates, so these rules are advisory for any other writer.

use chrono::NaiveDate;
use shared::{CreateRecordRequest, Period, RecordKind, MAX_AMOUNT};

use super::errors::ValidationError;

/// A record request that passed every check
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRecord {
    pub kind: RecordKind,
    /// Trimmed label
    pub label: String,
    pub amount: u64,
    pub occurred_on: NaiveDate,
    /// Filing period, equal to the period of `occurred_on`
    pub period: Period,
}

#[derive(Debug, Clone)]
pub struct RecordValidator {
    max_amount: u64,
    currency_symbol: &'static str,
}

impl Default for RecordValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordValidator {
    pub fn new() -> Self {
        Self {
            max_amount: MAX_AMOUNT,
            currency_symbol: "₫",
        }
    }

    /// Validate a request against the currently selected period
    pub fn validate(
        &self,
        request: &CreateRecordRequest,
        active_period: Period,
    ) -> Result<ValidatedRecord, ValidationError> {
        let label = request.label.trim();
        if request.kind == RecordKind::Expense && label.is_empty() {
            return Err(ValidationError::EmptyLabel);
        }

        let amount = self.parse_amount(&request.amount)?;

        if !active_period.contains(request.occurred_on) {
            return Err(ValidationError::DateOutsidePeriod);
        }

        Ok(ValidatedRecord {
            kind: request.kind,
            label: label.to_string(),
            amount,
            occurred_on: request.occurred_on,
            period: active_period,
        })
    }

    /// Parse a typed amount. Whitespace, thousands separators and the
    /// currency symbol are ignored; the result must be a whole number in
    /// `1..=MAX_AMOUNT`.
    pub fn parse_amount(&self, input: &str) -> Result<u64, ValidationError> {
        let cleaned: String = input
            .replace(self.currency_symbol, "")
            .chars()
            .filter(|c| *c != ',' && !c.is_whitespace())
            .collect();
        if cleaned.is_empty() {
            return Err(ValidationError::InvalidAmount);
        }

        let amount = match cleaned.parse::<u64>() {
            Ok(value) => value,
            Err(_) => {
                let value = cleaned
                    .parse::<f64>()
                    .map_err(|_| ValidationError::InvalidAmount)?;
                if !value.is_finite() || value <= 0.0 || value.fract() != 0.0 {
                    return Err(ValidationError::InvalidAmount);
                }
                if value > self.max_amount as f64 {
                    return Err(ValidationError::AmountTooLarge);
                }
                value as u64
            }
        };

        if amount == 0 {
            return Err(ValidationError::InvalidAmount);
        }
        if amount > self.max_amount {
            return Err(ValidationError::AmountTooLarge);
        }
        Ok(amount)
    }

    /// Default date for a form when the selected period changes: keep the
    /// day of month of the previous date, clamped to the new month
    pub fn default_date_for(&self, previous: NaiveDate, period: Period) -> Option<NaiveDate> {
        use chrono::Datelike;
        period.clamp_day(previous.day())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn june_2024() -> Period {
        Period::new(5, 2024).unwrap()
    }

    fn request(kind: RecordKind, label: &str, amount: &str, date: (i32, u32, u32)) -> CreateRecordRequest {
        CreateRecordRequest {
            kind,
            label: label.to_string(),
            amount: amount.to_string(),
            occurred_on: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
        }
    }

    #[test]
    fn test_lunch_in_active_period_is_accepted() {
        let validator = RecordValidator::new();
        let valid = validator
            .validate(&request(RecordKind::Expense, "  Lunch ", "50000", (2024, 6, 12)), june_2024())
            .unwrap();
        assert_eq!(valid.label, "Lunch");
        assert_eq!(valid.amount, 50_000);
        assert_eq!(valid.period, june_2024());
    }

    #[test]
    fn test_same_record_outside_active_period_is_rejected() {
        let validator = RecordValidator::new();
        let july = Period::new(6, 2024).unwrap();
        let result = validator.validate(&request(RecordKind::Expense, "Lunch", "50000", (2024, 6, 12)), july);
        assert_eq!(result, Err(ValidationError::DateOutsidePeriod));
    }

    #[test]
    fn test_expense_needs_label_but_salary_does_not() {
        let validator = RecordValidator::new();
        let expense = request(RecordKind::Expense, "   ", "10", (2024, 6, 1));
        assert_eq!(validator.validate(&expense, june_2024()), Err(ValidationError::EmptyLabel));

        let salary = request(RecordKind::Salary, "", "10", (2024, 6, 1));
        assert!(validator.validate(&salary, june_2024()).is_ok());
    }

    #[test]
    fn test_amount_boundaries() {
        let validator = RecordValidator::new();
        assert_eq!(validator.parse_amount("999999999999"), Ok(999_999_999_999));
        assert_eq!(validator.parse_amount("1000000000000"), Err(ValidationError::AmountTooLarge));
        assert_eq!(validator.parse_amount("1e13"), Err(ValidationError::AmountTooLarge));
        assert_eq!(
            validator.parse_amount("99999999999999999999999"),
            Err(ValidationError::AmountTooLarge)
        );
        assert_eq!(validator.parse_amount("1"), Ok(1));
    }

    #[test]
    fn test_invalid_amounts() {
        let validator = RecordValidator::new();
        for input in ["", "  ", "0", "-5", "abc", "12.5", "NaN", "inf"] {
            assert_eq!(
                validator.parse_amount(input),
                Err(ValidationError::InvalidAmount),
                "input {:?} should be invalid",
                input
            );
        }
    }

    #[test]
    fn test_amount_cleanup() {
        let validator = RecordValidator::new();
        assert_eq!(validator.parse_amount("1,250,000"), Ok(1_250_000));
        assert_eq!(validator.parse_amount(" 75 000₫ "), Ok(75_000));
        assert_eq!(validator.parse_amount("3000.0"), Ok(3_000));
    }

    #[test]
    fn test_checks_run_in_order() {
        let validator = RecordValidator::new();
        // Empty label and bad amount and wrong month: label wins
        let all_bad = request(RecordKind::Expense, "", "x", (2023, 1, 1));
        assert_eq!(validator.validate(&all_bad, june_2024()), Err(ValidationError::EmptyLabel));
        // Bad amount and wrong month: amount wins
        let bad_amount = request(RecordKind::Expense, "Taxi", "0", (2023, 1, 1));
        assert_eq!(validator.validate(&bad_amount, june_2024()), Err(ValidationError::InvalidAmount));
    }

    #[test]
    fn test_default_date_clamps_to_month_end() {
        let validator = RecordValidator::new();
        let previous = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let feb = Period::new(1, 2023).unwrap();
        assert_eq!(validator.default_date_for(previous, feb), NaiveDate::from_ymd_opt(2023, 2, 28));
    }
}
