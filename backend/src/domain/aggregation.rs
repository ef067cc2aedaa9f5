//! # Aggregation
//!
//! Pure reductions of a record set into per-period totals. The functions
//! never assume any ordering of their input and never fail: malformed
//! amounts were already coerced to 0 when the records were decoded.
//!
//! - [`sum_by_kind`]: total of one kind inside one period
//! - [`monthly_series`]: twelve chart points for a year, remainder clamped
//!   at zero
//! - [`year_totals`]: yearly totals, remainder may go negative
//! - [`month_totals`] / [`month_summary`]: the monthly summary card

use shared::{FinancialRecord, MonthSummary, MonthlyPoint, Period, PeriodTotals, RecordKind};

/// Sum of `amount` over records of `kind` filed under `period`
pub fn sum_by_kind(records: &[FinancialRecord], kind: RecordKind, period: Period) -> u64 {
    records
        .iter()
        .filter(|r| r.kind == kind && r.period() == period)
        .fold(0u64, |sum, r| sum.saturating_add(r.amount))
}

/// One point per month 0..=11 of `year`. The remainder is
/// `max(0, income - expense)` so the chart never renders below zero.
pub fn monthly_series(records: &[FinancialRecord], year: i32) -> Vec<MonthlyPoint> {
    let mut income = [0u64; 12];
    let mut expense = [0u64; 12];

    for record in records.iter().filter(|r| r.year == year) {
        let Some(month) = usize::try_from(record.month).ok().filter(|m| *m < 12) else {
            continue;
        };
        let bucket = match record.kind {
            RecordKind::Salary => &mut income[month],
            RecordKind::Expense => &mut expense[month],
        };
        *bucket = bucket.saturating_add(record.amount);
    }

    (0..12)
        .map(|m| MonthlyPoint {
            month: m as u32,
            income: income[m],
            expense: expense[m],
            remainder: income[m].saturating_sub(expense[m]),
        })
        .collect()
}

/// Totals over every month of `year`. The remainder is not clamped.
pub fn year_totals(records: &[FinancialRecord], year: i32) -> PeriodTotals {
    let (income, expense) = records
        .iter()
        .filter(|r| r.year == year)
        .fold((0u64, 0u64), |(income, expense), r| match r.kind {
            RecordKind::Salary => (income.saturating_add(r.amount), expense),
            RecordKind::Expense => (income, expense.saturating_add(r.amount)),
        });
    PeriodTotals::new(income, expense)
}

/// Totals of a single period. The remainder is not clamped.
pub fn month_totals(records: &[FinancialRecord], period: Period) -> PeriodTotals {
    PeriodTotals::new(
        sum_by_kind(records, RecordKind::Salary, period),
        sum_by_kind(records, RecordKind::Expense, period),
    )
}

/// Totals plus the counters shown under the record list
pub fn month_summary(records: &[FinancialRecord], period: Period) -> MonthSummary {
    let in_period: Vec<&FinancialRecord> = records.iter().filter(|r| r.period() == period).collect();
    let salary_count = in_period.iter().filter(|r| r.is_salary()).count();

    MonthSummary {
        period,
        totals: month_totals(records, period),
        record_count: in_period.len(),
        expense_count: in_period.len() - salary_count,
        salary_count,
        pinned_count: in_period.iter().filter(|r| r.pinned).count(),
    }
}
