//! Record list ordering.
//!
//! Ties on the primary key fall back to `created_at` (newest first) and then
//! to the id, so the same input always produces the same order.

use shared::{FinancialRecord, SortMode};
use std::cmp::Ordering;

/// Sort a copy of `records` by `mode`
pub fn sort_records(records: &[FinancialRecord], mode: SortMode) -> Vec<FinancialRecord> {
    let mut sorted = records.to_vec();
    sort_in_place(&mut sorted, mode);
    sorted
}

pub fn sort_in_place(records: &mut [FinancialRecord], mode: SortMode) {
    records.sort_by(|a, b| primary(a, b, mode).then_with(|| tie_break(a, b)));
}

/// Records flagged for the pinned view, newest first
pub fn pinned(records: &[FinancialRecord]) -> Vec<FinancialRecord> {
    let pinned: Vec<FinancialRecord> = records.iter().filter(|r| r.pinned).cloned().collect();
    sort_records(&pinned, SortMode::Newest)
}

fn primary(a: &FinancialRecord, b: &FinancialRecord, mode: SortMode) -> Ordering {
    match mode {
        SortMode::Newest => b.occurred_on.cmp(&a.occurred_on),
        SortMode::Oldest => a.occurred_on.cmp(&b.occurred_on),
        SortMode::HighAmount => b.amount.cmp(&a.amount),
        SortMode::LowAmount => a.amount.cmp(&b.amount),
    }
}

fn tie_break(a: &FinancialRecord, b: &FinancialRecord) -> Ordering {
    b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id))
}
