use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use csv::{Reader, StringRecord};
use shared::{coerce_amount, FinancialRecord, RecordKind};
use std::fs::File;
use std::io::BufReader;
use tracing::{info, warn};

use super::connection::{CsvConnection, RECORDS_FILE};
use crate::storage::live_query::Subscription;
use crate::storage::traits::{NewRecord, RecordListener, RecordQuery, RecordStorage};

const HEADER: [&str; 10] = [
    "id",
    "owner_id",
    "kind",
    "label",
    "amount",
    "occurred_on",
    "month",
    "year",
    "pinned",
    "created_at",
];

/// CSV-based record repository. All owners share one `records.csv`.
#[derive(Clone)]
pub struct RecordRepository {
    connection: CsvConnection,
}

impl RecordRepository {
    pub fn new(connection: CsvConnection) -> Self {
        Self { connection }
    }

    /// Read every record from the CSV file. Rows without a readable id,
    /// date or timestamp are skipped; unreadable amounts count as 0.
    fn read_records(&self) -> Result<Vec<FinancialRecord>> {
        let file_path = self.connection.ensure_csv_file_exists(RECORDS_FILE, &HEADER)?;
        let file = File::open(&file_path)?;
        let mut csv_reader = Reader::from_reader(BufReader::new(file));

        let mut records = Vec::new();
        for (line, result) in csv_reader.records().enumerate() {
            let row = result?;
            match parse_row(&row) {
                Some(record) => records.push(record),
                None => warn!("Skipping malformed record row {} in {}", line + 2, RECORDS_FILE),
            }
        }
        Ok(records)
    }

    fn write_records(&self, records: &[FinancialRecord]) -> Result<()> {
        self.connection.write_csv_atomically(RECORDS_FILE, &HEADER, |writer| {
            for record in records {
                writer.write_record(&[
                    record.id.clone(),
                    record.owner_id.clone(),
                    record.kind.to_string(),
                    record.label.clone(),
                    record.amount.to_string(),
                    record.occurred_on.format("%Y-%m-%d").to_string(),
                    record.month.to_string(),
                    record.year.to_string(),
                    record.pinned.to_string(),
                    record.created_at.to_rfc3339(),
                ])?;
            }
            Ok(())
        })
    }

    /// Persist and then push the new state to live queries
    fn commit(&self, records: &[FinancialRecord]) -> Result<()> {
        self.write_records(records)?;
        self.connection.listeners().notify(records);
        Ok(())
    }
}

fn parse_row(row: &StringRecord) -> Option<FinancialRecord> {
    let id = row.get(0).filter(|id| !id.is_empty())?.to_string();
    let occurred_on = NaiveDate::parse_from_str(row.get(5)?, "%Y-%m-%d").ok()?;
    let created_at = DateTime::parse_from_rfc3339(row.get(9)?).ok()?.with_timezone(&Utc);

    Some(FinancialRecord {
        id,
        owner_id: row.get(1).unwrap_or("").to_string(),
        kind: RecordKind::parse(row.get(2).unwrap_or("")),
        label: row.get(3).unwrap_or("").to_string(),
        amount: coerce_amount(row.get(4).unwrap_or("0")),
        occurred_on,
        month: row.get(6).and_then(|m| m.trim().parse().ok()).unwrap_or(0),
        year: row.get(7).and_then(|y| y.trim().parse().ok()).unwrap_or(0),
        pinned: row.get(8).map(|p| p.trim() == "true").unwrap_or(false),
        created_at,
    })
}

fn newest_first(records: &mut [FinancialRecord]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}

#[async_trait]
impl RecordStorage for RecordRepository {
    async fn insert_record(&self, new_record: NewRecord) -> Result<FinancialRecord> {
        let _guard = self.connection.lock_writes().await;
        let mut records = self.read_records()?;

        let record = FinancialRecord {
            id: FinancialRecord::generate_id(),
            owner_id: new_record.owner_id,
            kind: new_record.kind,
            label: new_record.label,
            amount: new_record.amount,
            occurred_on: new_record.occurred_on,
            month: new_record.period.month,
            year: new_record.period.year,
            pinned: false,
            created_at: Utc::now(),
        };
        records.push(record.clone());
        self.commit(&records)?;

        info!("Stored record {} for owner {} in {}", record.id, record.owner_id, record.period());
        Ok(record)
    }

    async fn get_record(&self, record_id: &str) -> Result<Option<FinancialRecord>> {
        let records = self.read_records()?;
        Ok(records.into_iter().find(|r| r.id == record_id))
    }

    async fn query_records(&self, query: &RecordQuery) -> Result<Vec<FinancialRecord>> {
        let mut records: Vec<FinancialRecord> = self
            .read_records()?
            .into_iter()
            .filter(|r| query.matches(r))
            .collect();
        newest_first(&mut records);
        Ok(records)
    }

    async fn delete_record(&self, record_id: &str) -> Result<bool> {
        let _guard = self.connection.lock_writes().await;
        let mut records = self.read_records()?;
        let before = records.len();
        records.retain(|r| r.id != record_id);

        if records.len() == before {
            return Ok(false);
        }
        self.commit(&records)?;
        info!("Deleted record {}", record_id);
        Ok(true)
    }

    async fn delete_records(&self, query: &RecordQuery) -> Result<usize> {
        let _guard = self.connection.lock_writes().await;
        let mut records = self.read_records()?;
        let before = records.len();
        records.retain(|r| !query.matches(r));

        let deleted = before - records.len();
        if deleted > 0 {
            self.commit(&records)?;
            info!("Deleted {} records matching {:?}", deleted, query);
        }
        Ok(deleted)
    }

    async fn set_pinned(&self, record_id: &str, pinned: bool) -> Result<bool> {
        let _guard = self.connection.lock_writes().await;
        let mut records = self.read_records()?;

        let Some(record) = records.iter_mut().find(|r| r.id == record_id) else {
            return Ok(false);
        };
        if record.pinned != pinned {
            record.pinned = pinned;
            self.commit(&records)?;
        }
        Ok(true)
    }

    async fn watch(&self, query: RecordQuery, listener: RecordListener) -> Result<Subscription> {
        // Holding the write lock keeps the first snapshot and later
        // notifications in commit order
        let _guard = self.connection.lock_writes().await;
        let records = self.read_records()?;
        Ok(self.connection.listeners().register(query, listener, &records))
    }
}
