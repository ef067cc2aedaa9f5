//! # CSV Storage Module
//!
//! File-based storage for the expense tracker. Every file lives directly in
//! the configured data directory:
//!
//! - `records.csv`: financial records of all users
//! - `profiles.csv`: profile documents
//! - `identities.csv`: sign-in identities with Argon2 password hashes
//! - `preferences.yaml`: application preferences
//!
//! Writes hold the connection's write lock for the whole read-modify-write
//! cycle and replace the file atomically (temp file + rename).
//!
//! ## File Format
//!
//! ```csv
//! id,owner_id,kind,label,amount,occurred_on,month,year,pinned,created_at
//! record::0f4c…,uid_1,expense,Lunch,50000,2024-06-12,5,2024,false,2024-06-12T04:10:00+00:00
//! ```

pub mod connection;
pub mod preference_repository;
pub mod profile_repository;
pub mod record_repository;

#[cfg(test)]
pub mod test_utils;

pub use connection::CsvConnection;
pub use preference_repository::PreferenceRepository;
pub use profile_repository::ProfileRepository;
pub use record_repository::RecordRepository;
