//! # Storage Module
//!
//! Handles all data persistence for the expense tracker.
//!
//! The domain layer only sees the traits in [`traits`]: record, profile and
//! preference repositories created through a [`Connection`], and an
//! [`IdentityProvider`] for sign-in and account security. The shipped
//! implementation keeps everything in flat files under the data directory
//! ([`csv`]) and pushes changes to live queries through the
//! [`live_query::ListenerRegistry`]. Bearer tokens of signed-in clients
//! live in the in-memory [`session::SessionStore`].

pub mod csv;
pub mod identity;
pub mod live_query;
pub mod session;
pub mod traits;

pub use self::csv::CsvConnection;
pub use identity::LocalIdentityProvider;
pub use live_query::{ListenerRegistry, Subscription};
pub use session::SessionStore;
pub use traits::{
    AuthIdentity, Connection, IdentityProvider, NewRecord, PreferenceStorage, Preferences, ProfileStorage,
    RecordListener, RecordQuery, RecordStorage,
};
