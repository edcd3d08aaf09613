//! Persistence boundary for signatures.
//!
//! The submission and verification flows only ever talk to a
//! [`SignatureStore`]; `PgSignatureStore` is the production adapter and
//! `MemorySignatureStore` backs the tests.

mod memory;
mod postgres;
mod retry;

pub use memory::MemorySignatureStore;
pub use postgres::{run_migrations, PgPool, PgSignatureStore};
pub use retry::RetryPolicy;

use thiserror::Error;

use crate::models::{Signature, SignatureForm};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a signature already exists for this email")]
    DuplicateEmail,

    #[error("database connection unavailable: {0}")]
    Connection(String),

    #[error("query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("giving up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<StoreError>,
    },
}

impl StoreError {
    /// Connectivity problems worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Connection(_))
    }
}

pub trait SignatureStore: Send + Sync {
    fn find_by_email(&self, email: &str) -> Result<Option<Signature>, StoreError>;

    /// Inserts a `pending` row. `token_digest` is what [`consume_token`]
    /// will later be called with.
    ///
    /// [`consume_token`]: SignatureStore::consume_token
    fn insert(&self, form: &SignatureForm, token_digest: &str) -> Result<Signature, StoreError>;

    /// Verified rows only, notable first, newest first.
    fn list_verified(&self, search: Option<&str>) -> Result<Vec<Signature>, StoreError>;

    /// Flips the `pending` row holding this token to `verified`. Returns
    /// `None` when no pending row matches.
    fn consume_token(&self, token_digest: &str) -> Result<Option<Signature>, StoreError>;
}
