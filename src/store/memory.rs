use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use uuid::Uuid;

use super::{SignatureStore, StoreError};
use crate::models::{Signature, SignatureForm, SignatureStatus};

/// Process-local store with the same contract as the database adapter.
#[derive(Debug, Default)]
pub struct MemorySignatureStore {
    rows: Mutex<Vec<Signature>>,
}

impl MemorySignatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with existing rows.
    pub fn with_rows(rows: Vec<Signature>) -> Self {
        Self {
            rows: Mutex::new(rows),
        }
    }

    /// Every row regardless of status, in insertion order.
    pub fn snapshot(&self) -> Vec<Signature> {
        self.rows().clone()
    }

    fn rows(&self) -> MutexGuard<'_, Vec<Signature>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SignatureStore for MemorySignatureStore {
    fn find_by_email(&self, email: &str) -> Result<Option<Signature>, StoreError> {
        Ok(self.rows().iter().find(|row| row.email == email).cloned())
    }

    fn insert(&self, form: &SignatureForm, token_digest: &str) -> Result<Signature, StoreError> {
        let mut rows = self.rows();
        if rows.iter().any(|row| row.email == form.email) {
            return Err(StoreError::DuplicateEmail);
        }

        let signature = Signature {
            id: Uuid::new_v4(),
            name: form.name.clone(),
            email: form.email.clone(),
            position: form.position.clone(),
            honors: form.honors.clone(),
            is_notable: form.is_notable,
            status: SignatureStatus::Pending,
            verification_token: token_digest.to_owned(),
            created_at: Utc::now(),
            verified_at: None,
        };
        rows.push(signature.clone());
        Ok(signature)
    }

    fn list_verified(&self, search: Option<&str>) -> Result<Vec<Signature>, StoreError> {
        let needle = search
            .filter(|term| !term.is_empty())
            .map(str::to_lowercase);
        let contains = |field: Option<&str>, needle: &str| {
            field.is_some_and(|value| value.to_lowercase().contains(needle))
        };

        let mut verified: Vec<Signature> = self
            .rows()
            .iter()
            .filter(|row| row.status == SignatureStatus::Verified)
            .filter(|row| match &needle {
                None => true,
                Some(needle) => {
                    contains(Some(&row.name), needle)
                        || contains(row.position.as_deref(), needle)
                        || contains(row.honors.as_deref(), needle)
                }
            })
            .cloned()
            .collect();

        verified.sort_by(|a, b| {
            b.is_notable
                .cmp(&a.is_notable)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(verified)
    }

    fn consume_token(&self, token_digest: &str) -> Result<Option<Signature>, StoreError> {
        let mut rows = self.rows();
        let row = rows.iter_mut().find(|row| {
            row.verification_token == token_digest && row.status == SignatureStatus::Pending
        });

        Ok(row.map(|row| {
            row.status = SignatureStatus::Verified;
            row.verified_at = Some(Utc::now());
            row.clone()
        }))
    }
}
