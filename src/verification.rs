//! Email verification tokens.
//!
//! Signers receive a random UUID; rows only ever hold its SHA-256 digest.
//! A token is single-use because the store only flips rows that are still
//! `pending`.

use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::Signature;
use crate::store::SignatureStore;

pub fn issue_token() -> String {
    Uuid::new_v4().to_string()
}

pub fn token_digest(token: &str) -> String {
    sha256::digest(token)
}

/// Consumes `token`, moving its signature from `pending` to `verified`.
///
/// Absent or malformed tokens fail before the store is touched.
#[instrument(skip_all)]
pub fn verify(store: &dyn SignatureStore, token: Option<&str>) -> Result<Signature, AppError> {
    let token = token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AppError::MissingToken)?;

    if Uuid::parse_str(token).is_err() {
        return Err(AppError::InvalidToken);
    }

    let signature = store
        .consume_token(&token_digest(token))?
        .ok_or(AppError::InvalidToken)?;

    info!(id = %signature.id, "signature verified");
    Ok(signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SignatureForm, SignatureStatus};
    use crate::store::{MemorySignatureStore, StoreError};

    fn pending(store: &MemorySignatureStore) -> String {
        let token = issue_token();
        store
            .insert(
                &SignatureForm {
                    name: "Ada Lovelace".into(),
                    email: "ada@example.com".into(),
                    position: None,
                    honors: None,
                    is_notable: false,
                },
                &token_digest(&token),
            )
            .expect("insert");
        token
    }

    /// Fails the test if the flow reaches the store.
    struct Untouchable;

    impl SignatureStore for Untouchable {
        fn find_by_email(&self, _: &str) -> Result<Option<Signature>, StoreError> {
            panic!("store accessed")
        }
        fn insert(&self, _: &SignatureForm, _: &str) -> Result<Signature, StoreError> {
            panic!("store accessed")
        }
        fn list_verified(&self, _: Option<&str>) -> Result<Vec<Signature>, StoreError> {
            panic!("store accessed")
        }
        fn consume_token(&self, _: &str) -> Result<Option<Signature>, StoreError> {
            panic!("store accessed")
        }
    }

    #[test]
    fn digest_is_stable_hex() {
        let digest = token_digest("abc");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(token_digest(&issue_token()), token_digest(&issue_token()));
    }

    #[test]
    fn verifies_once() {
        let store = MemorySignatureStore::new();
        let token = pending(&store);

        let signature = verify(&store, Some(&token)).expect("first use");
        assert_eq!(signature.status, SignatureStatus::Verified);
        let verified_at = signature.verified_at;

        assert!(matches!(
            verify(&store, Some(&token)),
            Err(AppError::InvalidToken)
        ));
        assert_eq!(store.snapshot()[0].verified_at, verified_at);
    }

    #[test]
    fn unknown_token_is_rejected() {
        let store = MemorySignatureStore::new();
        pending(&store);

        assert!(matches!(
            verify(&store, Some(&issue_token())),
            Err(AppError::InvalidToken)
        ));
        assert_eq!(store.snapshot()[0].status, SignatureStatus::Pending);
    }

    #[test]
    fn missing_or_malformed_token_skips_store() {
        assert!(matches!(verify(&Untouchable, None), Err(AppError::MissingToken)));
        assert!(matches!(
            verify(&Untouchable, Some("  ")),
            Err(AppError::MissingToken)
        ));
        assert!(matches!(
            verify(&Untouchable, Some("not-a-token")),
            Err(AppError::InvalidToken)
        ));
    }
}
