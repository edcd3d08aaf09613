use tracing::{info, instrument, warn};

use crate::error::AppError;
use crate::mail::Notifier;
use crate::models::{Signature, SignatureForm};
use crate::store::SignatureStore;
use crate::verification::{issue_token, token_digest};

/// Records a pending signature and mails its verification link.
///
/// Addresses the notifier cannot handle fail before anything is written. If
/// delivery itself fails the pending row stays behind and the submission is
/// reported as failed.
#[instrument(skip_all)]
pub fn submit(
    store: &dyn SignatureStore,
    notifier: &dyn Notifier,
    form: SignatureForm,
) -> Result<Signature, AppError> {
    if store.find_by_email(&form.email)?.is_some() {
        info!("duplicate submission refused");
        return Err(AppError::DuplicateEmail);
    }

    notifier.check_recipient(&form.email).map_err(|err| {
        warn!(error = %err, "recipient cannot be addressed");
        err
    })?;

    let token = issue_token();
    let signature = store.insert(&form, &token_digest(&token))?;

    notifier
        .send(&signature.email, &signature.name, &token)
        .map_err(|err| {
            warn!(id = %signature.id, error = %err, "verification email not delivered");
            err
        })?;

    info!(id = %signature.id, notable = signature.is_notable, "signature submitted");
    Ok(signature)
}
