use std::convert::Infallible;
use std::sync::Arc;

use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::serde::json::{self, Json, Value};
use rocket::serde::Serialize;
use rocket::tokio::task::spawn_blocking;
use rocket::{Request, State};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AppError, ErrorBody};
use crate::mail::Notifier;
use crate::models::PublicSignature;
use crate::rate_limit::RateLimiter;
use crate::store::SignatureStore;
use crate::validation::{validate, ValidationError};
use crate::{signing, verification};

/// Everything a request handler needs, owned by the Rocket instance.
pub struct AppState {
    pub store: Arc<dyn SignatureStore>,
    pub notifier: Arc<dyn Notifier>,
    pub limiter: RateLimiter,
}

/// Rate limiting key: first `X-Forwarded-For` hop, then the peer address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKey(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientKey {
    type Error = Infallible;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let forwarded = req
            .headers()
            .get_one("X-Forwarded-For")
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty())
            .map(str::to_owned);

        let key = forwarded
            .or_else(|| req.client_ip().map(|ip| ip.to_string()))
            .unwrap_or_else(|| "unknown".to_owned());

        Outcome::Success(ClientKey(key))
    }
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct SubmitResponse {
    pub message: &'static str,
    pub id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct VerifyResponse {
    pub message: &'static str,
}

#[get("/signatures?<search>")]
pub async fn list_signatures(
    state: &State<AppState>,
    search: Option<String>,
) -> Result<Json<Vec<PublicSignature>>, AppError> {
    let store = Arc::clone(&state.store);

    let signatures = spawn_blocking(move || store.list_verified(search.as_deref())).await??;
    debug!(count = signatures.len(), "listed verified signatures");

    Ok(Json(signatures.into_iter().map(PublicSignature::from).collect()))
}

#[post("/signatures", data = "<body>")]
pub async fn submit_signature(
    state: &State<AppState>,
    client: ClientKey,
    body: Result<Json<Value>, json::Error<'_>>,
) -> Result<Json<SubmitResponse>, AppError> {
    let decision = state.limiter.check(&client.0);
    if !decision.allowed {
        warn!(client = %client.0, "submission rate limited");
        return Err(AppError::RateLimited {
            retry_after: state.limiter.window(),
            remaining: decision.remaining,
        });
    }

    let Json(payload) = body.map_err(|e| ValidationError::NotJson(e.to_string()))?;
    let form = validate(&payload).map_err(|e| {
        debug!(reason = %e, "submission rejected");
        e
    })?;

    let store = Arc::clone(&state.store);
    let notifier = Arc::clone(&state.notifier);
    let signature =
        spawn_blocking(move || signing::submit(store.as_ref(), notifier.as_ref(), form)).await??;

    state.limiter.record(&client.0);

    Ok(Json(SubmitResponse {
        message: "Signature submitted successfully",
        id: signature.id,
    }))
}

#[put("/signatures?<token>")]
pub async fn verify_signature(
    state: &State<AppState>,
    token: Option<String>,
) -> Result<Json<VerifyResponse>, AppError> {
    let store = Arc::clone(&state.store);

    spawn_blocking(move || verification::verify(store.as_ref(), token.as_deref())).await??;

    Ok(Json(VerifyResponse {
        message: "Signature verified successfully",
    }))
}

#[catch(default)]
pub fn default_catcher(status: Status, _req: &Request<'_>) -> Json<ErrorBody> {
    ErrorBody::new(status.reason().unwrap_or("Unknown error"))
}
