use std::time::Duration;

use rocket::http::{Method, Status};
use rocket::response::{self, Responder, Response};
use rocket::serde::json::Json;
use rocket::serde::Serialize;
use rocket::tokio::task::JoinError;
use rocket::Request;
use thiserror::Error;
use tracing::error;

use crate::mail::NotifyError;
use crate::store::StoreError;
use crate::validation::ValidationError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] ValidationError),

    #[error("email has already been used to sign")]
    DuplicateEmail,

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration, remaining: u32 },

    #[error("verification token missing")]
    MissingToken,

    #[error("verification token invalid or already used")]
    InvalidToken,

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("notification failed: {0}")]
    Notify(#[from] NotifyError),

    #[error("blocking task failed: {0}")]
    Task(#[from] JoinError),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => AppError::DuplicateEmail,
            other => AppError::Store(other),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Json<Self> {
        Json(Self {
            error: error.into(),
        })
    }
}

impl AppError {
    pub fn status(&self) -> Status {
        match self {
            AppError::InvalidRequest(_)
            | AppError::DuplicateEmail
            | AppError::MissingToken
            | AppError::InvalidToken => Status::BadRequest,
            AppError::RateLimited { .. } => Status::TooManyRequests,
            AppError::Store(_) | AppError::Notify(_) | AppError::Task(_) => {
                Status::InternalServerError
            }
        }
    }

    /// Client-facing message. Server-side failures never leak their cause.
    fn public_message(&self, method: Method) -> &'static str {
        match self {
            AppError::InvalidRequest(_) => "Invalid request body",
            AppError::DuplicateEmail => "This email has already been used to sign",
            AppError::RateLimited { .. } => "Too many requests. Please try again later.",
            AppError::MissingToken => "Verification token is required",
            AppError::InvalidToken => "Invalid or expired verification token",
            AppError::Store(_) | AppError::Notify(_) | AppError::Task(_) => match method {
                Method::Get => "Failed to fetch signatures",
                Method::Post => "Failed to submit signature",
                Method::Put => "Failed to verify signature",
                _ => "Internal server error",
            },
        }
    }
}

impl<'r> Responder<'r, 'static> for AppError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        if status.code >= 500 {
            error!(method = %req.method(), uri = %req.uri(), error = %self, "request failed");
        }

        let body = ErrorBody::new(self.public_message(req.method()));
        let mut res = Response::build_from(body.respond_to(req)?)
            .status(status)
            .finalize();

        if let AppError::RateLimited {
            retry_after,
            remaining,
        } = self
        {
            res.set_raw_header("Retry-After", retry_after.as_secs().to_string());
            res.set_raw_header("X-RateLimit-Remaining", remaining.to_string());
        }

        Ok(res)
    }
}
