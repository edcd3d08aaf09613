use std::sync::LazyLock;

use regex::Regex;
use rocket::serde::json::Value;
use thiserror::Error;

use crate::models::SignatureForm;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is valid")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("body is not valid JSON: {0}")]
    NotJson(String),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("field `{0}` is missing")]
    Missing(&'static str),

    #[error("field `{0}` has the wrong type")]
    WrongType(&'static str),

    #[error("name must not be empty")]
    EmptyName,

    #[error("email address is malformed")]
    MalformedEmail,
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

/// Checks the submission shape and returns the accepted fields.
pub fn validate(payload: &Value) -> Result<SignatureForm, ValidationError> {
    let fields = payload.as_object().ok_or(ValidationError::NotAnObject)?;

    let name = required_str(fields.get("name"), "name")?;
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }

    let email = required_str(fields.get("email"), "email")?;
    if !is_valid_email(email) {
        return Err(ValidationError::MalformedEmail);
    }

    let position = optional_str(fields.get("position"), "position")?;
    let honors = optional_str(fields.get("honors"), "honors")?;

    let is_notable = match fields.get("isNotable") {
        None => false,
        Some(value) => value
            .as_bool()
            .ok_or(ValidationError::WrongType("isNotable"))?,
    };

    Ok(SignatureForm {
        name: name.to_owned(),
        email: email.to_owned(),
        position: position.filter(|s| !s.trim().is_empty()).map(str::to_owned),
        honors: honors.filter(|s| !s.trim().is_empty()).map(str::to_owned),
        is_notable,
    })
}

fn required_str<'a>(
    value: Option<&'a Value>,
    field: &'static str,
) -> Result<&'a str, ValidationError> {
    value
        .ok_or(ValidationError::Missing(field))?
        .as_str()
        .ok_or(ValidationError::WrongType(field))
}

fn optional_str<'a>(
    value: Option<&'a Value>,
    field: &'static str,
) -> Result<Option<&'a str>, ValidationError> {
    value
        .map(|v| v.as_str().ok_or(ValidationError::WrongType(field)))
        .transpose()
}
