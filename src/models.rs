use std::io::Write;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use rocket::serde::Serialize;
use uuid::Uuid;

/// Lifecycle of a signature. Only `Pending -> Verified` is ever performed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsExpression, FromSqlRow, Serialize)]
#[diesel(sql_type = Text)]
#[serde(crate = "rocket::serde", rename_all = "lowercase")]
pub enum SignatureStatus {
    Pending,
    Verified,
    Rejected,
}

impl SignatureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureStatus::Pending => "pending",
            SignatureStatus::Verified => "verified",
            SignatureStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for SignatureStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SignatureStatus::Pending),
            "verified" => Ok(SignatureStatus::Verified),
            "rejected" => Ok(SignatureStatus::Rejected),
            other => Err(format!("unknown signature status `{other}`")),
        }
    }
}

impl ToSql<Text, Pg> for SignatureStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for SignatureStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let raw = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
        raw.parse().map_err(Into::into)
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::signatures)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Signature {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub position: Option<String>,
    pub honors: Option<String>,
    pub is_notable: bool,
    pub status: SignatureStatus,
    /// SHA-256 digest of the token mailed to the signer.
    pub verification_token: String,
    pub created_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
}

/// What the public listing exposes. Never carries the verification token.
#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct PublicSignature {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub position: Option<String>,
    pub honors: Option<String>,
    pub status: SignatureStatus,
    pub created_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub is_notable: bool,
}

impl From<Signature> for PublicSignature {
    fn from(signature: Signature) -> Self {
        Self {
            id: signature.id,
            name: signature.name,
            email: signature.email,
            position: signature.position,
            honors: signature.honors,
            status: signature.status,
            created_at: signature.created_at,
            verified_at: signature.verified_at,
            is_notable: signature.is_notable,
        }
    }
}

/// A submission that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureForm {
    pub name: String,
    pub email: String,
    pub position: Option<String>,
    pub honors: Option<String>,
    pub is_notable: bool,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::signatures)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewSignature<'a> {
    pub id: Uuid,
    pub name: &'a str,
    pub email: &'a str,
    pub position: Option<&'a str>,
    pub honors: Option<&'a str>,
    pub is_notable: bool,
    pub status: SignatureStatus,
    pub verification_token: &'a str,
}

impl<'a> NewSignature<'a> {
    pub fn pending(form: &'a SignatureForm, token_digest: &'a str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: &form.name,
            email: &form.email,
            position: form.position.as_deref(),
            honors: form.honors.as_deref(),
            is_notable: form.is_notable,
            status: SignatureStatus::Pending,
            verification_token: token_digest,
        }
    }
}

#[derive(AsChangeset)]
#[diesel(table_name = crate::schema::signatures)]
pub struct SignatureVerify {
    pub status: SignatureStatus,
    pub verified_at: Option<DateTime<Utc>>,
}
