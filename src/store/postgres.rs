use std::error::Error;
use std::time::Duration;

use chrono::Utc;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::{debug, warn};

use super::{RetryPolicy, SignatureStore, StoreError};
use crate::models::{NewSignature, Signature, SignatureForm, SignatureStatus, SignatureVerify};
use crate::schema::signatures;

pub type PgPool = Pool<ConnectionManager<PgConnection>>;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");
const EMAIL_CONSTRAINT: &str = "signatures_email_key";
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(2);

/// Applies pending schema migrations, returning how many ran.
pub fn run_migrations(pool: &PgPool) -> Result<usize, Box<dyn Error + Send + Sync>> {
    let mut pooled = pool.get()?;
    let conn: &mut PgConnection = &mut pooled;
    let applied = conn.run_pending_migrations(MIGRATIONS)?;
    Ok(applied.len())
}

pub struct PgSignatureStore {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PgSignatureStore {
    pub fn connect(url: &str, pool_size: u32, retry: RetryPolicy) -> Result<Self, StoreError> {
        let pool = Pool::builder()
            .max_size(pool_size)
            .connection_timeout(CONNECTION_TIMEOUT)
            .build(ConnectionManager::<PgConnection>::new(url))
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(Self { pool, retry })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn with_conn<T>(
        &self,
        operation: &str,
        mut f: impl FnMut(&mut PgConnection) -> Result<T, DieselError>,
    ) -> Result<T, StoreError> {
        self.retry.run(operation, || {
            let mut conn = self
                .pool
                .get()
                .map_err(|e| StoreError::Connection(e.to_string()))?;
            f(&mut conn).map_err(classify)
        })
    }
}

impl SignatureStore for PgSignatureStore {
    fn find_by_email(&self, email: &str) -> Result<Option<Signature>, StoreError> {
        self.with_conn("find_by_email", |conn| {
            signatures::table
                .filter(signatures::email.eq(email))
                .select(Signature::as_select())
                .first(conn)
                .optional()
        })
    }

    fn insert(&self, form: &SignatureForm, token_digest: &str) -> Result<Signature, StoreError> {
        let inserted = self.with_conn("insert", |conn| {
            diesel::insert_into(signatures::table)
                .values(&NewSignature::pending(form, token_digest))
                .returning(Signature::as_returning())
                .get_result(conn)
        });

        match inserted {
            // A retried insert can collide with its own earlier attempt when
            // the commit landed but the connection dropped before the reply.
            Err(StoreError::DuplicateEmail) => {
                reclaim_own_insert(self.find_by_email(&form.email)?, token_digest)
            }
            other => other,
        }
    }

    fn list_verified(&self, search: Option<&str>) -> Result<Vec<Signature>, StoreError> {
        let pattern = search
            .filter(|term| !term.is_empty())
            .map(|term| format!("%{}%", escape_like(term)));

        self.with_conn("list_verified", |conn| {
            verified_query(pattern.as_deref())
                .select(Signature::as_select())
                .load(conn)
        })
    }

    fn consume_token(&self, token_digest: &str) -> Result<Option<Signature>, StoreError> {
        self.with_conn("consume_token", |conn| {
            diesel::update(
                signatures::table
                    .filter(signatures::verification_token.eq(token_digest))
                    .filter(signatures::status.eq(SignatureStatus::Pending)),
            )
            .set(&SignatureVerify {
                status: SignatureStatus::Verified,
                verified_at: Some(Utc::now()),
            })
            .returning(Signature::as_returning())
            .get_result(conn)
            .optional()
        })
    }
}

/// Verified rows, optionally narrowed by an already escaped `ILIKE` pattern.
fn verified_query(pattern: Option<&str>) -> signatures::BoxedQuery<'static, Pg> {
    let mut query = signatures::table
        .filter(signatures::status.eq(SignatureStatus::Verified))
        .into_boxed();

    if let Some(pattern) = pattern {
        query = query.filter(
            signatures::name
                .ilike(pattern.to_owned())
                .or(signatures::position.ilike(pattern.to_owned()))
                .or(signatures::honors.ilike(pattern.to_owned())),
        );
    }

    query.order((signatures::is_notable.desc(), signatures::created_at.desc()))
}

/// Resolves a duplicate-email insert. The row only counts as ours when it
/// carries the token digest this insert was writing.
fn reclaim_own_insert(
    existing: Option<Signature>,
    token_digest: &str,
) -> Result<Signature, StoreError> {
    match existing {
        Some(row) if row.verification_token == token_digest => {
            warn!(id = %row.id, "insert already committed by an earlier attempt");
            Ok(row)
        }
        _ => Err(StoreError::DuplicateEmail),
    }
}

fn classify(err: DieselError) -> StoreError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info)
            if info.constraint_name() == Some(EMAIL_CONSTRAINT) =>
        {
            debug!("email uniqueness constraint rejected insert");
            StoreError::DuplicateEmail
        }
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, ref info) => {
            StoreError::Connection(info.message().to_owned())
        }
        other => StoreError::Query(other),
    }
}

/// Escapes `LIKE` metacharacters so a search term matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
