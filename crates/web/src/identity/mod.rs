//! Application users and the lookups the pipeline needs from them.
//!
//! The identity stage only ever calls [`IdentityStore::find_by_id`]; the
//! authentication route group uses the credential and sign-up operations.

pub mod password;

use rusqlite::{params, ErrorCode, OptionalExtension};
use thiserror::Error;

use common::Identity;

use crate::db::{unix_now, Database, StoreError};
use password::{hash_password, verify_password};

/// Input for [`IdentityStore::create`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Errors from creating a user.
#[derive(Debug, Error)]
pub enum SignUpError {
    #[error("email is already registered")]
    EmailTaken,

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Lookup and registration of application users.
///
/// Calls are synchronous; the pipeline runs them on the blocking pool.
#[cfg_attr(test, mockall::automock)]
pub trait IdentityStore: Send + Sync {
    /// Look up a user by identifier.
    fn find_by_id(&self, id: &str) -> Result<Option<Identity>, StoreError>;

    /// Return the user with `email` if `password` matches.
    fn find_by_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<Identity>, StoreError>;

    /// Register a new user.
    fn create(&self, user: &NewUser) -> Result<Identity, SignUpError>;
}

/// [`IdentityStore`] backed by the `users` table.
#[derive(Clone, Debug)]
pub struct SqliteIdentityStore {
    db: Database,
}

impl SqliteIdentityStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn normalise_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl IdentityStore for SqliteIdentityStore {
    fn find_by_id(&self, id: &str) -> Result<Option<Identity>, StoreError> {
        let identity = self
            .db
            .lock()
            .query_row(
                "SELECT id, name, email FROM users WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Identity {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        email: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(identity)
    }

    fn find_by_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<Identity>, StoreError> {
        let row = self
            .db
            .lock()
            .query_row(
                "SELECT id, name, email, password_hash FROM users WHERE email = ?1",
                params![normalise_email(email)],
                |row| {
                    let identity = Identity {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        email: row.get(2)?,
                    };
                    let phc: String = row.get(3)?;
                    Ok((identity, phc))
                },
            )
            .optional()?;

        Ok(row
            .filter(|(_, phc)| verify_password(password, phc))
            .map(|(identity, _)| identity))
    }

    fn create(&self, user: &NewUser) -> Result<Identity, SignUpError> {
        let identity = Identity {
            id: uuid::Uuid::new_v4().to_string(),
            name: user.name.trim().to_owned(),
            email: normalise_email(&user.email),
        };
        let phc =
            hash_password(&user.password).map_err(|e| SignUpError::Hashing(e.to_string()))?;

        let inserted = self.db.lock().execute(
            "INSERT INTO users (id, name, email, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![identity.id, identity.name, identity.email, phc, unix_now()],
        );

        match inserted {
            Ok(_) => Ok(identity),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(SignUpError::EmailTaken)
            }
            Err(e) => Err(StoreError::from(e).into()),
        }
    }
}
