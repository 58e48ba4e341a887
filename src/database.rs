//! SQLite-backed credential repository
//!
//! Durable counterpart to the in-memory repository in
//! [`crate::credentials`]. The flow controller only sees the
//! [`CredentialRepository`] trait, so deployments pick a backing store
//! through configuration alone.

use crate::credentials::{check_counter, Credential, CredentialRepository};
use crate::error::{RpError, RpResult};
use crate::identity::UserId;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS credentials (
        credential_id TEXT PRIMARY KEY,
        user_id       TEXT NOT NULL,
        public_key    TEXT NOT NULL,
        counter       INTEGER NOT NULL,
        transports    TEXT NOT NULL,
        created_at    TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_credentials_user ON credentials(user_id)",
];

/// Initialize the database and create the schema.
pub async fn init_db(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(path) = database_url.strip_prefix("sqlite://") {
        if let Some(parent) = std::path::Path::new(path).parent() {
            std::fs::create_dir_all(parent).ok();
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    for statement in SCHEMA {
        sqlx::query(statement).execute(&pool).await?;
    }

    Ok(pool)
}

pub struct SqliteCredentialRepository {
    pool: SqlitePool,
}

impl SqliteCredentialRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        Ok(Self::new(init_db(database_url).await?))
    }

    fn row_to_credential(row: &sqlx::sqlite::SqliteRow) -> RpResult<Credential> {
        let transports: String = row.get("transports");
        let counter: i64 = row.get("counter");
        Ok(Credential {
            credential_id: row.get("credential_id"),
            public_key: row.get("public_key"),
            counter: counter as u32,
            transports: serde_json::from_str(&transports)
                .map_err(|e| RpError::Internal(format!("corrupt transports column: {e}")))?,
        })
    }
}

#[async_trait]
impl CredentialRepository for SqliteCredentialRepository {
    async fn list_credentials(&self, user: &UserId) -> RpResult<Vec<Credential>> {
        let rows = sqlx::query(
            r#"
            SELECT credential_id, public_key, counter, transports
            FROM credentials
            WHERE user_id = ?1
            ORDER BY created_at, credential_id
            "#,
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_credential).collect()
    }

    async fn add_credential(&self, user: &UserId, credential: Credential) -> RpResult<()> {
        let transports = serde_json::to_string(&credential.transports)
            .map_err(|e| RpError::Internal(e.to_string()))?;
        let now = Utc::now().naive_utc();

        // The transaction makes check-then-insert atomic; the primary key
        // backs it up against anything that slips through.
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query("SELECT 1 FROM credentials WHERE credential_id = ?1")
            .bind(&credential.credential_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_some() {
            return Err(RpError::DuplicateCredential);
        }

        sqlx::query(
            r#"
            INSERT INTO credentials (credential_id, user_id, public_key, counter, transports, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&credential.credential_id)
        .bind(user.as_str())
        .bind(&credential.public_key)
        .bind(credential.counter as i64)
        .bind(&transports)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_credential(
        &self,
        user: &UserId,
        credential_id: &str,
    ) -> RpResult<Option<Credential>> {
        let row = sqlx::query(
            r#"
            SELECT credential_id, public_key, counter, transports
            FROM credentials
            WHERE user_id = ?1 AND credential_id = ?2
            "#,
        )
        .bind(user.as_str())
        .bind(credential_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_credential).transpose()
    }

    async fn update_counter(
        &self,
        user: &UserId,
        credential_id: &str,
        new_counter: u32,
    ) -> RpResult<()> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT counter FROM credentials WHERE user_id = ?1 AND credential_id = ?2",
        )
        .bind(user.as_str())
        .bind(credential_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RpError::UnknownCredential)?;

        let stored: i64 = row.get("counter");
        check_counter(stored as u32, new_counter)?;

        if i64::from(new_counter) > stored {
            sqlx::query(
                "UPDATE credentials SET counter = ?1 WHERE user_id = ?2 AND credential_id = ?3",
            )
            .bind(new_counter as i64)
            .bind(user.as_str())
            .bind(credential_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
