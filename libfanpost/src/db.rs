//! Database operations for Fanpost

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{DbError, Result};
use crate::tokens::{Credential, CredentialBackend, CredentialKey};
use crate::types::{PlatformKind, PublishRecord, PublishStatus};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        // Expand path and create parent directories
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // mode=rwc creates the file on first use
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    /// Record one platform outcome of a publish request
    pub async fn record_result(&self, record: &PublishRecord) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO publish_records (request_id, user_id, platform, status, external_id, detail, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.request_id)
        .bind(&record.user_id)
        .bind(record.platform.as_str())
        .bind(record.status.as_str())
        .bind(&record.external_id)
        .bind(&record.detail)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.last_insert_rowid())
    }

    /// Most recent publish outcomes for a user, newest first
    pub async fn publish_history(&self, user_id: &str, limit: usize) -> Result<Vec<PublishRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, request_id, user_id, platform, status, external_id, detail, created_at
            FROM publish_records
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(publish_record_from_row).collect()
    }

    /// All outcomes recorded for one request, in platform insertion order
    pub async fn records_for_request(&self, request_id: &str) -> Result<Vec<PublishRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, request_id, user_id, platform, status, external_id, detail, created_at
            FROM publish_records
            WHERE request_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(publish_record_from_row).collect()
    }
}

fn parse_platform(value: &str) -> Result<PlatformKind> {
    value
        .parse()
        .map_err(|_| DbError::CorruptRow(format!("unknown platform '{}'", value)).into())
}

fn publish_record_from_row(row: &SqliteRow) -> Result<PublishRecord> {
    let platform: String = row.get("platform");
    let status: String = row.get("status");

    Ok(PublishRecord {
        id: Some(row.get("id")),
        request_id: row.get("request_id"),
        user_id: row.get("user_id"),
        platform: parse_platform(&platform)?,
        status: status
            .parse::<PublishStatus>()
            .map_err(|_| DbError::CorruptRow(format!("unknown status '{}'", status)))?,
        external_id: row.get("external_id"),
        detail: row.get("detail"),
        created_at: row.get("created_at"),
    })
}

fn credential_from_row(row: &SqliteRow) -> Result<Credential> {
    let platform: String = row.get("platform");
    let metadata: Option<String> = row.get("metadata");

    let metadata = match metadata {
        Some(json) => serde_json::from_str::<BTreeMap<String, String>>(&json)
            .map_err(|e| DbError::CorruptRow(format!("credential metadata: {}", e)))?,
        None => BTreeMap::new(),
    };

    Ok(Credential {
        user_id: row.get("user_id"),
        platform: parse_platform(&platform)?,
        access_token: row.get("access_token"),
        refresh_token: row.get("refresh_token"),
        expires_at: row.get("expires_at"),
        metadata,
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl CredentialBackend for Database {
    async fn get(&self, key: &CredentialKey) -> Result<Option<Credential>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, platform, access_token, refresh_token, expires_at, metadata, updated_at
            FROM credentials WHERE user_id = ? AND platform = ?
            "#,
        )
        .bind(&key.user_id)
        .bind(key.platform.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.as_ref().map(credential_from_row).transpose()
    }

    async fn upsert(&self, credential: &Credential) -> Result<Credential> {
        // NULL refresh_token / metadata keep the stored values
        let metadata = if credential.metadata.is_empty() {
            None
        } else {
            Some(
                serde_json::to_string(&credential.metadata)
                    .map_err(|e| DbError::CorruptRow(format!("credential metadata: {}", e)))?,
            )
        };

        let row = sqlx::query(
            r#"
            INSERT INTO credentials (user_id, platform, access_token, refresh_token, expires_at, metadata, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, platform) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = COALESCE(excluded.refresh_token, credentials.refresh_token),
                expires_at = excluded.expires_at,
                metadata = COALESCE(excluded.metadata, credentials.metadata),
                updated_at = excluded.updated_at
            RETURNING user_id, platform, access_token, refresh_token, expires_at, metadata, updated_at
            "#,
        )
        .bind(&credential.user_id)
        .bind(credential.platform.as_str())
        .bind(&credential.access_token)
        .bind(&credential.refresh_token)
        .bind(credential.expires_at)
        .bind(metadata)
        .bind(credential.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        credential_from_row(&row)
    }

    async fn delete(&self, key: &CredentialKey) -> Result<bool> {
        let result = sqlx::query("DELETE FROM credentials WHERE user_id = ? AND platform = ?")
            .bind(&key.user_id)
            .bind(key.platform.as_str())
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Credential>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, platform, access_token, refresh_token, expires_at, metadata, updated_at
            FROM credentials WHERE user_id = ?
            ORDER BY platform
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(credential_from_row).collect()
    }

    fn backend_name(&self) -> &str {
        "sqlite"
    }
}
