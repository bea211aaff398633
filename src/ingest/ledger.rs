//! Checksum ledger: which source files have been durably ingested, keyed by
//! file name and identified by a SHA-256 digest of their full content.
//!
//! A file whose name is recorded with the same digest is skipped. The same
//! name with a different digest is a legitimate re-ingestion (e.g. corrected
//! data) and overwrites the entry once its commit succeeds.

use std::fmt;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};

use crate::db::Db;
use crate::error::Result;

/// Lowercase hex SHA-256 of a file's bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentDigest(String);

impl ContentDigest {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ContentDigest {
    fn from(hex: String) -> Self {
        Self(hex)
    }
}

/// One ledger row
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub filename: String,
    pub digest: ContentDigest,
    pub processed_at: DateTime<Utc>,
    pub rows_inserted: usize,
}

/// Compute the content digest of a file's bytes
pub fn digest_of(bytes: &[u8]) -> ContentDigest {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    ContentDigest(format!("{:x}", hasher.finalize()))
}

/// True iff `name` is recorded with exactly this digest
pub async fn is_processed(db: &Db, name: &str, digest: &ContentDigest) -> Result<bool> {
    let name = name.to_string();
    let digest = digest.clone();
    db.with_connection(move |conn| is_processed_in(conn, &name, &digest)).await
}

/// [`is_processed`] against an open connection or transaction
pub fn is_processed_in(conn: &Connection, name: &str, digest: &ContentDigest) -> Result<bool> {
    Ok(stored_digest_in(conn, name)?.as_ref() == Some(digest))
}

/// Stored digest for `name`, if any
pub fn stored_digest_in(conn: &Connection, name: &str) -> Result<Option<ContentDigest>> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT file_hash FROM ingest_files WHERE filename = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(stored.map(ContentDigest))
}

/// Upsert the entry for `name`. Only the persistence coordinator calls this,
/// inside the transaction that writes the file's rows.
pub fn record(conn: &Connection, name: &str, digest: &ContentDigest, rows_inserted: usize) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO ingest_files (filename, file_hash, processed_at, rows_inserted)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(filename) DO UPDATE SET
            file_hash = excluded.file_hash,
            processed_at = excluded.processed_at,
            rows_inserted = excluded.rows_inserted
        "#,
        params![name, digest.as_str(), Utc::now().to_rfc3339(), rows_inserted as i64],
    )?;
    Ok(())
}

/// Look up the ledger entry for `name`
pub async fn get_entry(db: &Db, name: &str) -> Result<Option<LedgerEntry>> {
    let name = name.to_string();
    db.with_connection(move |conn| {
        let row = conn
            .query_row(
                "SELECT filename, file_hash, processed_at, rows_inserted FROM ingest_files WHERE filename = ?1",
                params![name],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(filename, hash, processed_at, rows)| {
            let processed_at = DateTime::parse_from_rfc3339(&processed_at)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?
                .with_timezone(&Utc);
            Ok(LedgerEntry {
                filename,
                digest: ContentDigest(hash),
                processed_at,
                rows_inserted: rows.max(0) as usize,
            })
        })
        .transpose()
    })
    .await
}
