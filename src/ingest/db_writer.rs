//! Persistence of one file's extraction as a single transaction: measurement
//! rows, profile summaries and the ledger entry commit together or not at all.

use rusqlite::{params, Connection, TransactionBehavior};

use super::extractor::MeasurementRow;
use super::ledger::{self, ContentDigest};
use super::summary::ProfileSummary;
use crate::db::Db;
use crate::error::Result;

/// Result of [`commit_file`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Rows, summaries and ledger entry were written
    Committed { rows: usize, summaries: usize },
    /// Another run recorded this name and digest first; nothing was written
    AlreadyCommitted,
}

/// Commit one file's rows and summaries and record it in the ledger.
///
/// Runs inside one IMMEDIATE transaction:
/// 1. re-check the ledger, returning `AlreadyCommitted` if the same digest is
///    recorded (a racing worker won)
/// 2. when the name is recorded with a different digest, delete the rows the
///    previous version inserted
/// 3. insert rows in batches of `batch_size`
/// 4. insert summaries, leaving any existing profile key untouched
/// 5. upsert the ledger entry
///
/// Any error rolls the whole transaction back.
pub async fn commit_file(
    db: &Db,
    file_name: &str,
    digest: &ContentDigest,
    rows: Vec<MeasurementRow>,
    summaries: Vec<ProfileSummary>,
    batch_size: usize,
) -> Result<CommitOutcome> {
    let file_name = file_name.to_string();
    let digest = digest.clone();

    db.with_connection(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        match ledger::stored_digest_in(&tx, &file_name)? {
            Some(stored) if stored == digest => {
                log::info!("{} was committed by another worker, discarding", file_name);
                return Ok(CommitOutcome::AlreadyCommitted);
            }
            Some(_) => {
                let removed = tx.execute(
                    "DELETE FROM profiles WHERE source_file = ?1",
                    params![file_name],
                )?;
                log::info!("{} changed since last ingestion, replacing {} rows", file_name, removed);
            }
            None => {}
        }

        let row_count = insert_rows(&tx, &rows, batch_size)?;
        let summary_count = insert_summaries(&tx, &summaries)?;
        ledger::record(&tx, &file_name, &digest, row_count)?;

        tx.commit()?;
        Ok(CommitOutcome::Committed { rows: row_count, summaries: summary_count })
    })
    .await
}

/// Insert measurement rows, one prepared statement per batch
fn insert_rows(conn: &Connection, rows: &[MeasurementRow], batch_size: usize) -> Result<usize> {
    let mut count = 0;

    for batch in rows.chunks(batch_size.max(1)) {
        let mut stmt = conn.prepare_cached(
            r#"
            INSERT INTO profiles (
                float_id, profile_index, cycle, time, latitude, longitude,
                depth, temperature, salinity, qc, source_file, raw_metadata
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )?;

        for row in batch {
            stmt.execute(params![
                row.float_id,
                row.profile_index as i64,
                row.cycle,
                row.time.to_rfc3339(),
                row.latitude,
                row.longitude,
                row.depth,
                row.temperature,
                row.salinity,
                row.qc,
                row.source_file,
                row.metadata.to_string(),
            ])?;
        }

        count += batch.len();
        log::debug!("Inserted {} rows", count);
    }

    Ok(count)
}

/// Insert summaries; an existing profile key wins over a re-derived one.
/// Returns the number of summaries actually written.
fn insert_summaries(conn: &Connection, summaries: &[ProfileSummary]) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        r#"
        INSERT INTO profile_summaries (
            profile_key, float_id, time, latitude, longitude, n_levels,
            min_depth, max_depth, mean_temperature, mean_salinity,
            temp_surface, sal_surface, variables, raw_metadata
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        ON CONFLICT(profile_key) DO NOTHING
        "#,
    )?;

    let mut written = 0;
    for s in summaries {
        let variables = serde_json::to_string(&s.variables)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        written += stmt.execute(params![
            s.profile_key,
            s.float_id,
            s.time.to_rfc3339(),
            s.latitude,
            s.longitude,
            s.n_levels as i64,
            s.min_depth,
            s.max_depth,
            s.mean_temperature,
            s.mean_salinity,
            s.surface_temperature,
            s.surface_salinity,
            variables,
            s.metadata.to_string(),
        ])?;
    }

    Ok(written)
}
