//! Query repository — CRUD operations for the `queries` table.
//!
//! The store is the single source of truth for query state. Overall status
//! is never written independently of the stage map: every stage transition
//! recomputes it through [`derive_status`], so the dominance rule cannot be
//! violated by a caller.

use rusqlite::{params, Row};

use super::error::StoreError;
use super::status::{derive_status, QueryStatus, Stage, StageMap, StageState};
use super::{now_rfc3339, Database};

/// A query row from the status store.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRecord {
    pub query_id: String,
    pub owner: Option<String>,
    pub status: QueryStatus,
    pub stages: StageMap,
    pub created_at: String,
    pub updated_at: String,
    pub result_path: Option<String>,
    pub error_message: Option<String>,
    pub verdict: Option<String>,
}

impl QueryRecord {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let stages_raw: String = row.get("stages")?;
        let stages: StageMap = serde_json::from_str(&stages_raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?;

        let status_raw: String = row.get("status")?;
        let status = QueryStatus::parse(&status_raw).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("unknown status '{}'", status_raw),
                )),
            )
        })?;

        Ok(Self {
            query_id: row.get("query_id")?,
            owner: row.get("owner")?,
            status,
            stages,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            result_path: row.get("result_path")?,
            error_message: row.get("error_message")?,
            verdict: row.get("verdict")?,
        })
    }

    /// Relative filesystem path for this query: `owner/query_id`, or the
    /// bare `query_id` for ownerless queries.
    pub fn rel_path(&self) -> std::path::PathBuf {
        match &self.owner {
            Some(owner) => std::path::Path::new(owner).join(&self.query_id),
            None => std::path::PathBuf::from(&self.query_id),
        }
    }
}

/// Registers a new query with all stages pending.
///
/// Idempotent from the caller's perspective: a duplicate `query_id` is
/// logged and ignored, so the watcher can re-observe a directory without
/// clobbering an in-flight record.
pub fn insert(db: &Database, query_id: &str, owner: Option<&str>) -> Result<(), StoreError> {
    db.with_conn(|conn| {
        let now = now_rfc3339();
        let stages = serde_json::to_string(&StageMap::default())
            .map_err(|e| StoreError::CorruptStageMap {
                query_id: query_id.to_string(),
                reason: e.to_string(),
            })?;

        let result = conn.execute(
            "INSERT INTO queries (query_id, owner, status, stages, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                query_id,
                owner,
                QueryStatus::Pending.as_str(),
                stages,
                now,
                now
            ],
        );

        match result {
            Ok(_) => {
                log::info!("Query '{}' registered (owner: {:?})", query_id, owner);
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                log::warn!("Query '{}' already registered, skipping", query_id);
                Ok(())
            }
            Err(e) => Err(StoreError::Sqlite(e)),
        }
    })
}

/// Updates one stage's state and recomputes the overall status from the
/// full stage map. `error` is stored only when the new state is `Failed`;
/// any other transition clears a previously recorded error.
///
/// Safe to call redundantly with the same `(query_id, stage, state)` —
/// the resulting record is identical apart from `updated_at`, which is what
/// makes a crashed-and-requeued job harmless to reprocess.
pub fn advance_stage(
    db: &Database,
    query_id: &str,
    stage: Stage,
    new_state: StageState,
    error: Option<&str>,
) -> Result<(), StoreError> {
    db.with_conn(|conn| {
        let stages_raw: Option<String> = conn
            .query_row(
                "SELECT stages FROM queries WHERE query_id = ?1",
                params![query_id],
                |r| r.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        let stages_raw = stages_raw.ok_or_else(|| StoreError::QueryNotFound(query_id.to_string()))?;
        let mut stages: StageMap =
            serde_json::from_str(&stages_raw).map_err(|e| StoreError::CorruptStageMap {
                query_id: query_id.to_string(),
                reason: e.to_string(),
            })?;

        stages.set(stage, new_state);
        let status = derive_status(&stages);
        let stages_json =
            serde_json::to_string(&stages).map_err(|e| StoreError::CorruptStageMap {
                query_id: query_id.to_string(),
                reason: e.to_string(),
            })?;
        let error_message = if new_state == StageState::Failed {
            error
        } else {
            None
        };

        conn.execute(
            "UPDATE queries
             SET status = ?2, stages = ?3, updated_at = ?4, error_message = ?5
             WHERE query_id = ?1",
            params![
                query_id,
                status.as_str(),
                stages_json,
                now_rfc3339(),
                error_message
            ],
        )?;

        log::info!(
            "Status updated for '{}': stage '{}' -> '{}'",
            query_id,
            stage,
            new_state
        );
        Ok(())
    })
}

/// Sets the final report artifact path for a query.
pub fn set_result_path(db: &Database, query_id: &str, path: &str) -> Result<(), StoreError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE queries SET result_path = ?2, updated_at = ?3 WHERE query_id = ?1",
            params![query_id, path, now_rfc3339()],
        )?;
        if changed == 0 {
            return Err(StoreError::QueryNotFound(query_id.to_string()));
        }
        Ok(())
    })
}

/// Sets the best-effort verdict label for a query.
pub fn set_verdict(db: &Database, query_id: &str, verdict: &str) -> Result<(), StoreError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE queries SET verdict = ?2, updated_at = ?3 WHERE query_id = ?1",
            params![query_id, verdict, now_rfc3339()],
        )?;
        if changed == 0 {
            return Err(StoreError::QueryNotFound(query_id.to_string()));
        }
        Ok(())
    })
}

/// Restores all stages to pending and clears run-scoped fields. Used by
/// rerun and restore; the next worker pass sees a brand-new run.
pub fn reset(db: &Database, query_id: &str) -> Result<(), StoreError> {
    db.with_conn(|conn| {
        let stages = serde_json::to_string(&StageMap::default())
            .map_err(|e| StoreError::CorruptStageMap {
                query_id: query_id.to_string(),
                reason: e.to_string(),
            })?;
        let changed = conn.execute(
            "UPDATE queries
             SET status = ?2, stages = ?3, updated_at = ?4,
                 result_path = NULL, error_message = NULL
             WHERE query_id = ?1",
            params![
                query_id,
                QueryStatus::Pending.as_str(),
                stages,
                now_rfc3339()
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::QueryNotFound(query_id.to_string()));
        }
        log::info!("Query '{}' has been reset for reprocessing", query_id);
        Ok(())
    })
}

/// Finds a query by its ID.
pub fn get(db: &Database, query_id: &str) -> Result<Option<QueryRecord>, StoreError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM queries WHERE query_id = ?1")?;
        let mut rows = stmt.query_map(params![query_id], QueryRecord::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(StoreError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Lists queries, optionally filtered by owner, newest first.
///
/// The `created_at DESC` ordering is a contract: status consumers render
/// this list directly and rely on most-recent-first.
pub fn list(db: &Database, owner: Option<&str>) -> Result<Vec<QueryRecord>, StoreError> {
    db.with_conn(|conn| {
        let records = match owner {
            Some(owner) => {
                let mut stmt = conn.prepare(
                    "SELECT * FROM queries WHERE owner = ?1 ORDER BY created_at DESC",
                )?;
                let rows = stmt.query_map(params![owner], QueryRecord::from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt =
                    conn.prepare("SELECT * FROM queries ORDER BY created_at DESC")?;
                let rows = stmt.query_map([], QueryRecord::from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(records)
    })
}

/// Marks a query as trashed without touching stage data, so trash stays
/// reversible.
pub fn mark_trashed(db: &Database, query_id: &str) -> Result<(), StoreError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE queries SET status = ?2, updated_at = ?3 WHERE query_id = ?1",
            params![query_id, QueryStatus::Trashed.as_str(), now_rfc3339()],
        )?;
        if changed == 0 {
            return Err(StoreError::QueryNotFound(query_id.to_string()));
        }
        Ok(())
    })
}

/// Permanently removes the record. Idempotent — deleting an absent record
/// is a no-op, which keeps purge retryable after a partial failure.
pub fn delete(db: &Database, query_id: &str) -> Result<(), StoreError> {
    db.with_conn(|conn| {
        conn.execute("DELETE FROM queries WHERE query_id = ?1", params![query_id])?;
        Ok(())
    })
}
