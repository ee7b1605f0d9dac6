//! Review record store: one immutable row per admin decision.
//!
//! Records are totally ordered per space by their autoincrement id, which is
//! also creation order. Storage triggers reject updates and deletes.

use std::collections::HashMap;
use std::str::FromStr;

use anyhow::anyhow;
use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::WorkflowError;

use super::db::now;
use super::ledger;
use super::models::{ReviewDecision, ReviewRecord};

const RECORD_COLUMNS: &str = "id, space_id, reviewer_id, decision, general_comment, created_at";

struct RecordRow {
    id: i64,
    space_id: i64,
    reviewer_id: i64,
    decision: String,
    general_comment: Option<String>,
    created_at: String,
}

impl RecordRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            space_id: row.get(1)?,
            reviewer_id: row.get(2)?,
            decision: row.get(3)?,
            general_comment: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn into_record(self, issues: Vec<super::models::Issue>) -> Result<ReviewRecord, WorkflowError> {
        let decision = ReviewDecision::from_str(&self.decision).map_err(|e| anyhow!(e))?;
        Ok(ReviewRecord {
            id: self.id,
            space_id: self.space_id,
            reviewer_id: self.reviewer_id,
            decision,
            general_comment: self.general_comment,
            issues,
            created_at: self.created_at,
        })
    }
}

/// Append a decision. Returns the new record id; issues are raised separately
/// through the ledger in the same transaction.
pub fn insert_record(
    conn: &Connection,
    space_id: i64,
    reviewer_id: i64,
    decision: ReviewDecision,
    general_comment: Option<&str>,
) -> Result<i64, WorkflowError> {
    conn.execute(
        "INSERT INTO review_records (space_id, reviewer_id, decision, general_comment, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![space_id, reviewer_id, decision.as_str(), general_comment, now()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_record(conn: &Connection, id: i64) -> Result<Option<ReviewRecord>, WorkflowError> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM review_records WHERE id = ?1", RECORD_COLUMNS),
            params![id],
            RecordRow::from_row,
        )
        .optional()?;
    match row {
        Some(row) => {
            let issues = ledger::issues_for_record(conn, row.id)?;
            Ok(Some(row.into_record(issues)?))
        }
        None => Ok(None),
    }
}

/// Every decision on a space in creation order, each with its issues.
pub fn history(conn: &Connection, space_id: i64) -> Result<Vec<ReviewRecord>, WorkflowError> {
    let mut by_record: HashMap<i64, Vec<super::models::Issue>> = HashMap::new();
    for issue in ledger::issues_for_space(conn, space_id)? {
        by_record.entry(issue.review_record_id).or_default().push(issue);
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM review_records WHERE space_id = ?1 ORDER BY id",
        RECORD_COLUMNS
    ))?;
    let rows = stmt.query_map(params![space_id], RecordRow::from_row)?;
    let mut records = Vec::new();
    for row in rows {
        let row = row?;
        let issues = by_record.remove(&row.id).unwrap_or_default();
        records.push(row.into_record(issues)?);
    }
    Ok(records)
}
