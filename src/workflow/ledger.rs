//! Issue ledger.
//!
//! Field-level correction requests, keyed per field across review rounds: a
//! space never has two unresolved issues on the same field. An issue leaves
//! the open set only through [`resolve`], which the resubmission reconciler
//! drives. Nothing here deletes or rewrites an issue.
//!
//! Every function takes a plain `&Connection` so the orchestrator can run it
//! inside its own transaction.

use std::str::FromStr;

use anyhow::anyhow;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};

use crate::errors::WorkflowError;

use super::db::now;
use super::fields::FieldKey;
use super::models::{Issue, Severity};

/// A validated issue ready to be raised.
#[derive(Debug, Clone, PartialEq)]
pub struct NewIssue {
    pub field: FieldKey,
    pub comment: String,
    pub severity: Option<Severity>,
}

const ISSUE_COLUMNS: &str =
    "id, review_record_id, space_id, field, comment, severity, resolved, resolved_at, created_at";

struct IssueRow {
    id: i64,
    review_record_id: i64,
    space_id: i64,
    field: String,
    comment: String,
    severity: Option<String>,
    resolved: bool,
    resolved_at: Option<String>,
    created_at: String,
}

impl IssueRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            review_record_id: row.get(1)?,
            space_id: row.get(2)?,
            field: row.get(3)?,
            comment: row.get(4)?,
            severity: row.get(5)?,
            resolved: row.get(6)?,
            resolved_at: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn into_issue(self) -> Result<Issue, WorkflowError> {
        let field = FieldKey::from_str(&self.field)
            .map_err(|_| anyhow!("Corrupt field key '{}' on issue {}", self.field, self.id))?;
        let severity = self
            .severity
            .as_deref()
            .map(Severity::from_str)
            .transpose()
            .map_err(|e| anyhow!(e))?;
        Ok(Issue {
            id: self.id,
            review_record_id: self.review_record_id,
            space_id: self.space_id,
            field,
            comment: self.comment,
            severity,
            resolved: self.resolved,
            resolved_at: self.resolved_at,
            created_at: self.created_at,
        })
    }
}

fn query_issues(
    conn: &Connection,
    filter: &str,
    param: i64,
) -> Result<Vec<Issue>, WorkflowError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM review_issues WHERE {} ORDER BY review_record_id, id",
        ISSUE_COLUMNS, filter
    ))?;
    let rows = stmt.query_map(params![param], IssueRow::from_row)?;
    let mut issues = Vec::new();
    for row in rows {
        issues.push(row?.into_issue()?);
    }
    Ok(issues)
}

/// All unresolved issues for a space, in the order their rounds were recorded.
pub fn open_issues(conn: &Connection, space_id: i64) -> Result<Vec<Issue>, WorkflowError> {
    query_issues(conn, "space_id = ?1 AND resolved = 0", space_id)
}

/// Every issue ever raised on a space, resolved or not.
pub fn issues_for_space(conn: &Connection, space_id: i64) -> Result<Vec<Issue>, WorkflowError> {
    query_issues(conn, "space_id = ?1", space_id)
}

pub fn issues_for_record(conn: &Connection, review_record_id: i64) -> Result<Vec<Issue>, WorkflowError> {
    query_issues(conn, "review_record_id = ?1", review_record_id)
}

pub fn get_issue(conn: &Connection, id: i64) -> Result<Option<Issue>, WorkflowError> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM review_issues WHERE id = ?1", ISSUE_COLUMNS),
            params![id],
            IssueRow::from_row,
        )
        .optional()?;
    row.map(IssueRow::into_issue).transpose()
}

/// Raise one issue under an existing review record.
///
/// Fails with `DuplicateFieldIssue` if the space already has an open issue on
/// the same field, whichever round raised it.
pub fn raise(conn: &Connection, review_record_id: i64, issue: &NewIssue) -> Result<Issue, WorkflowError> {
    let space_id: i64 = conn
        .query_row(
            "SELECT space_id FROM review_records WHERE id = ?1",
            params![review_record_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| anyhow!("Review record {} not found", review_record_id))?;

    let duplicate = || WorkflowError::DuplicateFieldIssue {
        space_id,
        field: issue.field.as_str().to_string(),
    };

    let already_open: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM review_issues WHERE space_id = ?1 AND field = ?2 AND resolved = 0",
        params![space_id, issue.field.as_str()],
        |row| row.get(0),
    )?;
    if already_open {
        return Err(duplicate());
    }

    let inserted = conn.execute(
        "INSERT INTO review_issues (review_record_id, space_id, field, comment, severity, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            review_record_id,
            space_id,
            issue.field.as_str(),
            issue.comment,
            issue.severity.map(|s| s.as_str()),
            now()
        ],
    );
    match inserted {
        Ok(_) => {}
        // The partial unique index is the last line of defence.
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            return Err(duplicate());
        }
        Err(e) => return Err(e.into()),
    }

    let id = conn.last_insert_rowid();
    get_issue(conn, id)?.ok_or(WorkflowError::IssueNotFound { id })
}

/// Mark an issue resolved. Resolving an already-resolved issue is a no-op and
/// keeps its original `resolved_at`.
pub fn resolve(conn: &Connection, issue_id: i64) -> Result<Issue, WorkflowError> {
    conn.execute(
        "UPDATE review_issues SET resolved = 1, resolved_at = ?1 WHERE id = ?2 AND resolved = 0",
        params![now(), issue_id],
    )?;
    get_issue(conn, issue_id)?.ok_or(WorkflowError::IssueNotFound { id: issue_id })
}
