use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use rusqlite::{Connection, OptionalExtension, Transaction, params};

use crate::errors::WorkflowError;

use super::fields::SpaceFields;
use super::models::{Space, SpaceFilter, SpaceStatus};

/// Async-safe handle to the review database.
///
/// Wraps `ReviewDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O never
/// ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<ReviewDb>>,
}

impl DbHandle {
    pub fn new(db: ReviewDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R, WorkflowError>
    where
        F: FnOnce(&ReviewDb) -> Result<R, WorkflowError> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| WorkflowError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .map_err(|e| WorkflowError::Other(anyhow!("DB task panicked: {}", e)))?
    }
}

pub struct ReviewDb {
    conn: Connection,
}

impl ReviewDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> anyhow::Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> anyhow::Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> anyhow::Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS spaces (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    owner_id INTEGER NOT NULL,
                    status TEXT NOT NULL DEFAULT 'pending'
                        CHECK (status IN ('pending', 'under_review', 'verified', 'rejected')),
                    fields TEXT NOT NULL DEFAULT '{}',
                    version INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS review_records (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    space_id INTEGER NOT NULL REFERENCES spaces(id),
                    reviewer_id INTEGER NOT NULL,
                    decision TEXT NOT NULL
                        CHECK (decision IN ('approve', 'request_changes', 'reject')),
                    general_comment TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS review_issues (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    review_record_id INTEGER NOT NULL REFERENCES review_records(id),
                    space_id INTEGER NOT NULL REFERENCES spaces(id),
                    field TEXT NOT NULL,
                    comment TEXT NOT NULL,
                    severity TEXT,
                    resolved INTEGER NOT NULL DEFAULT 0,
                    resolved_at TEXT,
                    created_at TEXT NOT NULL,
                    CHECK ((resolved = 0 AND resolved_at IS NULL)
                        OR (resolved = 1 AND resolved_at IS NOT NULL))
                );

                CREATE INDEX IF NOT EXISTS idx_spaces_status ON spaces(status);
                CREATE INDEX IF NOT EXISTS idx_spaces_owner ON spaces(owner_id);
                CREATE INDEX IF NOT EXISTS idx_review_records_space ON review_records(space_id, id);
                CREATE INDEX IF NOT EXISTS idx_review_issues_record ON review_issues(review_record_id);

                -- At most one open issue per field per space.
                CREATE UNIQUE INDEX IF NOT EXISTS idx_review_issues_open_field
                    ON review_issues(space_id, field) WHERE resolved = 0;
                ",
            )
            .context("Failed to create tables")?;

        // Review history is append-only; issues may only flip to resolved.
        self.conn
            .execute_batch(
                "
                CREATE TRIGGER IF NOT EXISTS review_records_no_update
                BEFORE UPDATE ON review_records
                BEGIN
                    SELECT RAISE(ABORT, 'review records are append-only');
                END;

                CREATE TRIGGER IF NOT EXISTS review_records_no_delete
                BEFORE DELETE ON review_records
                BEGIN
                    SELECT RAISE(ABORT, 'review records are append-only');
                END;

                CREATE TRIGGER IF NOT EXISTS review_issues_no_delete
                BEFORE DELETE ON review_issues
                BEGIN
                    SELECT RAISE(ABORT, 'review issues are append-only');
                END;

                CREATE TRIGGER IF NOT EXISTS review_issues_resolve_only
                BEFORE UPDATE ON review_issues
                WHEN OLD.resolved = 1
                    OR NEW.resolved = 0
                    OR NEW.field IS NOT OLD.field
                    OR NEW.comment IS NOT OLD.comment
                    OR NEW.severity IS NOT OLD.severity
                    OR NEW.review_record_id IS NOT OLD.review_record_id
                    OR NEW.space_id IS NOT OLD.space_id
                BEGIN
                    SELECT RAISE(ABORT, 'review issues can only be resolved once');
                END;
                ",
            )
            .context("Failed to create append-only triggers")?;

        Ok(())
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside a transaction. Any error rolls back everything `f` did.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, WorkflowError>,
    ) -> Result<T, WorkflowError> {
        // unchecked_transaction: DbHandle's Mutex already guarantees exclusive access.
        let tx = self.conn.unchecked_transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

/// Current UTC time with millisecond precision.
pub fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

// ── Space rows ────────────────────────────────────────────────────────

const SPACE_COLUMNS: &str = "id, owner_id, status, fields, version, created_at, updated_at";

struct SpaceRow {
    id: i64,
    owner_id: i64,
    status: String,
    fields: String,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl SpaceRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            status: row.get(2)?,
            fields: row.get(3)?,
            version: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_space(self) -> Result<Space, WorkflowError> {
        let status = self
            .status
            .parse::<SpaceStatus>()
            .map_err(|e| anyhow!(e))?;
        let fields: SpaceFields = serde_json::from_str(&self.fields)
            .with_context(|| format!("Corrupt fields for space {}", self.id))?;
        Ok(Space {
            id: self.id,
            owner_id: self.owner_id,
            status,
            fields,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn encode_fields(fields: &SpaceFields) -> Result<String, WorkflowError> {
    Ok(serde_json::to_string(fields).context("Failed to encode space fields")?)
}

pub fn insert_space(conn: &Connection, owner_id: i64, fields: &SpaceFields) -> Result<Space, WorkflowError> {
    let ts = now();
    conn.execute(
        "INSERT INTO spaces (owner_id, status, fields, version, created_at, updated_at)
         VALUES (?1, ?2, ?3, 1, ?4, ?4)",
        params![owner_id, SpaceStatus::Pending.as_str(), encode_fields(fields)?, ts],
    )?;
    let id = conn.last_insert_rowid();
    require_space(conn, id)
}

pub fn get_space(conn: &Connection, id: i64) -> Result<Option<Space>, WorkflowError> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM spaces WHERE id = ?1", SPACE_COLUMNS),
            params![id],
            SpaceRow::from_row,
        )
        .optional()?;
    row.map(SpaceRow::into_space).transpose()
}

pub fn require_space(conn: &Connection, id: i64) -> Result<Space, WorkflowError> {
    get_space(conn, id)?.ok_or(WorkflowError::SpaceNotFound { id })
}

/// Persist a status change. Domain fields are untouched.
pub fn set_status(conn: &Connection, id: i64, status: SpaceStatus) -> Result<(), WorkflowError> {
    let changed = conn.execute(
        "UPDATE spaces SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), now(), id],
    )?;
    if changed == 0 {
        return Err(WorkflowError::SpaceNotFound { id });
    }
    Ok(())
}

/// Replace the field bag and bump the version. Status is untouched.
pub fn set_fields(conn: &Connection, id: i64, fields: &SpaceFields) -> Result<(), WorkflowError> {
    let changed = conn.execute(
        "UPDATE spaces SET fields = ?1, version = version + 1, updated_at = ?2 WHERE id = ?3",
        params![encode_fields(fields)?, now(), id],
    )?;
    if changed == 0 {
        return Err(WorkflowError::SpaceNotFound { id });
    }
    Ok(())
}

/// Search text matches literally: `%`, `_` and `\` lose their LIKE meaning.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub fn list_spaces(conn: &Connection, filter: &SpaceFilter) -> Result<Vec<Space>, WorkflowError> {
    let status = filter.status.map(|s| s.as_str());
    let pattern = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", escape_like(&s.to_lowercase())));

    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM spaces
         WHERE (?1 IS NULL OR status = ?1)
           AND (?2 IS NULL OR owner_id = ?2)
           AND (?3 IS NULL OR LOWER(COALESCE(json_extract(fields, '$.name'), '')) LIKE ?3 ESCAPE '\\')
         ORDER BY id",
        SPACE_COLUMNS
    ))?;
    let rows = stmt.query_map(params![status, filter.owner_id, pattern], SpaceRow::from_row)?;
    let mut spaces = Vec::new();
    for row in rows {
        spaces.push(row?.into_space()?);
    }
    Ok(spaces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::fields::FieldKey;
    use serde_json::json;

    fn fields(name: &str) -> SpaceFields {
        SpaceFields::from([
            (FieldKey::Name, json!(name)),
            (FieldKey::Capacity, json!(120)),
        ])
    }

    #[test]
    fn test_create_database_and_run_migrations() -> anyhow::Result<()> {
        let db = ReviewDb::new_in_memory()?;
        let tables: Vec<String> = {
            let mut stmt = db
                .conn()
                .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
            stmt.query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?
        };
        assert!(tables.contains(&"spaces".to_string()));
        assert!(tables.contains(&"review_records".to_string()));
        assert!(tables.contains(&"review_issues".to_string()));
        Ok(())
    }

    #[test]
    fn test_migrations_are_idempotent() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("review.db");
        {
            let db = ReviewDb::new(&path)?;
            insert_space(db.conn(), 1, &fields("Cine Rex"))?;
        }
        let db = ReviewDb::new(&path)?;
        assert!(get_space(db.conn(), 1)?.is_some());
        Ok(())
    }

    #[test]
    fn test_insert_space_starts_pending() -> anyhow::Result<()> {
        let db = ReviewDb::new_in_memory()?;
        let space = insert_space(db.conn(), 42, &fields("Cine Rex"))?;
        assert_eq!(space.owner_id, 42);
        assert_eq!(space.status, SpaceStatus::Pending);
        assert_eq!(space.version, 1);
        assert_eq!(space.fields.get(&FieldKey::Capacity), Some(&json!(120)));
        Ok(())
    }

    #[test]
    fn test_require_space_not_found() -> anyhow::Result<()> {
        let db = ReviewDb::new_in_memory()?;
        match require_space(db.conn(), 999) {
            Err(WorkflowError::SpaceNotFound { id }) => assert_eq!(id, 999),
            other => panic!("Expected SpaceNotFound, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_set_fields_bumps_version_and_keeps_status() -> anyhow::Result<()> {
        let db = ReviewDb::new_in_memory()?;
        let space = insert_space(db.conn(), 1, &fields("Old"))?;
        set_status(db.conn(), space.id, SpaceStatus::UnderReview)?;
        set_fields(db.conn(), space.id, &fields("New"))?;
        let space = require_space(db.conn(), space.id)?;
        assert_eq!(space.version, 2);
        assert_eq!(space.status, SpaceStatus::UnderReview);
        assert_eq!(space.fields.get(&FieldKey::Name), Some(&json!("New")));
        Ok(())
    }

    #[test]
    fn test_status_column_rejects_unknown_values() -> anyhow::Result<()> {
        let db = ReviewDb::new_in_memory()?;
        let space = insert_space(db.conn(), 1, &fields("Rex"))?;
        let result = db.conn().execute(
            "UPDATE spaces SET status = 'archived' WHERE id = ?1",
            params![space.id],
        );
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn test_transaction_rolls_back_on_error() -> anyhow::Result<()> {
        let db = ReviewDb::new_in_memory()?;
        let space = insert_space(db.conn(), 1, &fields("Rex"))?;
        let result: Result<(), WorkflowError> = db.transaction(|tx| {
            set_status(tx, space.id, SpaceStatus::UnderReview)?;
            Err(WorkflowError::SpaceNotFound { id: 0 })
        });
        assert!(result.is_err());
        assert_eq!(require_space(db.conn(), space.id)?.status, SpaceStatus::Pending);
        Ok(())
    }

    #[test]
    fn test_list_spaces_filters() -> anyhow::Result<()> {
        let db = ReviewDb::new_in_memory()?;
        let rex = insert_space(db.conn(), 1, &fields("Cine Rex"))?;
        insert_space(db.conn(), 2, &fields("Sala Azul"))?;
        insert_space(db.conn(), 1, &fields("Teatro Rex"))?;
        set_status(db.conn(), rex.id, SpaceStatus::UnderReview)?;

        let all = list_spaces(db.conn(), &SpaceFilter::default())?;
        assert_eq!(all.len(), 3);

        let by_search = list_spaces(
            db.conn(),
            &SpaceFilter {
                search: Some("rex".into()),
                ..Default::default()
            },
        )?;
        assert_eq!(by_search.len(), 2);

        let by_status = list_spaces(
            db.conn(),
            &SpaceFilter {
                status: Some(SpaceStatus::UnderReview),
                ..Default::default()
            },
        )?;
        assert_eq!(by_status.len(), 1);
        assert_eq!(by_status[0].id, rex.id);

        let by_owner = list_spaces(
            db.conn(),
            &SpaceFilter {
                owner_id: Some(2),
                ..Default::default()
            },
        )?;
        assert_eq!(by_owner.len(), 1);
        Ok(())
    }

    #[test]
    fn test_search_wildcards_match_literally() -> anyhow::Result<()> {
        let db = ReviewDb::new_in_memory()?;
        insert_space(db.conn(), 1, &fields("Cine Rex"))?;
        insert_space(db.conn(), 1, &fields("Sala_Azul"))?;
        insert_space(db.conn(), 1, &fields("100% Jazz"))?;
        insert_space(db.conn(), 1, &fields("Back\\Room"))?;

        let search = |text: &str| {
            list_spaces(
                db.conn(),
                &SpaceFilter {
                    search: Some(text.into()),
                    ..Default::default()
                },
            )
        };
        assert_eq!(search("%")?.len(), 1);
        assert_eq!(search("_")?.len(), 1);
        assert_eq!(search("\\")?.len(), 1);
        assert_eq!(search("a_a")?.len(), 1);
        assert!(search("x%z")?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_db_handle_call_runs_closure() -> anyhow::Result<()> {
        let handle = DbHandle::new(ReviewDb::new_in_memory()?);
        let space = handle
            .call(|db| insert_space(db.conn(), 5, &SpaceFields::new()))
            .await?;
        let fetched = handle.call(move |db| get_space(db.conn(), space.id)).await?;
        assert_eq!(fetched, Some(space));
        Ok(())
    }
}
