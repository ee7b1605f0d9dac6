//! Resubmission reconciler.
//!
//! An owner's resubmission counts as an attestation that every edited field
//! with an open issue has been corrected. The new value is not inspected;
//! judging it is left to the next review pass. Edited fields without an open
//! issue leave the ledger untouched.

use rusqlite::Connection;

use crate::errors::WorkflowError;

use super::fields::SpaceFields;
use super::ledger;
use super::models::Issue;

/// The open issues an edit payload settles.
pub fn issues_to_resolve<'a>(open: &'a [Issue], edited: &SpaceFields) -> Vec<&'a Issue> {
    open.iter()
        .filter(|issue| edited.contains_key(&issue.field))
        .collect()
}

/// Resolve every open issue on `space_id` whose field appears in `edited`.
/// Returns the issues resolved by this call.
pub fn reconcile(conn: &Connection, space_id: i64, edited: &SpaceFields) -> Result<Vec<Issue>, WorkflowError> {
    let open = ledger::open_issues(conn, space_id)?;
    issues_to_resolve(&open, edited)
        .into_iter()
        .map(|issue| ledger::resolve(conn, issue.id))
        .collect()
}
