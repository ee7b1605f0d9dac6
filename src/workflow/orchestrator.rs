//! Review orchestrator: the public operation surface of the workflow.
//!
//! Every mutating operation follows the same shape:
//!
//! 1. Role and payload checks that need no storage (fail before any lock).
//! 2. Take the per-space lock.
//! 3. One `db.call` running one transaction: load, guard via the state
//!    machine, write. Any error rolls the whole step back.
//! 4. Queue the notification while the lock is still held, so events for a
//!    space leave in commit order. Delivery itself happens off the request
//!    path and can never undo the commit.

use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tracing::{info, instrument};

use crate::errors::WorkflowError;

use super::db::{self, DbHandle};
use super::fields::{FieldKey, SpaceFields, parse_fields};
use super::ledger::{self, NewIssue};
use super::locks::SpaceLocks;
use super::models::{
    Issue, Principal, RawFields, Resubmission, ReviewDecision, ReviewRecord, Space, SpaceFilter,
    SpaceStatus, SubmitReview,
};
use super::notify::{Notifier, WorkflowEvent, spawn_dispatcher};
use super::reconciler;
use super::records;
use super::state_machine::{Trigger, transition};

/// A review payload that passed every check that does not need storage.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedReview {
    pub decision: ReviewDecision,
    pub general_comment: Option<String>,
    pub issues: Vec<NewIssue>,
}

/// Check a review payload before touching any state.
///
/// Unknown fields and blank comments are reported against the offending
/// field. APPROVE and REJECT carry no issues; REQUEST_CHANGES needs at least
/// one. Two issues on the same field are left for the ledger to refuse.
pub fn validate_review(review: SubmitReview) -> Result<ValidatedReview, WorkflowError> {
    let SubmitReview {
        decision,
        general_comment,
        issues,
    } = review;

    match decision {
        ReviewDecision::RequestChanges if issues.is_empty() => {
            return Err(WorkflowError::invalid_payload(
                "issues",
                "request_changes requires at least one issue",
            ));
        }
        ReviewDecision::Approve | ReviewDecision::Reject if !issues.is_empty() => {
            return Err(WorkflowError::invalid_payload(
                "issues",
                format!("{} does not take issues", decision),
            ));
        }
        _ => {}
    }

    let issues = issues
        .into_iter()
        .map(|draft| {
            let field: FieldKey = draft.field.parse().map_err(|_| {
                WorkflowError::invalid_payload(draft.field.clone(), "not a known space field")
            })?;
            let comment = draft.comment.trim();
            if comment.is_empty() {
                return Err(WorkflowError::invalid_payload(
                    field.as_str(),
                    "comment must not be empty",
                ));
            }
            Ok(NewIssue {
                field,
                comment: comment.to_string(),
                severity: draft.severity,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let general_comment = general_comment
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    Ok(ValidatedReview {
        decision,
        general_comment,
        issues,
    })
}

#[derive(Clone)]
pub struct ReviewService {
    db: DbHandle,
    locks: SpaceLocks,
    events: mpsc::UnboundedSender<WorkflowEvent>,
}

impl ReviewService {
    /// Must be called inside a tokio runtime; it starts the notification
    /// dispatcher.
    pub fn new(db: DbHandle, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            db,
            locks: SpaceLocks::new(),
            events: spawn_dispatcher(notifier),
        }
    }

    pub fn db(&self) -> &DbHandle {
        &self.db
    }

    fn publish(&self, event: WorkflowEvent) {
        if self.events.send(event).is_err() {
            tracing::warn!("notification dispatcher has stopped; event dropped");
        }
    }

    #[instrument(skip_all, fields(owner_id = owner.user_id))]
    pub async fn create_space(&self, owner: &Principal, fields: SpaceFields) -> Result<Space, WorkflowError> {
        let owner_id = owner.user_id;
        let space = self
            .db
            .call(move |db| db::insert_space(db.conn(), owner_id, &fields))
            .await?;
        info!(space_id = space.id, "space created");
        self.publish(WorkflowEvent::SpaceCreated {
            space: space.clone(),
        });
        Ok(space)
    }

    #[instrument(skip(self, reviewer), fields(reviewer_id = reviewer.user_id))]
    pub async fn claim_for_review(&self, space_id: i64, reviewer: &Principal) -> Result<Space, WorkflowError> {
        if !reviewer.is_admin() {
            return Err(WorkflowError::NotAdmin {
                user_id: reviewer.user_id,
                action: "claim spaces for review",
            });
        }

        let _guard = self.locks.acquire(space_id).await;
        let space = self
            .db
            .call(move |db| {
                db.transaction(|tx| {
                    let space = db::require_space(tx, space_id)?;
                    let next = transition(space.status, &Trigger::Claim)
                        .map_err(|r| r.into_error(space_id, space.status))?;
                    db::set_status(tx, space_id, next)?;
                    db::require_space(tx, space_id)
                })
            })
            .await?;

        info!(space_id, "space claimed for review");
        self.publish(WorkflowEvent::SpaceClaimed {
            space_id,
            reviewer_id: reviewer.user_id,
            status: space.status,
        });
        Ok(space)
    }

    /// Record an admin decision, raise its issues and move the space, as one
    /// atomic step.
    #[instrument(skip(self, reviewer, review), fields(reviewer_id = reviewer.user_id, decision = %review.decision))]
    pub async fn submit_review(
        &self,
        space_id: i64,
        reviewer: &Principal,
        review: SubmitReview,
    ) -> Result<ReviewRecord, WorkflowError> {
        if !reviewer.is_admin() {
            return Err(WorkflowError::NotAdmin {
                user_id: reviewer.user_id,
                action: "submit reviews",
            });
        }
        let review = validate_review(review)?;
        let reviewer_id = reviewer.user_id;

        let _guard = self.locks.acquire(space_id).await;
        let (record, new_status) = self
            .db
            .call(move |db| {
                db.transaction(|tx| {
                    let space = db::require_space(tx, space_id)?;
                    let open_fields: Vec<FieldKey> = ledger::open_issues(tx, space_id)?
                        .into_iter()
                        .map(|issue| issue.field)
                        .collect();
                    let next = transition(
                        space.status,
                        &Trigger::Decide {
                            decision: review.decision,
                            attached_issues: review.issues.len(),
                            open_fields: &open_fields,
                        },
                    )
                    .map_err(|r| r.into_error(space_id, space.status))?;

                    let record_id = records::insert_record(
                        tx,
                        space_id,
                        reviewer_id,
                        review.decision,
                        review.general_comment.as_deref(),
                    )?;
                    for issue in &review.issues {
                        ledger::raise(tx, record_id, issue)?;
                    }
                    db::set_status(tx, space_id, next)?;

                    let record = records::get_record(tx, record_id)?
                        .ok_or_else(|| anyhow!("Review record {} vanished mid-transaction", record_id))?;
                    Ok((record, next))
                })
            })
            .await?;

        info!(
            space_id,
            record_id = record.id,
            status = %new_status,
            issues = record.issues.len(),
            "review submitted"
        );
        self.publish(WorkflowEvent::ReviewSubmitted {
            space_id,
            new_status,
            record: record.clone(),
        });
        Ok(record)
    }

    /// Apply an owner's field edits. While the space is under review, every
    /// edited field with an open issue gets that issue resolved.
    ///
    /// Returns the updated space together with the issues this edit closed,
    /// rather than the bare `Space`, so callers can show what the change
    /// settled without a second ledger read.
    #[instrument(skip(self, owner, edited), fields(owner_id = owner.user_id))]
    pub async fn resubmit(
        &self,
        space_id: i64,
        owner: &Principal,
        edited: RawFields,
    ) -> Result<Resubmission, WorkflowError> {
        // Fail closed before any lock or write.
        let edited = parse_fields(edited)?;
        let owner_id = owner.user_id;

        let _guard = self.locks.acquire(space_id).await;
        let outcome = self
            .db
            .call(move |db| {
                db.transaction(|tx| {
                    let space = db::require_space(tx, space_id)?;
                    if space.owner_id != owner_id {
                        return Err(WorkflowError::NotOwner {
                            user_id: owner_id,
                            space_id,
                        });
                    }
                    transition(space.status, &Trigger::Resubmit)
                        .map_err(|r| r.into_error(space_id, space.status))?;

                    let mut fields = space.fields;
                    fields.extend(edited.iter().map(|(k, v)| (*k, v.clone())));
                    db::set_fields(tx, space_id, &fields)?;

                    let resolved = if space.status == SpaceStatus::UnderReview {
                        reconciler::reconcile(tx, space_id, &edited)?
                    } else {
                        Vec::new()
                    };
                    Ok(Resubmission {
                        space: db::require_space(tx, space_id)?,
                        resolved,
                    })
                })
            })
            .await?;

        info!(
            space_id,
            version = outcome.space.version,
            resolved = outcome.resolved.len(),
            "space resubmitted"
        );
        self.publish(WorkflowEvent::SpaceResubmitted {
            space_id,
            status: outcome.space.status,
            version: outcome.space.version,
            resolved_issues: outcome.resolved.clone(),
        });
        Ok(outcome)
    }

    pub async fn get_space(&self, space_id: i64) -> Result<Space, WorkflowError> {
        self.db
            .call(move |db| db::require_space(db.conn(), space_id))
            .await
    }

    pub async fn list_spaces(&self, filter: SpaceFilter) -> Result<Vec<Space>, WorkflowError> {
        self.db
            .call(move |db| db::list_spaces(db.conn(), &filter))
            .await
    }

    /// Every decision on the space, oldest first.
    pub async fn get_review_history(&self, space_id: i64) -> Result<Vec<ReviewRecord>, WorkflowError> {
        self.db
            .call(move |db| {
                db::require_space(db.conn(), space_id)?;
                records::history(db.conn(), space_id)
            })
            .await
    }

    /// Unresolved issues across all review rounds.
    pub async fn get_open_issues(&self, space_id: i64) -> Result<Vec<Issue>, WorkflowError> {
        self.db
            .call(move |db| {
                db::require_space(db.conn(), space_id)?;
                ledger::open_issues(db.conn(), space_id)
            })
            .await
    }

    /// Every issue ever raised on the space, resolved ones included.
    pub async fn get_all_issues(&self, space_id: i64) -> Result<Vec<Issue>, WorkflowError> {
        self.db
            .call(move |db| {
                db::require_space(db.conn(), space_id)?;
                ledger::issues_for_space(db.conn(), space_id)
            })
            .await
    }
}
