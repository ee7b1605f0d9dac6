//! Space lifecycle.
//!
//! ```text
//! PENDING ──claim──> UNDER_REVIEW ──approve──> VERIFIED
//!                     │    ^      ──reject───> REJECTED
//!                     └────┘
//!          request_changes / owner resubmits
//! ```
//!
//! `transition` is pure: it never touches storage. The orchestrator feeds it
//! the current status plus whatever the guards need and persists the result
//! in the same transaction that records the decision.

use crate::errors::TransitionRefusal;

use super::fields::FieldKey;
use super::models::{ReviewDecision, SpaceStatus};

#[derive(Debug, Clone, Copy)]
pub enum Trigger<'a> {
    /// An admin takes a pending space into review.
    Claim,
    /// An admin records a decision on a space under review.
    Decide {
        decision: ReviewDecision,
        /// Issues attached to this decision.
        attached_issues: usize,
        /// Fields with an unresolved issue from earlier rounds.
        open_fields: &'a [FieldKey],
    },
    /// The owner edits fields.
    Resubmit,
}

pub fn transition(current: SpaceStatus, trigger: &Trigger<'_>) -> Result<SpaceStatus, TransitionRefusal> {
    match (current, trigger) {
        (SpaceStatus::Pending, Trigger::Claim) => Ok(SpaceStatus::UnderReview),
        (_, Trigger::Claim) => Err(TransitionRefusal::Illegal { action: "claim" }),

        (
            SpaceStatus::UnderReview,
            Trigger::Decide {
                decision,
                attached_issues,
                open_fields,
            },
        ) => decide(*decision, *attached_issues, open_fields),
        (_, Trigger::Decide { .. }) => Err(TransitionRefusal::NotUnderReview),

        (status, Trigger::Resubmit) if can_edit(status) => Ok(status),
        (_, Trigger::Resubmit) => Err(TransitionRefusal::EditsClosed),
    }
}

fn decide(
    decision: ReviewDecision,
    attached_issues: usize,
    open_fields: &[FieldKey],
) -> Result<SpaceStatus, TransitionRefusal> {
    match decision {
        ReviewDecision::Approve if !open_fields.is_empty() => Err(TransitionRefusal::OpenIssues {
            fields: open_fields.iter().map(|f| f.as_str().to_string()).collect(),
        }),
        ReviewDecision::Approve => Ok(SpaceStatus::Verified),
        ReviewDecision::Reject => Ok(SpaceStatus::Rejected),
        ReviewDecision::RequestChanges if attached_issues == 0 => {
            Err(TransitionRefusal::MissingIssues { decision })
        }
        ReviewDecision::RequestChanges => Ok(SpaceStatus::UnderReview),
    }
}

/// Owners may edit only before a terminal decision.
pub fn can_edit(status: SpaceStatus) -> bool {
    matches!(status, SpaceStatus::Pending | SpaceStatus::UnderReview)
}
