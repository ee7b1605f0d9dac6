//! Typed error hierarchy for the review workflow.
//!
//! `WorkflowError` is the only error type the workflow core returns. Every
//! variant belongs to one [`ErrorCategory`], which drives the HTTP mapping in
//! `workflow::api` and tells callers whether a refresh-and-retry can succeed.

use thiserror::Error;

use crate::workflow::models::{ReviewDecision, SpaceStatus};

/// Coarse classification of a [`WorkflowError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caller mistake; rejected before any state change.
    Validation,
    /// Caller acted on a stale view of the space status.
    StateConflict,
    /// The request would break the one-open-issue-per-field rule.
    LedgerConflict,
    /// The principal is not allowed to perform the operation.
    Authorization,
    NotFound,
    Internal,
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    // ── Validation ────────────────────────────────────────────────────
    #[error("Invalid review payload ({field}): {reason}")]
    InvalidReviewPayload { field: String, reason: String },

    #[error("Unknown field '{field}'")]
    UnknownField { field: String },

    // ── State conflicts ───────────────────────────────────────────────
    #[error("Space {space_id} is not under review (status: {status})")]
    SpaceNotUnderReview { space_id: i64, status: SpaceStatus },

    #[error("Cannot {action} space {space_id} while it is {from}")]
    InvalidTransition {
        space_id: i64,
        from: SpaceStatus,
        action: &'static str,
    },

    #[error("Space {space_id} cannot be edited while it is {status}")]
    EditNotAllowed { space_id: i64, status: SpaceStatus },

    #[error("Space {space_id} cannot be approved with open issues on: {}", fields.join(", "))]
    OpenIssuesRemain { space_id: i64, fields: Vec<String> },

    // ── Ledger conflicts ──────────────────────────────────────────────
    #[error("Space {space_id} already has an open issue for field '{field}'")]
    DuplicateFieldIssue { space_id: i64, field: String },

    // ── Authorization ─────────────────────────────────────────────────
    #[error("User {user_id} is not an admin and cannot {action}")]
    NotAdmin { user_id: i64, action: &'static str },

    #[error("User {user_id} does not own space {space_id}")]
    NotOwner { user_id: i64, space_id: i64 },

    // ── Not found ─────────────────────────────────────────────────────
    #[error("Space {id} not found")]
    SpaceNotFound { id: i64 },

    #[error("Issue {id} not found")]
    IssueNotFound { id: i64 },

    // ── Internal ──────────────────────────────────────────────────────
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WorkflowError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidReviewPayload { .. } | Self::UnknownField { .. } => {
                ErrorCategory::Validation
            }
            Self::SpaceNotUnderReview { .. }
            | Self::InvalidTransition { .. }
            | Self::EditNotAllowed { .. }
            | Self::OpenIssuesRemain { .. } => ErrorCategory::StateConflict,
            Self::DuplicateFieldIssue { .. } => ErrorCategory::LedgerConflict,
            Self::NotAdmin { .. } | Self::NotOwner { .. } => ErrorCategory::Authorization,
            Self::SpaceNotFound { .. } | Self::IssueNotFound { .. } => ErrorCategory::NotFound,
            Self::Database(_) | Self::LockPoisoned | Self::Other(_) => ErrorCategory::Internal,
        }
    }

    /// Stable machine-readable name, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidReviewPayload { .. } => "invalid_review_payload",
            Self::UnknownField { .. } => "unknown_field",
            Self::SpaceNotUnderReview { .. } => "space_not_under_review",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::EditNotAllowed { .. } => "edit_not_allowed",
            Self::OpenIssuesRemain { .. } => "open_issues_remain",
            Self::DuplicateFieldIssue { .. } => "duplicate_field_issue",
            Self::NotAdmin { .. } => "not_admin",
            Self::NotOwner { .. } => "not_owner",
            Self::SpaceNotFound { .. } => "space_not_found",
            Self::IssueNotFound { .. } => "issue_not_found",
            Self::Database(_) => "database",
            Self::LockPoisoned => "lock_poisoned",
            Self::Other(_) => "internal",
        }
    }

    /// State conflicts can succeed once the caller refreshes its view.
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::StateConflict
    }

    pub(crate) fn invalid_payload(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidReviewPayload {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Reasons a decision was refused, kept separate so the state machine does
/// not need to know which space it is working on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionRefusal {
    NotUnderReview,
    Illegal { action: &'static str },
    EditsClosed,
    MissingIssues { decision: ReviewDecision },
    OpenIssues { fields: Vec<String> },
}

impl TransitionRefusal {
    /// Attach the space identity and current status.
    pub fn into_error(self, space_id: i64, status: SpaceStatus) -> WorkflowError {
        match self {
            Self::NotUnderReview => WorkflowError::SpaceNotUnderReview { space_id, status },
            Self::Illegal { action } => WorkflowError::InvalidTransition {
                space_id,
                from: status,
                action,
            },
            Self::EditsClosed => WorkflowError::EditNotAllowed { space_id, status },
            Self::MissingIssues { decision } => WorkflowError::invalid_payload(
                "issues",
                format!("{} requires at least one issue", decision),
            ),
            Self::OpenIssues { fields } => WorkflowError::OpenIssuesRemain { space_id, fields },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_not_retryable() {
        let err = WorkflowError::UnknownField {
            field: "colour".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("colour"));
    }

    #[test]
    fn state_conflicts_are_retryable() {
        let err = WorkflowError::SpaceNotUnderReview {
            space_id: 3,
            status: SpaceStatus::Verified,
        };
        assert_eq!(err.category(), ErrorCategory::StateConflict);
        assert!(err.is_retryable());
        assert!(err.to_string().contains("verified"));
    }

    #[test]
    fn duplicate_field_issue_is_a_ledger_conflict() {
        let err = WorkflowError::DuplicateFieldIssue {
            space_id: 1,
            field: "capacity".into(),
        };
        assert_eq!(err.category(), ErrorCategory::LedgerConflict);
        assert_eq!(err.kind(), "duplicate_field_issue");
        assert!(!err.is_retryable());
    }

    #[test]
    fn invalid_payload_message_names_the_field() {
        let err = WorkflowError::invalid_payload("managerEmail", "comment must not be empty");
        assert_eq!(
            err.to_string(),
            "Invalid review payload (managerEmail): comment must not be empty"
        );
    }

    #[test]
    fn open_issues_message_lists_fields() {
        let err = WorkflowError::OpenIssuesRemain {
            space_id: 9,
            fields: vec!["name".into(), "capacity".into()],
        };
        assert!(err.to_string().ends_with("name, capacity"));
    }

    #[test]
    fn refusal_carries_space_identity() {
        let err = TransitionRefusal::Illegal { action: "claim" }
            .into_error(12, SpaceStatus::UnderReview);
        match err {
            WorkflowError::InvalidTransition {
                space_id,
                from,
                action,
            } => {
                assert_eq!(space_id, 12);
                assert_eq!(from, SpaceStatus::UnderReview);
                assert_eq!(action, "claim");
            }
            other => panic!("Expected InvalidTransition, got {other:?}"),
        }
    }

    #[test]
    fn missing_issues_refusal_is_a_payload_error() {
        let err = TransitionRefusal::MissingIssues {
            decision: ReviewDecision::RequestChanges,
        }
        .into_error(1, SpaceStatus::UnderReview);
        assert_eq!(err.kind(), "invalid_review_payload");
    }

    #[test]
    fn database_errors_are_internal() {
        let err: WorkflowError = rusqlite::Error::QueryReturnedNoRows.into();
        assert_eq!(err.category(), ErrorCategory::Internal);
        let err = WorkflowError::LockPoisoned;
        assert!(matches!(err, WorkflowError::LockPoisoned));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&WorkflowError::SpaceNotFound { id: 1 });
    }
}
