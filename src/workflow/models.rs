use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::fields::{FieldKey, SpaceFields};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceStatus {
    Pending,
    UnderReview,
    Verified,
    Rejected,
}

impl SpaceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::UnderReview => "under_review",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Verified | Self::Rejected)
    }
}

impl std::fmt::Display for SpaceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpaceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "under_review" => Ok(Self::UnderReview),
            "verified" => Ok(Self::Verified),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Invalid space status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    RequestChanges,
    Reject,
}

impl ReviewDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::RequestChanges => "request_changes",
            Self::Reject => "reject",
        }
    }
}

impl std::fmt::Display for ReviewDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewDecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(Self::Approve),
            "request_changes" => Ok(Self::RequestChanges),
            "reject" => Ok(Self::Reject),
            _ => Err(format!("Invalid review decision: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(format!("Invalid severity: {}", s)),
        }
    }
}

/// Role supplied by the auth collaborator alongside the user id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Member,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "member" => Ok(Self::Member),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// An authenticated caller. The workflow trusts this identity and only
/// checks its shape (admin role, ownership).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    pub role: Role,
}

impl Principal {
    pub fn admin(user_id: i64) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }

    pub fn member(user_id: i64) -> Self {
        Self {
            user_id,
            role: Role::Member,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// A venue registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Space {
    pub id: i64,
    pub owner_id: i64,
    pub status: SpaceStatus,
    pub fields: SpaceFields,
    /// Incremented on every owner edit.
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// A single field-level correction request.
///
/// `resolved` and `resolved_at` always move together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: i64,
    pub review_record_id: i64,
    pub space_id: i64,
    pub field: FieldKey,
    pub comment: String,
    pub severity: Option<Severity>,
    pub resolved: bool,
    pub resolved_at: Option<String>,
    pub created_at: String,
}

/// One admin decision and the issues raised with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: i64,
    pub space_id: i64,
    pub reviewer_id: i64,
    pub decision: ReviewDecision,
    pub general_comment: Option<String>,
    pub issues: Vec<Issue>,
    pub created_at: String,
}

// ── Request types ─────────────────────────────────────────────────────

/// An issue as authored by a reviewer, before validation. The field stays
/// a string so an unknown key surfaces as an invalid payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueDraft {
    pub field: String,
    pub comment: String,
    #[serde(default)]
    pub severity: Option<Severity>,
}

impl IssueDraft {
    pub fn new(field: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            comment: comment.into(),
            severity: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitReview {
    pub decision: ReviewDecision,
    #[serde(default)]
    pub general_comment: Option<String>,
    #[serde(default)]
    pub issues: Vec<IssueDraft>,
}

impl SubmitReview {
    pub fn approve() -> Self {
        Self::decide(ReviewDecision::Approve)
    }

    pub fn reject() -> Self {
        Self::decide(ReviewDecision::Reject)
    }

    pub fn request_changes(issues: Vec<IssueDraft>) -> Self {
        Self {
            decision: ReviewDecision::RequestChanges,
            general_comment: None,
            issues,
        }
    }

    fn decide(decision: ReviewDecision) -> Self {
        Self {
            decision,
            general_comment: None,
            issues: Vec::new(),
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.general_comment = Some(comment.into());
        self
    }
}

/// Loosely keyed field payload, as received from a client.
pub type RawFields = BTreeMap<String, serde_json::Value>;

/// Caller-supplied filter for space listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpaceFilter {
    pub status: Option<SpaceStatus>,
    pub owner_id: Option<i64>,
    /// Case-insensitive substring match on the space name.
    pub search: Option<String>,
}

/// Outcome of an owner resubmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resubmission {
    pub space: Space,
    pub resolved: Vec<Issue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_status_roundtrip() {
        for s in &["pending", "under_review", "verified", "rejected"] {
            let parsed: SpaceStatus = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!("approved".parse::<SpaceStatus>().is_err());
    }

    #[test]
    fn test_review_decision_roundtrip() {
        for s in &["approve", "request_changes", "reject"] {
            let parsed: ReviewDecision = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!("maybe".parse::<ReviewDecision>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!SpaceStatus::Pending.is_terminal());
        assert!(!SpaceStatus::UnderReview.is_terminal());
        assert!(SpaceStatus::Verified.is_terminal());
        assert!(SpaceStatus::Rejected.is_terminal());
    }

    #[test]
    fn test_serde_produces_snake_case_strings() {
        assert_eq!(
            serde_json::to_string(&SpaceStatus::UnderReview).unwrap(),
            "\"under_review\""
        );
        assert_eq!(
            serde_json::to_string(&ReviewDecision::RequestChanges).unwrap(),
            "\"request_changes\""
        );
        assert_eq!(
            serde_json::from_str::<Severity>("\"high\"").unwrap(),
            Severity::High
        );
    }

    #[test]
    fn test_submit_review_defaults() {
        let req: SubmitReview = serde_json::from_str(r#"{"decision":"approve"}"#).unwrap();
        assert_eq!(req.decision, ReviewDecision::Approve);
        assert!(req.issues.is_empty());
        assert!(req.general_comment.is_none());
    }

    #[test]
    fn test_principal_roles() {
        assert!(Principal::admin(7).is_admin());
        assert!(!Principal::member(42).is_admin());
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert!("root".parse::<Role>().is_err());
    }
}
