//! Notification collaborator.
//!
//! Workflow events are handed to a [`Notifier`] only after the owning
//! transaction has committed. Delivery failures are logged and dropped; they
//! never reach the caller and never undo workflow state.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

use super::models::{Issue, ReviewRecord, Space, SpaceStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WorkflowEvent {
    SpaceCreated {
        space: Space,
    },
    SpaceClaimed {
        space_id: i64,
        reviewer_id: i64,
        status: SpaceStatus,
    },
    ReviewSubmitted {
        space_id: i64,
        new_status: SpaceStatus,
        record: ReviewRecord,
    },
    SpaceResubmitted {
        space_id: i64,
        status: SpaceStatus,
        version: i64,
        resolved_issues: Vec<Issue>,
    },
}

impl WorkflowEvent {
    pub fn space_id(&self) -> i64 {
        match self {
            Self::SpaceCreated { space } => space.id,
            Self::SpaceClaimed { space_id, .. }
            | Self::ReviewSubmitted { space_id, .. }
            | Self::SpaceResubmitted { space_id, .. } => *space_id,
        }
    }
}

/// Abstraction over event delivery for testability.
/// Real implementation: `BroadcastNotifier`.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &WorkflowEvent) -> Result<()>;
}

/// Fans events out as JSON over a broadcast channel; `/ws` clients subscribe.
#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<String>,
}

impl BroadcastNotifier {
    pub fn new(tx: broadcast::Sender<String>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn notify(&self, event: &WorkflowEvent) -> Result<()> {
        broadcast_message(&self.tx, event)
    }
}

/// Start the delivery task for `notifier` and return its queue.
///
/// Events are delivered one at a time in the order they were queued, so two
/// commits on the same space are always announced in commit order. Queuing
/// never blocks; the task ends once every sender is dropped.
pub fn spawn_dispatcher(notifier: Arc<dyn Notifier>) -> mpsc::UnboundedSender<WorkflowEvent> {
    let (tx, mut rx) = mpsc::unbounded_channel::<WorkflowEvent>();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Err(e) = notifier.notify(&event).await {
                tracing::warn!(
                    space_id = event.space_id(),
                    error = %e,
                    "workflow notification failed"
                );
            }
        }
    });
    tx
}

/// Serialize and broadcast an event to all subscribers.
/// Having no subscribers is not an error.
pub fn broadcast_message(tx: &broadcast::Sender<String>, event: &WorkflowEvent) -> Result<()> {
    let json = serde_json::to_string(event)?;
    let _ = tx.send(json);
    Ok(())
}
