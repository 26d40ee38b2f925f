//! Lifecycle notifications.
//!
//! The queue calls its [`Notifier`] after every committed transition, once all
//! locks are released. Notifier failures are logged and otherwise ignored: a
//! notification can never roll back or block a transition.

use crate::experiment::RequestStatus;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

/// A committed lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEvent {
    /// Request that moved
    pub request_id: String,
    /// Previous status; `None` for a new submission
    pub old_status: Option<RequestStatus>,
    /// Status after the transition
    pub new_status: RequestStatus,
    /// Reviewer note attached to the transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_notes: Option<String>,
    /// Who triggered it
    pub actor: String,
    /// Commit time
    pub at: DateTime<Utc>,
    /// Reviewers of the target microscope; set on transitions into `SUBMITTED`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reviewers: Vec<String>,
}

/// Receiver of lifecycle transitions.
pub trait Notifier: Send + Sync {
    /// Deliver one event. Must not block on slow I/O.
    ///
    /// # Errors
    ///
    /// Any error is logged by the caller and dropped.
    fn notify(&self, event: &TransitionEvent) -> Result<()>;
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _event: &TransitionEvent) -> Result<()> {
        Ok(())
    }
}

/// Logs every event at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &TransitionEvent) -> Result<()> {
        info!(
            request_id = %event.request_id,
            old_status = ?event.old_status,
            new_status = %event.new_status,
            actor = %event.actor,
            notes = event.review_notes.as_deref().unwrap_or(""),
            reviewers = event.reviewers.len(),
            "request transition"
        );
        Ok(())
    }
}

/// Forwards events into a bounded channel for an out-of-process delivery task.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::Sender<TransitionEvent>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiving end of its channel.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<TransitionEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: &TransitionEvent) -> Result<()> {
        self.sender.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                Error::Notification("notification channel full, event dropped".into())
            }
            mpsc::error::TrySendError::Closed(_) => {
                Error::Notification("notification channel closed, event dropped".into())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> TransitionEvent {
        TransitionEvent {
            request_id: "req-1".into(),
            old_status: Some(RequestStatus::UnderReview),
            new_status: RequestStatus::Rejected,
            review_notes: Some("out of scope".into()),
            actor: "rev@lab.org".into(),
            at: Utc::now(),
            reviewers: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_channel_notifier_delivers() {
        let (notifier, mut rx) = ChannelNotifier::new(4);
        notifier.notify(&event()).unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.new_status, RequestStatus::Rejected);
    }

    #[test]
    fn test_channel_full_and_closed_are_errors() {
        let (notifier, rx) = ChannelNotifier::new(1);
        notifier.notify(&event()).unwrap();
        assert!(notifier.notify(&event()).is_err());

        drop(rx);
        assert!(notifier.notify(&event()).is_err());
    }

    #[test]
    fn test_noop_and_log_accept_everything() {
        assert!(NoopNotifier.notify(&event()).is_ok());
        assert!(LogNotifier.notify(&event()).is_ok());
    }
}
