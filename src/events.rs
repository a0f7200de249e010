//! Domain events emitted by the workflow engine.
//!
//! Every assignment creation and status transition produces a typed event
//! value, published onto an in-process queue after the owning database
//! transaction has committed. The notification dispatcher consumes the queue
//! on its own task, so slow or failing email delivery can never block or
//! fail a workflow operation.

use crate::entities::{AssignmentStatus, point_assignment, user};
use tokio::sync::mpsc;
use tracing::warn;

/// A point assignment with its principals resolved.
///
/// Carries everything the notification dispatcher needs - the recipient's
/// and assignor's preference flags travel with the event, so handlers never
/// re-query for them.
#[derive(Debug, Clone)]
pub struct AssignmentDetail {
    /// The ledger row as of the moment the event fired
    pub assignment: point_assignment::Model,
    /// User who created the assignment
    pub assignor: user::Model,
    /// User the points were assigned to
    pub recipient: user::Model,
    /// Reviewer, set once the assignment has been processed
    pub verifier: Option<user::Model>,
}

/// Events published by the workflow engine.
#[derive(Debug, Clone)]
pub enum Event {
    /// A new assignment row was created (pending or auto-verified).
    AssignmentCreated {
        /// The created assignment with principals resolved
        detail: AssignmentDetail,
    },
    /// A pending assignment transitioned to a terminal status.
    AssignmentStatusChanged {
        /// The assignment after the transition
        detail: AssignmentDetail,
        /// Status before the transition (always `Pending` today)
        previous_status: AssignmentStatus,
    },
}

/// Publishing half of the event queue, cloned into every workflow call site.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: mpsc::UnboundedSender<Event>,
}

impl EventBus {
    /// Creates a bus and the receiving end for the notification worker.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Publishes an event. Never blocks and never fails the caller; if the
    /// worker has gone away the event is dropped with a warning.
    pub fn publish(&self, event: Event) {
        if self.sender.send(event).is_err() {
            warn!("event dropped: notification worker is not running");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_delivers_in_order() {
        let (bus, mut receiver) = EventBus::new();
        let detail_stub = || AssignmentDetail {
            assignment: point_assignment::Model {
                id: 1,
                assignor_id: 1,
                recipient_id: 2,
                points: 5,
                reason: "good work".to_string(),
                status: AssignmentStatus::Pending,
                verified_by: None,
                verified_at: None,
                rejection_reason: None,
                is_bulk_assignment: false,
                created_at: chrono::Utc::now(),
                deleted_at: None,
            },
            assignor: stub_user(1),
            recipient: stub_user(2),
            verifier: None,
        };

        bus.publish(Event::AssignmentCreated {
            detail: detail_stub(),
        });
        bus.publish(Event::AssignmentStatusChanged {
            detail: detail_stub(),
            previous_status: AssignmentStatus::Pending,
        });

        assert!(matches!(
            receiver.recv().await,
            Some(Event::AssignmentCreated { .. })
        ));
        assert!(matches!(
            receiver.recv().await,
            Some(Event::AssignmentStatusChanged { .. })
        ));
    }

    #[test]
    fn test_publish_without_worker_is_silent() {
        let (bus, receiver) = EventBus::new();
        drop(receiver);

        // Must not panic or error
        bus.publish(Event::AssignmentStatusChanged {
            detail: AssignmentDetail {
                assignment: point_assignment::Model {
                    id: 1,
                    assignor_id: 1,
                    recipient_id: 2,
                    points: 1,
                    reason: "x".to_string(),
                    status: AssignmentStatus::Verified,
                    verified_by: Some(1),
                    verified_at: Some(chrono::Utc::now()),
                    rejection_reason: None,
                    is_bulk_assignment: false,
                    created_at: chrono::Utc::now(),
                    deleted_at: None,
                },
                assignor: stub_user(1),
                recipient: stub_user(2),
                verifier: Some(stub_user(1)),
            },
            previous_status: AssignmentStatus::Pending,
        });
    }

    fn stub_user(id: i64) -> user::Model {
        user::Model {
            id,
            name: format!("user{id}"),
            email: format!("user{id}@example.com"),
            password_hash: String::new(),
            role: user::Role::User,
            total_verified_points: 0,
            email_verified_at: None,
            email_on_point_received: true,
            email_on_point_verified: true,
            email_on_pending_points: true,
            created_at: chrono::Utc::now(),
        }
    }
}
