//! Notification dispatcher.
//!
//! Consumes the workflow engine's event queue on its own task and turns
//! events into emails, gated by each user's preference flags. Delivery is
//! strictly best-effort: a failed send is logged and the dispatcher moves
//! on, so mail trouble can never fail or roll back a workflow operation.

/// Mail transport seam (`Mailer` trait, SMTP implementation)
pub mod mailer;
/// Email subject and body builders
pub mod messages;

pub use mailer::{Mailer, OutgoingEmail, SmtpMailer};
pub use messages::RejectionAudience;

use crate::core;
use crate::entities::AssignmentStatus;
use crate::events::{AssignmentDetail, Event};
use sea_orm::DatabaseConnection;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};

/// Operational mailbox copied on every assignment, regardless of anyone's
/// preferences.
pub const OPS_MAILBOX: &str = "hr@mnotify.com";

/// Runs the dispatcher until the event queue closes.
pub async fn run<M: Mailer>(db: DatabaseConnection, mailer: M, mut receiver: UnboundedReceiver<Event>) {
    info!("notification dispatcher started");
    while let Some(event) = receiver.recv().await {
        handle_event(&db, &mailer, event).await;
    }
    info!("notification queue closed; dispatcher stopping");
}

/// Handles one event. Never returns an error; all failures are logged.
pub async fn handle_event<M: Mailer>(db: &DatabaseConnection, mailer: &M, event: Event) {
    match event {
        Event::AssignmentCreated { detail } => on_assignment_created(db, mailer, &detail).await,
        Event::AssignmentStatusChanged {
            detail,
            previous_status,
        } => on_status_changed(mailer, &detail, previous_status).await,
    }
}

async fn on_assignment_created<M: Mailer>(
    db: &DatabaseConnection,
    mailer: &M,
    detail: &AssignmentDetail,
) {
    if detail.recipient.email_on_point_received {
        deliver(mailer, messages::point_assigned(detail)).await;
    }

    // The operational mailbox hears about every assignment
    deliver(mailer, messages::ops_assignment_alert(detail)).await;

    if detail.assignment.status == AssignmentStatus::Pending {
        notify_supervisors(db, mailer).await;
    }
}

/// Sends each opted-in supervisor a digest of all currently pending
/// assignments, not just the one that triggered the event.
async fn notify_supervisors<M: Mailer>(db: &DatabaseConnection, mailer: &M) {
    let supervisors = match core::user::supervisors_awaiting_pending(db).await {
        Ok(supervisors) => supervisors,
        Err(err) => {
            error!(%err, "failed to load supervisors for pending digest");
            return;
        }
    };
    if supervisors.is_empty() {
        return;
    }

    let pending = match core::assignment::pending_with_principals(db).await {
        Ok(pending) => pending,
        Err(err) => {
            error!(%err, "failed to load pending assignments for digest");
            return;
        }
    };
    if pending.is_empty() {
        return;
    }

    for supervisor in supervisors {
        deliver(mailer, messages::pending_digest(&supervisor, &pending)).await;
    }
}

async fn on_status_changed<M: Mailer>(
    mailer: &M,
    detail: &AssignmentDetail,
    previous_status: AssignmentStatus,
) {
    if previous_status != AssignmentStatus::Pending {
        debug!(
            assignment_id = detail.assignment.id,
            "ignoring status change from non-pending state"
        );
        return;
    }

    match detail.assignment.status {
        AssignmentStatus::Verified => {
            if detail.recipient.email_on_point_verified {
                deliver(mailer, messages::point_approved(detail)).await;
            }
        }
        AssignmentStatus::Rejected => {
            // Both parties are told, each gated by their own flag
            if detail.assignor.email_on_point_verified {
                deliver(
                    mailer,
                    messages::point_rejected(detail, RejectionAudience::Assignor),
                )
                .await;
            }
            if detail.recipient.email_on_point_verified {
                deliver(
                    mailer,
                    messages::point_rejected(detail, RejectionAudience::Recipient),
                )
                .await;
            }
        }
        AssignmentStatus::Pending => {}
    }
}

async fn deliver<M: Mailer>(mailer: &M, email: OutgoingEmail) {
    let to = email.to.clone();
    let subject = email.subject.clone();
    if let Err(err) = mailer.send(email).await {
        warn!(%err, %to, %subject, "email delivery failed");
    }
}
