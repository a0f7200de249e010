//! Email subject and body builders.
//!
//! Plain-text rendering of every notification the dispatcher can send.
//! Wording distinguishes positive from negative points and, for
//! rejections, frames the copy for the assignor or the recipient.

use super::OPS_MAILBOX;
use crate::core::assignment::PendingReview;
use crate::entities::AssignmentStatus;
use crate::events::AssignmentDetail;
use crate::notify::mailer::OutgoingEmail;

/// Which party a rejection notice addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionAudience {
    /// The user who created the rejected assignment
    Assignor,
    /// The user the rejected points were destined for
    Recipient,
}

const FOOTER: &str = "This is an automated email from the meritboard point tracking system.\n\
    You can manage your email preferences in your account settings.";

fn point_type(points: i64) -> &'static str {
    if points > 0 { "positive" } else { "negative" }
}

fn signed(points: i64) -> String {
    if points > 0 {
        format!("+{points}")
    } else {
        points.to_string()
    }
}

fn format_date(at: chrono::DateTime<chrono::Utc>) -> String {
    at.format("%b %d, %Y at %H:%M UTC").to_string()
}

/// Notice to the recipient that points were assigned to them.
pub fn point_assigned(detail: &AssignmentDetail) -> OutgoingEmail {
    let assignment = &detail.assignment;
    let status_note = if assignment.status == AssignmentStatus::Pending {
        "Note: these points are pending supervisor verification and will be added to your total once approved."
    } else {
        "These points have been verified and added to your total."
    };

    OutgoingEmail {
        to: detail.recipient.email.clone(),
        subject: format!(
            "New {} points assigned to you ({} points)",
            point_type(assignment.points),
            assignment.points
        ),
        body: format!(
            "Hello {},\n\n\
            You have received {} points.\n\n\
            Assignment details:\n\
            - From: {}\n\
            - Reason: {}\n\
            - Date: {}\n\
            - Status: {}\n\n\
            {}\n\n{}",
            detail.recipient.name,
            signed(assignment.points),
            detail.assignor.name,
            assignment.reason,
            format_date(assignment.created_at),
            assignment.status.as_str(),
            status_note,
            FOOTER,
        ),
    }
}

/// Always-on copy to the operational mailbox for every assignment.
pub fn ops_assignment_alert(detail: &AssignmentDetail) -> OutgoingEmail {
    let assignment = &detail.assignment;

    OutgoingEmail {
        to: OPS_MAILBOX.to_string(),
        subject: format!(
            "Point Assignment Alert - {} points assigned ({} points)",
            point_type(assignment.points),
            assignment.points
        ),
        body: format!(
            "{} assigned {} points to {}.\n\n\
            - Reason: {}\n\
            - Status: {}\n\
            - Date: {}\n",
            detail.assignor.name,
            signed(assignment.points),
            detail.recipient.name,
            assignment.reason,
            assignment.status.as_str(),
            format_date(assignment.created_at),
        ),
    }
}

/// Digest of every pending assignment, sent to an opted-in supervisor.
pub fn pending_digest(
    supervisor: &crate::entities::user::Model,
    pending: &[PendingReview],
) -> OutgoingEmail {
    let mut lines = String::new();
    for review in pending {
        lines.push_str(&format!(
            "- {} -> {}: {} points - {} (waiting {} days)\n",
            review.assignor.name,
            review.recipient.name,
            signed(review.assignment.points),
            review.assignment.reason,
            review.days_pending,
        ));
    }

    OutgoingEmail {
        to: supervisor.email.clone(),
        subject: format!(
            "You have {} pending point assignments to review",
            pending.len()
        ),
        body: format!(
            "Hello {},\n\n\
            The following point assignments are waiting for review:\n\n\
            {}\n{}",
            supervisor.name, lines, FOOTER,
        ),
    }
}

/// Notice to the recipient that their pending points were approved.
pub fn point_approved(detail: &AssignmentDetail) -> OutgoingEmail {
    let assignment = &detail.assignment;
    let verifier_name = detail
        .verifier
        .as_ref()
        .map_or("a supervisor", |v| v.name.as_str());

    OutgoingEmail {
        to: detail.recipient.email.clone(),
        subject: "Your points have been approved".to_string(),
        body: format!(
            "Hello {},\n\n\
            Your {} points from {} have been approved by {} and added to your total.\n\n\
            - Reason: {}\n\n{}",
            detail.recipient.name,
            signed(assignment.points),
            detail.assignor.name,
            verifier_name,
            assignment.reason,
            FOOTER,
        ),
    }
}

/// Notice that a pending assignment was rejected, framed for one party.
pub fn point_rejected(detail: &AssignmentDetail, audience: RejectionAudience) -> OutgoingEmail {
    let assignment = &detail.assignment;
    let verifier_name = detail
        .verifier
        .as_ref()
        .map_or("a supervisor", |v| v.name.as_str());
    let rejection_reason = assignment
        .rejection_reason
        .as_deref()
        .unwrap_or("no reason given");

    let (to, name, subject_fragment, opening) = match audience {
        RejectionAudience::Assignor => (
            detail.assignor.email.clone(),
            detail.assignor.name.as_str(),
            "you assigned were rejected",
            "Your point assignment has been rejected by a supervisor.",
        ),
        RejectionAudience::Recipient => (
            detail.recipient.email.clone(),
            detail.recipient.name.as_str(),
            "assigned to you were rejected",
            "A point assignment that was made to you has been rejected by a supervisor.",
        ),
    };

    OutgoingEmail {
        to,
        subject: format!(
            "Point Assignment Rejected - {} points {}",
            assignment.points, subject_fragment
        ),
        body: format!(
            "Hello {},\n\n\
            {}\n\n\
            Rejected assignment details:\n\
            - Points: {}\n\
            - From: {}\n\
            - To: {}\n\
            - Original reason: {}\n\
            - Rejected by: {}\n\
            - Reason for rejection: {}\n\n{}",
            name,
            opening,
            signed(assignment.points),
            detail.assignor.name,
            detail.recipient.name,
            assignment.reason,
            verifier_name,
            rejection_reason,
            FOOTER,
        ),
    }
}
