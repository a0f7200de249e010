//! Point assignment workflow engine.
//!
//! This module owns the verification state machine: assignments are created
//! pending (or verified immediately when a supervisor or admin assigns),
//! and pending assignments transition exactly once to verified or rejected.
//! Every transition runs inside a database transaction whose status change
//! is a conditional update keyed on the current status, so two reviewers
//! racing on the same row cannot double-process it or double-increment the
//! recipient's total. Domain events are published only after the owning
//! transaction commits; audit writes are best-effort side effects.

use crate::{
    core::audit,
    entities::{AssignmentStatus, PointAssignment, Role, User, point_assignment, user},
    errors::{Error, Result},
    events::{AssignmentDetail, Event, EventBus},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde_json::json;
use std::collections::HashMap;
use tracing::{error, warn};

/// How overdue a pending assignment is for review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    /// Created today
    Normal,
    /// Waiting at least one day
    Attention,
    /// Waiting three days or more
    Urgent,
}

impl Urgency {
    #[must_use]
    pub const fn from_days_pending(days: i64) -> Self {
        if days >= 3 {
            Self::Urgent
        } else if days >= 1 {
            Self::Attention
        } else {
            Self::Normal
        }
    }
}

/// A pending assignment annotated for the review queue.
#[derive(Debug, Clone)]
pub struct PendingReview {
    /// The pending ledger row
    pub assignment: point_assignment::Model,
    /// User who created the assignment
    pub assignor: user::Model,
    /// User the points are destined for
    pub recipient: user::Model,
    /// Whole days since the assignment was created
    pub days_pending: i64,
    /// Review urgency derived from `days_pending`
    pub urgency: Urgency,
}

fn ensure_reviewer(actor: &user::Model) -> Result<()> {
    if actor.role.can_verify_points() {
        Ok(())
    } else {
        Err(Error::forbidden(
            "Only supervisors and admins can review point assignments",
        ))
    }
}

fn validate_rejection_reason(reason: &str) -> Result<()> {
    let len = reason.chars().count();
    if (3..=500).contains(&len) {
        Ok(())
    } else {
        Err(Error::validation(
            "Rejection reason must be between 3 and 500 characters",
        ))
    }
}

/// Creates a new point assignment.
///
/// Assignments from supervisors and admins are verified at creation: the
/// row starts in `verified` with the assignor as verifier and the
/// recipient's running total incremented in the same transaction.
/// Assignments from plain users start `pending` and touch no total.
pub async fn create_assignment(
    db: &DatabaseConnection,
    events: &EventBus,
    assignor: &user::Model,
    recipient_id: i64,
    points: i64,
    reason: String,
) -> Result<point_assignment::Model> {
    if points == 0 {
        return Err(Error::validation("Points must be a nonzero integer"));
    }
    if reason.trim().is_empty() {
        return Err(Error::validation("A reason is required"));
    }

    let auto_verified = assignor.role.can_verify_points();
    let now = chrono::Utc::now();

    let txn = db.begin().await?;

    let recipient = User::find_by_id(recipient_id)
        .one(&txn)
        .await?
        .ok_or(Error::NotFound {
            entity: "user",
            id: recipient_id,
        })?;

    let row = point_assignment::ActiveModel {
        assignor_id: Set(assignor.id),
        recipient_id: Set(recipient.id),
        points: Set(points),
        reason: Set(reason.clone()),
        status: Set(if auto_verified {
            AssignmentStatus::Verified
        } else {
            AssignmentStatus::Pending
        }),
        verified_by: Set(auto_verified.then_some(assignor.id)),
        verified_at: Set(auto_verified.then_some(now)),
        rejection_reason: Set(None),
        is_bulk_assignment: Set(false),
        created_at: Set(now),
        deleted_at: Set(None),
        ..Default::default()
    };
    let created = row.insert(&txn).await?;

    if auto_verified {
        increment_total_verified(&txn, recipient.id, points).await?;
    }

    txn.commit().await?;

    publish_created(db, events, &created).await;

    audit::record_best_effort(
        db,
        assignor.id,
        "assigned_point",
        json!({
            "recipient_id": recipient_id,
            "points": points,
            "reason": reason,
            "status": created.status,
        }),
    )
    .await;

    Ok(created)
}

/// Approves a pending assignment.
///
/// Supervisor/admin only. The status change and the recipient's total
/// increment commit atomically; an assignment that is no longer pending
/// fails with `InvalidState` and changes nothing.
pub async fn approve(
    db: &DatabaseConnection,
    events: &EventBus,
    actor: &user::Model,
    assignment_id: i64,
) -> Result<point_assignment::Model> {
    ensure_reviewer(actor)?;

    let assignment = get_assignment_by_id(db, assignment_id)
        .await?
        .ok_or(Error::NotFound {
            entity: "point assignment",
            id: assignment_id,
        })?;

    if !transition(db, actor, &assignment, AssignmentStatus::Verified, None).await? {
        return Err(Error::invalid_state(
            "This assignment has already been processed",
        ));
    }

    let updated = reload(db, assignment_id).await?;
    publish_status_changed(db, events, &updated).await;

    audit::record_best_effort(
        db,
        actor.id,
        "approved_point",
        json!({ "assignment_id": assignment_id }),
    )
    .await;

    Ok(updated)
}

/// Rejects a pending assignment with a reviewer-supplied reason.
///
/// Supervisor/admin only. The rejection reason must be 3-500 characters.
/// The recipient's total is never touched.
pub async fn reject(
    db: &DatabaseConnection,
    events: &EventBus,
    actor: &user::Model,
    assignment_id: i64,
    rejection_reason: &str,
) -> Result<point_assignment::Model> {
    ensure_reviewer(actor)?;
    validate_rejection_reason(rejection_reason)?;

    let assignment = get_assignment_by_id(db, assignment_id)
        .await?
        .ok_or(Error::NotFound {
            entity: "point assignment",
            id: assignment_id,
        })?;

    if !transition(
        db,
        actor,
        &assignment,
        AssignmentStatus::Rejected,
        Some(rejection_reason),
    )
    .await?
    {
        return Err(Error::invalid_state(
            "This assignment has already been processed",
        ));
    }

    let updated = reload(db, assignment_id).await?;
    publish_status_changed(db, events, &updated).await;

    audit::record_best_effort(
        db,
        actor.id,
        "rejected_point",
        json!({
            "assignment_id": assignment_id,
            "rejection_reason": rejection_reason,
        }),
    )
    .await;

    Ok(updated)
}

/// Approves every still-pending assignment among `assignment_ids`.
///
/// Already-processed ids are skipped silently; each approval is its own
/// atomic unit. Returns the number of assignments actually approved and
/// writes one summary audit entry for the batch.
pub async fn bulk_approve(
    db: &DatabaseConnection,
    events: &EventBus,
    actor: &user::Model,
    assignment_ids: &[i64],
) -> Result<usize> {
    ensure_reviewer(actor)?;

    let pending = pending_among(db, assignment_ids).await?;

    let mut approved = 0;
    for assignment in pending {
        if transition(db, actor, &assignment, AssignmentStatus::Verified, None).await? {
            let updated = reload(db, assignment.id).await?;
            publish_status_changed(db, events, &updated).await;
            approved += 1;
        }
    }

    audit::record_best_effort(
        db,
        actor.id,
        "bulk_approved_points",
        json!({
            "approved_count": approved,
            "assignment_ids": assignment_ids,
        }),
    )
    .await;

    Ok(approved)
}

/// Rejects every still-pending assignment among `assignment_ids` with one
/// shared reason. Same partial-success model as [`bulk_approve`].
pub async fn bulk_reject(
    db: &DatabaseConnection,
    events: &EventBus,
    actor: &user::Model,
    assignment_ids: &[i64],
    rejection_reason: &str,
) -> Result<usize> {
    ensure_reviewer(actor)?;
    validate_rejection_reason(rejection_reason)?;

    let pending = pending_among(db, assignment_ids).await?;

    let mut rejected = 0;
    for assignment in pending {
        if transition(
            db,
            actor,
            &assignment,
            AssignmentStatus::Rejected,
            Some(rejection_reason),
        )
        .await?
        {
            let updated = reload(db, assignment.id).await?;
            publish_status_changed(db, events, &updated).await;
            rejected += 1;
        }
    }

    audit::record_best_effort(
        db,
        actor.id,
        "bulk_rejected_points",
        json!({
            "rejected_count": rejected,
            "assignment_ids": assignment_ids,
            "rejection_reason": rejection_reason,
        }),
    )
    .await;

    Ok(rejected)
}

/// Assigns `points` to every user except admins and the actor, each row
/// auto-verified and flagged as a bulk assignment.
///
/// The batch is not atomic: each recipient's row and total commit
/// independently, so a failure partway leaves earlier recipients updated.
/// Returns the number of recipients affected.
pub async fn bulk_assign_to_all(
    db: &DatabaseConnection,
    events: &EventBus,
    actor: &user::Model,
    points: i64,
    reason: String,
) -> Result<usize> {
    ensure_reviewer(actor)?;
    if points == 0 {
        return Err(Error::validation("Points must be a nonzero integer"));
    }
    if reason.trim().is_empty() {
        return Err(Error::validation("A reason is required"));
    }

    let recipients = User::find()
        .filter(user::Column::Role.ne(Role::Admin))
        .filter(user::Column::Id.ne(actor.id))
        .all(db)
        .await?;

    let now = chrono::Utc::now();
    for recipient in &recipients {
        let txn = db.begin().await?;

        let row = point_assignment::ActiveModel {
            assignor_id: Set(actor.id),
            recipient_id: Set(recipient.id),
            points: Set(points),
            reason: Set(reason.clone()),
            status: Set(AssignmentStatus::Verified),
            verified_by: Set(Some(actor.id)),
            verified_at: Set(Some(now)),
            rejection_reason: Set(None),
            is_bulk_assignment: Set(true),
            created_at: Set(now),
            deleted_at: Set(None),
            ..Default::default()
        };
        let created = row.insert(&txn).await?;
        increment_total_verified(&txn, recipient.id, points).await?;

        txn.commit().await?;

        publish_created(db, events, &created).await;
    }

    audit::record_best_effort(
        db,
        actor.id,
        "bulk_assigned_points",
        json!({
            "points": points,
            "reason": reason,
            "recipients_count": recipients.len(),
        }),
    )
    .await;

    Ok(recipients.len())
}

/// Performs the guarded pending -> terminal transition for one assignment.
///
/// The update is conditional on the row still being pending; a zero
/// rows-affected result means some other reviewer got there first and the
/// whole transaction rolls back. Returns whether the transition happened.
async fn transition(
    db: &DatabaseConnection,
    actor: &user::Model,
    assignment: &point_assignment::Model,
    new_status: AssignmentStatus,
    rejection_reason: Option<&str>,
) -> Result<bool> {
    use sea_orm::sea_query::Expr;

    let now = chrono::Utc::now();
    let txn = db.begin().await?;

    let mut update = PointAssignment::update_many()
        .col_expr(point_assignment::Column::Status, Expr::value(new_status))
        .col_expr(point_assignment::Column::VerifiedBy, Expr::value(actor.id))
        .col_expr(point_assignment::Column::VerifiedAt, Expr::value(now));
    if let Some(reason) = rejection_reason {
        update = update.col_expr(
            point_assignment::Column::RejectionReason,
            Expr::value(reason),
        );
    }

    let result = update
        .filter(point_assignment::Column::Id.eq(assignment.id))
        .filter(point_assignment::Column::Status.eq(AssignmentStatus::Pending))
        .filter(point_assignment::Column::DeletedAt.is_null())
        .exec(&txn)
        .await?;

    if result.rows_affected == 0 {
        txn.rollback().await?;
        return Ok(false);
    }

    if new_status == AssignmentStatus::Verified {
        increment_total_verified(&txn, assignment.recipient_id, assignment.points).await?;
    }

    txn.commit().await?;
    Ok(true)
}

/// Atomically adds `delta` to a user's running verified-point total.
///
/// A single `UPDATE users SET total = total + delta` statement, so
/// concurrent increments on the same user serialize in the database instead
/// of losing updates to a read-modify-write race. Only the workflow engine
/// calls this; rejections and pending creations never touch the total.
async fn increment_total_verified<C>(db: &C, user_id: i64, delta: i64) -> Result<()>
where
    C: ConnectionTrait,
{
    use sea_orm::sea_query::Expr;

    User::update_many()
        .col_expr(
            user::Column::TotalVerifiedPoints,
            Expr::col(user::Column::TotalVerifiedPoints).add(delta),
        )
        .filter(user::Column::Id.eq(user_id))
        .exec(db)
        .await?;

    Ok(())
}

/// Finds an assignment by ID, excluding soft-deleted rows.
pub async fn get_assignment_by_id(
    db: &DatabaseConnection,
    assignment_id: i64,
) -> Result<Option<point_assignment::Model>> {
    PointAssignment::find_by_id(assignment_id)
        .filter(point_assignment::Column::DeletedAt.is_null())
        .one(db)
        .await
        .map_err(Into::into)
}

async fn reload(db: &DatabaseConnection, assignment_id: i64) -> Result<point_assignment::Model> {
    get_assignment_by_id(db, assignment_id)
        .await?
        .ok_or(Error::NotFound {
            entity: "point assignment",
            id: assignment_id,
        })
}

async fn pending_among(
    db: &DatabaseConnection,
    assignment_ids: &[i64],
) -> Result<Vec<point_assignment::Model>> {
    PointAssignment::find()
        .filter(point_assignment::Column::Id.is_in(assignment_ids.iter().copied()))
        .filter(point_assignment::Column::Status.eq(AssignmentStatus::Pending))
        .filter(point_assignment::Column::DeletedAt.is_null())
        .all(db)
        .await
        .map_err(Into::into)
}

/// All pending assignments, newest first.
pub async fn pending_assignments(db: &DatabaseConnection) -> Result<Vec<point_assignment::Model>> {
    PointAssignment::find()
        .filter(point_assignment::Column::Status.eq(AssignmentStatus::Pending))
        .filter(point_assignment::Column::DeletedAt.is_null())
        .order_by_desc(point_assignment::Column::CreatedAt)
        .all(db)
        .await
        .map_err(Into::into)
}

/// The supervisor review queue: pending assignments with principals and a
/// waiting-time annotation. Supervisor/admin only.
pub async fn pending_reviews(
    db: &DatabaseConnection,
    actor: &user::Model,
) -> Result<Vec<PendingReview>> {
    ensure_reviewer(actor)?;
    pending_with_principals(db).await
}

/// Pending assignments joined with their assignor and recipient. Used by
/// the review queue and by the supervisor digest emails.
pub(crate) async fn pending_with_principals(
    db: &DatabaseConnection,
) -> Result<Vec<PendingReview>> {
    let pending = pending_assignments(db).await?;
    let users = principals_by_id(db, &pending).await?;
    let now = chrono::Utc::now();

    let mut reviews = Vec::with_capacity(pending.len());
    for assignment in pending {
        let (Some(assignor), Some(recipient)) = (
            users.get(&assignment.assignor_id),
            users.get(&assignment.recipient_id),
        ) else {
            // Principal deleted between queries; the row is about to go away
            warn!(assignment_id = assignment.id, "skipping orphaned pending assignment");
            continue;
        };

        let days_pending = (now - assignment.created_at).num_days();
        reviews.push(PendingReview {
            assignor: assignor.clone(),
            recipient: recipient.clone(),
            days_pending,
            urgency: Urgency::from_days_pending(days_pending),
            assignment,
        });
    }

    Ok(reviews)
}

/// Assignments created by the given user, newest first.
pub async fn assignments_made_by(
    db: &DatabaseConnection,
    user_id: i64,
) -> Result<Vec<point_assignment::Model>> {
    PointAssignment::find()
        .filter(point_assignment::Column::AssignorId.eq(user_id))
        .filter(point_assignment::Column::DeletedAt.is_null())
        .order_by_desc(point_assignment::Column::CreatedAt)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Assignments received by the given user, newest first.
pub async fn assignments_received_by(
    db: &DatabaseConnection,
    user_id: i64,
) -> Result<Vec<point_assignment::Model>> {
    PointAssignment::find()
        .filter(point_assignment::Column::RecipientId.eq(user_id))
        .filter(point_assignment::Column::DeletedAt.is_null())
        .order_by_desc(point_assignment::Column::CreatedAt)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Resolves an assignment's principals for the event payload.
pub async fn load_detail(
    db: &DatabaseConnection,
    assignment: &point_assignment::Model,
) -> Result<AssignmentDetail> {
    let assignor = User::find_by_id(assignment.assignor_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "user",
            id: assignment.assignor_id,
        })?;
    let recipient = User::find_by_id(assignment.recipient_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "user",
            id: assignment.recipient_id,
        })?;
    let verifier = match assignment.verified_by {
        Some(verifier_id) => User::find_by_id(verifier_id).one(db).await?,
        None => None,
    };

    Ok(AssignmentDetail {
        assignment: assignment.clone(),
        assignor,
        recipient,
        verifier,
    })
}

async fn publish_created(db: &DatabaseConnection, events: &EventBus, row: &point_assignment::Model) {
    match load_detail(db, row).await {
        Ok(detail) => events.publish(Event::AssignmentCreated { detail }),
        Err(err) => error!(%err, assignment_id = row.id, "failed to load assignment for event"),
    }
}

async fn publish_status_changed(
    db: &DatabaseConnection,
    events: &EventBus,
    row: &point_assignment::Model,
) {
    match load_detail(db, row).await {
        Ok(detail) => events.publish(Event::AssignmentStatusChanged {
            detail,
            previous_status: AssignmentStatus::Pending,
        }),
        Err(err) => error!(%err, assignment_id = row.id, "failed to load assignment for event"),
    }
}

async fn principals_by_id(
    db: &DatabaseConnection,
    assignments: &[point_assignment::Model],
) -> Result<HashMap<i64, user::Model>> {
    let ids: Vec<i64> = assignments
        .iter()
        .flat_map(|a| [a.assignor_id, a.recipient_id])
        .collect();

    let users = User::find()
        .filter(user::Column::Id.is_in(ids))
        .all(db)
        .await?;

    Ok(users.into_iter().map(|u| (u.id, u)).collect())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::entities::AuditLog;
    use crate::test_utils::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[tokio::test]
    async fn test_create_assignment_validation() -> Result<()> {
        let db = setup_test_db().await?;
        let (events, _rx) = test_event_bus();
        let assignor = create_test_user(&db, "Ann", Role::User).await?;
        let recipient = create_test_user(&db, "Bob", Role::User).await?;

        let result =
            create_assignment(&db, &events, &assignor, recipient.id, 0, "x".to_string()).await;
        assert!(matches!(result.unwrap_err(), Error::Validation { .. }));

        let result =
            create_assignment(&db, &events, &assignor, recipient.id, 5, "   ".to_string()).await;
        assert!(matches!(result.unwrap_err(), Error::Validation { .. }));

        let result =
            create_assignment(&db, &events, &assignor, 9999, 5, "good work".to_string()).await;
        assert!(matches!(result.unwrap_err(), Error::NotFound { .. }));

        Ok(())
    }

    #[tokio::test]
    async fn test_plain_user_assignment_is_pending() -> Result<()> {
        let db = setup_test_db().await?;
        let (events, mut rx) = test_event_bus();
        let ann = create_test_user(&db, "Ann", Role::User).await?;
        let bob = create_test_user(&db, "Bob", Role::User).await?;

        let created =
            create_assignment(&db, &events, &ann, bob.id, 5, "good work".to_string()).await?;

        assert_eq!(created.status, AssignmentStatus::Pending);
        assert!(created.verified_by.is_none());
        assert!(created.verified_at.is_none());

        // Recipient's total is untouched until approval
        let bob = reload_user(&db, bob.id).await?;
        assert_eq!(bob.total_verified_points, 0);

        let fired = drain_events(&mut rx);
        assert_eq!(fired.len(), 1);
        assert!(matches!(fired[0], Event::AssignmentCreated { .. }));

        Ok(())
    }

    #[tokio::test]
    async fn test_supervisor_assignment_is_auto_verified() -> Result<()> {
        let db = setup_test_db().await?;
        let (events, mut rx) = test_event_bus();
        let sup = create_test_user(&db, "Sup", Role::Supervisor).await?;
        let bob = create_test_user(&db, "Bob", Role::User).await?;

        let created =
            create_assignment(&db, &events, &sup, bob.id, -3, "late arrival".to_string()).await?;

        assert_eq!(created.status, AssignmentStatus::Verified);
        assert_eq!(created.verified_by, Some(sup.id));
        assert!(created.verified_at.is_some());

        // Negative totals are allowed; no floor at zero
        let bob = reload_user(&db, bob.id).await?;
        assert_eq!(bob.total_verified_points, -3);

        let fired = drain_events(&mut rx);
        assert_eq!(fired.len(), 1);
        match &fired[0] {
            Event::AssignmentCreated { detail } => {
                assert_eq!(detail.assignment.status, AssignmentStatus::Verified);
                assert_eq!(detail.recipient.id, bob.id);
                assert_eq!(detail.verifier.as_ref().unwrap().id, sup.id);
            }
            other => panic!("unexpected event {other:?}"),
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_approve_flow() -> Result<()> {
        let db = setup_test_db().await?;
        let (events, mut rx) = test_event_bus();
        let ann = create_test_user(&db, "Ann", Role::User).await?;
        let bob = create_test_user(&db, "Bob", Role::User).await?;
        let sup = create_test_user(&db, "Sup", Role::Supervisor).await?;

        let created =
            create_assignment(&db, &events, &ann, bob.id, 5, "good work".to_string()).await?;
        drain_events(&mut rx);

        let approved = approve(&db, &events, &sup, created.id).await?;

        assert_eq!(approved.status, AssignmentStatus::Verified);
        assert_eq!(approved.verified_by, Some(sup.id));

        let bob = reload_user(&db, bob.id).await?;
        assert_eq!(bob.total_verified_points, 5);

        let fired = drain_events(&mut rx);
        assert_eq!(fired.len(), 1);
        match &fired[0] {
            Event::AssignmentStatusChanged {
                detail,
                previous_status,
            } => {
                assert_eq!(*previous_status, AssignmentStatus::Pending);
                assert_eq!(detail.assignment.status, AssignmentStatus::Verified);
            }
            other => panic!("unexpected event {other:?}"),
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_approve_requires_reviewer_role() -> Result<()> {
        let db = setup_test_db().await?;
        let (events, _rx) = test_event_bus();
        let ann = create_test_user(&db, "Ann", Role::User).await?;
        let bob = create_test_user(&db, "Bob", Role::User).await?;

        let created =
            create_assignment(&db, &events, &ann, bob.id, 5, "good work".to_string()).await?;

        let result = approve(&db, &events, &bob, created.id).await;
        assert!(matches!(result.unwrap_err(), Error::Forbidden { .. }));

        Ok(())
    }

    #[tokio::test]
    async fn test_approve_twice_increments_once() -> Result<()> {
        let db = setup_test_db().await?;
        let (events, _rx) = test_event_bus();
        let ann = create_test_user(&db, "Ann", Role::User).await?;
        let bob = create_test_user(&db, "Bob", Role::User).await?;
        let sup = create_test_user(&db, "Sup", Role::Supervisor).await?;

        let created =
            create_assignment(&db, &events, &ann, bob.id, 5, "good work".to_string()).await?;

        approve(&db, &events, &sup, created.id).await?;
        let second = approve(&db, &events, &sup, created.id).await;
        assert!(matches!(second.unwrap_err(), Error::InvalidState { .. }));

        let bob = reload_user(&db, bob.id).await?;
        assert_eq!(bob.total_verified_points, 5);

        Ok(())
    }

    #[tokio::test]
    async fn test_reject_reason_length_bounds() -> Result<()> {
        let db = setup_test_db().await?;
        let (events, _rx) = test_event_bus();
        let ann = create_test_user(&db, "Ann", Role::User).await?;
        let bob = create_test_user(&db, "Bob", Role::User).await?;
        let sup = create_test_user(&db, "Sup", Role::Supervisor).await?;

        let created =
            create_assignment(&db, &events, &ann, bob.id, 5, "good work".to_string()).await?;

        let result = reject(&db, &events, &sup, created.id, "no").await;
        assert!(matches!(result.unwrap_err(), Error::Validation { .. }));

        let result = reject(&db, &events, &sup, created.id, "").await;
        assert!(matches!(result.unwrap_err(), Error::Validation { .. }));

        let too_long = "x".repeat(501);
        let result = reject(&db, &events, &sup, created.id, &too_long).await;
        assert!(matches!(result.unwrap_err(), Error::Validation { .. }));

        // Exactly three characters is the lower bound
        let rejected = reject(&db, &events, &sup, created.id, "dup").await?;
        assert_eq!(rejected.status, AssignmentStatus::Rejected);

        Ok(())
    }

    #[tokio::test]
    async fn test_reject_leaves_total_untouched() -> Result<()> {
        let db = setup_test_db().await?;
        let (events, mut rx) = test_event_bus();
        let ann = create_test_user(&db, "Ann", Role::User).await?;
        let bob = create_test_user(&db, "Bob", Role::User).await?;
        let sup = create_test_user(&db, "Sup", Role::Supervisor).await?;

        let created =
            create_assignment(&db, &events, &ann, bob.id, 5, "good work".to_string()).await?;
        drain_events(&mut rx);

        let rejected = reject(&db, &events, &sup, created.id, "duplicate entry").await?;
        assert_eq!(rejected.status, AssignmentStatus::Rejected);
        assert_eq!(
            rejected.rejection_reason.as_deref(),
            Some("duplicate entry")
        );
        assert_eq!(rejected.verified_by, Some(sup.id));

        let bob = reload_user(&db, bob.id).await?;
        assert_eq!(bob.total_verified_points, 0);

        let fired = drain_events(&mut rx);
        assert_eq!(fired.len(), 1);
        match &fired[0] {
            Event::AssignmentStatusChanged {
                detail,
                previous_status,
            } => {
                assert_eq!(*previous_status, AssignmentStatus::Pending);
                assert_eq!(detail.assignment.status, AssignmentStatus::Rejected);
            }
            other => panic!("unexpected event {other:?}"),
        }

        // A rejected assignment is terminal
        let result = approve(&db, &events, &sup, created.id).await;
        assert!(matches!(result.unwrap_err(), Error::InvalidState { .. }));

        Ok(())
    }

    #[tokio::test]
    async fn test_bulk_reject_skips_processed_rows() -> Result<()> {
        let db = setup_test_db().await?;
        let (events, _rx) = test_event_bus();
        let ann = create_test_user(&db, "Ann", Role::User).await?;
        let bob = create_test_user(&db, "Bob", Role::User).await?;
        let sup = create_test_user(&db, "Sup", Role::Supervisor).await?;

        let mut ids = Vec::new();
        for n in 0..5 {
            let created =
                create_assignment(&db, &events, &ann, bob.id, 1, format!("item {n}")).await?;
            ids.push(created.id);
        }

        // Two of the five are already verified before the bulk reject
        approve(&db, &events, &sup, ids[0]).await?;
        approve(&db, &events, &sup, ids[1]).await?;

        let rejected = bulk_reject(&db, &events, &sup, &ids, "batch cleanup").await?;
        assert_eq!(rejected, 3);

        // The two verified rows are untouched
        for id in &ids[..2] {
            let row = get_assignment_by_id(&db, *id).await?.unwrap();
            assert_eq!(row.status, AssignmentStatus::Verified);
        }
        for id in &ids[2..] {
            let row = get_assignment_by_id(&db, *id).await?.unwrap();
            assert_eq!(row.status, AssignmentStatus::Rejected);
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_bulk_approve_counts_and_audits() -> Result<()> {
        let db = setup_test_db().await?;
        let (events, _rx) = test_event_bus();
        let ann = create_test_user(&db, "Ann", Role::User).await?;
        let bob = create_test_user(&db, "Bob", Role::User).await?;
        let sup = create_test_user(&db, "Sup", Role::Supervisor).await?;

        let mut ids = Vec::new();
        for n in 0..3 {
            let created =
                create_assignment(&db, &events, &ann, bob.id, 2, format!("item {n}")).await?;
            ids.push(created.id);
        }
        // An unknown id in the batch is ignored
        ids.push(9999);

        let approved = bulk_approve(&db, &events, &sup, &ids).await?;
        assert_eq!(approved, 3);

        let bob = reload_user(&db, bob.id).await?;
        assert_eq!(bob.total_verified_points, 6);

        let logs = AuditLog::find().all(&db).await?;
        let summary = logs
            .iter()
            .find(|log| log.action == "bulk_approved_points")
            .unwrap();
        assert_eq!(summary.data["approved_count"], 3);

        Ok(())
    }

    #[tokio::test]
    async fn test_bulk_assign_to_all_excludes_admins_and_actor() -> Result<()> {
        let db = setup_test_db().await?;
        let (events, mut rx) = test_event_bus();
        let admin = create_test_user(&db, "Admin", Role::Admin).await?;
        let sup = create_test_user(&db, "Sup", Role::Supervisor).await?;
        let ann = create_test_user(&db, "Ann", Role::User).await?;
        let bob = create_test_user(&db, "Bob", Role::User).await?;

        let count =
            bulk_assign_to_all(&db, &events, &sup, 10, "quarterly bonus".to_string()).await?;
        assert_eq!(count, 2);

        for recipient in [&ann, &bob] {
            let reloaded = reload_user(&db, recipient.id).await?;
            assert_eq!(reloaded.total_verified_points, 10);
        }
        let admin = reload_user(&db, admin.id).await?;
        assert_eq!(admin.total_verified_points, 0);
        let sup = reload_user(&db, sup.id).await?;
        assert_eq!(sup.total_verified_points, 0);

        let rows = PointAssignment::find().all(&db).await?;
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.is_bulk_assignment));
        assert!(rows.iter().all(|r| r.status == AssignmentStatus::Verified));

        // One created event per recipient
        let fired = drain_events(&mut rx);
        assert_eq!(fired.len(), 2);

        Ok(())
    }

    #[tokio::test]
    async fn test_bulk_assign_requires_reviewer() -> Result<()> {
        let db = setup_test_db().await?;
        let (events, _rx) = test_event_bus();
        let ann = create_test_user(&db, "Ann", Role::User).await?;

        let result = bulk_assign_to_all(&db, &events, &ann, 5, "nope".to_string()).await;
        assert!(matches!(result.unwrap_err(), Error::Forbidden { .. }));

        Ok(())
    }

    #[tokio::test]
    async fn test_total_matches_verified_ledger_sum() -> Result<()> {
        let db = setup_test_db().await?;
        let (events, _rx) = test_event_bus();
        let ann = create_test_user(&db, "Ann", Role::User).await?;
        let bob = create_test_user(&db, "Bob", Role::User).await?;
        let sup = create_test_user(&db, "Sup", Role::Supervisor).await?;

        // A mixed sequence: auto-verified, approved, rejected, left pending
        create_assignment(&db, &events, &sup, bob.id, 7, "auto".to_string()).await?;
        let a = create_assignment(&db, &events, &ann, bob.id, 5, "approve me".to_string()).await?;
        approve(&db, &events, &sup, a.id).await?;
        let r = create_assignment(&db, &events, &ann, bob.id, 9, "reject me".to_string()).await?;
        reject(&db, &events, &sup, r.id, "not earned").await?;
        create_assignment(&db, &events, &ann, bob.id, 4, "still pending".to_string()).await?;
        create_assignment(&db, &events, &sup, bob.id, -2, "deduction".to_string()).await?;

        let bob = reload_user(&db, bob.id).await?;
        let ledger_sum = crate::core::report::verified_points_sum(&db, bob.id).await?;

        assert_eq!(bob.total_verified_points, 10);
        assert_eq!(ledger_sum, bob.total_verified_points);

        Ok(())
    }

    #[tokio::test]
    async fn test_pending_reviews_annotates_urgency() -> Result<()> {
        let db = setup_test_db().await?;
        let (events, _rx) = test_event_bus();
        let ann = create_test_user(&db, "Ann", Role::User).await?;
        let bob = create_test_user(&db, "Bob", Role::User).await?;
        let sup = create_test_user(&db, "Sup", Role::Supervisor).await?;

        create_assignment(&db, &events, &ann, bob.id, 5, "fresh".to_string()).await?;

        let reviews = pending_reviews(&db, &sup).await?;
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].days_pending, 0);
        assert_eq!(reviews[0].urgency, Urgency::Normal);
        assert_eq!(reviews[0].assignor.id, ann.id);
        assert_eq!(reviews[0].recipient.id, bob.id);

        // Plain users cannot see the review queue
        let result = pending_reviews(&db, &ann).await;
        assert!(matches!(result.unwrap_err(), Error::Forbidden { .. }));

        Ok(())
    }

    #[test]
    fn test_urgency_thresholds() {
        assert_eq!(Urgency::from_days_pending(0), Urgency::Normal);
        assert_eq!(Urgency::from_days_pending(1), Urgency::Attention);
        assert_eq!(Urgency::from_days_pending(2), Urgency::Attention);
        assert_eq!(Urgency::from_days_pending(3), Urgency::Urgent);
        assert_eq!(Urgency::from_days_pending(30), Urgency::Urgent);
    }

    #[tokio::test]
    async fn test_approve_unknown_assignment_not_found() -> Result<()> {
        // MockDatabase returning no rows simulates a missing assignment
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results([Vec::<point_assignment::Model>::new()])
            .into_connection();
        let (events, _rx) = test_event_bus();
        let sup = stub_supervisor();

        let result = approve(&db, &events, &sup, 42).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::NotFound {
                entity: "point assignment",
                id: 42
            }
        ));

        Ok(())
    }

    fn stub_supervisor() -> user::Model {
        user::Model {
            id: 1,
            name: "Sup".to_string(),
            email: "sup@example.com".to_string(),
            password_hash: String::new(),
            role: Role::Supervisor,
            total_verified_points: 0,
            email_verified_at: None,
            email_on_point_received: true,
            email_on_point_verified: true,
            email_on_pending_points: true,
            created_at: chrono::Utc::now(),
        }
    }
}
