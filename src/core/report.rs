//! Read-only reporting and aggregation over the ledger and user directory.
//!
//! Nothing here mutates state; every function is a deterministic projection
//! (sums, counts, groupings) consumed by dashboards and the leaderboard.

use crate::{
    core::user::count_admins,
    entities::{AssignmentStatus, PointAssignment, Role, User, point_assignment, user},
    errors::{Error, Result},
};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};

/// Per-user dashboard numbers.
///
/// For admins the point sums are system-wide; for everyone else they cover
/// only assignments received by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserStats {
    /// Assignments this user has created
    pub assigned_by_me: u64,
    /// Assignments this user has received
    pub received_by_me: u64,
    /// Sum of verified points in scope
    pub verified_points: i64,
    /// Sum of points still awaiting review in scope
    pub pending_points: i64,
    /// The user's running total
    pub total_verified_points: i64,
}

/// Supervisor dashboard numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorStats {
    /// Users who are not admins
    pub total_team_members: u64,
    /// Assignments awaiting review
    pub pending_reviews: u64,
    /// Assignments verified within the last week
    pub approved_this_week: u64,
    /// Assignments rejected within the last week
    pub rejected_this_week: u64,
    /// Mean running total across the team, one decimal
    pub average_team_points: f64,
    /// Pending assignments older than three days
    pub urgent_assignments: u64,
    /// Assignments this supervisor created within the last week
    pub my_assignments_this_week: u64,
}

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub user_id: i64,
    pub name: String,
    /// Verified points received inside the queried window
    pub total_points: i64,
}

/// Admin system overview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminOverview {
    pub admins: u64,
    pub supervisors: u64,
    pub users: u64,
    /// System-wide sum of verified points
    pub total_verified_points: i64,
    /// System-wide sum of points awaiting review
    pub total_pending_points: i64,
    /// Number of rejected assignments
    pub rejected_count: u64,
    /// Assignments created within the last week
    pub assignments_this_week: u64,
    /// Top five non-admin users by running total
    pub top_performers: Vec<LeaderboardEntry>,
}

/// Sum of `points` over the verified ledger rows received by one user.
///
/// By the workflow engine's invariant this equals the user's
/// `total_verified_points`; tests assert the two stay in agreement.
pub async fn verified_points_sum(db: &DatabaseConnection, user_id: i64) -> Result<i64> {
    sum_points(
        db,
        Condition::all()
            .add(point_assignment::Column::RecipientId.eq(user_id))
            .add(point_assignment::Column::Status.eq(AssignmentStatus::Verified)),
    )
    .await
}

/// Dashboard stats for one user.
pub async fn user_stats(db: &DatabaseConnection, subject: &user::Model) -> Result<UserStats> {
    let assigned_by_me = PointAssignment::find()
        .filter(point_assignment::Column::AssignorId.eq(subject.id))
        .filter(point_assignment::Column::DeletedAt.is_null())
        .count(db)
        .await?;
    let received_by_me = PointAssignment::find()
        .filter(point_assignment::Column::RecipientId.eq(subject.id))
        .filter(point_assignment::Column::DeletedAt.is_null())
        .count(db)
        .await?;

    // Admins look at the whole system, everyone else at their own inbox
    let scope = |status: AssignmentStatus| {
        let mut condition =
            Condition::all().add(point_assignment::Column::Status.eq(status));
        if !subject.role.is_admin() {
            condition = condition.add(point_assignment::Column::RecipientId.eq(subject.id));
        }
        condition
    };

    let verified_points = sum_points(db, scope(AssignmentStatus::Verified)).await?;
    let pending_points = sum_points(db, scope(AssignmentStatus::Pending)).await?;

    Ok(UserStats {
        assigned_by_me,
        received_by_me,
        verified_points,
        pending_points,
        total_verified_points: subject.total_verified_points,
    })
}

/// Supervisor dashboard stats. Supervisor/admin only.
pub async fn supervisor_stats(
    db: &DatabaseConnection,
    actor: &user::Model,
) -> Result<SupervisorStats> {
    if !actor.role.can_verify_points() {
        return Err(Error::forbidden(
            "Only supervisors and admins can view supervisor statistics",
        ));
    }

    let now = Utc::now();
    let one_week_ago = now - Duration::weeks(1);
    let three_days_ago = now - Duration::days(3);

    let total_team_members = User::find()
        .filter(user::Column::Role.ne(Role::Admin))
        .count(db)
        .await?;

    let pending_reviews = PointAssignment::find()
        .filter(point_assignment::Column::Status.eq(AssignmentStatus::Pending))
        .filter(point_assignment::Column::DeletedAt.is_null())
        .count(db)
        .await?;

    let approved_this_week = PointAssignment::find()
        .filter(point_assignment::Column::Status.eq(AssignmentStatus::Verified))
        .filter(point_assignment::Column::VerifiedAt.gte(one_week_ago))
        .count(db)
        .await?;

    let rejected_this_week = PointAssignment::find()
        .filter(point_assignment::Column::Status.eq(AssignmentStatus::Rejected))
        .filter(point_assignment::Column::VerifiedAt.gte(one_week_ago))
        .count(db)
        .await?;

    let urgent_assignments = PointAssignment::find()
        .filter(point_assignment::Column::Status.eq(AssignmentStatus::Pending))
        .filter(point_assignment::Column::CreatedAt.lt(three_days_ago))
        .filter(point_assignment::Column::DeletedAt.is_null())
        .count(db)
        .await?;

    let my_assignments_this_week = PointAssignment::find()
        .filter(point_assignment::Column::AssignorId.eq(actor.id))
        .filter(point_assignment::Column::CreatedAt.gte(one_week_ago))
        .count(db)
        .await?;

    let team_points_sum = sum_user_totals(db).await?;
    let average_team_points = if total_team_members == 0 {
        0.0
    } else {
        let raw = team_points_sum as f64 / total_team_members as f64;
        (raw * 10.0).round() / 10.0
    };

    Ok(SupervisorStats {
        total_team_members,
        pending_reviews,
        approved_this_week,
        rejected_this_week,
        average_team_points,
        urgent_assignments,
        my_assignments_this_week,
    })
}

/// Verified points received per non-admin user inside a time window,
/// highest first.
pub async fn leaderboard(
    db: &DatabaseConnection,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<LeaderboardEntry>> {
    let members = User::find()
        .filter(user::Column::Role.ne(Role::Admin))
        .order_by_asc(user::Column::Name)
        .all(db)
        .await?;

    let sums: Vec<(i64, Option<i64>)> = PointAssignment::find()
        .select_only()
        .column(point_assignment::Column::RecipientId)
        .column_as(point_assignment::Column::Points.sum(), "total")
        .filter(point_assignment::Column::Status.eq(AssignmentStatus::Verified))
        .filter(point_assignment::Column::CreatedAt.gte(start))
        .filter(point_assignment::Column::CreatedAt.lte(end))
        .filter(point_assignment::Column::DeletedAt.is_null())
        .group_by(point_assignment::Column::RecipientId)
        .into_tuple()
        .all(db)
        .await?;

    let totals: std::collections::HashMap<i64, i64> = sums
        .into_iter()
        .map(|(recipient_id, total)| (recipient_id, total.unwrap_or(0)))
        .collect();

    let mut entries: Vec<LeaderboardEntry> = members
        .into_iter()
        .map(|member| LeaderboardEntry {
            total_points: totals.get(&member.id).copied().unwrap_or(0),
            user_id: member.id,
            name: member.name,
        })
        .collect();

    entries.sort_by(|a, b| b.total_points.cmp(&a.total_points).then(a.name.cmp(&b.name)));
    Ok(entries)
}

/// System overview for the admin dashboard. Admin only.
pub async fn admin_overview(db: &DatabaseConnection, actor: &user::Model) -> Result<AdminOverview> {
    if !actor.role.is_admin() {
        return Err(Error::forbidden("Only admins can view the system overview"));
    }

    let admins = count_admins(db).await?;
    let supervisors = User::find()
        .filter(user::Column::Role.eq(Role::Supervisor))
        .count(db)
        .await?;
    let users = User::find()
        .filter(user::Column::Role.eq(Role::User))
        .count(db)
        .await?;

    let total_verified_points = sum_points(
        db,
        Condition::all().add(point_assignment::Column::Status.eq(AssignmentStatus::Verified)),
    )
    .await?;
    let total_pending_points = sum_points(
        db,
        Condition::all().add(point_assignment::Column::Status.eq(AssignmentStatus::Pending)),
    )
    .await?;

    let rejected_count = PointAssignment::find()
        .filter(point_assignment::Column::Status.eq(AssignmentStatus::Rejected))
        .count(db)
        .await?;

    let one_week_ago = Utc::now() - Duration::weeks(1);
    let assignments_this_week = PointAssignment::find()
        .filter(point_assignment::Column::CreatedAt.gte(one_week_ago))
        .count(db)
        .await?;

    let top_performers = User::find()
        .filter(user::Column::Role.ne(Role::Admin))
        .order_by_desc(user::Column::TotalVerifiedPoints)
        .limit(5)
        .all(db)
        .await?
        .into_iter()
        .map(|member| LeaderboardEntry {
            user_id: member.id,
            total_points: member.total_verified_points,
            name: member.name,
        })
        .collect();

    Ok(AdminOverview {
        admins,
        supervisors,
        users,
        total_verified_points,
        total_pending_points,
        rejected_count,
        assignments_this_week,
        top_performers,
    })
}

async fn sum_points(db: &DatabaseConnection, condition: Condition) -> Result<i64> {
    let total: Option<Option<i64>> = PointAssignment::find()
        .select_only()
        .column_as(point_assignment::Column::Points.sum(), "total")
        .filter(condition)
        .filter(point_assignment::Column::DeletedAt.is_null())
        .into_tuple()
        .one(db)
        .await?;

    Ok(total.flatten().unwrap_or(0))
}

async fn sum_user_totals(db: &DatabaseConnection) -> Result<i64> {
    let total: Option<Option<i64>> = User::find()
        .select_only()
        .column_as(user::Column::TotalVerifiedPoints.sum(), "total")
        .filter(user::Column::Role.ne(Role::Admin))
        .into_tuple()
        .one(db)
        .await?;

    Ok(total.flatten().unwrap_or(0))
}
