//! Audit log writer and queries.
//!
//! The writer is a pure append: actor id, action tag, structured payload.
//! Workflow operations call [`record_best_effort`] after their transaction
//! commits - a failed audit write is logged for operators but never rolls
//! back or fails the business operation that triggered it.

use crate::{
    entities::{AuditLog, audit_log},
    errors::{Error, Result},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use tracing::error;

/// Appends one audit entry.
pub async fn record<C>(
    db: &C,
    actor_id: i64,
    action: &str,
    data: serde_json::Value,
) -> Result<audit_log::Model>
where
    C: ConnectionTrait,
{
    let entry = audit_log::ActiveModel {
        user_id: Set(actor_id),
        action: Set(action.to_string()),
        data: Set(data),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    };

    entry.insert(db).await.map_err(Into::into)
}

/// Appends one audit entry, swallowing failures.
///
/// The failure is surfaced to operators via the error log.
pub async fn record_best_effort<C>(db: &C, actor_id: i64, action: &str, data: serde_json::Value)
where
    C: ConnectionTrait,
{
    if let Err(err) = record(db, actor_id, action, data).await {
        error!(%err, action, actor_id, "audit log write failed");
    }
}

/// Filters for the admin audit listing.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    /// Only entries with this action tag
    pub action: Option<String>,
    /// Only entries created at or after this instant
    pub from: Option<chrono::DateTime<chrono::Utc>>,
    /// Only entries created at or before this instant
    pub to: Option<chrono::DateTime<chrono::Utc>>,
    /// Maximum number of entries returned (default 50)
    pub limit: Option<u64>,
}

/// Lists audit entries for the admin review screen, newest first. Admin only.
pub async fn list_entries(
    db: &DatabaseConnection,
    actor: &crate::entities::user::Model,
    filter: AuditFilter,
) -> Result<Vec<audit_log::Model>> {
    if !actor.role.is_admin() {
        return Err(Error::forbidden("Only admins can review the audit log"));
    }

    let mut query = AuditLog::find().order_by_desc(audit_log::Column::CreatedAt);

    if let Some(action) = filter.action {
        query = query.filter(audit_log::Column::Action.eq(action));
    }
    if let Some(from) = filter.from {
        query = query.filter(audit_log::Column::CreatedAt.gte(from));
    }
    if let Some(to) = filter.to {
        query = query.filter(audit_log::Column::CreatedAt.lte(to));
    }

    query
        .limit(filter.limit.unwrap_or(50))
        .all(db)
        .await
        .map_err(Into::into)
}

/// Recent audit entries where the given user is the actor, newest first.
pub async fn recent_for_user(
    db: &DatabaseConnection,
    user_id: i64,
    limit: u64,
) -> Result<Vec<audit_log::Model>> {
    AuditLog::find()
        .filter(audit_log::Column::UserId.eq(user_id))
        .order_by_desc(audit_log::Column::CreatedAt)
        .limit(limit)
        .all(db)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::entities::Role;
    use crate::test_utils::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_record_appends_entry() -> Result<()> {
        let db = setup_test_db().await?;
        let admin = create_test_user(&db, "Admin", Role::Admin).await?;

        let entry = record(
            &db,
            admin.id,
            "assigned_point",
            json!({"recipient_id": 7, "points": 5}),
        )
        .await?;

        assert_eq!(entry.user_id, admin.id);
        assert_eq!(entry.action, "assigned_point");
        assert_eq!(entry.data["points"], 5);

        Ok(())
    }

    #[tokio::test]
    async fn test_list_entries_requires_admin() -> Result<()> {
        let db = setup_test_db().await?;
        let supervisor = create_test_user(&db, "Sup", Role::Supervisor).await?;

        let result = list_entries(&db, &supervisor, AuditFilter::default()).await;
        assert!(matches!(result.unwrap_err(), Error::Forbidden { .. }));

        Ok(())
    }

    #[tokio::test]
    async fn test_list_entries_filters_by_action() -> Result<()> {
        let db = setup_test_db().await?;
        let admin = create_test_user(&db, "Admin", Role::Admin).await?;

        record(&db, admin.id, "assigned_point", json!({})).await?;
        record(&db, admin.id, "approved_point", json!({})).await?;
        record(&db, admin.id, "assigned_point", json!({})).await?;

        let entries = list_entries(
            &db,
            &admin,
            AuditFilter {
                action: Some("assigned_point".to_string()),
                ..Default::default()
            },
        )
        .await?;

        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.action == "assigned_point"));

        Ok(())
    }

    #[tokio::test]
    async fn test_recent_for_user_orders_newest_first() -> Result<()> {
        let db = setup_test_db().await?;
        let admin = create_test_user(&db, "Admin", Role::Admin).await?;

        let first = record(&db, admin.id, "role_changed", json!({"n": 1})).await?;
        let second = record(&db, admin.id, "role_changed", json!({"n": 2})).await?;

        let entries = recent_for_user(&db, admin.id, 10).await?;
        assert_eq!(entries.len(), 2);
        assert!(entries[0].id == second.id && entries[1].id == first.id);

        Ok(())
    }
}
