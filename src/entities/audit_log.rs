//! Audit log entity - Append-only record of every mutating action.
//!
//! Each entry names the acting user, an action tag such as `assigned_point`
//! or `role_changed`, and a JSON payload specific to the action. Entries are
//! never updated or deleted in normal operation.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Audit log database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "audit_logs")]
pub struct Model {
    /// Unique identifier for the entry
    #[sea_orm(primary_key)]
    pub id: i64,
    /// User who performed the action
    pub user_id: i64,
    /// Action tag, e.g. `assigned_point`, `approved_point`, `user_deleted`
    pub action: String,
    /// Structured payload specific to the action
    pub data: Json,
    /// When the action happened
    pub created_at: DateTimeUtc,
}

/// Defines relationships between AuditLog and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each entry belongs to the acting user
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
