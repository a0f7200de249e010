//! User entity - Represents every account in the point-tracking system.
//!
//! Each user has a role (`user`, `supervisor`, or `admin`), a running
//! `total_verified_points` counter maintained by the workflow engine, and
//! per-user email notification preference flags.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Role held by a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum Role {
    #[sea_orm(string_value = "user")]
    #[default]
    User,
    #[sea_orm(string_value = "supervisor")]
    Supervisor,
    #[sea_orm(string_value = "admin")]
    Admin,
}

impl Role {
    /// Whether this role may approve or reject pending point assignments.
    #[must_use]
    pub const fn can_verify_points(self) -> bool {
        matches!(self, Self::Supervisor | Self::Admin)
    }

    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }

    /// Stable lowercase tag, as stored in the database and audit payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Supervisor => "supervisor",
            Self::Admin => "admin",
        }
    }
}

/// User database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Unique identifier for the user
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name
    pub name: String,
    /// Email address, unique across all accounts
    #[sea_orm(unique)]
    pub email: String,
    /// Argon2 password hash
    pub password_hash: String,
    /// Account role, gating verification and administration
    pub role: Role,
    /// Running sum of this user's verified points, maintained by the
    /// workflow engine only
    pub total_verified_points: i64,
    /// When an admin verified this account, None while unverified
    pub email_verified_at: Option<DateTimeUtc>,
    /// Email the user when points are assigned to them
    pub email_on_point_received: bool,
    /// Email the user when their pending points are approved or rejected
    pub email_on_point_verified: bool,
    /// Email the user (supervisors) a digest of pending assignments
    pub email_on_pending_points: bool,
    /// When the account was created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between User and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One user writes many audit log entries
    #[sea_orm(has_many = "super::audit_log::Entity")]
    AuditLogs,
}

impl Related<super::audit_log::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AuditLogs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_permissions() {
        assert!(!Role::User.can_verify_points());
        assert!(Role::Supervisor.can_verify_points());
        assert!(Role::Admin.can_verify_points());

        assert!(!Role::User.is_admin());
        assert!(!Role::Supervisor.is_admin());
        assert!(Role::Admin.is_admin());
    }

    #[test]
    fn test_role_tags_are_lowercase() {
        assert_eq!(Role::User.as_str(), "user");
        assert_eq!(Role::Supervisor.as_str(), "supervisor");
        assert_eq!(Role::Admin.as_str(), "admin");
    }
}
