//! Point assignment entity - The ledger of every point transaction.
//!
//! Each row records who assigned how many points to whom and why, plus the
//! verification state. Rows created by supervisors or admins start out
//! `verified`; rows created by plain users start `pending` and are later
//! approved or rejected. Verified and rejected are terminal states.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Verification state of a point assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum AssignmentStatus {
    #[sea_orm(string_value = "pending")]
    #[default]
    Pending,
    #[sea_orm(string_value = "verified")]
    Verified,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

impl AssignmentStatus {
    /// Stable lowercase tag, as stored in the database and audit payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
        }
    }
}

/// Point assignment database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "point_assignments")]
pub struct Model {
    /// Unique identifier for the assignment
    #[sea_orm(primary_key)]
    pub id: i64,
    /// User who assigned the points
    pub assignor_id: i64,
    /// User who receives the points
    pub recipient_id: i64,
    /// Signed point amount; never zero
    pub points: i64,
    /// Reason given for the assignment
    #[sea_orm(column_type = "Text")]
    pub reason: String,
    /// Verification state; pending rows await supervisor review
    pub status: AssignmentStatus,
    /// User who approved or rejected the assignment, None while pending
    pub verified_by: Option<i64>,
    /// When the assignment was approved or rejected
    pub verified_at: Option<DateTimeUtc>,
    /// Reviewer's reason when the assignment was rejected
    #[sea_orm(column_type = "Text", nullable)]
    pub rejection_reason: Option<String>,
    /// Whether the row was produced by a bulk assign-to-all operation
    pub is_bulk_assignment: bool,
    /// When the assignment was created
    pub created_at: DateTimeUtc,
    /// Soft-delete marker; rows are retained for the audit trail
    pub deleted_at: Option<DateTimeUtc>,
}

/// Defines relationships between PointAssignment and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each assignment was created by one user
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::AssignorId",
        to = "super::user::Column::Id"
    )]
    Assignor,
    /// Each assignment targets one recipient
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::RecipientId",
        to = "super::user::Column::Id"
    )]
    Recipient,
    /// Each processed assignment was reviewed by one user; cleared when the
    /// reviewer account is deleted
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::VerifiedBy",
        to = "super::user::Column::Id",
        on_delete = "SetNull"
    )]
    Verifier,
}

impl ActiveModelBehavior for ActiveModel {}
