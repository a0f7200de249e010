//! User directory business logic.
//!
//! Provides account creation, role management, admin verification, guarded
//! deletion, and notification preference updates. Every mutating operation
//! takes the acting user explicitly and checks permissions here, not at the
//! transport layer. All functions are async and return Result types for
//! error handling.

use crate::{
    core::audit,
    entities::{PointAssignment, Role, User, point_assignment, user},
    errors::{Error, Result},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde_json::json;

/// Hashes a plaintext password with Argon2id and a fresh random salt.
pub fn hash_password(password: &str) -> Result<String> {
    use argon2::{
        Argon2,
        password_hash::{PasswordHasher as _, SaltString, rand_core::OsRng},
    };

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Config {
            message: format!("Password hashing failed: {e}"),
        })
}

/// Verifies a plaintext password against a stored Argon2 hash.
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    use argon2::{
        Argon2,
        password_hash::{PasswordHash, PasswordVerifier as _},
    };

    let parsed = PasswordHash::new(password_hash).map_err(|e| Error::Config {
        message: format!("Stored password hash is malformed: {e}"),
    })?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Inserts a user row directly, bypassing actor checks and auditing.
///
/// This is the bootstrap path used by config.toml seeding and by tests;
/// application code goes through [`create_user`].
pub(crate) async fn insert_user(
    db: &DatabaseConnection,
    name: &str,
    email: &str,
    password: &str,
    role: Role,
    email_verified: bool,
) -> Result<user::Model> {
    let now = chrono::Utc::now();
    let account = user::ActiveModel {
        name: Set(name.to_string()),
        email: Set(email.to_string()),
        password_hash: Set(hash_password(password)?),
        role: Set(role),
        total_verified_points: Set(0),
        email_verified_at: Set(email_verified.then_some(now)),
        email_on_point_received: Set(true),
        email_on_point_verified: Set(true),
        email_on_pending_points: Set(true),
        created_at: Set(now),
        ..Default::default()
    };

    account.insert(db).await.map_err(Into::into)
}

/// Creates a new user account.
///
/// With an admin `actor` the account may hold any role and is created
/// email-verified immediately; the creation is audit-logged. Without an
/// actor (self-registration) the account must be a plain user and starts
/// unverified. Any other actor is refused.
pub async fn create_user(
    db: &DatabaseConnection,
    actor: Option<&user::Model>,
    name: &str,
    email: &str,
    password: &str,
    role: Role,
) -> Result<user::Model> {
    if name.trim().is_empty() {
        return Err(Error::validation("Name cannot be empty"));
    }
    if !email.contains('@') {
        return Err(Error::validation("Email address is not valid"));
    }
    if password.len() < 8 {
        return Err(Error::validation(
            "Password must be at least 8 characters long",
        ));
    }

    match actor {
        Some(admin) if admin.role.is_admin() => {}
        Some(_) => {
            return Err(Error::forbidden("Only admins can create user accounts"));
        }
        None if role != Role::User => {
            return Err(Error::forbidden(
                "Self-registration cannot choose an elevated role",
            ));
        }
        None => {}
    }

    let existing = get_user_by_email(db, email).await?;
    if existing.is_some() {
        return Err(Error::validation("Email address is already registered"));
    }

    // Admin-created accounts skip the verification queue
    let email_verified = actor.is_some();
    let created = insert_user(db, name.trim(), email, password, role, email_verified).await?;

    if let Some(admin) = actor {
        audit::record_best_effort(
            db,
            admin.id,
            "user_created",
            json!({
                "created_user_id": created.id,
                "created_user_name": created.name,
                "created_user_email": created.email,
                "created_user_role": created.role,
            }),
        )
        .await;
    }

    Ok(created)
}

/// Finds a user by its unique ID.
pub async fn get_user_by_id(db: &DatabaseConnection, user_id: i64) -> Result<Option<user::Model>> {
    User::find_by_id(user_id).one(db).await.map_err(Into::into)
}

/// Finds a user by email address.
pub async fn get_user_by_email(db: &DatabaseConnection, email: &str) -> Result<Option<user::Model>> {
    User::find()
        .filter(user::Column::Email.eq(email))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Changes a user's role. Admin only.
///
/// An admin may not demote themselves; assigning their own current admin
/// role back is tolerated as a no-op, matching the point that only the
/// *loss* of one's own admin rights is the hazard.
pub async fn update_role(
    db: &DatabaseConnection,
    actor: &user::Model,
    target_id: i64,
    new_role: Role,
) -> Result<user::Model> {
    if !actor.role.is_admin() {
        return Err(Error::forbidden("Only admins can change user roles"));
    }

    let target = get_user_by_id(db, target_id)
        .await?
        .ok_or(Error::NotFound {
            entity: "user",
            id: target_id,
        })?;

    if target.id == actor.id && new_role != Role::Admin {
        return Err(Error::forbidden("Cannot change your own admin role"));
    }

    let old_role = target.role;
    let mut active: user::ActiveModel = target.into();
    active.role = Set(new_role);
    let updated = active.update(db).await?;

    audit::record_best_effort(
        db,
        actor.id,
        "role_changed",
        json!({
            "target_user_id": updated.id,
            "target_user_name": updated.name,
            "old_role": old_role,
            "new_role": new_role,
        }),
    )
    .await;

    Ok(updated)
}

/// Marks a user account as verified. Admin only.
///
/// Fails with `InvalidState` if the account is already verified.
pub async fn verify_user(
    db: &DatabaseConnection,
    actor: &user::Model,
    target_id: i64,
) -> Result<user::Model> {
    if !actor.role.is_admin() {
        return Err(Error::forbidden("Only admins can verify user accounts"));
    }

    let target = get_user_by_id(db, target_id)
        .await?
        .ok_or(Error::NotFound {
            entity: "user",
            id: target_id,
        })?;

    if target.email_verified_at.is_some() {
        return Err(Error::invalid_state("User is already verified"));
    }

    let mut active: user::ActiveModel = target.into();
    active.email_verified_at = Set(Some(chrono::Utc::now()));
    let updated = active.update(db).await?;

    audit::record_best_effort(
        db,
        actor.id,
        "user_verified",
        json!({
            "target_user_id": updated.id,
            "target_user_name": updated.name,
            "target_user_email": updated.email,
        }),
    )
    .await;

    Ok(updated)
}

/// Deletes a user account and its ledger rows. Admin only.
///
/// Self-deletion is refused, as is deleting the last remaining admin. The
/// user row and every assignment where the user is assignor or recipient
/// are removed in one transaction; the deletion is audit-logged with a
/// snapshot of the removed account.
pub async fn delete_user(db: &DatabaseConnection, actor: &user::Model, target_id: i64) -> Result<()> {
    if !actor.role.is_admin() {
        return Err(Error::forbidden("Only admins can delete user accounts"));
    }
    if actor.id == target_id {
        return Err(Error::forbidden("Cannot delete your own account"));
    }

    let target = get_user_by_id(db, target_id)
        .await?
        .ok_or(Error::NotFound {
            entity: "user",
            id: target_id,
        })?;

    if target.role.is_admin() && count_admins(db).await? <= 1 {
        return Err(Error::forbidden("Cannot delete the last admin user"));
    }

    let snapshot = json!({
        "deleted_user_id": target.id,
        "deleted_user_name": target.name,
        "deleted_user_email": target.email,
        "deleted_user_role": target.role,
        "total_points": target.total_verified_points,
    });

    let txn = db.begin().await?;

    PointAssignment::delete_many()
        .filter(
            Condition::any()
                .add(point_assignment::Column::AssignorId.eq(target.id))
                .add(point_assignment::Column::RecipientId.eq(target.id)),
        )
        .exec(&txn)
        .await?;

    User::delete_by_id(target.id).exec(&txn).await?;

    txn.commit().await?;

    audit::record_best_effort(db, actor.id, "user_deleted", snapshot).await;

    Ok(())
}

/// Counts admin accounts.
pub async fn count_admins(db: &DatabaseConnection) -> Result<u64> {
    User::find()
        .filter(user::Column::Role.eq(Role::Admin))
        .count(db)
        .await
        .map_err(Into::into)
}

/// Partial update of a user's email notification flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmailPreferences {
    /// New value for `email_on_point_received`, if provided
    pub email_on_point_received: Option<bool>,
    /// New value for `email_on_point_verified`, if provided
    pub email_on_point_verified: Option<bool>,
    /// New value for `email_on_pending_points`, if provided
    pub email_on_pending_points: Option<bool>,
}

/// Updates only the preference flags present in `prefs`.
pub async fn update_email_preferences(
    db: &DatabaseConnection,
    user_id: i64,
    prefs: EmailPreferences,
) -> Result<user::Model> {
    let target = get_user_by_id(db, user_id).await?.ok_or(Error::NotFound {
        entity: "user",
        id: user_id,
    })?;

    // Nothing to change; avoid issuing an empty UPDATE
    if prefs.email_on_point_received.is_none()
        && prefs.email_on_point_verified.is_none()
        && prefs.email_on_pending_points.is_none()
    {
        return Ok(target);
    }

    let mut active: user::ActiveModel = target.into();
    if let Some(value) = prefs.email_on_point_received {
        active.email_on_point_received = Set(value);
    }
    if let Some(value) = prefs.email_on_point_verified {
        active.email_on_point_verified = Set(value);
    }
    if let Some(value) = prefs.email_on_pending_points {
        active.email_on_pending_points = Set(value);
    }

    active.update(db).await.map_err(Into::into)
}

/// Restores the default all-enabled notification flags.
pub async fn reset_email_preferences(
    db: &DatabaseConnection,
    user_id: i64,
) -> Result<user::Model> {
    update_email_preferences(
        db,
        user_id,
        EmailPreferences {
            email_on_point_received: Some(true),
            email_on_point_verified: Some(true),
            email_on_pending_points: Some(true),
        },
    )
    .await
}

/// Users the given actor may assign points to: everyone except admins and
/// the actor themselves, ordered by name.
pub async fn assignable_recipients(
    db: &DatabaseConnection,
    actor: &user::Model,
) -> Result<Vec<user::Model>> {
    User::find()
        .filter(user::Column::Role.ne(Role::Admin))
        .filter(user::Column::Id.ne(actor.id))
        .order_by_asc(user::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Supervisors who opted into pending-assignment digest emails.
pub async fn supervisors_awaiting_pending(db: &DatabaseConnection) -> Result<Vec<user::Model>> {
    User::find()
        .filter(user::Column::Role.eq(Role::Supervisor))
        .filter(user::Column::EmailOnPendingPoints.eq(true))
        .all(db)
        .await
        .map_err(Into::into)
}
