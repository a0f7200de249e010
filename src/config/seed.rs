//! Initial user seeding from config.toml.
//!
//! On first boot the users table is empty and nobody can log in, so the
//! service seeds accounts (at minimum one admin) from a TOML file. Existing
//! emails are left untouched, which makes seeding safe to run on every boot.

use crate::core::user::insert_user;
use crate::entities::{Role, User, user};
use crate::errors::{Error, Result};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Deserialize)]
pub struct Config {
    /// List of user accounts to seed
    pub users: Vec<UserSeed>,
}

/// Configuration for a single seeded user account
#[derive(Debug, Deserialize, Clone)]
pub struct UserSeed {
    /// Display name
    pub name: String,
    /// Email address (unique; duplicate seeds are skipped)
    pub email: String,
    /// Plaintext password, hashed before storage
    pub password: String,
    /// Account role; defaults to `user`
    #[serde(default)]
    pub role: Role,
}

/// Loads user seed configuration from a TOML file
///
/// # Errors
/// Returns an error if the file cannot be read or the TOML is invalid.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })
}

/// Loads user seed configuration from the default location (./config.toml)
pub fn load_default_config() -> Result<Config> {
    load_config("config.toml")
}

/// Inserts the configured users, skipping any email that already exists.
///
/// Seeded accounts are created email-verified; they exist precisely so the
/// system is usable before any admin can verify anyone.
///
/// # Returns
/// The number of accounts actually created.
pub async fn seed_initial_users(db: &DatabaseConnection, config: &Config) -> Result<usize> {
    let mut created = 0;

    for seed in &config.users {
        let existing = User::find()
            .filter(user::Column::Email.eq(seed.email.as_str()))
            .one(db)
            .await?;

        if existing.is_some() {
            continue;
        }

        insert_user(db, &seed.name, &seed.email, &seed.password, seed.role, true).await?;
        info!(email = %seed.email, role = seed.role.as_str(), "seeded user account");
        created += 1;
    }

    Ok(created)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::setup_test_db;

    #[test]
    fn test_parse_user_seed_config() {
        let toml_str = r#"
            [[users]]
            name = "Site Admin"
            email = "admin@example.com"
            password = "changeme-now"
            role = "admin"

            [[users]]
            name = "Pat Lane"
            email = "pat@example.com"
            password = "password123"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.users.len(), 2);
        assert_eq!(config.users[0].email, "admin@example.com");
        assert_eq!(config.users[0].role, Role::Admin);
        // Role defaults to plain user when omitted
        assert_eq!(config.users[1].role, Role::User);
    }

    #[tokio::test]
    async fn test_seed_skips_existing_emails() -> Result<()> {
        let db = setup_test_db().await?;

        let config = Config {
            users: vec![
                UserSeed {
                    name: "Site Admin".to_string(),
                    email: "admin@example.com".to_string(),
                    password: "changeme-now".to_string(),
                    role: Role::Admin,
                },
                UserSeed {
                    name: "Pat Lane".to_string(),
                    email: "pat@example.com".to_string(),
                    password: "password123".to_string(),
                    role: Role::User,
                },
            ],
        };

        let first = seed_initial_users(&db, &config).await?;
        assert_eq!(first, 2);

        // Re-running is a no-op
        let second = seed_initial_users(&db, &config).await?;
        assert_eq!(second, 0);

        let admin = User::find()
            .filter(user::Column::Email.eq("admin@example.com"))
            .one(&db)
            .await?
            .unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert!(admin.email_verified_at.is_some());
        assert_eq!(admin.total_verified_points, 0);

        Ok(())
    }
}
