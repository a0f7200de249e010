//! Database configuration module.
//!
//! Handles the SQLite database connection and table creation using SeaORM.
//! Table creation uses `Schema::create_table_from_entity` to generate SQL
//! from the entity definitions, so the database schema always matches the
//! Rust struct definitions without hand-written DDL.

use crate::entities::{AuditLog, PointAssignment, User};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};

/// Gets the database URL from the environment or returns the default
/// local SQLite path.
pub fn get_database_url() -> Result<String> {
    Ok(std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://data/meritboard.sqlite".to_string()))
}

/// Establishes a connection to the database using `DATABASE_URL`.
///
/// Falls back to a default local SQLite file if no environment variable is
/// set.
pub async fn create_connection() -> Result<DatabaseConnection> {
    let database_url = get_database_url()?;
    Database::connect(&database_url).await.map_err(Into::into)
}

/// Creates the users, point_assignments, and audit_logs tables from the
/// entity definitions.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let user_table = schema.create_table_from_entity(User);
    let point_assignment_table = schema.create_table_from_entity(PointAssignment);
    let audit_log_table = schema.create_table_from_entity(AuditLog);

    db.execute(builder.build(&user_table)).await?;
    db.execute(builder.build(&point_assignment_table)).await?;
    db.execute(builder.build(&audit_log_table)).await?;

    Ok(())
}
