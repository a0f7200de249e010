/// Database configuration and connection management
pub mod database;

/// SMTP mail transport settings from environment variables
pub mod mail;

/// Initial user seeding from config.toml
pub mod seed;
