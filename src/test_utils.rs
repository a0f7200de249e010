//! Shared test utilities for meritboard.
//!
//! This module provides common helper functions for setting up test
//! databases, creating test users, and capturing domain events and
//! outgoing email.

use crate::{
    core::user::insert_user,
    entities::{Role, user},
    errors::{Error, Result},
    events::{Event, EventBus},
    notify::{Mailer, OutgoingEmail},
};
use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedReceiver;

/// Creates an in-memory SQLite database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates a test user with the given role.
///
/// The email is derived from the name (`"Sup On"` becomes
/// `sup.on@example.com`), so distinct names give distinct accounts.
pub async fn create_test_user(
    db: &DatabaseConnection,
    name: &str,
    role: Role,
) -> Result<user::Model> {
    let email = format!("{}@example.com", name.to_lowercase().replace(' ', "."));
    insert_user(db, name, &email, "password123", role, true).await
}

/// Re-reads a user row, failing the test if it has vanished.
pub async fn reload_user(db: &DatabaseConnection, user_id: i64) -> Result<user::Model> {
    crate::core::user::get_user_by_id(db, user_id)
        .await?
        .ok_or(Error::NotFound {
            entity: "user",
            id: user_id,
        })
}

/// Creates an event bus whose receiving end stays in the test, so emitted
/// events can be asserted on with [`drain_events`].
#[must_use]
pub fn test_event_bus() -> (EventBus, UnboundedReceiver<Event>) {
    EventBus::new()
}

/// Collects every event currently sitting in the queue.
pub fn drain_events(receiver: &mut UnboundedReceiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

/// Mailer that records outgoing email instead of delivering it.
#[derive(Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<OutgoingEmail>>>,
}

impl RecordingMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything "sent" so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().expect("mailer lock poisoned").clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        self.sent.lock().expect("mailer lock poisoned").push(email);
        Ok(())
    }
}

/// Mailer whose every send fails, for asserting that delivery errors are
/// swallowed.
pub struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, _email: OutgoingEmail) -> Result<()> {
        Err(Error::Mail {
            message: "transport unavailable".to_string(),
        })
    }
}
