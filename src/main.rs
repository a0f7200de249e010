//! Service entry point.
//!
//! Boots the core stack: logging, configuration, database, user seeding,
//! and the notification worker. The HTTP layer (out of scope here) embeds
//! against the same components; until then the binary parks on Ctrl-C so
//! the dispatcher keeps draining its queue.

use dotenvy::dotenv;
use meritboard::{config, errors::Result, events::EventBus, notify};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file (as early as possible)
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Initialize database
    let db = config::database::create_connection()
        .await
        .inspect(|_| info!("Database connection established."))
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    config::database::create_tables(&db)
        .await
        .inspect(|()| info!("Database schema ready."))
        .inspect_err(|e| error!("Failed to create tables: {}", e))?;

    // 4. Seed initial users (config.toml is optional)
    match config::seed::load_default_config() {
        Ok(seed_config) => {
            let created = config::seed::seed_initial_users(&db, &seed_config).await?;
            info!(created, "User seeding complete.");
        }
        Err(e) => info!("No usable config.toml ({e}); skipping user seeding."),
    }

    // 5. Start the notification dispatcher
    let mail_config = config::mail::MailConfig::from_env()?;
    let mailer = notify::SmtpMailer::from_config(&mail_config)
        .inspect_err(|e| error!("Failed to build SMTP mailer: {}", e))?;
    let (events, receiver) = EventBus::new();
    let worker = tokio::spawn(notify::run(db, mailer, receiver));

    info!("meritboard core is running; press Ctrl-C to stop.");
    tokio::signal::ctrl_c().await?;

    // Closing the bus lets the worker drain its queue and exit
    drop(events);
    if let Err(err) = worker.await {
        error!(%err, "notification worker ended abnormally");
    }

    Ok(())
}
