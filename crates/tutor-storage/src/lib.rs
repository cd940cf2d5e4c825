pub mod artifacts;
pub mod error;
pub mod learner;
pub mod session;

pub use artifacts::JsonArtifactStore;
pub use error::{Result, StorageError};
pub use learner::SqliteLearnerRepository;
pub use session::SqliteSessionRepository;

use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};
use std::str::FromStr;

/// Initialize the tutor database: create the file if missing, enable foreign
/// keys, and run embedded migrations.
pub async fn init_tutor_db(db_path: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(db_path)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePool::connect_with(options).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    tracing::info!(db_path, "tutor database initialized");
    Ok(pool)
}

/// In-memory database for tests.
pub async fn init_test_db() -> Result<SqlitePool> {
    init_tutor_db("sqlite::memory:").await
}
