//! `PostgreSQL` adapters for the box office engine.
//!
//! Implements [`InventoryLedger`](boxoffice_core::providers::InventoryLedger),
//! [`TransactionStore`](boxoffice_core::providers::TransactionStore) and
//! [`UserDirectory`](boxoffice_core::providers::UserDirectory) on a shared
//! [`PgPool`].
//!
//! Every inventory mutation is one conditional `UPDATE ... RETURNING`: the
//! capacity check and the counter write happen in the same statement, so
//! concurrent buyers serialize on the event row and can never oversell.
//! Status changes are compare-and-set on the current status.
//!
//! # Example
//!
//! ```no_run
//! use boxoffice_core::config::Config;
//! use boxoffice_postgres::{connect, lifecycle, migrate};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env();
//! let pool = connect(&config.database).await?;
//! migrate(&pool).await?;
//!
//! let engine = lifecycle(pool, config.engine);
//! # let _ = engine;
//! # Ok(())
//! # }
//! ```

pub mod ledger;
pub mod transactions;
pub mod users;

pub use ledger::PostgresInventoryLedger;
pub use transactions::PostgresTransactionStore;
pub use users::PostgresUserDirectory;

use boxoffice_core::config::{DatabaseConfig, EngineConfig};
use boxoffice_core::{EngineError, Result, TransactionLifecycle};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

/// Controller wired to `PostgreSQL` providers.
pub type PostgresLifecycle =
    TransactionLifecycle<PostgresInventoryLedger, PostgresTransactionStore, PostgresUserDirectory>;

/// Open a connection pool.
///
/// # Errors
///
/// Returns `StorageFault` if the database cannot be reached.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout))
        .idle_timeout(Duration::from_secs(config.idle_timeout))
        .connect(&config.url)
        .await
        .map_err(|e| storage_fault("Failed to connect", &e))?;

    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "PostgreSQL pool ready"
    );
    Ok(pool)
}

/// Run the embedded migrations.
///
/// # Errors
///
/// Returns `StorageFault` if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| EngineError::StorageFault(format!("Migration failed: {e}")))?;
    Ok(())
}

/// Build a controller whose providers share `pool`.
#[must_use]
pub fn lifecycle(pool: PgPool, config: EngineConfig) -> PostgresLifecycle {
    TransactionLifecycle::new(
        PostgresInventoryLedger::new(pool.clone()),
        PostgresTransactionStore::new(pool.clone()),
        PostgresUserDirectory::new(pool),
        config,
    )
}

pub(crate) fn storage_fault(context: &str, e: &sqlx::Error) -> EngineError {
    EngineError::StorageFault(format!("{context}: {e}"))
}

/// A stored value that does not fit the domain type.
pub(crate) fn corrupt_column(column: &str) -> EngineError {
    EngineError::StorageFault(format!("Invalid value in column {column}"))
}

/// Quantities and capacities are `INTEGER` columns.
pub(crate) fn to_db_count(value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| EngineError::invalid_input("count out of range"))
}

pub(crate) fn from_db_count(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| corrupt_column(column))
}
