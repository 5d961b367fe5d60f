//! Database drivers.
#[cfg(feature = "pg")]
pub mod pg;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use sea_orm::ConnectOptions;
use sea_orm::DatabaseConnection;
use tracing::instrument;
use tracing::warn;

use crate::error::Error;
use crate::error::Result;

/// How stubbornly to (re)connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Fixed pause between two attempts.
    pub delay:    Duration,
    /// Give up after this many attempts. `0` means never give up.
    pub attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay:    Duration::from_millis(1000),
            attempts: 0,
        }
    }
}

/// A database backend for [`SeaStore`](crate::store::SeaStore): `sqlite` or `pg`, depending on enabled features.
#[async_trait]
pub trait DatabaseDriver: Debug + Sync + Send + 'static {
    /// Return driver name.
    fn name(&self) -> &'static str;
    /// Returns the database connection for the driver.
    fn connection(&self) -> DatabaseConnection;
    /// Configure the database connection parameters. See corresponding driver implementation for details.
    async fn configure(&self) -> Result<()>;
}

#[instrument(level = "debug", skip(opts))]
pub(crate) async fn connect_with_retry(
    driver: &'static str,
    opts: ConnectOptions,
    retry: RetryPolicy,
) -> Result<DatabaseConnection> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match sea_orm::Database::connect(opts.clone()).await {
            Ok(conn) => return Ok(conn),
            Err(err) => {
                if retry.attempts != 0 && attempt >= retry.attempts {
                    return Err(Error::store_unavailable("durable store", err));
                }
                warn!(
                    "Connecting to {driver} failed (attempt {attempt}): {err}; retrying in {:?}",
                    retry.delay
                );
                tokio::time::sleep(retry.delay).await;
            }
        }
    }
}
