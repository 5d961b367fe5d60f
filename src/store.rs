//! The durable store: an append-only `values` table behind SeaORM.
pub mod driver;
pub mod entity;
pub mod migrations;

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::ActiveValue::NotSet;
use sea_orm::ActiveValue::Set;
use sea_orm::EntityTrait;
use sea_orm::QuerySelect;
use sea_orm_migration::MigratorTrait;
use tracing::info;
use tracing::instrument;

use crate::error::Error;
use crate::error::Result;
use crate::traits::DurableStore;
use crate::types::DurableRecord;

use driver::DatabaseDriver;
use entity::Entity as Values;
use migrations::Migrator;

const STORE: &str = "durable store";

pub struct SeaStore<D: DatabaseDriver> {
    driver: Arc<D>,
}

impl<D: DatabaseDriver> SeaStore<D> {
    /// Configure the driver and create the `values` table unless it's there already.
    #[instrument(level = "debug", skip(driver), fields(driver = driver.name()))]
    pub async fn open(driver: Arc<D>) -> Result<Arc<Self>> {
        driver.configure().await?;
        Migrator::up(&driver.connection(), None).await?;
        info!("Durable store ready on {}", driver.name());
        Ok(Arc::new(Self { driver }))
    }

    pub fn driver(&self) -> Arc<D> {
        self.driver.clone()
    }
}

#[async_trait]
impl<D: DatabaseDriver> DurableStore for SeaStore<D> {
    #[instrument(level = "debug", skip(self))]
    async fn append(&self, record: DurableRecord) -> Result<()> {
        let row = entity::ActiveModel {
            id:     NotSet,
            number: Set(record.number),
        };
        Values::insert(row)
            .exec_without_returning(&self.driver.connection())
            .await
            .map_err(|err| Error::store_unavailable(STORE, err))?;
        Ok(())
    }

    // Only `number` is read: a `values` table created by an earlier deployment has no `id` column.
    async fn scan(&self) -> Result<Vec<DurableRecord>> {
        Ok(Values::find()
            .select_only()
            .column(entity::Column::Number)
            .into_tuple::<i32>()
            .all(&self.driver.connection())
            .await
            .map_err(|err| Error::store_unavailable(STORE, err))?
            .into_iter()
            .map(|number| DurableRecord { number })
            .collect())
    }
}

impl<D: DatabaseDriver> Debug for SeaStore<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SeaStore({})", self.driver.name())
    }
}
