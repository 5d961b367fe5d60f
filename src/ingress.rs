use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::Arc;

use fieldx::fxstruct;
use serde::Deserialize;
use serde::Serialize;
use tokio_util::task::TaskTracker;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::error::Result;
use crate::traits::DurableStore;
use crate::traits::FastCache;
use crate::traits::Publisher;
use crate::types::CacheValue;
use crate::types::DurableRecord;
use crate::types::Index;
use crate::types::INSERT_TOPIC;

/// Outcome of an accepted submission. Serializes as `{"working": true}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub working: bool,
}

/// The submission side of the pipeline.
///
/// Holds its own publishing session; the worker subscribes over a different one.
#[fxstruct(sync, rc, no_new, default(off), builder)]
pub struct Ingress {
    #[fieldx(get(clone), builder(required))]
    cache: Arc<dyn FastCache>,

    #[fieldx(get(clone), builder(required))]
    publisher: Arc<dyn Publisher>,

    #[fieldx(get(clone), builder(required))]
    store: Arc<dyn DurableStore>,

    // Detached durable appends. Only waited for by `settle()`.
    #[fieldx(get(off), builder(off), default(TaskTracker::new()))]
    appends: TaskTracker,
}

impl Ingress {
    /// Accept an index: placeholder into the cache, notification out, durable append in the background.
    ///
    /// Out-of-range indices are rejected before anything is touched. Once the index is valid the call succeeds; cache
    /// and channel failures are logged, and the durable append isn't waited for at all.
    #[instrument(level = "debug", skip(self))]
    pub async fn submit(&self, index: i64) -> Result<Submission> {
        let index = Index::new(index)?;

        self.announce(index).await;
        self.append_detached(DurableRecord::from(index));

        Ok(Submission { working: true })
    }

    async fn announce(&self, index: Index) {
        if let Err(err) = self.cache.set_field(index, CacheValue::Placeholder).await {
            error!("Placeholder for {index} not written: {err}");
        }

        if let Err(err) = self.publisher.publish(INSERT_TOPIC, index.to_string()).await {
            error!("Notification for {index} not published: {err}");
        }
    }

    fn append_detached(&self, record: DurableRecord) {
        let store = self.store.clone();
        self.appends.spawn(async move {
            match store.append(record).await {
                Ok(()) => debug!("Appended {record:?}"),
                Err(err) => error!("Durable append of {} failed: {err}", record.number),
            }
        });
    }

    /// Every record of the durable log, in no particular order.
    pub async fn list_all(&self) -> Result<Vec<DurableRecord>> {
        self.store.scan().await
    }

    /// Snapshot of the fast cache.
    pub async fn list_current(&self) -> Result<BTreeMap<Index, CacheValue>> {
        self.cache.get_all().await
    }

    pub async fn current_value(&self, index: Index) -> Result<Option<CacheValue>> {
        self.cache.get_field(index).await
    }

    /// Re-announce every index the durable log has but the cache doesn't, e.g. after the cache was restarted.
    ///
    /// Returns the number of indices re-published.
    #[instrument(level = "info", skip(self))]
    pub async fn recover(&self) -> Result<usize> {
        let cached = self.cache.get_all().await?;
        let mut missing = BTreeSet::new();

        for record in self.store.scan().await? {
            match Index::new(record.number as i64) {
                Ok(index) if !cached.contains_key(&index) => {
                    missing.insert(index);
                }
                Ok(_) => (),
                Err(err) => warn!("Skipping durable record {record:?}: {err}"),
            }
        }

        for index in &missing {
            self.announce(*index).await;
        }

        info!("Re-published {} indices from the durable log", missing.len());
        Ok(missing.len())
    }

    /// Wait for all pending durable appends.
    pub async fn settle(&self) {
        self.appends.close();
        self.appends.wait().await;
        self.appends.reopen();
    }

    pub fn pending_appends(&self) -> usize {
        self.appends.len()
    }
}

impl Debug for Ingress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingress")
            .field("cache", &self.cache)
            .field("publisher", &self.publisher)
            .field("store", &self.store)
            .field("pending_appends", &self.appends.len())
            .finish()
    }
}
