use std::collections::BTreeMap;
use std::fmt::Debug;

use async_trait::async_trait;
use fieldx::fxstruct;
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use tracing::debug;
use tracing::instrument;

use crate::error::Result;
use crate::traits::FastCache;
use crate::types::CacheValue;
use crate::types::Index;
use crate::types::VALUES_HASH;

/// In-process fast cache on top of [moka](https://crates.io/crates/moka).
///
/// ```ignore
/// let cache = MokaCache::builder()
///     .name("values")
///     .max_capacity(1_000)
///     .build()?;
///
/// cache.set_field(index, CacheValue::Placeholder).await?;
/// ```
///
/// The moka instance is created on first use. [`FastCache::clear()`] invalidates every entry and waits for moka to
/// evict them, which is how a restart of a dedicated cache process looks from the outside.
#[fxstruct(sync, rc, no_new, builder)]
pub struct MokaCache {
    /// Hash name. Most useful for debugging and logging.
    #[fieldx(get(off), default(VALUES_HASH.to_string()), builder(into))]
    name: String,

    #[fieldx(get(copy), default(10_000))]
    max_capacity: u64,

    #[fieldx(vis(pub(crate)), lazy, get(clone), builder(off))]
    cache: Cache<Index, CacheValue>,
}

impl MokaCache {
    fn build_cache(&self) -> Cache<Index, CacheValue> {
        Cache::builder()
            .max_capacity(self.max_capacity())
            .name(&self.name)
            .eviction_policy(EvictionPolicy::tiny_lfu())
            .build()
    }
}

#[async_trait]
impl FastCache for MokaCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn set_field(&self, index: Index, value: CacheValue) -> Result<()> {
        debug!("[{}] SET({index}) = {value}", self.name);
        self.cache().insert(index, value).await;
        Ok(())
    }

    async fn get_field(&self, index: Index) -> Result<Option<CacheValue>> {
        Ok(self.cache().get(&index).await)
    }

    async fn get_all(&self) -> Result<BTreeMap<Index, CacheValue>> {
        Ok(self.cache().iter().map(|(k, v)| (*k, v)).collect())
    }

    #[instrument(level = "debug", skip(self), fields(name = %self.name))]
    async fn clear(&self) -> Result<()> {
        let cache = self.cache();
        cache.invalidate_all();
        cache.run_pending_tasks().await;
        Ok(())
    }
}

impl Debug for MokaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaCache")
            .field("name", &self.name)
            .field("max_capacity", &self.max_capacity)
            .finish()
    }
}
