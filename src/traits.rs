use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::CacheValue;
use crate::types::DurableRecord;
use crate::types::Index;

/// The fast, volatile read path. Modelled after a single named hash: one field per index.
#[async_trait]
pub trait FastCache: Debug + Send + Sync + 'static {
    /// Name of the hash the entries live in.
    fn name(&self) -> &str;

    /// Overwrite the field unconditionally. Last writer wins.
    async fn set_field(&self, index: Index, value: CacheValue) -> Result<()>;
    async fn get_field(&self, index: Index) -> Result<Option<CacheValue>>;
    async fn get_all(&self) -> Result<BTreeMap<Index, CacheValue>>;

    /// Drop every entry, as a restart of the cache process would.
    async fn clear(&self) -> Result<()>;
}

/// The append-only source of truth.
#[async_trait]
pub trait DurableStore: Debug + Send + Sync + 'static {
    async fn append(&self, record: DurableRecord) -> Result<()>;
    async fn scan(&self) -> Result<Vec<DurableRecord>>;
}

/// Publishing half of a channel session. Delivery is never confirmed.
#[async_trait]
pub trait Publisher: Debug + Send + Sync + 'static {
    async fn publish(&self, topic: &str, payload: String) -> Result<()>;
}

/// Subscribing half of a channel session. Only sees messages published while it exists.
#[async_trait]
pub trait Subscriber: Send + 'static {
    /// Wait for the next payload on the subscribed topic. Fails with
    /// [`Error::ConnectionLost`](crate::Error::ConnectionLost) once the session is gone for good; the caller is
    /// expected to subscribe again.
    async fn next_payload(&mut self) -> Result<String>;
}

/// A pub/sub transport. Publishing and subscribing must happen over separate sessions, so the channel hands them out
/// as independently owned handles.
#[async_trait]
pub trait NotificationChannel: Debug + Send + Sync + 'static {
    fn publisher(&self) -> Result<Arc<dyn Publisher>>;
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscriber>>;
}

/// The expensive pure function whose results the cache holds.
pub trait DerivedFunction: Debug + Send + Sync + 'static {
    fn name(&self) -> &'static str;
    fn compute(&self, index: Index) -> Result<u64>;
}
