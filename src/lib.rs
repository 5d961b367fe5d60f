//! # fib-cache
//!
//! Accept small integer indices, keep a durable log of them, and compute an expensive derived value for each one in
//! the background. The derived value is served from a fast, volatile cache; the durable log survives restarts.
//!
//! # The Pipeline
//!
//! Three collaborators take part in every submission:
//!
//! - the [`FastCache`](traits::FastCache), a named in-memory hash (`"values"`) that loses everything on restart;
//! - the [`DurableStore`](traits::DurableStore), an append-only `values` table that is the source of truth;
//! - the [`NotificationChannel`](traits::NotificationChannel), a fire-and-forget broadcast on the `"insert"` topic.
//!
//! The [`Ingress`] puts a placeholder into the cache, publishes a notification, and appends the index to the durable
//! store in the background. The [`Worker`] listens for notifications, computes the derived value off the async reactor,
//! and overwrites the placeholder.
//!
//! ```ignore
//! let cache = MokaCache::builder().build()?;
//! let channel = BroadcastChannel::new(1024);
//! let store = SeaStore::open(Sqlite::connect(&dir, "fib-cache.db", RetryPolicy::default()).await?).await?;
//!
//! let worker = Worker::builder()
//!     .cache(cache.clone() as Arc<dyn FastCache>)
//!     .channel(channel.clone() as Arc<dyn NotificationChannel>)
//!     .build()?;
//! let ingress = Ingress::builder()
//!     .cache(cache as Arc<dyn FastCache>)
//!     .publisher(channel.publisher()?)
//!     .store(store as Arc<dyn DurableStore>)
//!     .build()?;
//!
//! let worker_task = worker.start(shutdown.clone()).await;
//! ingress.submit(5).await?;
//! ```
//!
//! Nothing links the three writes transactionally. A lost notification leaves a placeholder that never resolves;
//! [`Ingress::recover()`] re-publishes whatever the durable log knows and the cache doesn't.

pub mod app;
pub mod cache;
pub mod channel;
pub mod compute;
pub mod error;
pub mod http;
pub mod ingress;
pub mod store;
pub mod traits;
pub mod types;
pub mod worker;

#[doc(inline)]
pub use error::Error;
#[doc(inline)]
pub use ingress::Ingress;
#[doc(inline)]
pub use worker::Worker;

pub mod prelude {
    pub use crate::cache::MokaCache;
    pub use crate::channel::BroadcastChannel;
    pub use crate::compute::Fibonacci;
    pub use crate::error::Error;
    pub use crate::error::Result;
    pub use crate::ingress::Ingress;
    pub use crate::traits::*;
    pub use crate::types::*;
    pub use crate::worker::Worker;
}
