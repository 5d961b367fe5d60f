#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use fib_cache::prelude::*;
use fib_cache::store::driver::sqlite::Sqlite;
use fib_cache::store::driver::RetryPolicy;
use fib_cache::store::SeaStore;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

const PATIENCE: Duration = Duration::from_secs(30);
const POLL: Duration = Duration::from_millis(20);

/// All three collaborators wired together over a throwaway SQLite database. The worker is built but not started.
pub struct Pipeline {
    _dir:         TempDir,
    pub cache:    Arc<MokaCache>,
    pub channel:  Arc<BroadcastChannel>,
    pub store:    Arc<dyn DurableStore>,
    pub ingress:  Arc<Ingress>,
    pub worker:   Arc<Worker>,
    pub shutdown: CancellationToken,
}

impl Pipeline {
    pub async fn new() -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let dir = TempDir::with_prefix("fib-cache-test-")?;
        let sqlite = Sqlite::connect(dir.path(), "fib-cache.db", RetryPolicy::default()).await?;
        let store: Arc<dyn DurableStore> = SeaStore::open(sqlite).await?;
        let cache = MokaCache::builder().build()?;
        let channel = BroadcastChannel::new(64);

        let worker = Worker::builder()
            .cache(cache.clone() as Arc<dyn FastCache>)
            .channel(channel.clone() as Arc<dyn NotificationChannel>)
            .retry_delay(Duration::from_millis(50))
            .dead_letter_capacity(4)
            .build()?;
        let ingress = Ingress::builder()
            .cache(cache.clone() as Arc<dyn FastCache>)
            .publisher(channel.publisher()?)
            .store(store.clone())
            .build()?;

        Ok(Self {
            _dir: dir,
            cache,
            channel,
            store,
            ingress,
            worker,
            shutdown: CancellationToken::new(),
        })
    }

    pub async fn start_worker(&self) -> JoinHandle<()> {
        self.worker.start(self.shutdown.clone()).await
    }

    pub async fn numbers(&self) -> Vec<i32> {
        self.ingress.settle().await;
        let mut numbers: Vec<i32> = self.store.scan().await.unwrap().into_iter().map(|r| r.number).collect();
        numbers.sort();
        numbers
    }

    pub async fn wait_for_cache<F>(&self, what: &str, check: F) -> BTreeMap<Index, CacheValue>
    where
        F: Fn(&BTreeMap<Index, CacheValue>) -> bool,
    {
        let deadline = Instant::now() + PATIENCE;
        loop {
            let snapshot = self.cache.get_all().await.unwrap();
            if check(&snapshot) {
                return snapshot;
            }
            assert!(Instant::now() < deadline, "Timed out waiting for {what}; cache: {snapshot:?}");
            tokio::time::sleep(POLL).await;
        }
    }
}

pub async fn wait_until<F: Fn() -> bool>(what: &str, check: F) {
    let deadline = Instant::now() + PATIENCE;
    while !check() {
        assert!(Instant::now() < deadline, "Timed out waiting for {what}");
        tokio::time::sleep(POLL).await;
    }
}

pub fn idx(value: i64) -> Index {
    Index::new(value).unwrap()
}

pub fn fib(n: u32) -> u64 {
    Fibonacci.compute(Index::new(n as i64).unwrap()).unwrap()
}
