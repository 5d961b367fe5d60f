use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use fieldx::fxstruct;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::compute::Fibonacci;
use crate::error::Error;
use crate::error::Result;
use crate::traits::DerivedFunction;
use crate::traits::FastCache;
use crate::traits::NotificationChannel;
use crate::traits::Subscriber;
use crate::types::CacheValue;
use crate::types::DeadLetter;
use crate::types::Index;
use crate::types::INSERT_TOPIC;

/// Turns `insert` notifications into cache values.
///
/// Every notification becomes its own task and the derived function runs on the blocking pool, so a slow index never
/// holds up delivery of the next one. Results overwrite whatever the cache holds for the key.
///
/// ```ignore
/// let worker = Worker::builder()
///     .cache(cache)
///     .channel(channel)
///     .retry_delay(Duration::from_millis(500))
///     .build()?;
/// let handle = worker.start(shutdown.clone()).await;
/// ```
#[fxstruct(sync, rc, no_new, default(off), builder)]
pub struct Worker {
    #[fieldx(get(clone), builder(required))]
    cache: Arc<dyn FastCache>,

    #[fieldx(get(clone), builder(required))]
    channel: Arc<dyn NotificationChannel>,

    #[fieldx(get(clone), default(Arc::new(Fibonacci) as Arc<dyn DerivedFunction>))]
    function: Arc<dyn DerivedFunction>,

    /// Pause before re-subscribing after the channel went away.
    #[fieldx(get(copy), default(Duration::from_millis(1000)))]
    retry_delay: Duration,

    /// How many failed notifications to remember. Oldest go first.
    #[fieldx(get(copy), default(100))]
    dead_letter_capacity: usize,

    #[fieldx(lock, private, get, get_mut, builder(off), default(VecDeque::new()))]
    dead_letter_log: VecDeque<DeadLetter>,

    #[fieldx(get(off), builder(off), default(TaskTracker::new()))]
    computations: TaskTracker,

    #[fieldx(get(off), builder(off), default(AtomicU64::new(0)))]
    processed: AtomicU64,
}

impl Worker {
    /// Subscribe, then drain the channel in a background task until `shutdown` is cancelled.
    ///
    /// Returns once the subscription is in place: anything published after this point reaches the worker.
    pub async fn start(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let subscriber = self.subscribe(&shutdown, false).await;
        let worker = self.clone();
        tokio::spawn(async move {
            if let Some(subscriber) = subscriber {
                worker.run(subscriber, shutdown).await;
            }
        })
    }

    #[instrument(level = "info", skip_all)]
    async fn run(self: Arc<Self>, mut subscriber: Box<dyn Subscriber>, shutdown: CancellationToken) {
        info!("Worker started, computing with {}", self.function.name());

        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = subscriber.next_payload() => next,
            };

            match next {
                Ok(payload) => self.dispatch(payload),
                Err(err) => {
                    warn!("Subscription to '{INSERT_TOPIC}' ended: {err}");
                    match self.subscribe(&shutdown, true).await {
                        Some(s) => subscriber = s,
                        None => break,
                    }
                }
            }
        }

        debug!("Waiting for {} in-flight computations", self.computations.len());
        self.computations.close();
        self.computations.wait().await;
        info!("Worker stopped");
    }

    // None means shutdown was requested while we were trying.
    async fn subscribe(&self, shutdown: &CancellationToken, delay_first: bool) -> Option<Box<dyn Subscriber>> {
        let mut delay = delay_first;
        loop {
            if delay {
                tokio::select! {
                    _ = shutdown.cancelled() => return None,
                    _ = tokio::time::sleep(self.retry_delay()) => (),
                }
            }
            delay = true;

            match self.channel.subscribe(INSERT_TOPIC).await {
                Ok(subscriber) => return Some(subscriber),
                Err(err) => warn!(
                    "Subscribing to '{INSERT_TOPIC}' failed: {err}; retrying in {:?}",
                    self.retry_delay()
                ),
            }
        }
    }

    fn dispatch(self: &Arc<Self>, payload: String) {
        let worker = self.clone();
        self.computations.spawn(async move {
            match worker.process(&payload).await {
                Ok((index, value)) => debug!("Computed {index} => {value}"),
                Err(err @ Error::ComputationFailure { .. }) => {
                    error!("{err}; notification dropped");
                    worker.bury(&payload, &err);
                }
                Err(err) => error!("Result for payload '{payload}' lost: {err}"),
            }
        });
    }

    /// Handle one notification payload: parse, compute, write the result into the cache.
    #[instrument(level = "debug", skip(self))]
    pub async fn process(&self, payload: &str) -> Result<(Index, u64)> {
        let failure = |reason: String| Error::ComputationFailure {
            payload: payload.to_string(),
            reason,
        };

        let index = payload.parse::<Index>().map_err(|err| failure(err.to_string()))?;

        let function = self.function();
        let value = tokio::task::spawn_blocking(move || function.compute(index))
            .await
            .map_err(|err| failure(err.to_string()))?
            .map_err(|err| failure(err.to_string()))?;

        self.cache.set_field(index, CacheValue::Computed(value)).await?;
        self.processed.fetch_add(1, Ordering::Relaxed);

        Ok((index, value))
    }

    fn bury(&self, payload: &str, err: &Error) {
        let capacity = self.dead_letter_capacity();
        if capacity == 0 {
            return;
        }

        let reason = match err {
            Error::ComputationFailure { reason, .. } => reason.clone(),
            other => other.to_string(),
        };

        let mut log = self.dead_letter_log_mut();
        while log.len() >= capacity {
            log.pop_front();
        }
        log.push_back(DeadLetter {
            payload: payload.to_string(),
            reason,
        });
    }

    /// Notifications that could not be computed, oldest first.
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letter_log().iter().cloned().collect()
    }

    /// Number of results written into the cache so far.
    pub fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn in_flight(&self) -> usize {
        self.computations.len()
    }
}

impl Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("function", &self.function.name())
            .field("retry_delay", &self.retry_delay)
            .field("in_flight", &self.computations.len())
            .finish()
    }
}
