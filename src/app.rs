//! Process bootstrap: command line, tracing, client construction, and the run loop.
use std::fmt::Debug;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::error::ErrorKind;
use clap::CommandFactory;
use clap::Parser;
use fieldx::fxstruct;
use fieldx_plus::fx_plus;
use garde::Validate;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;

use crate::cache::MokaCache;
use crate::channel::BroadcastChannel;
use crate::error::Error;
use crate::error::Result;
use crate::http;
use crate::ingress::Ingress;
#[cfg(feature = "pg")]
use crate::store::driver::pg::Pg;
#[cfg(feature = "sqlite")]
use crate::store::driver::sqlite::Sqlite;
use crate::store::driver::RetryPolicy;
#[cfg(any(feature = "pg", feature = "sqlite"))]
use crate::store::SeaStore;
use crate::traits::DurableStore;
use crate::traits::FastCache;
use crate::traits::NotificationChannel;
use crate::worker::Worker;

#[cfg(feature = "sqlite")]
const SQLITE_DB_NAME: &str = "fib-cache.db";

#[derive(Debug, Clone, clap::Parser, Validate)]
#[fxstruct(no_new, get(copy))]
#[clap(about, version, author, name = "fib-cache")]
pub(crate) struct Cli {
    /// Address the HTTP server binds to.
    #[clap(long, env = "FIBCACHE_LISTEN", default_value = "0.0.0.0:5000")]
    #[garde(skip)]
    listen: SocketAddr,

    /// Use SQLite as the durable store. This is the default when no backend is given.
    #[clap(long, env = "FIBCACHE_SQLITE", default_value_t = false)]
    #[garde(custom(Self::feature_enabled(cfg!(feature = "sqlite"), "sqlite")))]
    sqlite: bool,

    /// Directory of the SQLite database file.
    #[clap(long, env = "FIBCACHE_SQLITE_PATH")]
    #[fieldx(get(clone))]
    #[garde(skip)]
    sqlite_path: Option<PathBuf>,

    /// Use PostgreSQL as the durable store.
    #[clap(long, env = "FIBCACHE_PG", default_value_t = false)]
    #[garde(custom(Self::single_backend(cfg!(feature = "pg"), "pg", &self.sqlite)))]
    pg: bool,

    #[clap(long, env = "FIBCACHE_PG_HOST", default_value = "localhost")]
    #[fieldx(get(clone))]
    #[garde(skip)]
    pg_host: String,

    #[clap(long, env = "FIBCACHE_PG_PORT", default_value_t = 5432)]
    #[garde(skip)]
    pg_port: u16,

    #[clap(long, env = "FIBCACHE_PG_USER", default_value = "postgres")]
    #[fieldx(get(clone))]
    #[garde(skip)]
    pg_user: String,

    #[clap(long, env = "FIBCACHE_PG_PASSWORD", hide_env_values = true, default_value = "postgres_password")]
    #[fieldx(get(clone))]
    #[garde(skip)]
    pg_password: String,

    #[clap(long, env = "FIBCACHE_PG_DATABASE", default_value = "postgres")]
    #[fieldx(get(clone))]
    #[garde(skip)]
    pg_database: String,

    /// Pause between reconnection attempts, milliseconds.
    #[clap(long, env = "FIBCACHE_RETRY_DELAY_MS", default_value_t = 1000)]
    #[garde(range(min = 1))]
    retry_delay_ms: u64,

    /// Give up connecting to the database after this many attempts. 0 means never.
    #[clap(long, env = "FIBCACHE_CONNECT_ATTEMPTS", default_value_t = 0)]
    #[garde(skip)]
    connect_attempts: u32,

    /// Maximum number of entries in the fast cache. Must hold every valid index, 0 to 40.
    #[clap(long, env = "FIBCACHE_CACHE_CAPACITY", default_value_t = 10_000)]
    #[garde(range(min = 41))]
    cache_capacity: u64,

    /// How far a subscriber may fall behind before notifications are lost.
    #[clap(long, env = "FIBCACHE_CHANNEL_CAPACITY", default_value_t = 1024)]
    #[garde(range(min = 1))]
    channel_capacity: usize,

    /// How many failed notifications the worker remembers.
    #[clap(long, env = "FIBCACHE_DEAD_LETTERS", default_value_t = 100)]
    #[garde(skip)]
    dead_letters: usize,

    /// Re-publish every durably logged index missing from the cache on startup.
    #[clap(long, env = "FIBCACHE_RECOVER", default_value_t = false)]
    #[garde(skip)]
    recover: bool,

    /// File to send log into
    #[clap(long, env = "FIBCACHE_LOG_FILE")]
    #[fieldx(get(clone))]
    #[garde(skip)]
    log_file: Option<PathBuf>,

    /// URL of the Loki server for tracing.
    #[clap(long, env = "FIBCACHE_LOKI_URL", default_value = "http://127.0.0.1:3100")]
    #[fieldx(get(clone, attributes_fn(allow(unused))))]
    #[garde(skip)]
    loki_url: String,
}

impl Cli {
    fn feature_enabled<'a>(enabled: bool, feature: &'static str) -> impl FnOnce(&'a bool, &()) -> garde::Result {
        move |value, _| {
            if !*value || enabled {
                Ok(())
            }
            else {
                Err(garde::Error::new(format!("Build feature '{feature}' must be enabled.")))
            }
        }
    }

    fn single_backend<'a>(
        enabled: bool,
        feature: &'static str,
        other: &'a bool,
    ) -> impl FnOnce(&'a bool, &()) -> garde::Result {
        move |value, _| {
            if *value && *other {
                return Err(garde::Error::new("Only one database backend can be selected"));
            }
            Self::feature_enabled(enabled, feature)(value, &())
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            delay:    Duration::from_millis(self.retry_delay_ms),
            attempts: self.connect_attempts,
        }
    }
}

#[fx_plus(app, rc, new(private), sync, get, fallible(off, error(Error)), builder(vis(pub)))]
pub struct FibApp {
    #[fieldx(inner_mut, clearer, builder("_cli_args"))]
    cli_args: Vec<String>,

    #[fieldx(lazy, private, fallible(error(clap::Error)), get(clone))]
    cli: Cli,

    #[fieldx(lazy, fallible, get(clone))]
    cache: Arc<MokaCache>,

    #[fieldx(lazy, fallible, get(clone))]
    channel: Arc<BroadcastChannel>,

    /// Cancelled on Ctrl+C or by [`FibApp::stop()`].
    #[fieldx(get(clone), builder(off), default(CancellationToken::new()))]
    shutdown: CancellationToken,
}

impl FibApp {
    fn build_cli(&self) -> Result<Cli, clap::Error> {
        Ok(if let Some(custom_args) = self.clear_cli_args() {
            Cli::try_parse_from(custom_args.into_iter())?
        }
        else {
            Cli::try_parse()?
        })
    }

    fn build_cache(&self) -> Result<Arc<MokaCache>> {
        Ok(MokaCache::builder().max_capacity(self.cli()?.cache_capacity()).build()?)
    }

    fn build_channel(&self) -> Result<Arc<BroadcastChannel>> {
        Ok(BroadcastChannel::new(self.cli()?.channel_capacity()))
    }

    fn validate(&self) -> Result<()> {
        if let Err(report) = self.cli()?.validate() {
            let mut cmd = Cli::command();
            let err = cmd.error(ErrorKind::InvalidValue, report);
            return Err(Error::Config(err.to_string()));
        }
        Ok(())
    }

    async fn open_store(&self) -> Result<Arc<dyn DurableStore>> {
        let cli = self.cli()?;
        let retry = cli.retry_policy();

        #[cfg(feature = "pg")]
        if cli.pg() {
            let pg = Pg::builder()
                .host(cli.pg_host())
                .port(cli.pg_port())
                .user(cli.pg_user())
                .password(cli.pg_password())
                .database(cli.pg_database())
                .retry(retry)
                .build()?;
            pg.connect().await?;
            let store: Arc<dyn DurableStore> = SeaStore::open(pg).await?;
            return Ok(store);
        }

        #[cfg(feature = "sqlite")]
        if !cli.pg() {
            let dir = cli.sqlite_path().unwrap_or_else(|| PathBuf::from("."));
            std::fs::create_dir_all(&dir)?;
            let sqlite = Sqlite::connect(&dir, SQLITE_DB_NAME, retry).await?;
            let store: Arc<dyn DurableStore> = SeaStore::open(sqlite).await?;
            return Ok(store);
        }

        #[cfg(not(any(feature = "pg", feature = "sqlite")))]
        let _ = retry;
        Err(Error::Config(
            "No database backend is compiled in. Rebuild with the `sqlite` or `pg` feature.".to_string(),
        ))
    }

    #[cfg(feature = "tracing-loki")]
    fn setup_tracing_loki<R>(&self, registry: R) -> Result<tracing_subscriber::layer::Layered<tracing_loki::Layer, R>>
    where
        R: tracing_subscriber::layer::SubscriberExt + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        use std::fmt::Display;
        use std::process;

        let loki_err = |err: &dyn Display| Error::Config(format!("Loki: {err}"));
        let url = tracing_loki::url::Url::parse(&self.cli()?.loki_url()).map_err(|e| loki_err(&e))?;

        let (loki, loki_task) = tracing_loki::builder()
            .label("app", "fib_cache")
            .map_err(|e| loki_err(&e))?
            .extra_field("pid", format!("{}", process::id()))
            .map_err(|e| loki_err(&e))?
            .build_url(url)
            .map_err(|e| loki_err(&e))?;

        tokio::spawn(loki_task);

        Ok(registry.with(loki))
    }

    #[cfg(feature = "tracing")]
    #[allow(clippy::type_complexity)]
    fn setup_tracing_fmt<R>(
        &self,
        registry: R,
    ) -> Result<
        tracing_subscriber::layer::Layered<
            tracing_subscriber::fmt::Layer<
                R,
                tracing_subscriber::fmt::format::DefaultFields,
                tracing_subscriber::fmt::format::Format,
                ::std::sync::Mutex<Box<dyn std::io::Write + Send + 'static>>,
            >,
            R,
        >,
    >
    where
        R: tracing_subscriber::layer::SubscriberExt + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        use std::io;
        use std::sync::Mutex;

        let dest_writer = Mutex::new(if let Some(log_file) = self.cli()?.log_file() {
            let file = std::fs::OpenOptions::new().create(true).append(true).open(log_file)?;
            Box::new(file) as Box<dyn io::Write + Send>
        }
        else {
            Box::new(io::stdout()) as Box<dyn io::Write + Send>
        });

        Ok(registry.with(tracing_subscriber::fmt::layer().with_writer(dest_writer)))
    }

    #[cfg(feature = "tracing")]
    fn setup_tracing(&self) -> Result<()> {
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;
        use tracing_subscriber::EnvFilter;

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let tracing_registry = tracing_subscriber::registry();
        let tracing_registry = tracing_registry.with(filter);

        #[cfg(feature = "tracing-loki")]
        let tracing_registry = self.setup_tracing_loki(tracing_registry)?;

        let tracing_registry = self.setup_tracing_fmt(tracing_registry)?;

        tracing_registry
            .try_init()
            .map_err(|err| Error::Config(format!("Tracing: {err}")))?;

        info!("Tracing initialized");

        Ok(())
    }

    pub async fn execute(&self) -> Result<()> {
        let cli = match self.cli() {
            Ok(cli) => cli,
            Err(err) => match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    err.print()?;
                    return Ok(());
                }
                _ => {
                    return Err(err.into());
                }
            },
        };

        self.validate()?;

        #[cfg(feature = "tracing")]
        self.setup_tracing()?;

        let store = self.open_store().await?;
        let cache = self.cache()?;
        let channel = self.channel()?;
        let shutdown = self.shutdown();

        // Separate sessions: the worker subscribes over its own, the ingress only ever publishes.
        let worker = Worker::builder()
            .cache(cache.clone() as Arc<dyn FastCache>)
            .channel(channel.clone() as Arc<dyn NotificationChannel>)
            .retry_delay(cli.retry_policy().delay)
            .dead_letter_capacity(cli.dead_letters())
            .build()?;
        let ingress = Ingress::builder()
            .cache(cache as Arc<dyn FastCache>)
            .publisher(channel.publisher()?)
            .store(store)
            .build()?;

        let worker_task = worker.start(shutdown.clone()).await;

        if cli.recover() {
            ingress.recover().await?;
        }

        let signal_token = shutdown.clone();
        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("Shutdown signal received");
                    signal_token.cancel();
                }
                Err(err) => error!("Cannot listen for Ctrl+C: {err}"),
            }
        });

        let listener = TcpListener::bind(cli.listen()).await?;
        let served = http::serve(listener, ingress.clone(), shutdown.clone()).await;

        shutdown.cancel();
        worker_task.await?;
        ingress.settle().await;

        let dead = worker.dead_letters();
        if !dead.is_empty() {
            info!("{} notifications could not be computed", dead.len());
        }
        info!("Stopped");

        served
    }

    /// Ask a running [`FibApp::execute()`] to wind down.
    pub fn stop(&self) {
        self.shutdown().cancel();
    }

    pub async fn run() -> Result<()> {
        FibApp::__fieldx_new().execute().await
    }
}

impl FibAppBuilder {
    pub fn cli_args<S: ToString>(self, args: Vec<S>) -> Self {
        self._cli_args(args.into_iter().map(|s| s.to_string()).collect())
    }
}

impl Debug for FibApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FibApp {{ ... }}")
    }
}
