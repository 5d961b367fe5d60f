#![cfg(feature = "sqlite")]

use fib_cache::prelude::*;
use fib_cache::store::driver::sqlite::Sqlite;
use fib_cache::store::driver::DatabaseDriver;
use fib_cache::store::driver::RetryPolicy;
use fib_cache::store::SeaStore;
use sea_orm::ConnectionTrait;

type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

#[tokio::test]
async fn append_and_scan() -> TestResult {
    let dir = tempfile::tempdir()?;
    let store = SeaStore::open(Sqlite::connect(dir.path(), "fib-cache.db", RetryPolicy::default()).await?).await?;

    store.append(DurableRecord { number: 5 }).await?;
    store.append(DurableRecord { number: 5 }).await?;
    store.append(DurableRecord { number: 0 }).await?;

    let mut numbers: Vec<i32> = store.scan().await?.into_iter().map(|r| r.number).collect();
    numbers.sort();
    assert_eq!(numbers, vec![0, 5, 5]);
    Ok(())
}

#[tokio::test]
async fn reopening_keeps_the_log() -> TestResult {
    let dir = tempfile::tempdir()?;
    {
        let store = SeaStore::open(Sqlite::connect(dir.path(), "fib-cache.db", RetryPolicy::default()).await?).await?;
        store.append(DurableRecord { number: 12 }).await?;
    }

    let store = SeaStore::open(Sqlite::connect(dir.path(), "fib-cache.db", RetryPolicy::default()).await?).await?;
    assert_eq!(store.scan().await?, vec![DurableRecord { number: 12 }]);
    Ok(())
}

#[tokio::test]
async fn works_with_a_number_only_table() -> TestResult {
    let dir = tempfile::tempdir()?;
    let sqlite = Sqlite::connect(dir.path(), "fib-cache.db", RetryPolicy::default()).await?;
    let conn = sqlite.connection();
    conn.execute_unprepared(r#"CREATE TABLE IF NOT EXISTS "values" (number INT)"#)
        .await?;
    conn.execute_unprepared(r#"INSERT INTO "values" (number) VALUES (7)"#).await?;

    let store = SeaStore::open(sqlite).await?;
    store.append(DurableRecord { number: 9 }).await?;

    let mut numbers: Vec<i32> = store.scan().await?.into_iter().map(|r| r.number).collect();
    numbers.sort();
    assert_eq!(numbers, vec![7, 9]);
    Ok(())
}
