#![cfg(feature = "sqlite")]

mod common;

use std::time::Duration;

use common::fib;
use common::idx;
use common::wait_until;
use common::Pipeline;
use common::TestResult;
use fib_cache::prelude::*;

#[tokio::test]
async fn submissions_resolve_to_computed_values() -> TestResult {
    let p = Pipeline::new().await?;
    let worker_task = p.start_worker().await;

    for index in 5..=8 {
        let submission = p.ingress.submit(index).await?;
        assert!(submission.working);
    }

    let snapshot = p
        .wait_for_cache("indices 5..=8 to be computed", |s| {
            (5..=8).all(|i| matches!(s.get(&idx(i)), Some(CacheValue::Computed(_))))
        })
        .await;

    for i in 5..=8u32 {
        assert_eq!(snapshot[&idx(i as i64)], CacheValue::Computed(fib(i)));
    }
    assert_eq!(snapshot[&idx(5)], CacheValue::Computed(8));
    assert_eq!(p.numbers().await, vec![5, 6, 7, 8]);
    wait_until("four results", || p.worker.processed_count() == 4).await;

    p.shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), worker_task).await??;
    Ok(())
}

#[tokio::test]
async fn out_of_range_leaves_no_trace() -> TestResult {
    let p = Pipeline::new().await?;
    let mut listener = p.channel.subscribe(INSERT_TOPIC).await?;

    assert!(matches!(p.ingress.submit(41).await, Err(Error::OutOfRange(41))));
    assert!(matches!(p.ingress.submit(-1).await, Err(Error::OutOfRange(-1))));
    assert!(matches!(p.ingress.submit(i64::MAX).await, Err(Error::OutOfRange(_))));

    // The boundary itself is fine.
    p.ingress.submit(40).await?;
    assert_eq!(listener.next_payload().await?, "40");

    assert_eq!(p.numbers().await, vec![40]);
    let current = p.ingress.list_current().await?;
    assert_eq!(current.keys().copied().collect::<Vec<_>>(), vec![idx(40)]);
    Ok(())
}

#[tokio::test]
async fn placeholder_is_visible_before_the_worker_runs() -> TestResult {
    let p = Pipeline::new().await?;

    p.ingress.submit(10).await?;

    assert_eq!(p.ingress.current_value(idx(10)).await?, Some(CacheValue::Placeholder));
    let rendered = p.ingress.list_current().await?[&idx(10)].to_string();
    assert_eq!(rendered, PLACEHOLDER);
    Ok(())
}

#[tokio::test]
async fn lost_notification_keeps_placeholder_until_recovered() -> TestResult {
    let p = Pipeline::new().await?;

    // Nobody listens yet, so the notification is gone for good.
    p.ingress.submit(10).await?;
    assert_eq!(p.numbers().await, vec![10]);

    let _worker_task = p.start_worker().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(p.ingress.current_value(idx(10)).await?, Some(CacheValue::Placeholder));

    // A placeholder counts as present; recovery only cares about what the cache lost.
    assert_eq!(p.ingress.recover().await?, 0);

    p.cache.clear().await?;
    assert_eq!(p.ingress.recover().await?, 1);
    p.wait_for_cache("recovered index 10", |s| s.get(&idx(10)) == Some(&CacheValue::Computed(89)))
        .await;
    Ok(())
}

#[tokio::test]
async fn durable_log_survives_cache_loss() -> TestResult {
    let p = Pipeline::new().await?;
    let _worker_task = p.start_worker().await;

    p.ingress.submit(3).await?;
    p.wait_for_cache("index 3", |s| s.get(&idx(3)) == Some(&CacheValue::Computed(3)))
        .await;

    p.cache.clear().await?;

    assert!(p.ingress.list_current().await?.is_empty());
    assert_eq!(p.numbers().await, vec![3]);
    Ok(())
}

#[tokio::test]
async fn duplicates_append_twice_but_cache_once() -> TestResult {
    let p = Pipeline::new().await?;
    let _worker_task = p.start_worker().await;

    p.ingress.submit(4).await?;
    p.ingress.submit(4).await?;

    assert_eq!(p.numbers().await, vec![4, 4]);
    let snapshot = p
        .wait_for_cache("index 4", |s| s.get(&idx(4)) == Some(&CacheValue::Computed(5)))
        .await;
    assert_eq!(snapshot.len(), 1);
    Ok(())
}

#[tokio::test]
async fn bad_payloads_are_dead_lettered() -> TestResult {
    let p = Pipeline::new().await?;
    let _worker_task = p.start_worker().await;

    let publisher = p.channel.publisher()?;
    publisher.publish(INSERT_TOPIC, "abc".to_string()).await?;
    publisher.publish(INSERT_TOPIC, "99".to_string()).await?;
    // Another topic is none of the worker's business.
    publisher.publish("other", "7".to_string()).await?;

    wait_until("two dead letters", || p.worker.dead_letters().len() == 2).await;

    let mut payloads: Vec<String> = p.worker.dead_letters().into_iter().map(|d| d.payload).collect();
    payloads.sort();
    assert_eq!(payloads, vec!["99".to_string(), "abc".to_string()]);
    assert!(p.ingress.list_current().await?.is_empty());

    // The worker keeps going after a failure.
    p.ingress.submit(2).await?;
    p.wait_for_cache("index 2", |s| s.get(&idx(2)) == Some(&CacheValue::Computed(2)))
        .await;
    Ok(())
}

#[tokio::test]
async fn dead_letter_log_is_bounded() -> TestResult {
    let p = Pipeline::new().await?;
    let _worker_task = p.start_worker().await;

    let publisher = p.channel.publisher()?;
    for n in 0..6 {
        publisher.publish(INSERT_TOPIC, format!("bad-{n}")).await?;
        // One at a time keeps the eviction order deterministic.
        wait_until("dead letter", || {
            p.worker.dead_letters().iter().any(|d| d.payload == format!("bad-{n}"))
        })
        .await;
    }

    let payloads: Vec<String> = p.worker.dead_letters().into_iter().map(|d| d.payload).collect();
    assert_eq!(payloads, vec!["bad-2", "bad-3", "bad-4", "bad-5"]);
    Ok(())
}

#[tokio::test]
async fn worker_resubscribes_after_disconnect() -> TestResult {
    let p = Pipeline::new().await?;
    let _worker_task = p.start_worker().await;
    assert_eq!(p.channel.subscriber_count(), 1);

    p.channel.disconnect();
    assert_eq!(p.channel.subscriber_count(), 0);

    wait_until("worker to resubscribe", || p.channel.subscriber_count() == 1).await;

    p.ingress.submit(6).await?;
    p.wait_for_cache("index 6", |s| s.get(&idx(6)) == Some(&CacheValue::Computed(13)))
        .await;
    Ok(())
}

#[tokio::test]
async fn shutdown_waits_for_in_flight_work() -> TestResult {
    let p = Pipeline::new().await?;
    let worker_task = p.start_worker().await;

    p.ingress.submit(30).await?;
    wait_until("computation to start", || p.worker.in_flight() > 0 || p.worker.processed_count() > 0).await;

    p.shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(30), worker_task).await??;

    assert_eq!(p.worker.in_flight(), 0);
    assert_eq!(
        p.ingress.current_value(idx(30)).await?,
        Some(CacheValue::Computed(fib(30)))
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_index_does_not_hold_up_fast_ones() -> TestResult {
    let p = Pipeline::new().await?;
    let _worker_task = p.start_worker().await;

    p.ingress.submit(36).await?;
    p.ingress.submit(2).await?;

    let snapshot = p
        .wait_for_cache("index 2", |s| s.get(&idx(2)) == Some(&CacheValue::Computed(2)))
        .await;
    assert_eq!(snapshot.get(&idx(36)), Some(&CacheValue::Placeholder));

    let expected = CacheValue::Computed(fib(36));
    p.wait_for_cache("index 36", |s| s.get(&idx(36)) == Some(&expected))
        .await;
    Ok(())
}
