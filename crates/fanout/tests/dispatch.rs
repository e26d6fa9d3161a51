//! Fan-out dispatch tests under drain-all collection.

use fanout::{
    ChannelCapacity, CollectPolicy, Context, ContextPolicy, Dispatcher, OutcomeKind, Simulated,
    WorkError, WorkItem, from_fn,
};
use std::{
    collections::BTreeSet,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::time::{self, Instant};

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

fn urls(n: usize) -> Vec<WorkItem> {
    (0..n)
        .map(|i| WorkItem::url(format!("http://example.com/{i}")))
        .collect()
}

/// A simulator with one pinned latency per item of `urls(latencies.len())`.
fn pinned(latencies: &[u64]) -> Simulated {
    latencies
        .iter()
        .enumerate()
        .fold(Simulated::default(), |sim, (i, latency)| {
            sim.latency(format!("http://example.com/{i}"), ms(*latency))
        })
}

#[tokio::test(start_paused = true)]
async fn drain_all_returns_one_result_per_item() {
    let items = urls(20);
    let submitted: Vec<_> = items.iter().map(|item| item.id.clone()).collect();
    let expected: BTreeSet<_> = submitted.iter().cloned().collect();
    let dispatcher = Dispatcher::new(Simulated::new(ms(0), ms(50)));

    let batch = dispatcher.dispatch(items, ContextPolicy::PerItemCancel);
    assert_eq!(batch.ids(), submitted.as_slice());
    let collected = batch.collect(CollectPolicy::DrainAll).await;

    assert!(collected.is_complete());
    assert!(collected.results.iter().all(|r| r.is_success()));
    assert_eq!(collected.results.len(), 20);
    let ids: BTreeSet<_> = collected.results.iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids, expected);
    let indices: BTreeSet<_> = collected.results.iter().map(|r| r.index).collect();
    assert_eq!(indices.len(), 20);
}

#[tokio::test(start_paused = true)]
async fn empty_batch_collects_immediately() {
    let dispatcher = Dispatcher::new(Simulated::default());
    let start = Instant::now();

    let batch = dispatcher.dispatch(Vec::<WorkItem>::new(), ContextPolicy::SharedDeadline(ms(100)));
    assert!(batch.is_empty());
    let collected = batch.collect(CollectPolicy::DrainAll).await;
    assert!(collected.results.is_empty());
    assert!(collected.is_complete());

    let collected = dispatcher
        .dispatch(Vec::<WorkItem>::new(), ContextPolicy::PerItemCancel)
        .collect(CollectPolicy::Deadline(ms(100)))
        .await;
    assert!(collected.results.is_empty());
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn shared_deadline_splits_success_and_timeout() {
    let dispatcher = Dispatcher::new(pinned(&[10, 20, 450, 460, 470, 480]));
    let start = Instant::now();

    let collected = dispatcher
        .dispatch(urls(6), ContextPolicy::SharedDeadline(ms(100)))
        .collect(CollectPolicy::DrainAll)
        .await;

    assert_eq!(start.elapsed(), ms(100));
    let results = collected.ordered();
    assert_eq!(results.len(), 6);

    assert_eq!(results[0].kind(), OutcomeKind::Success);
    assert_eq!(results[0].elapsed, ms(10));
    assert_eq!(results[1].kind(), OutcomeKind::Success);
    assert_eq!(results[1].elapsed, ms(20));
    assert_eq!(results[1].payload().map(|r| r.status), Some(200));

    for result in &results[2..] {
        assert_eq!(result.kind(), OutcomeKind::TimedOut);
        assert_eq!(result.elapsed, ms(100));
        assert_eq!(
            result.error().map(ToString::to_string).as_deref(),
            Some("deadline exceeded")
        );
    }
}

#[tokio::test(start_paused = true)]
async fn long_deadline_lets_everything_succeed() {
    let dispatcher = Dispatcher::new(pinned(&[10, 20, 450, 460, 470, 480]));
    let collected = dispatcher
        .dispatch(urls(6), ContextPolicy::SharedDeadline(ms(1000)))
        .collect(CollectPolicy::DrainAll)
        .await;

    let summary = collected.summary();
    assert_eq!(summary.succeeded, 6);
    assert!(summary.all_succeeded());
    assert_eq!(collected.elapsed(), ms(480));
}

#[tokio::test(start_paused = true)]
async fn per_item_cancel_is_isolated() {
    let dispatcher = Dispatcher::new(pinned(&[200, 200, 200]));
    let batch = dispatcher.dispatch(urls(3), ContextPolicy::PerItemCancel);
    let handle = batch.cancel_handle();

    let canceller = tokio::spawn(async move {
        time::sleep(ms(50)).await;
        handle.cancel("http://example.com/1")
    });
    let results = batch.collect(CollectPolicy::DrainAll).await.ordered();
    assert!(canceller.await.unwrap());

    assert_eq!(results[0].kind(), OutcomeKind::Success);
    assert_eq!(results[0].elapsed, ms(200));
    assert_eq!(results[1].kind(), OutcomeKind::Cancelled);
    assert_eq!(results[1].elapsed, ms(50));
    assert_eq!(results[1].error(), Some(&WorkError::Cancelled));
    assert_eq!(results[2].kind(), OutcomeKind::Success);
}

#[tokio::test(start_paused = true)]
async fn per_item_timeout_bounds_each_item() {
    let dispatcher = Dispatcher::new(pinned(&[30, 80, 120]));
    let results = dispatcher
        .dispatch(urls(3), ContextPolicy::PerItemTimeout(ms(100)))
        .collect(CollectPolicy::DrainAll)
        .await
        .ordered();

    let kinds: Vec<_> = results.iter().map(|r| r.kind()).collect();
    assert_eq!(
        kinds,
        [OutcomeKind::Success, OutcomeKind::Success, OutcomeKind::TimedOut]
    );
    assert_eq!(results[2].elapsed, ms(100));
}

#[tokio::test(start_paused = true)]
async fn failure_does_not_cancel_siblings() {
    let dispatcher = Dispatcher::new(pinned(&[10, 20, 30]).fail("http://example.com/0"));
    let results = dispatcher
        .dispatch(urls(3), ContextPolicy::SharedDeadline(ms(100)))
        .collect(CollectPolicy::DrainAll)
        .await
        .ordered();

    assert_eq!(results[0].kind(), OutcomeKind::Failed);
    assert!(matches!(
        results[0].error(),
        Some(WorkError::Failed(msg)) if msg.contains("simulated failure")
    ));
    assert_eq!(results[1].kind(), OutcomeKind::Success);
    assert_eq!(results[2].kind(), OutcomeKind::Success);
}

#[tokio::test]
async fn panicking_operation_still_reports() {
    let dispatcher = Dispatcher::new(from_fn(|item: WorkItem| async move {
        if item.id == "boom" {
            panic!("exploded");
        }
        anyhow::Ok(item.target.len())
    }));
    let collected = dispatcher
        .dispatch(["ok", "boom"], ContextPolicy::PerItemCancel)
        .collect(CollectPolicy::DrainAll)
        .await;

    let results = collected.ordered();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].payload(), Some(&2));
    assert_eq!(
        results[1].error(),
        Some(&WorkError::Failed("operation panicked".into()))
    );
}

#[tokio::test]
async fn context_wins_when_both_are_ready() {
    let (parent, cancel) = Context::with_cancel(&Context::background());
    cancel.cancel();

    let dispatcher = Dispatcher::new(from_fn(|_: WorkItem| async { anyhow::Ok(()) }));
    let collected = dispatcher
        .dispatch_in(&parent, urls(4), ContextPolicy::PerItemCancel)
        .collect(CollectPolicy::DrainAll)
        .await;

    assert_eq!(collected.summary().cancelled, 4);
}

#[tokio::test(start_paused = true)]
async fn parent_cancel_fires_whole_batch() {
    let (parent, cancel) = Context::with_cancel(&Context::background());
    let dispatcher = Dispatcher::new(pinned(&[500, 500, 500]));
    let batch = dispatcher.dispatch_in(&parent, urls(3), ContextPolicy::SharedDeadline(ms(1000)));

    tokio::spawn(async move {
        time::sleep(ms(50)).await;
        cancel.cancel();
    });
    let collected = batch.collect(CollectPolicy::DrainAll).await;

    assert_eq!(collected.summary().cancelled, 3);
    assert!(collected.results.iter().all(|r| r.elapsed == ms(50)));
}

#[tokio::test(start_paused = true)]
async fn limit_bounds_running_operations() {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let op = {
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        from_fn(move |_: WorkItem| {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                time::sleep(ms(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                anyhow::Ok(())
            }
        })
    };

    let collected = Dispatcher::new(op)
        .limit(2)
        .dispatch(urls(6), ContextPolicy::PerItemCancel)
        .collect(CollectPolicy::DrainAll)
        .await;

    assert!(collected.summary().all_succeeded());
    assert_eq!(peak.load(Ordering::SeqCst), 2);
    assert_eq!(collected.elapsed(), ms(30));
}

#[tokio::test(start_paused = true)]
async fn queued_items_still_time_out() {
    let dispatcher = Dispatcher::new(pinned(&[100, 100, 100])).limit(1);
    let results = dispatcher
        .dispatch(urls(3), ContextPolicy::SharedDeadline(ms(150)))
        .collect(CollectPolicy::DrainAll)
        .await
        .ordered();

    assert_eq!(results[0].kind(), OutcomeKind::Success);
    assert_eq!(results[1].kind(), OutcomeKind::TimedOut);
    assert_eq!(results[2].kind(), OutcomeKind::TimedOut);
    assert_eq!(results[2].elapsed, ms(150));
}

#[tokio::test(start_paused = true)]
async fn rendezvous_channel_drains_all() {
    let dispatcher =
        Dispatcher::new(Simulated::new(ms(1), ms(20))).capacity(ChannelCapacity::Rendezvous);
    let collected = dispatcher
        .dispatch(urls(10), ContextPolicy::PerItemCancel)
        .collect(CollectPolicy::DrainAll)
        .await;

    assert!(collected.is_complete());
    assert_eq!(collected.summary().succeeded, 10);
}
