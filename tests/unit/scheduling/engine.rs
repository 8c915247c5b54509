//! Unit tests for the scheduler engine

use chrono::TimeDelta;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use switchyard::config::RuntimeSettings;
use switchyard::core::{HandlerRef, Reply, RuntimeContext};
use switchyard::scheduling::{FrozenClock, ScheduleEntry, ScheduledInvoker, SchedulerEngine, SystemClock};
use switchyard::{CapabilityBinding, SchedulePolicy};
use tokio_util::sync::CancellationToken;

fn counting(name: &str, counter: Arc<AtomicUsize>) -> HandlerRef {
    HandlerRef::from_fn(name, move |_| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Reply::Empty)
        }
    })
}

fn schedule(policy: SchedulePolicy, handler: HandlerRef) -> CapabilityBinding {
    CapabilityBinding::Schedule { policy, handler }
}

#[tokio::test]
async fn tick_invokes_only_due_entries() {
    let clock = Arc::new(FrozenClock::at("2025-08-09T07:00:00+00:00").unwrap());
    let fast = Arc::new(AtomicUsize::new(0));
    let pinned = Arc::new(AtomicUsize::new(0));

    let bindings = vec![
        schedule(SchedulePolicy::every_second().immediately(), counting("fast", fast.clone())),
        schedule(SchedulePolicy::hourly_at(5, 10).unwrap(), counting("pinned", pinned.clone())),
    ];
    let mut engine = SchedulerEngine::from_bindings(&bindings, clock.clone(), &RuntimeSettings::default());
    let ctx = RuntimeContext::detached();

    assert_eq!(engine.tick(&ctx).await, 1);
    // same instant: nothing is due
    assert_eq!(engine.tick(&ctx).await, 0);

    clock.advance(TimeDelta::seconds(1));
    assert_eq!(engine.tick(&ctx).await, 1);

    clock.advance(TimeDelta::seconds(309));
    assert_eq!(engine.tick(&ctx).await, 2);

    assert_eq!(fast.load(Ordering::SeqCst), 3);
    assert_eq!(pinned.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn entries_keep_independent_state() {
    let clock = Arc::new(FrozenClock::at("2025-08-09T07:00:00+00:00").unwrap());
    let a = Arc::new(AtomicUsize::new(0));
    let b = Arc::new(AtomicUsize::new(0));

    let mut engine = SchedulerEngine::new(clock.clone(), Duration::from_millis(10));
    engine.push(ScheduleEntry::new(
        SchedulePolicy::every_second().immediately(),
        ScheduledInvoker::new(counting("a", a.clone()), clock.clone()),
    ));
    engine.push(ScheduleEntry::new(
        SchedulePolicy::every_minute().immediately(),
        ScheduledInvoker::new(counting("b", b.clone()), clock.clone()),
    ));

    let ctx = RuntimeContext::detached();
    engine.tick(&ctx).await;
    clock.advance(TimeDelta::seconds(5));
    engine.tick(&ctx).await;

    assert_eq!(a.load(Ordering::SeqCst), 2);
    assert_eq!(b.load(Ordering::SeqCst), 1);

    let entries = engine.entries();
    assert_eq!(entries[0].handler_name(), "a");
    assert_ne!(entries[0].state(), entries[1].state());
}

#[test]
fn from_bindings_ignores_other_kinds() {
    let clock = Arc::new(FrozenClock::at("2025-08-09T07:00:00+00:00").unwrap());
    let handler = counting("task", Arc::new(AtomicUsize::new(0)));
    let bindings = vec![CapabilityBinding::Task {
        identifier: "t".to_string(),
        handler,
    }];

    let engine = SchedulerEngine::from_bindings(&bindings, clock, &RuntimeSettings::default());
    assert!(engine.is_empty());
}

#[tokio::test]
async fn spawned_loops_stop_on_cancellation() {
    let counter = Arc::new(AtomicUsize::new(0));
    let bindings = vec![schedule(
        SchedulePolicy::every_minute().immediately(),
        counting("loop", counter.clone()),
    )];
    let settings = RuntimeSettings {
        scheduler_tick_millis: 10,
        ..RuntimeSettings::default()
    };
    let engine = SchedulerEngine::from_bindings(&bindings, Arc::new(SystemClock), &settings);

    let shutdown = CancellationToken::new();
    let handles = engine.spawn(RuntimeContext::detached(), shutdown.clone());
    assert_eq!(handles.len(), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop exits after cancellation")
            .unwrap();
    }

    // first tick runs immediately, the next is a minute away
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}
