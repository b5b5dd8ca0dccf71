// tests/scheduler_cadence.rs
//
// Loop timing under paused tokio time: ticks never overlap and the sleep is
// measured from the end of one tick to the start of the next.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::Instant;

use crawl_console::collect::TickReport;
use crawl_console::error::{StoreError, TickError};
use crawl_console::scheduler::{spawn_scheduler, TickRunner};

const PERIOD: Duration = Duration::from_secs(60);
struct PanicsOnce {
    calls: AtomicUsize,
}

#[async_trait]
impl TickRunner for PanicsOnce {
    async fn run_tick(&self, _now: DateTime<Utc>) -> Result<TickReport, TickError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("first tick blew up");
        }
        Ok(TickReport::default())
    }
}

const TICK_COST: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Recorder {
    starts: Mutex<Vec<Instant>>,
    in_flight: AtomicUsize,
    overlaps: AtomicUsize,
    fail_first: bool,
}

#[async_trait]
impl TickRunner for Recorder {
    async fn run_tick(&self, _now: DateTime<Utc>) -> Result<TickReport, TickError> {
        let n = {
            let mut starts = self.starts.lock().unwrap();
            starts.push(Instant::now());
            starts.len()
        };
        if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        tokio::time::sleep(TICK_COST).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_first && n == 1 {
            return Err(TickError::LoadSources(StoreError::Task("db locked".into())));
        }
        Ok(TickReport::default())
    }
}

#[tokio::test(start_paused = true)]
async fn sleep_is_measured_from_tick_end() {
    let runner = Arc::new(Recorder::default());
    let (tx, rx) = watch::channel(false);
    let handle = spawn_scheduler(runner.clone(), PERIOD, rx);

    // Ticks start at 0s, 65s and 130s; stop while the loop sleeps after the third.
    tokio::time::sleep(Duration::from_secs(150)).await;
    tx.send(true).unwrap();
    handle.await.unwrap();

    let starts = runner.starts.lock().unwrap().clone();
    assert_eq!(starts.len(), 3);
    for pair in starts.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(gap >= PERIOD + TICK_COST, "gap {gap:?}");
        assert!(gap < PERIOD + TICK_COST + Duration::from_secs(1), "gap {gap:?}");
    }
    assert_eq!(runner.overlaps.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_tick_does_not_stop_the_loop() {
    let runner = Arc::new(Recorder {
        fail_first: true,
        ..Recorder::default()
    });
    let (tx, rx) = watch::channel(false);
    let handle = spawn_scheduler(runner.clone(), PERIOD, rx);

    tokio::time::sleep(Duration::from_secs(100)).await;
    tx.send(true).unwrap();
    handle.await.unwrap();

    assert_eq!(runner.starts.lock().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_sleep_ends_the_loop_promptly() {
    let runner = Arc::new(Recorder::default());
    let (tx, rx) = watch::channel(false);
    let handle = spawn_scheduler(runner.clone(), Duration::from_secs(3600), rx);

    tokio::time::sleep(Duration::from_secs(10)).await;
    let before = Instant::now();
    tx.send(true).unwrap();
    handle.await.unwrap();

    assert!(before.elapsed() < Duration::from_secs(1));
    assert_eq!(runner.starts.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn dropped_sender_stops_the_loop() {
    let runner = Arc::new(Recorder::default());
    let (tx, rx) = watch::channel(false);
    let handle = spawn_scheduler(runner.clone(), PERIOD, rx);

    tokio::time::sleep(Duration::from_secs(10)).await;
    drop(tx);
    handle.await.unwrap();
    assert_eq!(runner.starts.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn panicking_tick_does_not_stop_the_loop() {
    let runner = Arc::new(PanicsOnce {
        calls: AtomicUsize::new(0),
    });
    let (tx, rx) = watch::channel(false);
    let handle = spawn_scheduler(runner.clone(), PERIOD, rx);

    tokio::time::sleep(Duration::from_secs(100)).await;
    tx.send(true).unwrap();
    handle.await.unwrap();

    assert_eq!(runner.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn resending_false_keeps_the_loop_asleep() {
    let runner = Arc::new(Recorder::default());
    let (tx, rx) = watch::channel(false);
    let handle = spawn_scheduler(runner.clone(), PERIOD, rx);

    tokio::time::sleep(Duration::from_secs(30)).await;
    tx.send(false).unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(runner.starts.lock().unwrap().len(), 1);

    tokio::time::sleep(Duration::from_secs(30)).await;
    tx.send(true).unwrap();
    handle.await.unwrap();

    let starts = runner.starts.lock().unwrap().clone();
    assert_eq!(starts.len(), 2);
    assert!(starts[1] - starts[0] >= PERIOD + TICK_COST);
}
