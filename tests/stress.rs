//! Stress tests for evtrack
//!
//! Run with: cargo test --release stress -- --ignored

use chrono::{DateTime, TimeDelta, Utc};
use evtrack::*;
use rand::Rng;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
}

#[test]
#[ignore] // Run manually with --ignored
fn stress_test_advance() {
    let store = BackoffStore::new(TimeDelta::seconds(10), TimeDelta::seconds(300));
    let mut rng = rand::thread_rng();

    let iterations = 1_000_000;
    let start = Instant::now();

    for i in 0..iterations {
        let key = format!("ns/event-{}", rng.gen_range(0..10_000));
        store.advance(&key, at(i / 1000));
    }

    let elapsed = start.elapsed();
    let rate = iterations as f64 / elapsed.as_secs_f64();

    println!("Advanced {} observations in {:?}", iterations, elapsed);
    println!("Rate: {:.0} advances/second", rate);

    assert!(
        rate > 200_000.0,
        "Should advance at least 200k/s, got {:.0}",
        rate
    );
}

#[test]
#[ignore]
fn stress_test_snapshot_and_gc() {
    let store = BackoffStore::new(TimeDelta::seconds(10), TimeDelta::seconds(300));
    for i in 0..100_000 {
        store.advance(&format!("ns/event-{}", i), at(i % 1200));
    }

    let start = Instant::now();
    let snapshot = store.snapshot_activity(at(1200));
    let removed = store.collect_garbage(at(1200));
    let elapsed = start.elapsed();

    println!(
        "Snapshot of {} keys, {} collected in {:?}",
        snapshot.len(),
        removed.len(),
        elapsed
    );

    assert_eq!(snapshot.len() + removed.len(), 100_000);
    assert_eq!(store.len(), snapshot.len());
}

#[test]
#[ignore]
fn stress_test_concurrent_tracker() {
    let tracker = Arc::new(EventTracker::new(&TrackerConfig::default()).unwrap());
    let num_threads = 4;
    let events_per_thread = 50_000;

    let start = Instant::now();

    let mut handles: Vec<_> = (0..num_threads)
        .map(|thread_id| {
            let tracker = Arc::clone(&tracker);
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                for i in 0..events_per_thread {
                    let name = format!("event-{}-{}", thread_id, rng.gen_range(0..500));
                    let event = EventRecord::new("prod", name, at(i / 100))
                        .with_involved_object("Pod", "prod", "web")
                        .with_type("Warning");
                    tracker.observe(event).unwrap();
                }
            })
        })
        .collect();

    handles.push({
        let tracker = Arc::clone(&tracker);
        thread::spawn(move || {
            for t in 0..1_000 {
                let report = tracker.scrape(at(t / 2));
                assert!(!report.has_anomalies());
            }
        })
    });

    for handle in handles {
        handle.join().unwrap();
    }

    let elapsed = start.elapsed();
    let total = num_threads * events_per_thread;
    let rate = total as f64 / elapsed.as_secs_f64();

    println!("Concurrent tracker observed {} events in {:?}", total, elapsed);
    println!("Rate: {:.0} events/second", rate);

    // Concurrent access will be slower, so lower threshold
    assert!(
        rate > 20_000.0,
        "Should observe at least 20k events/s concurrently, got {:.0}",
        rate
    );
}
