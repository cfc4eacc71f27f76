//! Scenario C: a single frame sleeps repeatedly and logs a counter each
//! time it wakes. Exercised against every backend — this is the test that
//! would have caught a backend surfacing a normal timer fire as an error
//! (`RtError::Timeout`) instead of success.

use fiberio::{Runtime, RuntimeConfig};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn run_with_backend(backend: &str) {
    let mut rt = match Runtime::new(RuntimeConfig::new().backend(backend)) {
        Ok(rt) => rt,
        Err(_) => return, // backend unavailable on this machine/kernel
    };

    let ticks = Arc::new(Mutex::new(Vec::new()));
    let started = Instant::now();

    rt.entry({
        let ticks = Arc::clone(&ticks);
        move || {
            for i in 0..5u32 {
                fiberio::sleep(Duration::from_millis(20)).expect("sleep");
                ticks.lock().unwrap().push(i);
            }
            fiberio::stop();
        }
    })
    .expect("entry");

    let elapsed = started.elapsed();
    let seen = ticks.lock().unwrap().clone();

    assert_eq!(seen, vec![0, 1, 2, 3, 4], "backend {backend:?} delivered ticks out of order or dropped some");
    assert!(elapsed >= Duration::from_millis(90), "backend {backend:?} returned before 5 sleeps could have elapsed: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "backend {backend:?} took suspiciously long: {elapsed:?}");
}

#[test]
fn repeated_sleeps_fire_in_order_busy_backend() {
    run_with_backend("busy");
}

#[test]
fn repeated_sleeps_fire_in_order_readiness_backend() {
    run_with_backend("readiness");
}

#[test]
fn repeated_sleeps_fire_in_order_uring_backend() {
    run_with_backend("uring");
}

/// A single `delay` call must return `Ok(())`, never an error, on every
/// backend — the regression this guards against made the `uring` backend
/// return `Err(RtError::Timeout)` from a timer that fired exactly on
/// schedule.
#[test]
fn single_sleep_succeeds_on_every_backend() {
    for backend in ["busy", "readiness", "uring"] {
        let mut rt = match Runtime::new(RuntimeConfig::new().backend(backend)) {
            Ok(rt) => rt,
            Err(_) => continue,
        };
        let ok = Arc::new(Mutex::new(false));
        rt.entry({
            let ok = Arc::clone(&ok);
            move || {
                let result = fiberio::sleep(Duration::from_millis(5));
                *ok.lock().unwrap() = result.is_ok();
                fiberio::stop();
            }
        })
        .expect("entry");
        assert!(*ok.lock().unwrap(), "backend {backend:?} surfaced a normal timer fire as an error");
    }
}
