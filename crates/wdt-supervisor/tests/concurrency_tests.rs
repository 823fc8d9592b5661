//! Concurrency tests: real-time re-arming and callers racing the Auto timer.

#![cfg(test)]

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use wdt_supervisor::prelude::*;
use wdt_supervisor::sim::{RecordingRestart, SimulatedCounter, SimulatedSystem};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn simulated(system: &SimulatedSystem) -> SupervisorResult<Supervisor> {
    Supervisor::builder()
        .calibrator(system.calibrator())
        .device(system.counter().clone())
        .scheduler(system.scheduler().clone())
        .restart_path(Arc::new(RecordingRestart::new()))
        .build()
}

#[test]
fn test_thread_scheduler_rearms_in_real_time() -> TestResult {
    let counter = Arc::new(SimulatedCounter::new(32));
    let supervisor = Supervisor::builder()
        .calibrator(FixedFrequency(1_000))
        .device(counter.clone())
        .restart_path(Arc::new(RecordingRestart::new()))
        .build()?;
    supervisor.set_timeout(Duration::from_secs(1));

    thread::sleep(Duration::from_millis(1_200));
    let rearms = supervisor.metrics().auto_rearms;
    assert!(rearms >= 2, "expected at least 2 re-arms, saw {rearms}");

    supervisor.start(Some(Duration::from_secs(5)))?;
    let after_start = supervisor.metrics().auto_rearms;
    thread::sleep(Duration::from_millis(500));
    assert_eq!(supervisor.metrics().auto_rearms, after_start);

    supervisor.teardown(false);
    assert!(!counter.has_interrupt());
    Ok(())
}

#[test]
fn test_concurrent_pings_are_all_counted() -> TestResult {
    let system = SimulatedSystem::new(1_000, 32);
    let supervisor = simulated(&system)?;
    supervisor.start(Some(Duration::from_secs(10)))?;

    let failures = thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| s.spawn(|| (0..250).filter(|_| supervisor.ping().is_err()).count()))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or(usize::MAX))
            .sum::<usize>()
    });

    assert_eq!(failures, 0);

    assert_eq!(supervisor.metrics().pings, 1_000);
    assert_eq!(system.counter().registers().count, 0);
    Ok(())
}

#[test]
fn test_mode_changes_race_auto_timer() -> TestResult {
    let system = SimulatedSystem::new(1_000, 32);
    let supervisor = simulated(&system)?;

    let caller = thread::scope(|s| {
        s.spawn(|| {
            for _ in 0..200 {
                system.advance(Duration::from_millis(50));
            }
        });
        let caller = s.spawn(|| -> SupervisorResult<()> {
            for _ in 0..100 {
                supervisor.start(Some(Duration::from_secs(30)))?;
                supervisor.ping()?;
                supervisor.stop()?;
            }
            Ok(())
        });
        caller.join()
    });

    let Ok(result) = caller else {
        return Err("caller thread panicked".into());
    };
    result?;

    assert_eq!(supervisor.mode(), SupervisorMode::Auto);
    assert_eq!(
        system.counter().registers().compare,
        Some(u64::from(u32::MAX))
    );
    assert!(system.scheduler().next_due().is_some());
    assert_eq!(system.counter().expiries(), 0);
    Ok(())
}

#[test]
fn test_only_one_session_wins() -> TestResult {
    let system = SimulatedSystem::new(1_000, 32);
    let supervisor = simulated(&system)?;
    let barrier = Barrier::new(8);

    let winners = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                s.spawn(|| {
                    let session = supervisor.open_session();
                    let won = session.is_ok();
                    barrier.wait();
                    drop(session);
                    won
                })
            })
            .collect();
        handles
            .into_iter()
            .filter_map(|h| h.join().ok())
            .filter(|won| *won)
            .count()
    });

    assert_eq!(winners, 1);
    Ok(())
}
