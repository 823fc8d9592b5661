//! BDD tests for the watchdog supervisor's end-to-end scenarios.
//!
//! Feature: supervised hardware watchdog

#![cfg(test)]

use std::sync::Arc;
use std::time::Duration;
use wdt_supervisor::prelude::*;
use wdt_supervisor::sim::{HangingRestart, RecordingRestart, SimulatedSystem};

type TestResult = Result<(), Box<dyn std::error::Error>>;

const FREQ_166_MHZ: u64 = 166_000_000;
const DELIVERY: Duration = Duration::from_secs(5);

fn build_with(system: &SimulatedSystem, restart: Arc<dyn RestartPath>) -> SupervisorResult<Supervisor> {
    Supervisor::builder()
        .calibrator(system.calibrator())
        .device(system.counter().clone())
        .scheduler(system.scheduler().clone())
        .restart_path(restart)
        .build()
}

mod calibration_scenarios {
    use super::*;

    /// Scenario: a 166 MHz, 32-bit counter bounds the timeout at about 25.87s
    #[test]
    fn scenario_calibrated_maximum_timeout() -> TestResult {
        let system = SimulatedSystem::new(FREQ_166_MHZ, 32);
        let supervisor = build_with(&system, Arc::new(RecordingRestart::new()))?;

        let max = supervisor.info().max_timeout;
        assert!(max > Duration::from_millis(25_860));
        assert!(max < Duration::from_millis(25_880));
        Ok(())
    }

    /// Scenario: an over-long request is clamped to the maximum with a warning
    #[test]
    fn scenario_request_above_maximum_is_clamped() -> TestResult {
        let system = SimulatedSystem::new(FREQ_166_MHZ, 32);
        let supervisor = build_with(&system, Arc::new(RecordingRestart::new()))?;

        let outcome = supervisor.set_timeout(Duration::from_secs(40));
        assert_eq!(outcome.applied.as_secs(), 25);
        match outcome.warning {
            Some(ConfigurationWarning::AboveMaximum { requested, applied }) => {
                assert_eq!(requested, Duration::from_secs(40));
                assert_eq!(applied, supervisor.info().max_timeout);
            }
            other => return Err(format!("expected AboveMaximum, got {other:?}").into()),
        }
        Ok(())
    }
}

mod servicing_scenarios {
    use super::*;

    /// Scenario: left alone in Auto mode, the counter never expires
    #[test]
    fn scenario_auto_mode_services_itself() -> TestResult {
        let system = SimulatedSystem::new(FREQ_166_MHZ, 32);
        let supervisor = build_with(&system, Arc::new(RecordingRestart::new()))?;

        system.advance(Duration::from_secs(120));
        assert_eq!(system.counter().expiries(), 0);
        assert_eq!(supervisor.mode(), SupervisorMode::Auto);
        assert!(supervisor.metrics().auto_rearms >= 70);
        Ok(())
    }

    /// Scenario: changing the timeout every second never starves Auto re-arming
    #[test]
    fn scenario_frequent_timeout_changes_in_auto_mode() -> TestResult {
        let system = SimulatedSystem::new(FREQ_166_MHZ, 32);
        let supervisor = build_with(&system, Arc::new(RecordingRestart::new()))?;

        for _ in 0..30 {
            system.advance(Duration::from_secs(1));
            supervisor.set_timeout(Duration::from_secs(5));
        }
        assert_eq!(supervisor.mode(), SupervisorMode::Auto);
        assert_eq!(system.counter().expiries(), 0);
        assert!(supervisor.metrics().auto_rearms > 0);
        Ok(())
    }

    /// Scenario: a caller pinging every second keeps a 2s watchdog quiet
    #[test]
    fn scenario_regular_pings_prevent_expiry() -> TestResult {
        let system = SimulatedSystem::new(FREQ_166_MHZ, 32);
        let supervisor = build_with(&system, Arc::new(RecordingRestart::new()))?;
        supervisor.start(Some(Duration::from_secs(2)))?;

        for _ in 0..30 {
            system.advance(Duration::from_secs(1));
            supervisor.ping()?;
        }
        assert_eq!(system.counter().expiries(), 0);
        assert_eq!(supervisor.metrics().pings, 30);
        Ok(())
    }

    /// Scenario: entering User mode cancels the pending Auto re-arm
    #[test]
    fn scenario_user_mode_cancels_auto_rearm() -> TestResult {
        let system = SimulatedSystem::new(FREQ_166_MHZ, 32);
        let supervisor = build_with(&system, Arc::new(RecordingRestart::new()))?;
        assert!(system.scheduler().next_due().is_some());

        supervisor.start(Some(Duration::from_secs(2)))?;
        assert_eq!(system.scheduler().next_due(), None);

        system.advance(Duration::from_millis(1_900));
        assert_eq!(supervisor.metrics().auto_rearms, 0);
        assert_eq!(system.counter().expiries(), 0);
        Ok(())
    }

    /// Scenario: stop hands servicing back without disarming
    #[test]
    fn scenario_stop_returns_to_auto_and_stays_armed() -> TestResult {
        let system = SimulatedSystem::new(FREQ_166_MHZ, 32);
        let supervisor = build_with(&system, Arc::new(RecordingRestart::new()))?;
        supervisor.start(Some(Duration::from_secs(2)))?;

        supervisor.stop()?;
        assert_eq!(supervisor.mode(), SupervisorMode::Auto);
        assert_eq!(
            system.counter().registers().compare,
            Some(u64::from(u32::MAX))
        );
        system.advance(Duration::from_secs(60));
        assert_eq!(system.counter().expiries(), 0);
        Ok(())
    }
}

mod escalation_scenarios {
    use super::*;

    /// Scenario: an unacknowledged 2s watchdog attempts one graceful restart
    #[test]
    fn scenario_missed_ping_attempts_restart() -> TestResult {
        let system = SimulatedSystem::new(FREQ_166_MHZ, 32);
        let restart = Arc::new(RecordingRestart::new());
        let supervisor = build_with(&system, restart.clone())?;
        supervisor.start(Some(Duration::from_secs(2)))?;

        system.advance(Duration::from_millis(1_999));
        assert_eq!(system.counter().expiries(), 0);

        system.advance(Duration::from_millis(1));
        assert_eq!(system.counter().expiries(), 1);
        assert!(restart.wait_for_attempts(1, DELIVERY));
        assert_eq!(restart.attempts(), 1);
        assert_eq!(supervisor.metrics().expiries, 1);
        Ok(())
    }

    /// Scenario: a hung restart leaves the hardware reset to fire one timeout later
    #[test]
    fn scenario_hung_restart_falls_back_to_hardware_reset() -> TestResult {
        let system = SimulatedSystem::new(FREQ_166_MHZ, 32);
        let restart = Arc::new(HangingRestart::new());
        let supervisor = build_with(&system, restart.clone())?;
        supervisor.start(Some(Duration::from_secs(2)))?;

        system.advance(Duration::from_secs(2));
        assert!(restart.wait_for_attempts(1, DELIVERY));
        assert!(!system.counter().is_halted());

        system.advance(Duration::from_millis(1_999));
        assert!(!system.counter().is_halted());

        system.advance(Duration::from_millis(1));
        assert!(system.counter().is_halted());
        assert_eq!(system.counter().hardware_resets(), 1);
        assert_eq!(restart.attempts(), 1);

        restart.release();
        supervisor.teardown(false);
        Ok(())
    }

    /// Scenario: a hung restart does not block the supervisor's own operations
    #[test]
    fn scenario_hung_restart_does_not_block_supervisor() -> TestResult {
        let system = SimulatedSystem::new(FREQ_166_MHZ, 32);
        let restart = Arc::new(HangingRestart::new());
        let supervisor = build_with(&system, restart.clone())?;
        supervisor.start(Some(Duration::from_secs(2)))?;

        system.advance(Duration::from_secs(2));
        assert!(restart.wait_for_attempts(1, DELIVERY));

        supervisor.ping()?;
        let outcome = supervisor.set_timeout(Duration::from_secs(3));
        assert_eq!(outcome.applied, Duration::from_secs(3));
        assert_eq!(supervisor.info().mode, SupervisorMode::User);

        restart.release();
        Ok(())
    }
}

mod shutdown_scenarios {
    use super::*;

    /// Scenario: a system shutdown beginning while in User mode returns to Auto
    #[test]
    fn scenario_shutdown_returns_to_auto() -> TestResult {
        let system = SimulatedSystem::new(FREQ_166_MHZ, 32);
        let supervisor = build_with(&system, Arc::new(RecordingRestart::new()))?;
        supervisor.start(Some(Duration::from_secs(2)))?;
        system.advance(Duration::from_secs(1));

        supervisor.shutdown_guard().on_system_shutdown_begin();
        assert_eq!(supervisor.mode(), SupervisorMode::Auto);

        system.advance(Duration::from_secs(60));
        assert_eq!(system.counter().expiries(), 0);
        Ok(())
    }

    /// Scenario: halting teardown disarms the counter
    #[test]
    fn scenario_halt_disarms() -> TestResult {
        let system = SimulatedSystem::new(FREQ_166_MHZ, 32);
        let supervisor = build_with(&system, Arc::new(RecordingRestart::new()))?;
        supervisor.teardown(true);

        system.advance(Duration::from_secs(600));
        assert_eq!(system.counter().registers().compare, None);
        assert_eq!(system.counter().expiries(), 0);
        Ok(())
    }
}
