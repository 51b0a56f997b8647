//! Engine Lifecycle (§4.10): explicit state machine per engine, guarded by
//! one mutex per engine rather than a global lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineName {
    Dispatch,
    Routes,
    Batching,
    Escalation,
}

impl EngineName {
    pub const ALL: [EngineName; 4] =
        [EngineName::Dispatch, EngineName::Routes, EngineName::Batching, EngineName::Escalation];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Uninitialized,
    Initialized,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub name: EngineName,
    pub state: EngineState,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub ticks_total: u64,
    pub ticks_failed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartStopOutcome {
    pub name: EngineName,
    pub already_running: bool,
    pub already_stopped: bool,
}

/// Per-engine state machine plus tick counters. `run_flag` is read by the
/// orchestrator's timer loop to decide whether a due tick should actually
/// execute; it's separate from `state` so the orchestrator never needs to
/// lock the mutex on the hot path.
struct EngineController {
    state: Mutex<EngineState>,
    last_tick_at: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<String>>,
    ticks_total: AtomicU64,
    ticks_failed: AtomicU64,
    run_flag: AtomicBool,
}

impl EngineController {
    fn new() -> Self {
        Self {
            state: Mutex::new(EngineState::Uninitialized),
            last_tick_at: Mutex::new(None),
            last_error: Mutex::new(None),
            ticks_total: AtomicU64::new(0),
            ticks_failed: AtomicU64::new(0),
            run_flag: AtomicBool::new(false),
        }
    }
}

pub struct Lifecycle {
    engines: HashMap<EngineName, EngineController>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        let mut engines = HashMap::new();
        for name in EngineName::ALL {
            engines.insert(name, EngineController::new());
        }
        Self { engines }
    }

    fn controller(&self, name: EngineName) -> &EngineController {
        self.engines.get(&name).expect("every EngineName has a controller")
    }

    /// `uninitialized -> initialized -> running`. A no-op success if already
    /// running; per §9's design note this is modelled as success, not error.
    pub fn start(&self, name: EngineName) -> StartStopOutcome {
        let ctl = self.controller(name);
        let mut state = ctl.state.lock().unwrap();
        let already_running = *state == EngineState::Running;
        if !already_running {
            if *state == EngineState::Uninitialized {
                *state = EngineState::Initialized;
            }
            *state = EngineState::Running;
            ctl.run_flag.store(true, Ordering::SeqCst);
        }
        StartStopOutcome { name, already_running, already_stopped: false }
    }

    pub fn stop(&self, name: EngineName) -> StartStopOutcome {
        let ctl = self.controller(name);
        let mut state = ctl.state.lock().unwrap();
        let already_stopped = matches!(*state, EngineState::Stopped | EngineState::Uninitialized);
        if !already_stopped {
            *state = EngineState::Stopping;
            ctl.run_flag.store(false, Ordering::SeqCst);
            *state = EngineState::Stopped;
        }
        StartStopOutcome { name, already_running: false, already_stopped }
    }

    pub fn start_all(&self) -> Vec<StartStopOutcome> {
        EngineName::ALL.iter().map(|&name| self.start(name)).collect()
    }

    pub fn stop_all(&self) -> Vec<StartStopOutcome> {
        EngineName::ALL.iter().map(|&name| self.stop(name)).collect()
    }

    pub fn is_running(&self, name: EngineName) -> bool {
        self.controller(name).run_flag.load(Ordering::SeqCst)
    }

    pub fn status(&self, name: EngineName) -> EngineStatus {
        let ctl = self.controller(name);
        EngineStatus {
            name,
            state: *ctl.state.lock().unwrap(),
            last_tick_at: *ctl.last_tick_at.lock().unwrap(),
            last_error: ctl.last_error.lock().unwrap().clone(),
            ticks_total: ctl.ticks_total.load(Ordering::SeqCst),
            ticks_failed: ctl.ticks_failed.load(Ordering::SeqCst),
        }
    }

    pub fn status_all(&self) -> Vec<EngineStatus> {
        EngineName::ALL.iter().map(|&name| self.status(name)).collect()
    }

    /// Records a completed tick. `error` is the tick's failure reason, if
    /// any; the engine loop itself never stops because of it (§7 propagation
    /// policy — the orchestrator records last-error but keeps ticking).
    pub fn record_tick(&self, name: EngineName, at: DateTime<Utc>, error: Option<String>) {
        let ctl = self.controller(name);
        *ctl.last_tick_at.lock().unwrap() = Some(at);
        ctl.ticks_total.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = error {
            ctl.ticks_failed.fetch_add(1, Ordering::SeqCst);
            *ctl.last_error.lock().unwrap() = Some(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_engine_starts_uninitialized() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.status(EngineName::Dispatch).state, EngineState::Uninitialized);
    }

    #[test]
    fn starting_an_uninitialized_engine_transitions_to_running() {
        let lifecycle = Lifecycle::new();
        let outcome = lifecycle.start(EngineName::Dispatch);
        assert!(!outcome.already_running);
        assert_eq!(lifecycle.status(EngineName::Dispatch).state, EngineState::Running);
    }

    #[test]
    fn starting_twice_reports_already_running_as_success() {
        let lifecycle = Lifecycle::new();
        lifecycle.start(EngineName::Dispatch);
        let second = lifecycle.start(EngineName::Dispatch);
        assert!(second.already_running);
    }

    #[test]
    fn stopping_twice_reports_already_stopped() {
        let lifecycle = Lifecycle::new();
        lifecycle.start(EngineName::Dispatch);
        lifecycle.stop(EngineName::Dispatch);
        let second = lifecycle.stop(EngineName::Dispatch);
        assert!(second.already_stopped);
    }

    #[test]
    fn start_all_reports_one_outcome_per_engine() {
        let lifecycle = Lifecycle::new();
        let outcomes = lifecycle.start_all();
        assert_eq!(outcomes.len(), 4);
    }

    #[test]
    fn record_tick_failure_does_not_change_state() {
        let lifecycle = Lifecycle::new();
        lifecycle.start(EngineName::Escalation);
        lifecycle.record_tick(EngineName::Escalation, Utc::now(), Some("panic".into()));
        let status = lifecycle.status(EngineName::Escalation);
        assert_eq!(status.state, EngineState::Running);
        assert_eq!(status.ticks_failed, 1);
        assert_eq!(status.last_error.as_deref(), Some("panic"));
    }
}
