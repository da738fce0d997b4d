use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

use lazy_static::lazy_static;

use crate::core::Document;

/// Activation mode for a fail point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPointMode {
    Off,
    AlwaysOn,
    /// Activate for the next n matching evaluations, then switch off.
    Times(u64),
    /// Skip the first n matching evaluations, then behave as `AlwaysOn`.
    Skip(u64),
}

struct FailPointState {
    mode: FailPointMode,
    data: Document,
    times_remaining: u64,
    skip_remaining: u64,
}

/// A named, dynamically toggled fault-injection rule.
///
/// Evaluation sits on hot dispatch paths, so the disabled case is a single
/// relaxed atomic load; the rule payload is only consulted once the point
/// is known to be enabled.
pub struct FailPoint {
    name: &'static str,
    enabled: AtomicBool,
    state: Mutex<FailPointState>,
    cond: Condvar,
}

impl FailPoint {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            enabled: AtomicBool::new(false),
            state: Mutex::new(FailPointState {
                mode: FailPointMode::Off,
                data: Document::new(),
                times_remaining: 0,
                skip_remaining: 0,
            }),
            cond: Condvar::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Replaces the mode and rule payload, waking any blocked waiters.
    pub fn set_mode(&self, mode: FailPointMode, data: Document) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.times_remaining = match mode {
                FailPointMode::Times(n) => n,
                _ => 0,
            };
            state.skip_remaining = match mode {
                FailPointMode::Skip(n) => n,
                _ => 0,
            };
            state.mode = mode;
            state.data = data;
            self.enabled
                .store(mode != FailPointMode::Off, Ordering::Release);
        }
        self.cond.notify_all();
        log::info!("fail point '{}' set to {:?}", self.name, mode);
    }

    pub fn disable(&self) {
        self.set_mode(FailPointMode::Off, Document::new());
    }

    pub fn is_active(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Evaluates the point against a rule predicate. Returns the rule
    /// payload when the point fires, accounting for Times/Skip modes.
    pub fn check<F: FnOnce(&Document) -> bool>(&self, pred: F) -> Option<Document> {
        if !self.enabled.load(Ordering::Acquire) {
            return None;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match state.mode {
            FailPointMode::Off => None,
            FailPointMode::AlwaysOn => {
                if pred(&state.data) {
                    Some(state.data.clone())
                } else {
                    None
                }
            }
            FailPointMode::Skip(_) => {
                if !pred(&state.data) {
                    return None;
                }
                if state.skip_remaining > 0 {
                    state.skip_remaining -= 1;
                    None
                } else {
                    Some(state.data.clone())
                }
            }
            FailPointMode::Times(_) => {
                if !pred(&state.data) || state.times_remaining == 0 {
                    return None;
                }
                state.times_remaining -= 1;
                let data = state.data.clone();
                if state.times_remaining == 0 {
                    state.mode = FailPointMode::Off;
                    self.enabled.store(false, Ordering::Release);
                    self.cond.notify_all();
                }
                Some(data)
            }
        }
    }

    /// Blocks the calling thread until the point is disabled, or until the
    /// timeout elapses.
    pub fn wait_until_inactive(&self, timeout: Option<Duration>) {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match timeout {
            None => {
                let _state = self
                    .cond
                    .wait_while(state, |s| s.mode != FailPointMode::Off)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            Some(timeout) => {
                let _state = self
                    .cond
                    .wait_timeout_while(state, timeout, |s| s.mode != FailPointMode::Off)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
    }
}

lazy_static! {
    /// Injects failures into matching command invocations.
    pub static ref FAIL_COMMAND: FailPoint = FailPoint::new("failCommand");

    /// Pauses the kill-on-disconnect handler, for tests that need to poke
    /// at an operation while it is parked there.
    pub static ref WAIT_IN_COMMAND_MARK_KILL_ON_CLIENT_DISCONNECT: FailPoint =
        FailPoint::new("waitInCommandMarkKillOnClientDisconnect");
}
