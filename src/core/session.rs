//! The cycle session record and the arithmetic around it.
//!
//! Only `CycleController` holds a `CycleSession`; everything here is plain data
//! so the bookkeeping can be checked without threads or ports.

use serde::{Deserialize, Serialize};

/// Largest cycle count a job may request.
pub const MAX_TARGET_COUNT: u8 = 99;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display,
)]
pub enum LifecycleState {
    #[default]
    Idle,
    Running,
    Cancelling,
    Completed,
}

impl LifecycleState {
    /// A worker is attached in these states.
    pub fn is_active(&self) -> bool {
        matches!(self, LifecycleState::Running | LifecycleState::Cancelling)
    }
}

/// Snapshot reported to the presentation layer whenever `done_count` changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub done: u8,
    pub target: u8,
    pub percent: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleSession {
    target_count: u8,
    done_count: u8,
    paused: bool,
    state: LifecycleState,
}

impl CycleSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target_count(&self) -> u8 {
        self.target_count
    }

    pub fn done_count(&self) -> u8 {
        self.done_count
    }

    pub fn remaining(&self) -> u8 {
        self.target_count - self.done_count
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Apply a saturating edit to the target and return the new value.
    pub fn adjust_target(&mut self, delta: i32) -> u8 {
        let next = i32::from(self.target_count)
            .saturating_add(delta)
            .clamp(0, i32::from(MAX_TARGET_COUNT));
        // `next` is within 0..=99 after the clamp
        self.target_count = next as u8;
        self.target_count
    }

    /// Count one finished cycle. Returns `true` when this completes the job.
    pub fn record_cycle(&mut self) -> bool {
        if self.done_count < self.target_count {
            self.done_count += 1;
        }
        self.is_finished()
    }

    pub fn is_finished(&self) -> bool {
        self.target_count > 0 && self.done_count == self.target_count
    }

    pub fn progress(&self) -> Progress {
        Progress {
            done: self.done_count,
            target: self.target_count,
            percent: percent(self.done_count, self.target_count),
        }
    }

    pub(crate) fn set_state(&mut self, state: LifecycleState) {
        self.state = state;
        if state != LifecycleState::Running && state != LifecycleState::Cancelling {
            self.paused = false;
        }
    }

    pub(crate) fn toggle_pause(&mut self) -> bool {
        self.paused = !self.paused;
        self.paused
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// `round(done / target * 100)`, rounding halves up. Zero target yields zero.
pub fn percent(done: u8, target: u8) -> u8 {
    if target == 0 {
        return 0;
    }
    let (done, target) = (u32::from(done), u32::from(target));
    // done <= target keeps the quotient within 0..=100
    ((200 * done + target) / (2 * target)).min(100) as u8
}
