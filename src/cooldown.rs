//! Resend cooldown timer.
//!
//! One timer per challenge, restarted (never stacked) on every code
//! issuance. The host drives it with one [`CooldownTimer::tick`] per elapsed
//! second, so tearing down a flow stops the countdown with it; there is no
//! background task to orphan.

use serde::Serialize;

/// Snapshot of the countdown for rendering a resend control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CooldownState {
    pub remaining_seconds: u32,
    pub resend_allowed: bool,
}

impl CooldownState {
    fn idle() -> Self {
        Self {
            remaining_seconds: 0,
            resend_allowed: true,
        }
    }

    fn running(remaining: u32) -> Self {
        Self {
            remaining_seconds: remaining,
            resend_allowed: false,
        }
    }
}

/// `Idle -> Running(remaining) -> Idle` countdown state machine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CooldownTimer {
    #[default]
    Idle,
    Running {
        remaining: u32,
    },
}

impl CooldownTimer {
    pub fn new() -> Self {
        Self::Idle
    }

    /// Start (or restart) the countdown at a fixed window.
    ///
    /// A zero-second window leaves the timer idle.
    pub fn start(&mut self, window_secs: u32) {
        *self = if window_secs == 0 {
            Self::Idle
        } else {
            Self::Running {
                remaining: window_secs,
            }
        };
    }

    /// Advance by one elapsed second.
    pub fn tick(&mut self) -> CooldownState {
        if let Self::Running { remaining } = self {
            *remaining -= 1;
            if *remaining == 0 {
                *self = Self::Idle;
            }
        }
        self.state()
    }

    /// Stop the countdown, re-enabling resend immediately.
    pub fn cancel(&mut self) {
        *self = Self::Idle;
    }

    pub fn resend_allowed(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn state(&self) -> CooldownState {
        match self {
            Self::Idle => CooldownState::idle(),
            Self::Running { remaining } => CooldownState::running(*remaining),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_countdown() {
        let mut timer = CooldownTimer::new();
        timer.start(5);

        let mut previous = timer.state().remaining_seconds;
        assert_eq!(previous, 5);
        while !timer.resend_allowed() {
            let state = timer.tick();
            // Strictly decreasing, and resend stays disabled above zero.
            assert!(state.remaining_seconds < previous);
            assert_eq!(state.resend_allowed, state.remaining_seconds == 0);
            previous = state.remaining_seconds;
        }
        assert_eq!(previous, 0);
    }

    #[test]
    fn test_restart_not_stack() {
        let mut timer = CooldownTimer::new();
        timer.start(30);
        timer.tick();
        timer.tick();
        assert_eq!(timer.state().remaining_seconds, 28);

        // A second issuance resets the window, it does not add to it.
        timer.start(30);
        assert_eq!(timer.state().remaining_seconds, 30);
    }

    #[test]
    fn test_cancel_returns_to_idle() {
        let mut timer = CooldownTimer::new();
        timer.start(30);
        assert!(!timer.resend_allowed());
        timer.cancel();
        assert!(timer.resend_allowed());
        assert_eq!(timer.state().remaining_seconds, 0);
    }

    #[test]
    fn test_tick_while_idle_is_noop() {
        let mut timer = CooldownTimer::new();
        let state = timer.tick();
        assert!(state.resend_allowed);
        assert_eq!(state.remaining_seconds, 0);
    }

    #[test]
    fn test_zero_window() {
        let mut timer = CooldownTimer::new();
        timer.start(0);
        assert!(timer.resend_allowed());
    }
}
