//! Interrupt handling (SIGINT/SIGTERM)
//!
//! On the first signal the running subprocess is stopped, the summary is
//! written with outcome `cancelled` and the process exits 130. A second
//! signal exits immediately.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// Exit code for cancelled runs (128 + SIGINT)
pub const EXIT_CODE_CANCELLED: i32 = 130;

/// Action to take after receiving a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// First signal: stop the running subprocess and wind down
    InitiateCancellation,
    /// Second signal: exit immediately
    ImmediateExit,
    /// Third+ signal: ignore
    Ignore,
}

#[derive(Debug, Default)]
struct InterruptState {
    cancel_requested: AtomicBool,
    immediate_exit: AtomicBool,
    signal_count: AtomicU8,
}

/// Shared cancellation flag observed by every blocking step.
///
/// Cheap to clone; all clones see the same state.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    state: Arc<InterruptState>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.state.cancel_requested.load(Ordering::SeqCst)
    }

    pub fn is_immediate_exit(&self) -> bool {
        self.state.immediate_exit.load(Ordering::SeqCst)
    }

    pub fn signal_count(&self) -> u8 {
        self.state.signal_count.load(Ordering::SeqCst)
    }

    /// Record a signal and report what to do about it.
    pub fn handle_signal(&self) -> SignalAction {
        let count = self.state.signal_count.fetch_add(1, Ordering::SeqCst);
        match count {
            0 => {
                self.state.cancel_requested.store(true, Ordering::SeqCst);
                SignalAction::InitiateCancellation
            }
            1 => {
                self.state.immediate_exit.store(true, Ordering::SeqCst);
                SignalAction::ImmediateExit
            }
            _ => SignalAction::Ignore,
        }
    }

    /// Install the process-wide SIGINT/SIGTERM handler.
    ///
    /// Must be called at most once per process.
    pub fn install(&self) -> Result<(), ctrlc::Error> {
        let interrupt = self.clone();
        ctrlc::set_handler(move || match interrupt.handle_signal() {
            SignalAction::InitiateCancellation => {
                eprintln!("\nReceived interrupt signal, stopping build...");
            }
            SignalAction::ImmediateExit => {
                eprintln!("\nReceived second interrupt, exiting immediately");
                std::process::exit(EXIT_CODE_CANCELLED);
            }
            SignalAction::Ignore => {}
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let interrupt = Interrupt::new();
        assert!(!interrupt.is_cancel_requested());
        assert!(!interrupt.is_immediate_exit());
        assert_eq!(interrupt.signal_count(), 0);
    }

    #[test]
    fn test_first_signal_initiates_cancellation() {
        let interrupt = Interrupt::new();
        assert_eq!(interrupt.handle_signal(), SignalAction::InitiateCancellation);
        assert!(interrupt.is_cancel_requested());
        assert!(!interrupt.is_immediate_exit());
    }

    #[test]
    fn test_second_signal_requests_immediate_exit() {
        let interrupt = Interrupt::new();
        interrupt.handle_signal();
        assert_eq!(interrupt.handle_signal(), SignalAction::ImmediateExit);
        assert!(interrupt.is_immediate_exit());
        assert_eq!(interrupt.handle_signal(), SignalAction::Ignore);
        assert_eq!(interrupt.signal_count(), 3);
    }

    #[test]
    fn test_clones_share_state() {
        let interrupt = Interrupt::new();
        let observer = interrupt.clone();
        interrupt.handle_signal();
        assert!(observer.is_cancel_requested());
    }
}
