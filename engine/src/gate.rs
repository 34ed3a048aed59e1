//! Pause/cancel checkpoints.
//!
//! Every transfer lane calls [`TaskControl::checkpoint`] before each file,
//! after each block and between archive entries. The gate is poll-based: a
//! paused lane sleeps in short intervals until resumed, and a cancelled lane
//! unwinds with [`EngineError::Cancelled`].
//!
//! Each task owns its own tokens. [`ControlHub`] is the optional operator
//! surface that fans one pause/resume/cancel command out to every live task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

use crate::error::{EngineError, EngineResult};

/// Shared pause flag.
#[derive(Debug, Clone, Default)]
pub struct PauseToken(Arc<AtomicBool>);

impl PauseToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Shared cancellation flag. Once set it stays set.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// The pause/cancel state a single task's workers consult.
#[derive(Debug, Clone)]
pub struct TaskControl {
    pause: PauseToken,
    cancel: CancellationToken,
    halt: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl Default for TaskControl {
    fn default() -> Self {
        Self::new(PauseToken::new(), CancellationToken::new())
    }
}

impl TaskControl {
    pub fn new(pause: PauseToken, cancel: CancellationToken) -> Self {
        TaskControl {
            pause,
            cancel,
            halt: Arc::new(AtomicBool::new(false)),
            poll_interval: Duration::from_millis(100),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn pause_token(&self) -> &PauseToken {
        &self.pause
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Stop sibling lanes after a fatal error. Reported as cancellation at
    /// their next checkpoint; the original error wins when results merge.
    pub(crate) fn halt(&self) {
        self.halt.store(true, Ordering::Release);
    }

    fn should_stop(&self) -> bool {
        self.cancel.is_cancelled() || self.halt.load(Ordering::Acquire)
    }

    /// Idle while paused, then fail if cancellation was requested.
    pub fn checkpoint(&self) -> EngineResult<()> {
        while self.pause.is_paused() && !self.should_stop() {
            thread::sleep(self.poll_interval);
        }
        if self.should_stop() {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }
}

/// Fans operator commands out to every registered task.
#[derive(Debug, Default)]
pub struct ControlHub {
    tasks: Mutex<Vec<(Weak<AtomicBool>, Weak<AtomicBool>)>>,
}

impl ControlHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a control for a new task.
    pub fn register(&self, poll_interval: Duration) -> TaskControl {
        let control = TaskControl::default().with_poll_interval(poll_interval);
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.retain(|(pause, _)| pause.strong_count() > 0);
            tasks.push((
                Arc::downgrade(&control.pause.0),
                Arc::downgrade(&control.cancel.0),
            ));
        }
        control
    }

    /// Number of tasks whose controls are still alive.
    pub fn live_tasks(&self) -> usize {
        self.tasks
            .lock()
            .map(|tasks| tasks.iter().filter(|(p, _)| p.strong_count() > 0).count())
            .unwrap_or(0)
    }

    pub fn pause_all(&self) {
        self.for_each(|pause, _| pause.store(true, Ordering::Release));
    }

    pub fn resume_all(&self) {
        self.for_each(|pause, _| pause.store(false, Ordering::Release));
    }

    pub fn cancel_all(&self) {
        self.for_each(|_, cancel| cancel.store(true, Ordering::Release));
    }

    fn for_each(&self, apply: impl Fn(&AtomicBool, &AtomicBool)) {
        if let Ok(tasks) = self.tasks.lock() {
            for (pause, cancel) in tasks.iter() {
                if let (Some(pause), Some(cancel)) = (pause.upgrade(), cancel.upgrade()) {
                    apply(&pause, &cancel);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::time::Instant;

    #[test]
    fn test_checkpoint_passes_when_idle() {
        let control = TaskControl::default();
        assert!(control.checkpoint().is_ok());
    }

    #[test]
    fn test_checkpoint_fails_after_cancel() {
        let control = TaskControl::default();
        control.cancel_token().cancel();
        let err = control.checkpoint().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_checkpoint_waits_while_paused() {
        let control = TaskControl::default().with_poll_interval(Duration::from_millis(5));
        control.pause_token().pause();

        let resumer = control.pause_token().clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            resumer.resume();
        });

        let started = Instant::now();
        control.checkpoint().expect("resumed checkpoint should pass");
        assert!(started.elapsed() >= Duration::from_millis(40));
        handle.join().expect("resumer thread panicked");
    }

    #[test]
    fn test_cancel_releases_paused_checkpoint() {
        let control = TaskControl::default().with_poll_interval(Duration::from_millis(5));
        control.pause_token().pause();
        let canceller = control.cancel_token().clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });
        assert!(control.checkpoint().is_err());
        handle.join().expect("canceller thread panicked");
    }

    #[test]
    fn test_halt_stops_lanes() {
        let control = TaskControl::default();
        let sibling = control.clone();
        control.halt();
        assert!(sibling.checkpoint().is_err());
        assert!(!control.cancel_token().is_cancelled());
    }

    #[test]
    fn test_hub_fans_out_to_live_tasks() {
        let hub = ControlHub::new();
        let first = hub.register(Duration::from_millis(1));
        let second = hub.register(Duration::from_millis(1));
        assert_eq!(hub.live_tasks(), 2);

        hub.pause_all();
        assert!(first.pause_token().is_paused());
        assert!(second.pause_token().is_paused());

        hub.resume_all();
        assert!(!first.pause_token().is_paused());

        drop(second);
        assert_eq!(hub.live_tasks(), 1);

        hub.cancel_all();
        assert!(first.cancel_token().is_cancelled());
    }
}
