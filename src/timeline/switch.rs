use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::foundation::core::FrameTime;

/// Phases of the asynchronous time-switch state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwitchState {
    /// No switch in flight; the UI sits at `current_ui_time`.
    Idle,
    /// A switch stroke has been scheduled for the target time.
    SwitchRequested(FrameTime),
    /// The target lies outside the identical-frames span and a
    /// regeneration stroke is running for it.
    Regenerating(FrameTime),
}

/// Shared, retargetable destination of an in-flight time switch.
///
/// When a newer switch request arrives before the previous one's
/// regeneration has started, the in-flight token is asked to retarget
/// instead of being torn down; cancellation here is cooperative.
/// Retargeting is safe from the thread issuing the newer request.
#[derive(Debug)]
pub struct SwitchToken {
    destination: Mutex<FrameTime>,
    regeneration_started: AtomicBool,
}

impl SwitchToken {
    /// A token aimed at `destination`.
    pub fn new(destination: FrameTime) -> Self {
        Self {
            destination: Mutex::new(destination),
            regeneration_started: AtomicBool::new(false),
        }
    }

    /// The current destination time.
    pub fn destination(&self) -> FrameTime {
        *lock(&self.destination)
    }

    /// Try to coalesce a newer request into this token. Fails once
    /// regeneration has begun; the caller must then schedule a fresh
    /// switch.
    pub fn try_reset_destination_time(&self, time: FrameTime) -> bool {
        let guard = lock(&self.destination);
        if self.regeneration_started.load(Ordering::Acquire) {
            return false;
        }
        let mut destination = guard;
        *destination = time;
        true
    }

    /// Mark the point of no return: the regeneration stroke for the
    /// current destination has started executing.
    pub fn mark_regeneration_started(&self) {
        self.regeneration_started.store(true, Ordering::Release);
    }

    /// Whether regeneration has begun for this token.
    pub fn regeneration_started(&self) -> bool {
        self.regeneration_started.load(Ordering::Acquire)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
