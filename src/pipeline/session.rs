//! Capture session admission.
//!
//! [`CaptureStateMachine`] enforces the one rule push-to-talk lives by: at
//! most one capture session exists at any instant.  The controller asks it
//! before touching the microphone, and a stale hotkey release (or a release
//! after a cancel) is rejected by session-id mismatch instead of corrupting
//! the active session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Opaque identifier for one capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

impl SessionId {
    /// A process-unique fresh id.
    pub fn next() -> Self {
        SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// CaptureStateMachine
// ---------------------------------------------------------------------------

/// Mutually exclusive session slot.  All operations are thread-safe and
/// lock only for the duration of the swap.
#[derive(Debug, Default)]
pub struct CaptureStateMachine {
    active: Mutex<Option<SessionId>>,
}

impl CaptureStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `id` the active session.  Returns `false` (and changes nothing)
    /// when another session is already active.
    pub fn start_capture(&self, id: SessionId) -> bool {
        let mut active = self.active.lock().unwrap();
        if active.is_some() {
            return false;
        }
        *active = Some(id);
        true
    }

    /// Close the active session, but only if `expected_id` still owns it.
    /// Returns `false` (and changes nothing) on mismatch or when idle.
    pub fn stop_capture(&self, expected_id: SessionId) -> bool {
        let mut active = self.active.lock().unwrap();
        if *active == Some(expected_id) {
            *active = None;
            true
        } else {
            false
        }
    }

    /// Unconditionally clear the slot, returning whichever session was
    /// active.
    pub fn cancel_capture(&self) -> Option<SessionId> {
        self.active.lock().unwrap().take()
    }

    /// `true` while any session is active.
    pub fn is_active(&self) -> bool {
        self.active.lock().unwrap().is_some()
    }

    /// `true` while exactly `id` is the active session.
    pub fn is_session_active(&self, id: SessionId) -> bool {
        *self.active.lock().unwrap() == Some(id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn session_ids_are_unique() {
        let a = SessionId::next();
        let b = SessionId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn start_stop_cycle() {
        let sm = CaptureStateMachine::new();
        let id = SessionId::next();

        assert!(!sm.is_active());
        assert!(sm.start_capture(id));
        assert!(sm.is_active());
        assert!(sm.is_session_active(id));
        assert!(sm.stop_capture(id));
        assert!(!sm.is_active());
    }

    #[test]
    fn second_start_is_rejected_while_active() {
        let sm = CaptureStateMachine::new();
        let first = SessionId::next();
        let second = SessionId::next();

        assert!(sm.start_capture(first));
        assert!(!sm.start_capture(second));
        // The original session is untouched.
        assert!(sm.is_session_active(first));
        assert!(!sm.is_session_active(second));
    }

    #[test]
    fn stop_with_unknown_id_returns_false_and_keeps_state() {
        let sm = CaptureStateMachine::new();
        let active = SessionId::next();
        let stale = SessionId::next();

        assert!(sm.start_capture(active));
        assert!(!sm.stop_capture(stale));
        assert!(sm.is_session_active(active));
    }

    #[test]
    fn stop_when_idle_returns_false() {
        let sm = CaptureStateMachine::new();
        assert!(!sm.stop_capture(SessionId::next()));
    }

    #[test]
    fn cancel_clears_any_session() {
        let sm = CaptureStateMachine::new();
        assert_eq!(sm.cancel_capture(), None);

        let id = SessionId::next();
        sm.start_capture(id);
        assert_eq!(sm.cancel_capture(), Some(id));
        assert!(!sm.is_active());
    }

    /// Many threads race to open a session; exactly one must win.
    #[test]
    fn at_most_one_active_under_contention() {
        let sm = Arc::new(CaptureStateMachine::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let sm = Arc::clone(&sm);
                std::thread::spawn(move || sm.start_capture(SessionId::next()))
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(wins, 1);
        assert!(sm.is_active());
    }

    /// Interleaved start/stop/cancel from many threads must never leave two
    /// sessions active at once.
    #[test]
    fn interleavings_preserve_mutual_exclusion() {
        let sm = Arc::new(CaptureStateMachine::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sm = Arc::clone(&sm);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let id = SessionId::next();
                        if sm.start_capture(id) {
                            assert!(sm.is_session_active(id));
                            assert!(sm.stop_capture(id));
                        } else {
                            // Someone else owns the slot; a stale stop must
                            // not steal it.
                            assert!(!sm.stop_capture(id));
                        }
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert!(!sm.is_active());
    }
}
