//! OS keyboard hook for the push-to-talk and cancel keys.
//!
//! The hook is `rdev::listen`, which takes over whatever thread it runs on
//! and never returns, so [`HotkeyListener::start`] parks it on a thread of
//! its own.  The callback does exactly one thing per key event: publish a
//! timestamped [`HotkeyEvent`] to the bus.  The controller reacts on the
//! worker pool, which means a slow engine can never back pressure into the
//! OS event hook — the hook's cost per event is one channel send.
//!
//! There is no way to unhook rdev, so [`Drop`] flips a stop flag instead of
//! tearing anything down: the thread stays parked inside `listen` discarding
//! events until the process exits.  It holds no resources worth reclaiming
//! and burns no CPU while blocked.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Instant;

use crate::events::{EventBus, HotkeyEvent};

// ---------------------------------------------------------------------------
// HotkeyListener
// ---------------------------------------------------------------------------

/// Handle to the running listener thread.
///
/// Built by [`HotkeyListener::start`]; dropping it silences the hook (see
/// the module docs for why the thread itself outlives the handle).
pub struct HotkeyListener {
    /// Shared stop flag — set `true` on [`Drop`].
    stop: Arc<AtomicBool>,
    /// Keeps the thread owned rather than detached; never joined, since the
    /// rdev loop never ends.
    _thread: std::thread::JoinHandle<()>,
}

impl HotkeyListener {
    /// Spawn the listener thread.
    ///
    /// * `push_to_talk` — publishes [`HotkeyEvent::Pressed`] /
    ///   [`HotkeyEvent::Released`] on key down/up.  Key-repeat presses while
    ///   held are suppressed.
    /// * `cancel` — optional key publishing [`HotkeyEvent::CancelRequested`].
    /// * `bus` — where events land; subscribers run elsewhere.
    ///
    /// # Panics
    ///
    /// Panics if the OS refuses to create the thread (extremely unlikely).
    pub fn start(push_to_talk: rdev::Key, cancel: Option<rdev::Key>, bus: EventBus) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = Arc::clone(&stop);

        let thread = std::thread::Builder::new()
            .name("hotkey-listener".into())
            .spawn(move || {
                // Key-repeat guard: most platforms re-fire KeyPress while a
                // key is held.
                let mut held = false;

                let result = rdev::listen(move |event| {
                    if stop_clone.load(Ordering::Relaxed) {
                        return;
                    }

                    match event.event_type {
                        rdev::EventType::KeyPress(k) if k == push_to_talk => {
                            if !held {
                                held = true;
                                bus.publish_hotkey(HotkeyEvent::Pressed { at: Instant::now() });
                            }
                        }
                        rdev::EventType::KeyRelease(k) if k == push_to_talk => {
                            held = false;
                            bus.publish_hotkey(HotkeyEvent::Released { at: Instant::now() });
                        }
                        rdev::EventType::KeyPress(k) if Some(k) == cancel => {
                            bus.publish_hotkey(HotkeyEvent::CancelRequested {
                                at: Instant::now(),
                            });
                        }
                        _ => {}
                    }
                });

                if let Err(e) = result {
                    log::error!("hotkey-listener: rdev::listen exited with error: {e:?}");
                }
            })
            .expect("failed to spawn hotkey-listener thread");

        Self {
            stop,
            _thread: thread,
        }
    }
}

impl Drop for HotkeyListener {
    /// Silence the hook; the parked thread keeps discarding events.
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}
