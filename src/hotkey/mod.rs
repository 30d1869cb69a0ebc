//! Global hotkey listener for push-to-talk, backed by `rdev`.
//!
//! Two bindings come out of `settings.toml`: `push_to_talk_key` (held while
//! speaking) and `cancel_key` (aborts an in-flight capture).  Both are plain
//! key names resolved by [`parse_key`] against a deliberately small table:
//! a push-to-talk key is held down while the user dictates into the focused
//! window, so anything that itself types or moves the caret (letters, Space,
//! Enter, arrows) is not bindable — holding it would edit the exact window
//! the transcription is about to be pasted into.
//!
//! [`HotkeyListener::start`] spawns the listener thread and publishes
//! timestamped events to the [`crate::events::EventBus`], where the pipeline
//! controller picks them up.
//!
//! # Usage
//!
//! ```no_run
//! use voicekey::events::EventBus;
//! use voicekey::hotkey::{parse_key, HotkeyListener};
//!
//! let bus = EventBus::new();
//! let key = parse_key("F9").expect("unknown key");
//! let _listener = HotkeyListener::start(key, parse_key("Escape"), bus.clone());
//!
//! // Subscribe via bus.subscribe_hotkey() in the controller.
//! ```

pub mod listener;

pub use listener::HotkeyListener;

// ---------------------------------------------------------------------------
// parse_key
// ---------------------------------------------------------------------------

/// Keys a user may bind in `settings.toml`, by their config name
/// (matched case-insensitively).
///
/// The set is the function row plus keys that do nothing on their own while
/// held.  Keys that insert text or move the caret are intentionally absent.
const BINDABLE_KEYS: &[(&str, rdev::Key)] = &[
    ("f1", rdev::Key::F1),
    ("f2", rdev::Key::F2),
    ("f3", rdev::Key::F3),
    ("f4", rdev::Key::F4),
    ("f5", rdev::Key::F5),
    ("f6", rdev::Key::F6),
    ("f7", rdev::Key::F7),
    ("f8", rdev::Key::F8),
    ("f9", rdev::Key::F9),
    ("f10", rdev::Key::F10),
    ("f11", rdev::Key::F11),
    ("f12", rdev::Key::F12),
    ("escape", rdev::Key::Escape),
    ("esc", rdev::Key::Escape),
    ("insert", rdev::Key::Insert),
    ("pause", rdev::Key::Pause),
    ("capslock", rdev::Key::CapsLock),
    ("numlock", rdev::Key::NumLock),
    ("scrolllock", rdev::Key::ScrollLock),
];

/// Resolve a config key name (`push_to_talk_key`, `cancel_key`) into an
/// [`rdev::Key`].
///
/// Matching ignores case and surrounding whitespace.  Returns `None` for
/// names outside [`BINDABLE_KEYS`] — including combos ("Ctrl+V") and typing
/// keys — so callers can fall back to a default or surface a config error.
///
/// # Examples
///
/// ```
/// use voicekey::hotkey::parse_key;
///
/// assert_eq!(parse_key("F9"),     Some(rdev::Key::F9));
/// assert_eq!(parse_key("escape"), Some(rdev::Key::Escape));
/// assert_eq!(parse_key("Space"),  None); // would type into the target window
/// ```
pub fn parse_key(name: &str) -> Option<rdev::Key> {
    let wanted = name.trim().to_ascii_lowercase();
    BINDABLE_KEYS
        .iter()
        .find(|(n, _)| *n == wanted)
        .map(|(_, key)| *key)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
