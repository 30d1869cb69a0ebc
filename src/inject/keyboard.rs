//! Synthetic paste keystroke backed by the `enigo` crate.
//!
//! | Platform | Shortcut |
//! |----------|----------|
//! | macOS    | ⌘V (Meta + V) |
//! | Windows / Linux | Ctrl+V |

use enigo::{Direction, Enigo, Key, Keyboard, Settings};

use super::InjectError;

#[cfg(target_os = "macos")]
const PASTE_MODIFIER: Key = Key::Meta;
#[cfg(not(target_os = "macos"))]
const PASTE_MODIFIER: Key = Key::Control;

/// Send the platform paste shortcut to the currently focused window.
///
/// A fresh [`Enigo`] handle is created per call — `Enigo` is not `Send`, and
/// construction is cheap compared to the clipboard round-trip around it.
///
/// # Errors
///
/// [`InjectError::KeySimulation`] when the enigo backend cannot be
/// initialised (e.g. no display server) or an event fails to deliver.
pub fn simulate_paste() -> Result<(), InjectError> {
    let key_err = |e: enigo::InputError| InjectError::KeySimulation(e.to_string());

    let mut enigo = Enigo::new(&Settings::default())
        .map_err(|e| InjectError::KeySimulation(e.to_string()))?;

    enigo.key(PASTE_MODIFIER, Direction::Press).map_err(key_err)?;
    let combo = enigo
        .key(Key::Unicode('v'), Direction::Click)
        .map_err(key_err);
    // Always release the modifier, even when the click failed, so the user's
    // keyboard is not left with a stuck Ctrl/⌘.
    let release = enigo.key(PASTE_MODIFIER, Direction::Release).map_err(key_err);

    combo.and(release)
}
