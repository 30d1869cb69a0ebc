//! Clipboard save / set / restore backed by the `arboard` crate.
//!
//! Each function opens a short-lived [`arboard::Clipboard`] handle instead of
//! sharing one: the handle is not `Send` on every platform and is cheap to
//! create.

use arboard::Clipboard;

use super::InjectError;

/// Capture the current clipboard plain-text content.
///
/// `Ok(None)` means the clipboard was empty or held non-text data (an image,
/// say) — that is not an error, and `restore_clipboard(None)` later is a
/// no-op.
///
/// # Errors
///
/// [`InjectError::ClipboardAccess`] when the OS clipboard cannot be opened.
pub fn save_clipboard() -> Result<Option<String>, InjectError> {
    // get_text errors on empty or non-text content; both read as "nothing to
    // save".
    Ok(open()?.get_text().ok())
}

/// Replace the clipboard content with `text`.
///
/// # Errors
///
/// [`InjectError::ClipboardAccess`] when the clipboard cannot be opened,
/// [`InjectError::ClipboardSet`] when writing fails.
pub fn set_clipboard(text: &str) -> Result<(), InjectError> {
    open()?
        .set_text(text)
        .map_err(|e| InjectError::ClipboardSet(e.to_string()))
}

/// Put a previously saved value back.  `None` (nothing was saved) leaves the
/// clipboard untouched.
pub fn restore_clipboard(saved: Option<String>) -> Result<(), InjectError> {
    match saved {
        Some(text) => set_clipboard(&text),
        None => Ok(()),
    }
}

fn open() -> Result<Clipboard, InjectError> {
    Clipboard::new().map_err(|e| InjectError::ClipboardAccess(e.to_string()))
}
