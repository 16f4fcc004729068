//! Clipboard boundary.
//!
//! Copy hands serialised patch text to the clipboard, paste reads it back.
//! The window layer decides where the text really goes; the canvas only
//! sees this trait.

use std::sync::{Arc, Mutex, PoisonError};

/// Plain-text clipboard.
pub trait Clipboard {
    fn set_text(&mut self, text: String);
    fn get_text(&self) -> Option<String>;
}

/// In-process clipboard shared between canvases.
#[derive(Clone, Debug, Default)]
pub struct SharedClipboard {
    text: Arc<Mutex<Option<String>>>,
}

impl SharedClipboard {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clipboard for SharedClipboard {
    fn set_text(&mut self, text: String) {
        *self.text.lock().unwrap_or_else(PoisonError::into_inner) = Some(text);
    }

    fn get_text(&self) -> Option<String> {
        self.text
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
