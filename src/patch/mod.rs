//! Patch module
//!
//! The UI-side accessor for one engine patch, plus the pieces it needs on
//! the way in and out: argument templates for GUI objects and the system
//! clipboard boundary.

pub mod accessor;
pub mod clipboard;
pub mod gui_defaults;

use thiserror::Error;

use crate::engine::BridgeError;
use crate::persistence::FragmentError;

pub use accessor::Patch;
pub use clipboard::{Clipboard, SharedClipboard};
pub use gui_defaults::{GuiDefaults, TemplateColours};

/// Errors surfaced by the patch accessor.
#[derive(Debug, Error)]
pub enum PatchError {
    /// The engine refused to create an object from the given text.
    #[error("cannot create object '{0}'")]
    CreationFailed(String),
    /// The addressed object no longer exists.
    #[error("object no longer exists")]
    MissingObject,
    /// The patch has been closed.
    #[error("patch no longer exists")]
    MissingPatch,
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error(transparent)]
    Fragment(#[from] FragmentError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
