//! Application module
//!
//! Contains the eframe application, theme definitions, and the editor flags
//! shared between canvases.

pub mod canvas_app;
pub mod flags;
pub mod theme;

pub use canvas_app::CanvasApp;
pub use flags::{EditorFlags, SharedFlags};
