//! Property sidebar boundary.
//!
//! The canvas decides what the sidebar shows; drawing it is up to the
//! window layer, which reads [`SidebarState`] every frame.

use crate::engine::ObjectId;

/// One named parameter of an object.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectParameter {
    pub name: &'static str,
    pub value: String,
}

impl ObjectParameter {
    pub fn new(name: &'static str, value: impl ToString) -> Self {
        Self {
            name,
            value: value.to_string(),
        }
    }
}

/// What the sidebar currently shows.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SidebarState {
    shown: Option<(ObjectId, Vec<ObjectParameter>)>,
    /// A pinned sidebar stays open even for objects without parameters.
    pub pinned: bool,
}

impl SidebarState {
    pub fn show_parameters(&mut self, object: ObjectId, parameters: Vec<ObjectParameter>) {
        self.shown = Some((object, parameters));
    }

    pub fn hide_parameters(&mut self) {
        self.shown = None;
    }

    pub fn is_visible(&self) -> bool {
        self.shown.is_some()
    }

    /// The object whose parameters are shown.
    pub fn object(&self) -> Option<ObjectId> {
        self.shown.as_ref().map(|(object, _)| *object)
    }

    pub fn parameters(&self) -> &[ObjectParameter] {
        self.shown
            .as_ref()
            .map(|(_, parameters)| parameters.as_slice())
            .unwrap_or_default()
    }
}
