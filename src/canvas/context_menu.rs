//! Right-click menu.
//!
//! Which items are enabled depends on what is selected. Choosing an item is
//! handled by [`Canvas::choose_menu_item`](super::Canvas::choose_menu_item),
//! which goes back through the patch accessor.

use egui::Pos2;

use crate::engine::ObjectId;

use super::object_box::ObjectBox;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MenuItem {
    Open,
    Cut,
    Copy,
    Paste,
    Duplicate,
    Delete,
    ToFront,
    Help,
    Properties,
}

impl MenuItem {
    pub const ALL: [MenuItem; 9] = [
        MenuItem::Open,
        MenuItem::Cut,
        MenuItem::Copy,
        MenuItem::Paste,
        MenuItem::Duplicate,
        MenuItem::Delete,
        MenuItem::ToFront,
        MenuItem::Help,
        MenuItem::Properties,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            MenuItem::Open => "Open",
            MenuItem::Cut => "Cut",
            MenuItem::Copy => "Copy",
            MenuItem::Paste => "Paste",
            MenuItem::Duplicate => "Duplicate",
            MenuItem::Delete => "Delete",
            MenuItem::ToFront => "To Front",
            MenuItem::Help => "Help",
            MenuItem::Properties => "Properties",
        }
    }

    /// Items followed by a separator.
    pub fn ends_group(&self) -> bool {
        matches!(
            self,
            MenuItem::Open | MenuItem::Delete | MenuItem::ToFront | MenuItem::Help
        )
    }
}

/// What the menu was opened on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MenuContext {
    /// The single object the menu applies to.
    pub target: Option<ObjectId>,
    pub target_is_subpatch: bool,
    pub has_selection: bool,
    pub can_paste: bool,
}

impl MenuContext {
    pub fn new(target: Option<&ObjectBox>, has_selection: bool, can_paste: bool) -> Self {
        Self {
            target: target.map(ObjectBox::id),
            target_is_subpatch: target.is_some_and(|object| object.subpatch.is_some()),
            has_selection,
            can_paste,
        }
    }
}

/// An open context menu.
#[derive(Clone, Debug, PartialEq)]
pub struct ContextMenu {
    /// Where the menu was opened, in view coordinates.
    pub position: Pos2,
    pub context: MenuContext,
}

impl ContextMenu {
    pub fn new(position: Pos2, context: MenuContext) -> Self {
        Self { position, context }
    }

    pub fn target(&self) -> Option<ObjectId> {
        self.context.target
    }

    pub fn is_enabled(&self, item: MenuItem) -> bool {
        let context = &self.context;
        match item {
            MenuItem::Open => context.target_is_subpatch,
            MenuItem::Cut | MenuItem::Copy | MenuItem::Duplicate | MenuItem::Delete => {
                context.has_selection
            }
            MenuItem::Paste => context.can_paste,
            MenuItem::ToFront | MenuItem::Help | MenuItem::Properties => context.target.is_some(),
        }
    }

    /// Every item with its enabled state, in menu order.
    pub fn entries(&self) -> Vec<(MenuItem, bool)> {
        MenuItem::ALL
            .iter()
            .map(|item| (*item, self.is_enabled(*item)))
            .collect()
    }
}
