//! Canvas module
//!
//! The visual side of one open patch: boxes, edges, connections and the
//! selection, kept in step with the engine by
//! [`Canvas::synchronise`], and edited through pointer and keyboard input.
//!
//! The canvas never edits its boxes or connections to reflect a change it
//! asked for. It sends the edit through the [`Patch`] accessor and then
//! synchronises, so the engine stays the only source of truth.

pub mod connection;
pub mod context_menu;
pub mod grid;
pub mod gui_widget;
pub mod interaction;
pub mod object_box;
pub mod selection;
pub mod sidebar;
mod synchronise;
pub mod viewport;

use std::collections::{HashMap, VecDeque};

use crossbeam_channel::Receiver;
use egui::{Pos2, Rect, Vec2};

use crate::app::flags::{EditorFlags, SharedFlags};
use crate::config::CanvasConfig;
use crate::engine::{EngineEvent, ObjectId};
use crate::patch::{Clipboard, Patch};

pub use connection::VisualConnection;
pub use context_menu::{ContextMenu, MenuContext, MenuItem};
pub use grid::Grid;
pub use gui_widget::GuiWidget;
pub use interaction::{CanvasKey, Interaction, PointerButton};
pub use object_box::{Edge, EdgeRef, ObjectBox, Polarity};
pub use selection::{Selectable, SelectionSet};
pub use sidebar::{ObjectParameter, SidebarState};
pub use viewport::Viewport;

/// Pointer distance within which a click hits a connection.
const CONNECTION_HIT_DISTANCE: f32 = 4.0;

/// Work postponed to the next UI turn.
#[derive(Clone, Debug, PartialEq)]
pub enum Deferred {
    /// Refit the canvas extent once box geometry has settled.
    CheckBounds,
    /// Hand copied text to the clipboard.
    SetClipboard(String),
}

/// Something the canvas wants the window layer to do.
pub enum CanvasRequest {
    /// Show a subpatch in its own canvas.
    OpenPatch(Patch),
    /// Open the help patch with this name.
    OpenHelp(String),
}

/// Menu and shortcut enablement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommandStatus {
    pub can_undo: bool,
    pub can_redo: bool,
    pub has_selection: bool,
    pub has_object_selection: bool,
    pub single_object: bool,
    pub has_connection_selection: bool,
    pub can_paste: bool,
    pub locked: bool,
    /// Name of the step undo would revert, such as "typing".
    pub undo_name: Option<&'static str>,
    pub redo_name: Option<&'static str>,
}

/// Patch state read during the last synchronise.
#[derive(Clone, Debug, Default, PartialEq)]
struct PatchStatus {
    title: String,
    dirty: bool,
    can_undo: bool,
    can_redo: bool,
    undo_name: Option<&'static str>,
    redo_name: Option<&'static str>,
}

/// The visual scene of one patch.
pub struct Canvas {
    patch: Patch,
    config: CanvasConfig,
    shared_flags: SharedFlags,
    flag_changes: Receiver<EditorFlags>,
    flags: EditorFlags,
    /// Boxes in canonical engine order.
    boxes: Vec<ObjectBox>,
    connections: Vec<VisualConnection>,
    selection: SelectionSet,
    interaction: Interaction,
    viewport: Viewport,
    grid: Grid,
    /// Drawn inside a parent's graph: no connections, no editing.
    is_graph: bool,
    /// Engine bounds of the contents, for graphs.
    graph_bounds: Option<Rect>,
    /// Contents of graph-on-parent and array boxes, by box.
    graphs: HashMap<ObjectId, Canvas>,
    /// Keys whose press the canvas consumed, so their release is too.
    consumed_keys: Vec<CanvasKey>,
    status: PatchStatus,
    /// Area covered by the canvas, in canvas coordinates.
    extent: Rect,
    deferred: VecDeque<Deferred>,
    requests: Vec<CanvasRequest>,
    context_menu: Option<ContextMenu>,
    sidebar: SidebarState,
    clipboard: Box<dyn Clipboard>,
}

impl Canvas {
    /// Creates a canvas for `patch` and loads its current state.
    pub fn new(
        patch: Patch,
        config: &CanvasConfig,
        flags: &SharedFlags,
        clipboard: Box<dyn Clipboard>,
    ) -> Self {
        let current = flags.get();
        let viewport = Viewport::default();
        let mut canvas = Self {
            patch,
            config: config.clone(),
            shared_flags: flags.clone(),
            flag_changes: flags.subscribe(),
            flags: current,
            boxes: Vec::new(),
            connections: Vec::new(),
            selection: SelectionSet::new(),
            interaction: Interaction::Idle,
            grid: Grid::new(config.grid_size, config.grid_enabled && current.grid_enabled),
            extent: viewport.visible_rect(),
            viewport,
            is_graph: false,
            graph_bounds: None,
            graphs: HashMap::new(),
            consumed_keys: Vec::new(),
            status: PatchStatus::default(),
            deferred: VecDeque::new(),
            requests: Vec::new(),
            context_menu: None,
            sidebar: SidebarState::default(),
            clipboard,
        };
        canvas.synchronise(true);
        canvas
    }

    /// Marks the canvas as drawn inside a parent's graph.
    pub fn into_graph(mut self) -> Self {
        self.is_graph = true;
        self.connections.clear();
        self.selection.clear();
        self.synchronise(true);
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn patch(&self) -> &Patch {
        &self.patch
    }

    pub fn boxes(&self) -> &[ObjectBox] {
        &self.boxes
    }

    pub fn connections(&self) -> &[VisualConnection] {
        &self.connections
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    pub fn interaction(&self) -> &Interaction {
        &self.interaction
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn sidebar(&self) -> &SidebarState {
        &self.sidebar
    }

    pub fn sidebar_mut(&mut self) -> &mut SidebarState {
        &mut self.sidebar
    }

    pub fn context_menu(&self) -> Option<&ContextMenu> {
        self.context_menu.as_ref()
    }

    pub fn extent(&self) -> Rect {
        self.extent
    }

    pub fn title(&self) -> &str {
        &self.status.title
    }

    pub fn is_dirty(&self) -> bool {
        self.status.dirty
    }

    pub fn is_graph(&self) -> bool {
        self.is_graph
    }

    /// The graph drawn inside a graph-on-parent or array box.
    pub fn graph_for(&self, object: ObjectId) -> Option<&Canvas> {
        self.graphs.get(&object)
    }

    /// Area of a graph's contents in its own canvas coordinates. Empty
    /// graphs and ordinary canvases have none.
    pub fn graph_content(&self) -> Option<Rect> {
        self.graph_bounds
    }

    /// Editing is disabled: locked, command-locked, or a graph.
    pub fn is_locked(&self) -> bool {
        self.is_graph || self.flags.locked || self.flags.command_locked
    }

    pub fn presentation_mode(&self) -> bool {
        self.flags.presentation_mode
    }

    pub fn pending_deferred(&self) -> usize {
        self.deferred.len()
    }

    /// Takes the requests raised since the last call.
    pub fn take_requests(&mut self) -> Vec<CanvasRequest> {
        std::mem::take(&mut self.requests)
    }

    pub fn box_for(&self, object: ObjectId) -> Option<&ObjectBox> {
        self.boxes.iter().find(|object_box| object_box.id() == object)
    }

    fn box_for_mut(&mut self, object: ObjectId) -> Option<&mut ObjectBox> {
        self.boxes.iter_mut().find(|object_box| object_box.id() == object)
    }

    // ========================================================================
    // Geometry
    // ========================================================================

    /// Topmost box under `point`.
    pub fn box_at(&self, point: Pos2) -> Option<ObjectId> {
        self.boxes
            .iter()
            .rev()
            .find(|object_box| object_box.contains(point))
            .map(ObjectBox::id)
    }

    /// Topmost edge under `point`.
    pub fn edge_at(&self, point: Pos2) -> Option<EdgeRef> {
        self.boxes
            .iter()
            .rev()
            .find_map(|object_box| object_box.edge_at(point))
    }

    pub fn edge_position(&self, edge: EdgeRef) -> Option<Pos2> {
        self.box_for(edge.object)?
            .edge_position(edge.polarity, edge.index)
    }

    /// Polyline of a connection in canvas coordinates, if both ends exist.
    pub fn connection_points(&self, connection: &VisualConnection) -> Option<Vec<Pos2>> {
        let start = self.edge_position(connection.outlet())?;
        let end = self.edge_position(connection.inlet())?;
        Some(connection.route(start, end))
    }

    /// Topmost connection passing near `point`.
    pub fn connection_at(&self, point: Pos2) -> Option<crate::engine::Connection> {
        self.connections
            .iter()
            .rev()
            .find(|connection| {
                self.connection_points(connection).is_some_and(|points| {
                    connection::distance_to_polyline(point, &points) <= CONNECTION_HIT_DISTANCE
                })
            })
            .map(VisualConnection::connection)
    }

    /// Nearest edge of `polarity` within the snap distance, skipping the
    /// objects in `exclude`.
    pub fn nearest_edge(&self, point: Pos2, polarity: Polarity, exclude: &[ObjectId]) -> Option<EdgeRef> {
        let mut nearest: Option<(f32, EdgeRef)> = None;
        for object_box in &self.boxes {
            if exclude.contains(&object_box.id()) {
                continue;
            }
            for edge in object_box.edges(polarity) {
                let Some(position) = object_box.edge_position(polarity, edge.index) else {
                    continue;
                };
                let distance = position.distance(point);
                if distance > self.config.edge_snap_distance {
                    continue;
                }
                if nearest.map_or(true, |(best, _)| distance < best) {
                    nearest = Some((distance, object_box.edge_ref(polarity, edge.index)));
                }
            }
        }
        nearest.map(|(_, edge)| edge)
    }

    /// Refits the canvas extent to the visible area plus every box.
    pub fn check_bounds(&mut self) {
        if self.is_graph {
            return;
        }
        self.extent = self
            .boxes
            .iter()
            .fold(self.viewport.visible_rect(), |extent, object_box| {
                extent.union(object_box.bounds)
            });
    }

    /// Engine position for a canvas point.
    fn engine_position(point: Pos2) -> (i32, i32) {
        (point.x.round() as i32, point.y.round() as i32)
    }

    // ========================================================================
    // Selection
    // ========================================================================

    /// Selects or deselects one element and refreshes the sidebar.
    pub fn set_selected(&mut self, item: Selectable, selected: bool) {
        if self.selection.set(item, selected) {
            self.update_sidebar_selection();
        }
    }

    pub fn deselect_all(&mut self) {
        self.selection.clear();
        self.sidebar.hide_parameters();
    }

    /// Selects every box. Works while the command key is held.
    pub fn select_all(&mut self) {
        if self.is_graph || self.flags.locked {
            return;
        }
        for object_box in &self.boxes {
            self.selection.select(Selectable::Object(object_box.id()));
        }
        self.update_sidebar_selection();
    }

    pub fn selected_objects(&self) -> Vec<ObjectId> {
        self.selection.objects()
    }

    /// Shows the parameters of a single selected object, hides otherwise.
    pub fn update_sidebar_selection(&mut self) {
        let objects = self.selection.objects();
        let shown = match objects.as_slice() {
            [object] if !self.is_locked() => self
                .box_for(*object)
                .map(|object_box| (*object, object_box.parameters())),
            _ => None,
        };

        match shown {
            Some((object, parameters)) if !parameters.is_empty() || self.sidebar.pinned => {
                self.sidebar.show_parameters(object, parameters)
            }
            _ => self.sidebar.hide_parameters(),
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Creates an object at a canvas position and selects it.
    pub fn create_object(&mut self, text: &str, at: Pos2) -> Option<ObjectId> {
        let (x, y) = Self::engine_position(at);
        match self.patch.create_object(text, x, y) {
            Ok(object) => {
                self.synchronise(true);
                self.deselect_all();
                self.set_selected(Selectable::Object(object), true);
                Some(object)
            }
            Err(error) => {
                log::warn!("{}", error);
                None
            }
        }
    }

    /// Retypes a box. Returns the object now carrying the text.
    pub fn rename_box(&mut self, object: ObjectId, text: &str) -> Option<ObjectId> {
        match self.patch.rename_object(object, text) {
            Ok(renamed) => {
                self.synchronise(true);
                if renamed != object {
                    self.set_selected(Selectable::Object(renamed), true);
                }
                Some(renamed)
            }
            Err(error) => {
                log::warn!("{}", error);
                None
            }
        }
    }

    /// Copies the selected objects. The clipboard is filled once the engine
    /// has serialised them (see [`handle_engine_event`](Self::handle_engine_event)).
    pub fn copy_selection(&mut self) {
        let objects = self.selected_objects();
        if objects.is_empty() {
            return;
        }
        let result = self
            .patch
            .set_selection(objects, Vec::new())
            .and_then(|()| self.patch.copy())
            .and_then(|()| self.patch.deselect_all());
        if let Err(error) = result {
            log::warn!("copy failed: {}", error);
        }
    }

    /// Pastes the clipboard, at `at` when given, and selects the result.
    pub fn paste_selection(&mut self, at: Option<Pos2>) {
        let Some(text) = self.clipboard.get_text() else {
            return;
        };
        let at = at.map(Self::engine_position);
        match self.patch.paste(&text, at, self.config.paste_offset) {
            Ok(pasted) => self.adopt_engine_selection(pasted),
            Err(error) => log::warn!("paste failed: {}", error),
        }
    }

    pub fn duplicate_selection(&mut self) {
        let objects = self.selected_objects();
        if objects.is_empty() {
            return;
        }
        let duplicated = self
            .patch
            .set_selection(objects, Vec::new())
            .and_then(|()| self.patch.duplicate(self.config.paste_offset));
        match duplicated {
            Ok(copies) => self.adopt_engine_selection(copies),
            Err(error) => log::warn!("duplicate failed: {}", error),
        }
    }

    /// Synchronises without touching positions and selects `objects`.
    fn adopt_engine_selection(&mut self, objects: Vec<ObjectId>) {
        self.synchronise(false);
        self.deselect_all();
        for object in objects {
            self.selection.select(Selectable::Object(object));
        }
        self.update_sidebar_selection();
        if let Err(error) = self.patch.deselect_all() {
            log::warn!("{}", error);
        }
    }

    /// Deletes selected objects and connections as one undo step.
    pub fn remove_selection(&mut self) {
        if self.selection.is_empty() {
            return;
        }
        let (objects, connections) = (self.selection.objects(), self.selection.connections());

        self.sidebar.hide_parameters();
        let result = self
            .patch
            .set_selection(objects, connections)
            .and_then(|()| self.patch.remove_selection())
            .and_then(|()| self.patch.finish_remove());
        if let Err(error) = result {
            log::warn!("remove failed: {}", error);
        }

        self.deselect_all();
        self.synchronise(false);
    }

    pub fn undo(&mut self) {
        match self.patch.undo() {
            Ok(()) => self.synchronise(true),
            Err(error) => log::warn!("undo failed: {}", error),
        }
    }

    pub fn redo(&mut self) {
        match self.patch.redo() {
            Ok(()) => self.synchronise(true),
            Err(error) => log::warn!("redo failed: {}", error),
        }
    }

    /// Raises an object to the end of the canonical order.
    pub fn to_front(&mut self, object: ObjectId) {
        match self.patch.to_front(object) {
            Ok(()) => self.synchronise(true),
            Err(error) => log::warn!("{}", error),
        }
    }

    pub fn open_subpatch(&mut self, object: ObjectId) {
        match self.patch.open_subpatch(object) {
            Ok(Some(child)) => self.requests.push(CanvasRequest::OpenPatch(child)),
            Ok(None) => {}
            Err(error) => log::warn!("cannot open subpatch: {}", error),
        }
    }

    pub fn open_help(&mut self, object: ObjectId) {
        match self.patch.help_name(object) {
            Ok(Some(name)) => self.requests.push(CanvasRequest::OpenHelp(name)),
            Ok(None) => {}
            Err(error) => log::warn!("cannot find help: {}", error),
        }
    }

    /// Shows an object's parameters even when it has none.
    pub fn show_properties(&mut self, object: ObjectId) {
        if let Some(parameters) = self.box_for(object).map(ObjectBox::parameters) {
            self.sidebar.show_parameters(object, parameters);
        }
    }

    pub fn command_status(&self) -> CommandStatus {
        let objects = self.selection.objects().len();
        CommandStatus {
            can_undo: self.status.can_undo,
            can_redo: self.status.can_redo,
            has_selection: !self.selection.is_empty(),
            has_object_selection: objects > 0,
            single_object: objects == 1,
            has_connection_selection: !self.selection.connections().is_empty(),
            can_paste: self.clipboard.get_text().is_some(),
            locked: self.is_locked(),
            undo_name: self.status.undo_name,
            redo_name: self.status.redo_name,
        }
    }

    // ========================================================================
    // Context menu
    // ========================================================================

    pub fn dismiss_menu(&mut self) {
        self.context_menu = None;
    }

    /// Runs a menu item and closes the menu. Disabled items do nothing.
    pub fn choose_menu_item(&mut self, item: MenuItem) {
        let Some(menu) = self.context_menu.take() else {
            return;
        };
        if !menu.is_enabled(item) {
            return;
        }

        let target = menu.target();
        match item {
            MenuItem::Open => target.into_iter().for_each(|object| self.open_subpatch(object)),
            MenuItem::Cut => {
                self.copy_selection();
                self.remove_selection();
            }
            MenuItem::Copy => self.copy_selection(),
            MenuItem::Paste => {
                let at = self.viewport.to_canvas(menu.position);
                self.paste_selection(Some(at));
            }
            MenuItem::Duplicate => self.duplicate_selection(),
            MenuItem::Delete => self.remove_selection(),
            MenuItem::ToFront => target.into_iter().for_each(|object| self.to_front(object)),
            MenuItem::Help => target.into_iter().for_each(|object| self.open_help(object)),
            MenuItem::Properties => {
                target.into_iter().for_each(|object| self.show_properties(object))
            }
        }
    }

    // ========================================================================
    // Events, flags and deferred work
    // ========================================================================

    /// Reacts to an engine event. Returns whether the event was for this
    /// canvas.
    pub fn handle_engine_event(&mut self, event: &EngineEvent) -> bool {
        match event {
            EngineEvent::ClipboardText { patch, text } if *patch == self.patch.id() => {
                self.deferred.push_back(Deferred::SetClipboard(text.clone()));
                true
            }
            _ => false,
        }
    }

    /// Runs everything deferred to this turn.
    pub fn run_deferred(&mut self) {
        let pending: Vec<Deferred> = self.deferred.drain(..).collect();
        for task in pending {
            match task {
                Deferred::CheckBounds => {
                    if let Err(error) = self.patch.wait_for_state_update() {
                        log::warn!("{}", error);
                    }
                    self.check_bounds();
                }
                Deferred::SetClipboard(text) => self.clipboard.set_text(text),
            }
        }
    }

    /// Applies flag changes published since the last poll.
    pub fn poll_flags(&mut self) {
        for graph in self.graphs.values_mut() {
            graph.poll_flags();
        }
        let Some(latest) = self.flag_changes.try_iter().last() else {
            return;
        };
        let previous = std::mem::replace(&mut self.flags, latest);

        if previous.locked != latest.locked {
            self.cancel_interaction();
            self.deselect_all();
        }
        if previous.command_locked != latest.command_locked && latest.command_locked {
            self.cancel_interaction();
            self.sidebar.hide_parameters();
        }
        if previous.grid_enabled != latest.grid_enabled {
            self.grid.enabled = self.config.grid_enabled && latest.grid_enabled;
        }
        if previous.presentation_mode != latest.presentation_mode && !self.is_graph {
            self.deselect_all();
            if latest.presentation_mode {
                self.connections.clear();
            }
            self.shared_flags.set_command_locked(latest.presentation_mode);
            self.synchronise(true);
        }
    }

    /// Sets the view size in screen pixels.
    pub fn set_view_size(&mut self, size: Vec2) {
        if self.viewport.size != size {
            self.viewport.set_size(size);
            self.check_bounds();
        }
    }

    /// Rubber-band lines of connections being formed, in canvas coordinates.
    pub fn pending_connection_lines(&self) -> Vec<(Pos2, Pos2)> {
        match &self.interaction {
            Interaction::Connecting { anchors, pointer, .. } => anchors
                .iter()
                .filter_map(|anchor| Some((self.edge_position(*anchor)?, *pointer)))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// The lasso rectangle while one is being dragged.
    pub fn lasso_rect(&self) -> Option<Rect> {
        match &self.interaction {
            Interaction::Lasso { origin, current, .. } => {
                Some(Rect::from_two_pos(*origin, *current))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::{launch, EngineHost, Instance};
    use crate::patch::SharedClipboard;
    use egui::{pos2, Modifiers};

    fn canvas() -> (EngineHost, Canvas) {
        let config = EngineConfig {
            use_audio_device: false,
            ..EngineConfig::default()
        };
        let (bridge, host) = launch(&config, Instance::new());
        let patch = Patch::open(bridge, "menu").unwrap();
        let canvas = Canvas::new(
            patch,
            &CanvasConfig::default(),
            &SharedFlags::default(),
            Box::new(SharedClipboard::default()),
        );
        (host, canvas)
    }

    #[test]
    fn test_context_menu_on_box_selects_it() {
        let (_host, mut canvas) = canvas();
        let object = canvas.create_object("f", pos2(100.0, 100.0)).unwrap();
        canvas.deselect_all();

        canvas.pointer_pressed(pos2(110.0, 110.0), PointerButton::Secondary, Modifiers::NONE);
        let menu = canvas.context_menu().unwrap();
        assert_eq!(menu.target(), Some(object));
        assert!(menu.is_enabled(MenuItem::Delete));
        assert!(!menu.is_enabled(MenuItem::Open));
        assert!(canvas.selection().contains_object(object));

        canvas.choose_menu_item(MenuItem::Delete);
        assert!(canvas.context_menu().is_none());
        assert!(canvas.boxes().is_empty());
    }

    #[test]
    fn test_disabled_menu_item_does_nothing() {
        let (_host, mut canvas) = canvas();
        canvas.create_object("f", pos2(100.0, 100.0)).unwrap();
        canvas.deselect_all();

        canvas.pointer_pressed(pos2(400.0, 400.0), PointerButton::Secondary, Modifiers::NONE);
        canvas.choose_menu_item(MenuItem::Delete);
        assert_eq!(canvas.boxes().len(), 1);
    }

    #[test]
    fn test_properties_show_in_sidebar() {
        let (_host, mut canvas) = canvas();
        let object = canvas.create_object("hsl", pos2(50.0, 50.0)).unwrap();
        assert!(canvas.sidebar().is_visible());
        assert_eq!(canvas.sidebar().object(), Some(object));

        canvas.deselect_all();
        assert!(!canvas.sidebar().is_visible());

        canvas.pointer_pressed(pos2(55.0, 55.0), PointerButton::Secondary, Modifiers::NONE);
        canvas.choose_menu_item(MenuItem::Properties);
        assert_eq!(canvas.sidebar().object(), Some(object));
    }

    #[test]
    fn test_open_subpatch_raises_request() {
        let (_host, mut canvas) = canvas();
        let object = canvas.create_object("pd voice", pos2(50.0, 50.0)).unwrap();
        canvas.open_subpatch(object);

        let requests = canvas.take_requests();
        assert!(matches!(requests.as_slice(), [CanvasRequest::OpenPatch(_)]));
        assert!(canvas.take_requests().is_empty());
    }

    #[test]
    fn test_command_status_tracks_history() {
        let (_host, mut canvas) = canvas();
        let initial = canvas.command_status();
        assert!(!initial.can_undo && !initial.has_selection && !initial.can_paste);

        canvas.create_object("f", pos2(10.0, 10.0)).unwrap();
        let status = canvas.command_status();
        assert!(status.can_undo);
        assert!(status.single_object);
        assert_eq!(status.undo_name, Some("create"));

        canvas.undo();
        assert!(canvas.boxes().is_empty());
        let status = canvas.command_status();
        assert!(status.can_redo);
        assert_eq!((status.undo_name, status.redo_name), (None, Some("create")));
    }
}
