//! Patch graph: the engine-side model of one patch.
//!
//! A `PatchGraph` holds the objects of a patch in their canonical order, the
//! connections between them, the engine's own selection, and the undo
//! history. It is only ever touched on the engine thread (through mutations
//! queued on the bridge).
//!
//! Objects are stored in a generational arena. Removing an object leaves a
//! tombstone behind so that undo can bring it back under the same
//! [`ObjectId`]; ids of live objects are never reused.
//!
//! Every patch may carry one hidden metadata object (class `__info`). It
//! lives in the object order like any other object but is skipped by
//! [`PatchGraph::objects`] and [`PatchGraph::index_of`], so canonical indices
//! only ever count visible objects.

use std::collections::{BTreeMap, HashMap};

use slotmap::{new_key_type, SecondaryMap, SlotMap};

use super::instance::PatchId;
use super::object_class::{float_arg, GuiKind, ObjectClass, PortKind};
use super::object_spec::{Atom, ObjectSpec};
use super::undo::{UndoAction, UndoStack};
use super::validation::{validate_ports, ConnectionError};

new_key_type! {
    /// Stable identity of an engine object.
    pub struct ObjectId;
}

/// Class name of the hidden metadata object.
pub const INFO_CLASS: &str = "__info";

/// Width of one character of box text, in canvas units.
pub const CHAR_WIDTH: i32 = 7;

/// Horizontal padding around box text.
pub const TEXT_PADDING: i32 = 10;

/// Height of a text box.
pub const TEXT_HEIGHT: i32 = 22;

/// Minimum number of characters a text box is sized for.
const MIN_TEXT_CHARS: usize = 3;

/// A directed connection from an outlet to an inlet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Connection {
    /// Object owning the outlet.
    pub source: ObjectId,
    /// Outlet index on the source.
    pub outlet: usize,
    /// Object owning the inlet.
    pub sink: ObjectId,
    /// Inlet index on the sink.
    pub inlet: usize,
}

impl Connection {
    pub fn new(source: ObjectId, outlet: usize, sink: ObjectId, inlet: usize) -> Self {
        Self {
            source,
            outlet,
            sink,
            inlet,
        }
    }

    /// Whether either end of this connection is `object`.
    pub fn touches(&self, object: ObjectId) -> bool {
        self.source == object || self.sink == object
    }
}

/// Key identifying a connection by canonical indices:
/// `"{source}_{outlet}_{sink}_{inlet}"`.
///
/// Used both as the visual connection id and as the prefix under which
/// per-connection metadata is stored.
pub fn connection_key(source: usize, outlet: usize, sink: usize, inlet: usize) -> String {
    format!("{}_{}_{}_{}", source, outlet, sink, inlet)
}

/// A signal-rate feedback loop was found while ordering DSP objects.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("DSP loop detected ({unscheduled} objects not scheduled)")]
pub struct DspLoop {
    pub unscheduled: usize,
}

/// One object inside a patch.
#[derive(Clone, Debug)]
pub struct EngineObject {
    /// Parsed text of the object.
    pub spec: ObjectSpec,
    /// Resolved class (ports and widget).
    pub class: ObjectClass,
    /// Position in patch coordinates.
    pub x: i32,
    pub y: i32,
    /// Current widget value (toggle state, slider position, number...).
    pub value: f32,
    /// Child patch owned by subpatch objects.
    pub subpatch: Option<PatchId>,
    alive: bool,
    selected: bool,
    internal: bool,
    properties: BTreeMap<String, String>,
}

impl EngineObject {
    /// Creates a detached object; insert it with [`PatchGraph::add_object`].
    pub fn new(spec: ObjectSpec, class: ObjectClass, x: i32, y: i32) -> Self {
        let internal = spec.class_name().as_deref() == Some(INFO_CLASS);
        let value = initial_value(&spec, &class);
        Self {
            spec,
            class,
            x,
            y,
            value,
            subpatch: None,
            alive: true,
            selected: false,
            internal,
            properties: BTreeMap::new(),
        }
    }

    /// Text as it reads back through [`ObjectSpec::parse`].
    pub fn text(&self) -> String {
        self.spec.to_text()
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    /// Whether this is the hidden metadata object.
    pub fn is_internal(&self) -> bool {
        self.internal
    }

    /// Size of the object's box in patch coordinates.
    pub fn size(&self) -> (i32, i32) {
        let args = self.spec.arguments();
        match self.class.gui {
            Some(GuiKind::Toggle) | Some(GuiKind::Bang) => {
                let size = float_arg(args, 0, 15.0) as i32;
                (size, size)
            }
            Some(GuiKind::HorizontalRadio) => {
                let size = float_arg(args, 0, 15.0) as i32;
                (size * self.radio_count() as i32, size)
            }
            Some(GuiKind::VerticalRadio) => {
                let size = float_arg(args, 0, 15.0) as i32;
                (size, size * self.radio_count() as i32)
            }
            Some(GuiKind::HorizontalSlider) => (
                float_arg(args, 0, 128.0) as i32,
                float_arg(args, 1, 15.0) as i32,
            ),
            Some(GuiKind::VerticalSlider) => (
                float_arg(args, 0, 15.0) as i32,
                float_arg(args, 1, 128.0) as i32,
            ),
            Some(GuiKind::NumberBox) => {
                let digits = float_arg(args, 0, 5.0) as i32;
                let height = float_arg(args, 1, 14.0) as i32;
                (digits * CHAR_WIDTH + height / 2 + 4, height)
            }
            Some(GuiKind::GraphOnParent) | Some(GuiKind::Array) => (200, 140),
            _ => {
                let chars = self.text().chars().count().max(MIN_TEXT_CHARS) as i32;
                (chars * CHAR_WIDTH + TEXT_PADDING, TEXT_HEIGHT)
            }
        }
    }

    /// Number of buttons of a radio widget.
    pub fn radio_count(&self) -> usize {
        float_arg(self.spec.arguments(), 3, 8.0).max(1.0) as usize
    }

    /// Label argument of an iemgui widget, if set.
    pub fn label(&self) -> Option<String> {
        let index = self.class.gui?.label_argument()?;
        match self.spec.arguments().get(index)? {
            Atom::Symbol(label) if label != "empty" => Some(label.clone()),
            _ => None,
        }
    }
}

/// Widgets with their init flag set start from the value saved in their
/// arguments; everything else starts at zero.
fn initial_value(spec: &ObjectSpec, class: &ObjectClass) -> f32 {
    let args = spec.arguments();
    match class.gui {
        Some(GuiKind::Toggle) if float_arg(args, 1, 0.0) != 0.0 => float_arg(args, 13, 1.0),
        Some(GuiKind::HorizontalRadio) | Some(GuiKind::VerticalRadio)
            if float_arg(args, 2, 0.0) != 0.0 =>
        {
            float_arg(args, 14, 0.0)
        }
        _ => 0.0,
    }
}

/// The engine-side model of one patch.
#[derive(Debug)]
pub struct PatchGraph {
    name: String,
    objects: SlotMap<ObjectId, EngineObject>,
    /// Canonical order, internal object included.
    order: Vec<ObjectId>,
    /// Canonical index of every visible live object.
    visible: SecondaryMap<ObjectId, usize>,
    connections: Vec<Connection>,
    undo: UndoStack,
    dirty: bool,
    paste_onset: i32,
    parent: Option<(PatchId, ObjectId)>,
    info_object: Option<ObjectId>,
    /// Connections selected for deletion.
    selected_connections: Vec<Connection>,
}

impl PatchGraph {
    /// Creates an empty top-level patch.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            objects: SlotMap::with_key(),
            order: Vec::new(),
            visible: SecondaryMap::new(),
            connections: Vec::new(),
            undo: UndoStack::new(),
            dirty: false,
            paste_onset: 0,
            parent: None,
            info_object: None,
            selected_connections: Vec::new(),
        }
    }

    /// Creates a child patch owned by `parent`'s object `owner`.
    pub fn child(name: &str, parent: PatchId, owner: ObjectId) -> Self {
        let mut graph = Self::new(name);
        graph.parent = Some((parent, owner));
        graph
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    /// The patch and object owning this patch, for subpatches.
    pub fn parent(&self) -> Option<(PatchId, ObjectId)> {
        self.parent
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Number of visible objects.
    pub fn len(&self) -> usize {
        self.visible.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }

    /// Visible objects in canonical order.
    pub fn objects(&self) -> Vec<ObjectId> {
        self.order
            .iter()
            .copied()
            .filter(|id| self.visible.contains_key(*id))
            .collect()
    }

    /// Canonical index of a visible object.
    pub fn index_of(&self, id: ObjectId) -> Option<usize> {
        self.visible.get(id).copied()
    }

    /// Returns a live object (visible or internal).
    pub fn object(&self, id: ObjectId) -> Option<&EngineObject> {
        self.objects.get(id).filter(|object| object.alive)
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut EngineObject> {
        self.objects.get_mut(id).filter(|object| object.alive)
    }

    /// Whether `id` names a live visible object.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.visible.contains_key(id)
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn is_connected(&self, connection: &Connection) -> bool {
        self.connections.contains(connection)
    }

    /// Canonical key of a connection between visible objects.
    pub fn connection_key(&self, connection: &Connection) -> Option<String> {
        Some(connection_key(
            self.index_of(connection.source)?,
            connection.outlet,
            self.index_of(connection.sink)?,
            connection.inlet,
        ))
    }

    /// Checks a connection against the current contents.
    pub fn validate(&self, connection: &Connection) -> Result<(), ConnectionError> {
        if connection.source == connection.sink {
            return Err(ConnectionError::SelfConnection);
        }
        let (Some(source), Some(sink)) = (
            self.object(connection.source),
            self.object(connection.sink),
        ) else {
            return Err(ConnectionError::MissingObject);
        };
        if source.internal || sink.internal {
            return Err(ConnectionError::MissingObject);
        }

        validate_ports(
            &source.class.outlets,
            connection.outlet,
            &sink.class.inlets,
            connection.inlet,
        )?;

        if self.is_connected(connection) {
            return Err(ConnectionError::DuplicateConnection);
        }
        Ok(())
    }

    /// Bounding rectangle `(x, y, w, h)` of all visible objects.
    pub fn bounds(&self) -> Option<(i32, i32, i32, i32)> {
        let mut iter = self.objects().into_iter().filter_map(|id| self.object(id));
        let first = iter.next()?;
        let (w, h) = first.size();
        let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.x + w, first.y + h);

        for object in iter {
            let (w, h) = object.size();
            x0 = x0.min(object.x);
            y0 = y0.min(object.y);
            x1 = x1.max(object.x + w);
            y1 = y1.max(object.y + h);
        }
        Some((x0, y0, x1 - x0, y1 - y0))
    }

    // ========================================================================
    // Editing
    // ========================================================================

    /// Adds an object at the end of the order and records it for undo.
    pub fn add_object(&mut self, object: EngineObject) -> ObjectId {
        let internal = object.internal;
        let id = self.objects.insert(object);
        let position = self.order.len();
        self.order.push(id);
        self.reindex();

        if internal {
            self.info_object = Some(id);
        } else {
            self.record("create", UndoAction::Create { object: id, position });
        }
        id
    }

    /// Removes an object and every connection touching it.
    pub fn remove_object(&mut self, id: ObjectId) -> bool {
        if !self.contains(id) {
            return false;
        }
        match self.detach(id) {
            Some((position, connections)) => {
                self.record(
                    "remove",
                    UndoAction::Remove {
                        object: id,
                        position,
                        connections,
                    },
                );
                true
            }
            None => false,
        }
    }

    /// Connects an outlet to an inlet after validation.
    pub fn connect(&mut self, connection: Connection) -> Result<(), ConnectionError> {
        self.validate(&connection)?;
        self.connections.push(connection);
        self.record("connect", UndoAction::Connect(connection));
        Ok(())
    }

    /// Removes a connection. Returns false if it did not exist.
    pub fn disconnect(&mut self, connection: &Connection) -> bool {
        if !self.raw_disconnect(connection) {
            return false;
        }
        self.record("disconnect", UndoAction::Disconnect(*connection));
        true
    }

    /// Replaces an object's text in place, keeping its identity. Connections
    /// that no longer fit the new ports are dropped.
    pub fn retext(&mut self, id: ObjectId, spec: ObjectSpec, class: ObjectClass) -> bool {
        let Some(object) = self.object(id) else {
            return false;
        };
        let from = (object.spec.clone(), object.class.clone());
        let to = (spec, class);
        let dropped = self.apply_text(id, &to);

        self.record(
            "typing",
            UndoAction::Retext {
                object: id,
                from,
                to,
                dropped,
            },
        );
        true
    }

    /// Moves the engine-selected objects by a delta.
    fn move_selection(&mut self, dx: i32, dy: i32) {
        let objects = self.selected();
        if objects.is_empty() || (dx == 0 && dy == 0) {
            return;
        }
        self.shift(&objects, dx, dy);
        self.record("motion", UndoAction::Move { objects, dx, dy });
    }

    /// Moves a set of objects: select exactly them, move the selection,
    /// then clear the engine selection again.
    pub fn move_objects(&mut self, objects: &[ObjectId], dx: i32, dy: i32) {
        self.deselect_all();
        for id in objects {
            self.select(*id);
        }
        self.move_selection(dx, dy);
        self.deselect_all();
    }

    /// Moves an object to the end of the order so it draws on top.
    pub fn to_front(&mut self, id: ObjectId) -> bool {
        if !self.contains(id) {
            return false;
        }
        let Some(from) = self.position(id) else {
            return false;
        };
        let to = self.order.len() - 1;
        if from == to {
            return true;
        }
        self.arrange(id, to);
        self.record("arrange", UndoAction::Arrange { object: id, from, to });
        true
    }

    /// Removes all engine-selected objects and connections. Opens an undo
    /// group that stays open until [`finish_remove`](Self::finish_remove).
    pub fn remove_selection(&mut self) {
        self.undo.begin_group("clear");
        for id in self.selected() {
            self.remove_object(id);
        }
        for connection in std::mem::take(&mut self.selected_connections) {
            self.disconnect(&connection);
        }
    }

    /// Closes the undo group opened by [`remove_selection`](Self::remove_selection).
    pub fn finish_remove(&mut self) {
        self.undo.end_group();
    }

    /// Opens a named undo group; see [`UndoStack::begin_group`].
    pub fn begin_undo_group(&mut self, name: &'static str) -> bool {
        self.undo.begin_group(name)
    }

    pub fn end_undo_group(&mut self) {
        self.undo.end_group();
    }

    /// Sets the widget value of an object. Not recorded for undo.
    pub fn set_value(&mut self, id: ObjectId, value: f32) -> bool {
        match self.object_mut(id) {
            Some(object) => {
                object.value = value;
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // Selection
    // ========================================================================

    pub fn select(&mut self, id: ObjectId) -> bool {
        if !self.contains(id) {
            return false;
        }
        if let Some(object) = self.objects.get_mut(id) {
            object.selected = true;
        }
        true
    }

    pub fn deselect(&mut self, id: ObjectId) {
        if let Some(object) = self.objects.get_mut(id) {
            object.selected = false;
        }
    }

    pub fn deselect_all(&mut self) {
        for (_, object) in self.objects.iter_mut() {
            object.selected = false;
        }
        self.selected_connections.clear();
    }

    /// Adds an existing connection to the selection.
    pub fn select_connection(&mut self, connection: Connection) -> bool {
        if !self.is_connected(&connection) {
            return false;
        }
        if !self.selected_connections.contains(&connection) {
            self.selected_connections.push(connection);
        }
        true
    }

    pub fn selected_connections(&self) -> &[Connection] {
        &self.selected_connections
    }

    /// Engine-selected objects in canonical order.
    pub fn selected(&self) -> Vec<ObjectId> {
        self.objects()
            .into_iter()
            .filter(|id| self.objects.get(*id).is_some_and(|object| object.selected))
            .collect()
    }

    pub fn is_selected(&self, id: ObjectId) -> bool {
        self.object(id).is_some_and(|object| object.selected)
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Stores a metadata entry in the hidden info object. `None` erases it.
    ///
    /// Returns false if the patch has no info object yet; the instance
    /// creates one on demand before calling this.
    pub fn set_info(&mut self, key: &str, value: Option<String>) -> bool {
        let Some(info) = self.info_object else {
            return false;
        };
        let from = self.write_info(info, key, value.clone());
        if from != value {
            self.record(
                "properties",
                UndoAction::SetInfo {
                    key: key.to_string(),
                    from,
                    to: value,
                },
            );
        }
        true
    }

    pub fn info(&self, key: &str) -> Option<&str> {
        let info = self.object(self.info_object?)?;
        info.properties.get(key).map(String::as_str)
    }

    /// All metadata entries, sorted by key.
    pub fn info_entries(&self) -> BTreeMap<String, String> {
        self.info_object
            .and_then(|id| self.object(id))
            .map(|info| info.properties.clone())
            .unwrap_or_default()
    }

    pub fn has_info_object(&self) -> bool {
        self.info_object.is_some_and(|id| self.object(id).is_some())
    }

    fn write_info(&mut self, info: ObjectId, key: &str, value: Option<String>) -> Option<String> {
        let object = self.objects.get_mut(info)?;
        match value {
            Some(value) => object.properties.insert(key.to_string(), value),
            None => object.properties.remove(key),
        }
    }

    // ========================================================================
    // Undo
    // ========================================================================

    /// Reverts the newest undo entry.
    pub fn undo(&mut self) -> bool {
        let Some(entry) = self.undo.take_undo() else {
            return false;
        };
        for action in entry.actions.iter().rev() {
            self.apply(action, true);
        }
        self.undo.push_undone(entry);
        self.dirty = true;
        true
    }

    /// Replays the newest undone entry.
    pub fn redo(&mut self) -> bool {
        let Some(entry) = self.undo.take_redo() else {
            return false;
        };
        for action in &entry.actions {
            self.apply(action, false);
        }
        self.undo.push_done(entry);
        self.dirty = true;
        true
    }

    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    pub fn undo_name(&self) -> Option<&'static str> {
        self.undo.undo_name()
    }

    pub fn redo_name(&self) -> Option<&'static str> {
        self.undo.redo_name()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    /// Forgets all undo history and marks the patch clean (after loading).
    pub fn clear_history(&mut self) {
        self.undo = UndoStack::new();
        self.dirty = false;
    }

    /// Offset for the next paste of the same clipboard contents. Grows with
    /// every call so repeated pastes do not stack exactly.
    pub fn next_paste_onset(&mut self, step: i32) -> i32 {
        self.paste_onset += step;
        self.paste_onset
    }

    pub fn reset_paste_onset(&mut self) {
        self.paste_onset = 0;
    }

    // ========================================================================
    // DSP ordering
    // ========================================================================

    /// Orders the objects with signal connections so every object comes
    /// after the objects feeding it, using Kahn's algorithm.
    pub fn dsp_order(&self) -> Result<Vec<ObjectId>, DspLoop> {
        let signal: Vec<&Connection> = self
            .connections
            .iter()
            .filter(|connection| {
                self.object(connection.source)
                    .and_then(|object| object.class.outlets.get(connection.outlet))
                    .is_some_and(|kind| *kind == PortKind::Signal)
            })
            .collect();

        let nodes: Vec<ObjectId> = self
            .objects()
            .into_iter()
            .filter(|id| {
                self.object(*id).is_some_and(|object| {
                    object.class.inlets.contains(&PortKind::Signal)
                        || object.class.outlets.contains(&PortKind::Signal)
                })
            })
            .collect();

        let mut in_degree: HashMap<ObjectId, usize> = nodes.iter().map(|id| (*id, 0)).collect();
        for connection in &signal {
            if let Some(degree) = in_degree.get_mut(&connection.sink) {
                *degree += 1;
            }
        }

        // Seed in canonical order for a deterministic schedule
        let mut queue: Vec<ObjectId> = nodes
            .iter()
            .rev()
            .copied()
            .filter(|id| in_degree.get(id) == Some(&0))
            .collect();
        let mut result = Vec::with_capacity(nodes.len());

        while let Some(id) = queue.pop() {
            result.push(id);
            for connection in signal.iter().filter(|connection| connection.source == id) {
                if let Some(degree) = in_degree.get_mut(&connection.sink) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push(connection.sink);
                    }
                }
            }
        }

        if result.len() == nodes.len() {
            Ok(result)
        } else {
            Err(DspLoop {
                unscheduled: nodes.len() - result.len(),
            })
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn record(&mut self, name: &'static str, action: UndoAction) {
        self.undo.record(name, action);
        self.dirty = true;
    }

    fn position(&self, id: ObjectId) -> Option<usize> {
        self.order.iter().position(|other| *other == id)
    }

    fn reindex(&mut self) {
        self.visible.clear();
        let mut index = 0;
        for id in &self.order {
            if let Some(object) = self.objects.get(*id) {
                if object.alive && !object.internal {
                    self.visible.insert(*id, index);
                    index += 1;
                }
            }
        }
    }

    /// Takes an object out of the order, leaving a tombstone. Returns its
    /// former position and the connections it had.
    fn detach(&mut self, id: ObjectId) -> Option<(usize, Vec<Connection>)> {
        let position = self.position(id)?;
        self.order.remove(position);

        let (dropped, kept): (Vec<Connection>, Vec<Connection>) = self
            .connections
            .iter()
            .partition(|connection| connection.touches(id));
        self.connections = kept;
        self.selected_connections.retain(|connection| !connection.touches(id));

        if let Some(object) = self.objects.get_mut(id) {
            object.alive = false;
            object.selected = false;
        }
        self.reindex();
        Some((position, dropped))
    }

    /// Brings a tombstoned object back at `position` with its connections.
    fn revive(&mut self, id: ObjectId, position: usize, connections: &[Connection]) {
        let Some(object) = self.objects.get_mut(id) else {
            return;
        };
        if object.alive {
            return;
        }
        object.alive = true;

        let position = position.min(self.order.len());
        self.order.insert(position, id);
        self.reindex();

        for connection in connections {
            if self.validate(connection).is_ok() {
                self.connections.push(*connection);
            }
        }
    }

    fn raw_disconnect(&mut self, connection: &Connection) -> bool {
        self.selected_connections.retain(|other| other != connection);
        let before = self.connections.len();
        self.connections.retain(|other| other != connection);
        self.connections.len() < before
    }

    fn shift(&mut self, objects: &[ObjectId], dx: i32, dy: i32) {
        for id in objects {
            if let Some(object) = self.objects.get_mut(*id) {
                object.x += dx;
                object.y += dy;
            }
        }
    }

    fn arrange(&mut self, id: ObjectId, to: usize) {
        if let Some(from) = self.position(id) {
            self.order.remove(from);
            let to = to.min(self.order.len());
            self.order.insert(to, id);
            self.reindex();
        }
    }

    /// Swaps in new text and drops connections that fall out of range.
    /// A subpatch box keeps its ports, which follow the subpatch contents.
    fn apply_text(&mut self, id: ObjectId, text: &(ObjectSpec, ObjectClass)) -> Vec<Connection> {
        let Some(object) = self.objects.get_mut(id) else {
            return Vec::new();
        };
        let ports = object
            .subpatch
            .map(|_| (object.class.inlets.clone(), object.class.outlets.clone()));
        object.spec = text.0.clone();
        object.class = text.1.clone();
        if let Some((inlets, outlets)) = ports {
            object.class.inlets = inlets;
            object.class.outlets = outlets;
        }
        let (outlets, inlets) = (object.class.outlets.len(), object.class.inlets.len());

        let (dropped, kept): (Vec<Connection>, Vec<Connection>) =
            self.connections.iter().partition(|connection| {
                (connection.source == id && connection.outlet >= outlets)
                    || (connection.sink == id && connection.inlet >= inlets)
            });
        self.connections = kept;
        dropped
    }

    /// Applies an action backwards (`reverse`) or forwards, without
    /// recording anything.
    fn apply(&mut self, action: &UndoAction, reverse: bool) {
        match action {
            UndoAction::Create { object, position } => {
                if reverse {
                    self.detach(*object);
                } else {
                    self.revive(*object, *position, &[]);
                }
            }
            UndoAction::Remove {
                object,
                position,
                connections,
            } => {
                if reverse {
                    self.revive(*object, *position, connections);
                } else {
                    self.detach(*object);
                }
            }
            UndoAction::Connect(connection) | UndoAction::Disconnect(connection) => {
                let connect = matches!(action, UndoAction::Connect(_)) != reverse;
                if connect {
                    if self.validate(connection).is_ok() {
                        self.connections.push(*connection);
                    }
                } else {
                    self.raw_disconnect(connection);
                }
            }
            UndoAction::Move { objects, dx, dy } => {
                let sign = if reverse { -1 } else { 1 };
                self.shift(objects, dx * sign, dy * sign);
            }
            UndoAction::Retext {
                object,
                from,
                to,
                dropped,
            } => {
                if reverse {
                    self.apply_text(*object, from);
                    for connection in dropped {
                        if self.validate(connection).is_ok() {
                            self.connections.push(*connection);
                        }
                    }
                } else {
                    self.apply_text(*object, to);
                }
            }
            UndoAction::Arrange { object, from, to } => {
                self.arrange(*object, if reverse { *from } else { *to });
            }
            UndoAction::SetInfo { key, from, to } => {
                if let Some(info) = self.info_object {
                    let value = if reverse { from.clone() } else { to.clone() };
                    self.write_info(info, key, value);
                }
            }
        }
    }

    /// Entries recorded so far, newest last. Test helper.
    #[cfg(test)]
    fn undo_entry_names(&mut self) -> Vec<&'static str> {
        let mut names = Vec::new();
        let mut taken: Vec<super::undo::UndoEntry> = Vec::new();
        while let Some(entry) = self.undo.take_undo() {
            names.push(entry.name);
            taken.push(entry);
        }
        for entry in taken.into_iter().rev() {
            self.undo.push_done(entry);
        }
        names.reverse();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::object_class::ObjectCatalog;
    use pretty_assertions::assert_eq;

    fn add(graph: &mut PatchGraph, text: &str, x: i32, y: i32) -> ObjectId {
        let spec = ObjectSpec::parse(text);
        let class = ObjectCatalog::with_builtins().resolve(&spec);
        graph.add_object(EngineObject::new(spec, class, x, y))
    }

    fn add_info(graph: &mut PatchGraph) -> ObjectId {
        let spec = ObjectSpec::parse(INFO_CLASS);
        let class = ObjectCatalog::new().resolve(&spec);
        graph.add_object(EngineObject::new(spec, class, 0, 0))
    }

    #[test]
    fn test_graph_creation() {
        let graph = PatchGraph::new("main");
        assert!(graph.is_empty());
        assert!(graph.connections().is_empty());
        assert!(!graph.can_undo());
        assert!(!graph.is_dirty());
    }

    #[test]
    fn test_add_objects_in_order() {
        let mut graph = PatchGraph::new("main");
        let a = add(&mut graph, "osc~ 440", 10, 10);
        let b = add(&mut graph, "dac~", 10, 80);

        assert_eq!(graph.objects(), vec![a, b]);
        assert_eq!(graph.index_of(a), Some(0));
        assert_eq!(graph.index_of(b), Some(1));
        assert!(graph.is_dirty());
    }

    #[test]
    fn test_info_object_is_hidden() {
        let mut graph = PatchGraph::new("main");
        let a = add(&mut graph, "metro 100", 0, 0);
        let info = add_info(&mut graph);
        let b = add(&mut graph, "print", 0, 50);

        assert_eq!(graph.objects(), vec![a, b]);
        assert_eq!(graph.index_of(b), Some(1));
        assert_eq!(graph.index_of(info), None);
        assert!(graph.object(info).is_some());
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_connect_and_validate() {
        let mut graph = PatchGraph::new("main");
        let osc = add(&mut graph, "osc~ 440", 0, 0);
        let dac = add(&mut graph, "dac~", 0, 60);
        let print = add(&mut graph, "print", 100, 60);

        assert!(graph.connect(Connection::new(osc, 0, dac, 0)).is_ok());
        assert_eq!(
            graph.connect(Connection::new(osc, 0, dac, 0)),
            Err(ConnectionError::DuplicateConnection)
        );
        assert!(matches!(
            graph.connect(Connection::new(osc, 0, print, 0)),
            Err(ConnectionError::IncompatibleTypes { .. })
        ));
        assert!(matches!(
            graph.connect(Connection::new(osc, 3, dac, 0)),
            Err(ConnectionError::OutletOutOfRange { .. })
        ));
        assert_eq!(
            graph.connect(Connection::new(osc, 0, osc, 0)),
            Err(ConnectionError::SelfConnection)
        );
        assert_eq!(graph.connections().len(), 1);
    }

    #[test]
    fn test_connection_key_uses_canonical_indices() {
        let mut graph = PatchGraph::new("main");
        add_info(&mut graph);
        let a = add(&mut graph, "metro 100", 0, 0);
        let b = add(&mut graph, "print", 0, 50);
        let connection = Connection::new(a, 0, b, 0);
        graph.connect(connection).unwrap();

        assert_eq!(graph.connection_key(&connection).as_deref(), Some("0_0_1_0"));
    }

    #[test]
    fn test_remove_object_and_undo() {
        let mut graph = PatchGraph::new("main");
        let a = add(&mut graph, "metro 100", 0, 0);
        let b = add(&mut graph, "print", 0, 50);
        let c = add(&mut graph, "loadbang", 0, 100);
        graph.connect(Connection::new(a, 0, b, 0)).unwrap();

        assert!(graph.remove_object(a));
        assert_eq!(graph.objects(), vec![b, c]);
        assert!(graph.connections().is_empty());
        assert!(graph.object(a).is_none());
        assert!(!graph.remove_object(a));

        assert!(graph.undo());
        assert_eq!(graph.objects(), vec![a, b, c]);
        assert_eq!(graph.connections(), &[Connection::new(a, 0, b, 0)]);

        assert!(graph.redo());
        assert_eq!(graph.objects(), vec![b, c]);
    }

    #[test]
    fn test_remove_selection_is_one_step() {
        let mut graph = PatchGraph::new("main");
        let a = add(&mut graph, "metro 100", 0, 0);
        let b = add(&mut graph, "print", 0, 50);
        let c = add(&mut graph, "loadbang", 0, 100);
        graph.select(a);
        graph.select(c);

        graph.remove_selection();
        graph.finish_remove();
        assert_eq!(graph.objects(), vec![b]);

        assert!(graph.undo());
        assert_eq!(graph.objects(), vec![a, b, c]);
    }

    #[test]
    fn test_selected_connections_are_removed() {
        let mut graph = PatchGraph::new("main");
        let a = add(&mut graph, "metro 100", 0, 0);
        let b = add(&mut graph, "print", 0, 50);
        let c = add(&mut graph, "print", 50, 50);
        let kept = Connection::new(a, 0, c, 0);
        let removed = Connection::new(a, 0, b, 0);
        graph.connect(kept).unwrap();
        graph.connect(removed).unwrap();

        // Only existing connections can be selected
        assert!(!graph.select_connection(Connection::new(b, 0, c, 0)));
        assert!(graph.select_connection(removed));
        assert_eq!(graph.selected_connections(), &[removed]);

        graph.remove_selection();
        graph.finish_remove();
        assert_eq!(graph.connections(), &[kept]);
        assert!(graph.selected_connections().is_empty());

        assert!(graph.undo());
        assert!(graph.is_connected(&removed));
    }

    #[test]
    fn test_move_objects_clears_selection() {
        let mut graph = PatchGraph::new("main");
        let a = add(&mut graph, "metro 100", 10, 10);
        let b = add(&mut graph, "print", 10, 50);
        graph.select(b);

        graph.move_objects(&[a], 25, -5);
        assert_eq!(graph.object(a).map(|o| (o.x, o.y)), Some((35, 5)));
        assert_eq!(graph.object(b).map(|o| (o.x, o.y)), Some((10, 50)));
        assert!(graph.selected().is_empty());

        graph.undo();
        assert_eq!(graph.object(a).map(|o| (o.x, o.y)), Some((10, 10)));
    }

    #[test]
    fn test_retext_drops_out_of_range_connections() {
        let mut graph = PatchGraph::new("main");
        let t = add(&mut graph, "t b b b", 0, 0);
        let p = add(&mut graph, "print", 0, 50);
        graph.connect(Connection::new(t, 2, p, 0)).unwrap();
        graph.connect(Connection::new(t, 0, p, 0)).unwrap();

        let spec = ObjectSpec::parse("t b b");
        let class = ObjectCatalog::with_builtins().resolve(&spec);
        assert!(graph.retext(t, spec, class));
        assert_eq!(graph.connections(), &[Connection::new(t, 0, p, 0)]);
        assert_eq!(graph.index_of(t), Some(0));

        graph.undo();
        assert_eq!(graph.object(t).map(|o| o.text()).as_deref(), Some("t b b b"));
        assert_eq!(graph.connections().len(), 2);
    }

    #[test]
    fn test_to_front() {
        let mut graph = PatchGraph::new("main");
        let a = add(&mut graph, "metro 100", 0, 0);
        let b = add(&mut graph, "print", 0, 50);

        assert!(graph.to_front(a));
        assert_eq!(graph.objects(), vec![b, a]);
        graph.undo();
        assert_eq!(graph.objects(), vec![a, b]);
    }

    #[test]
    fn test_info_roundtrip_and_undo() {
        let mut graph = PatchGraph::new("main");
        assert!(!graph.set_info("0_0_1_0/Path", Some("x".into())));

        add_info(&mut graph);
        assert!(graph.set_info("0_0_1_0/Path", Some("1,2,3,4".into())));
        assert_eq!(graph.info("0_0_1_0/Path"), Some("1,2,3,4"));

        graph.undo();
        assert_eq!(graph.info("0_0_1_0/Path"), None);
    }

    #[test]
    fn test_undo_names() {
        let mut graph = PatchGraph::new("main");
        let a = add(&mut graph, "metro 100", 0, 0);
        graph.select(a);
        graph.move_selection(5, 5);
        assert_eq!(graph.undo_entry_names(), vec!["create", "motion"]);
        assert_eq!(graph.undo_name(), Some("motion"));
    }

    #[test]
    fn test_dsp_order_and_loop() {
        let mut graph = PatchGraph::new("main");
        let dac = add(&mut graph, "dac~", 0, 100);
        let osc = add(&mut graph, "osc~ 440", 0, 0);
        let mul = add(&mut graph, "*~", 0, 50);
        graph.connect(Connection::new(osc, 0, mul, 0)).unwrap();
        graph.connect(Connection::new(mul, 0, dac, 0)).unwrap();

        assert_eq!(graph.dsp_order(), Ok(vec![osc, mul, dac]));

        graph.connect(Connection::new(mul, 0, mul, 1)).unwrap_err();
        let add_obj = add(&mut graph, "+~", 100, 50);
        graph.connect(Connection::new(mul, 0, add_obj, 0)).unwrap();
        graph.connect(Connection::new(add_obj, 0, mul, 1)).unwrap();
        assert_eq!(graph.dsp_order(), Err(DspLoop { unscheduled: 3 }));
    }

    #[test]
    fn test_object_sizes() {
        let mut graph = PatchGraph::new("main");
        let tgl = add(&mut graph, "tgl 25", 0, 0);
        let radio = add(&mut graph, "hradio 20 1 0 4", 0, 0);
        let text = add(&mut graph, "metro 100", 0, 0);

        assert_eq!(graph.object(tgl).map(|o| o.size()), Some((25, 25)));
        assert_eq!(graph.object(radio).map(|o| o.size()), Some((80, 20)));
        assert_eq!(
            graph.object(text).map(|o| o.size()),
            Some((9 * CHAR_WIDTH + TEXT_PADDING, TEXT_HEIGHT))
        );
    }

    #[test]
    fn test_bounds() {
        let mut graph = PatchGraph::new("main");
        assert_eq!(graph.bounds(), None);
        add(&mut graph, "tgl 20", 10, 10);
        add(&mut graph, "tgl 20", 100, 200);
        assert_eq!(graph.bounds(), Some((10, 10, 110, 210)));
    }
}
