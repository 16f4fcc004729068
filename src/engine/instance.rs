//! The engine instance: every open patch plus the class catalog.
//!
//! All engine state lives here and is only reached from the engine thread,
//! through mutations queued on the [`EngineBridge`](super::EngineBridge).
//! Operations that can change a subpatch's inlets or outlets refresh the
//! owning object's ports in the parent patch before returning.

use std::collections::HashMap;

use slotmap::{new_key_type, SlotMap};
use thiserror::Error;

use super::commands::EngineEvent;
use super::object_class::{GuiKind, ObjectCatalog, PortKind};
use super::object_spec::{ObjectSpec, TypeSymbol};
use super::patch_graph::{Connection, EngineObject, ObjectId, PatchGraph, INFO_CLASS};
use super::validation::ConnectionError;
use crate::persistence::{ConnectionRecord, FragmentError, ObjectRecord, PatchFragment};

new_key_type! {
    /// Identity of an open patch (top-level or subpatch).
    pub struct PatchId;
}

/// Key suffix under which a connection's routing path is stored.
pub const PATH_KEY: &str = "Path";

/// Key codes with an engine-side meaning.
pub const KEY_BACKSPACE: u32 = 8;
pub const KEY_ESCAPE: u32 = 27;
pub const KEY_DELETE: u32 = 127;

/// Why an object could not be created or retyped.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CreateError {
    #[error("empty object text")]
    Empty,
    #[error("'{0}' is reserved")]
    Reserved(String),
    #[error("patch no longer exists")]
    MissingPatch,
    #[error("object no longer exists")]
    MissingObject,
}

/// Widget state reported with an object.
#[derive(Clone, Debug, PartialEq)]
pub struct GuiState {
    pub kind: GuiKind,
    pub value: f32,
    /// Number of buttons, for radio widgets.
    pub radio_count: usize,
    pub label: Option<String>,
}

/// Everything the canvas needs to know about one object.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectInfo {
    pub id: ObjectId,
    /// Canonical index.
    pub index: usize,
    pub text: String,
    pub type_symbol: TypeSymbol,
    pub class_name: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub inlets: Vec<PortKind>,
    pub outlets: Vec<PortKind>,
    pub gui: Option<GuiState>,
    pub selected: bool,
    pub subpatch: Option<PatchId>,
    pub broken: bool,
}

/// A connection plus its canonical key and stored routing path.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionInfo {
    pub connection: Connection,
    pub key: String,
    pub path: Option<String>,
}

/// A consistent picture of one patch, taken in a single engine step.
#[derive(Clone, Debug, PartialEq)]
pub struct PatchSnapshot {
    pub title: String,
    pub objects: Vec<ObjectInfo>,
    pub connections: Vec<ConnectionInfo>,
    pub dirty: bool,
    pub can_undo: bool,
    pub can_redo: bool,
    /// Names of the steps undo and redo would apply.
    pub undo_name: Option<&'static str>,
    pub redo_name: Option<&'static str>,
}

/// The engine: patches, catalog, and pending events.
pub struct Instance {
    patches: SlotMap<PatchId, PatchGraph>,
    /// Creation order of live patches.
    order: Vec<PatchId>,
    catalog: ObjectCatalog,
    events: Vec<EngineEvent>,
    dsp_running: bool,
}

impl Instance {
    /// Creates an instance with the built-in classes.
    pub fn new() -> Self {
        Self::with_catalog(ObjectCatalog::with_builtins())
    }

    pub fn with_catalog(catalog: ObjectCatalog) -> Self {
        Self {
            patches: SlotMap::with_key(),
            order: Vec::new(),
            catalog,
            events: Vec::new(),
            dsp_running: false,
        }
    }

    pub fn catalog(&self) -> &ObjectCatalog {
        &self.catalog
    }

    // ========================================================================
    // Patches
    // ========================================================================

    /// Opens a new empty top-level patch.
    pub fn new_patch(&mut self, name: &str) -> PatchId {
        let id = self.patches.insert(PatchGraph::new(name));
        self.order.push(id);
        id
    }

    /// Closes a patch together with all of its subpatches.
    pub fn close_patch(&mut self, id: PatchId) -> bool {
        let Some(patch) = self.patches.remove(id) else {
            return false;
        };
        self.order.retain(|other| *other != id);

        let children: Vec<PatchId> = self
            .patches
            .iter()
            .filter(|(_, child)| child.parent().is_some_and(|(parent, _)| parent == id))
            .map(|(child, _)| child)
            .collect();
        for child in children {
            self.close_patch(child);
        }
        log::debug!("closed patch '{}'", patch.name());
        true
    }

    pub fn patch(&self, id: PatchId) -> Option<&PatchGraph> {
        self.patches.get(id)
    }

    pub fn patch_mut(&mut self, id: PatchId) -> Option<&mut PatchGraph> {
        self.patches.get_mut(id)
    }

    /// Live patches in creation order.
    pub fn patch_ids(&self) -> Vec<PatchId> {
        self.order.clone()
    }

    pub fn patch_count(&self) -> usize {
        self.order.len()
    }

    // ========================================================================
    // Events
    // ========================================================================

    pub fn emit(&mut self, event: EngineEvent) {
        self.events.push(event);
    }

    /// Publishes a console line.
    pub fn print(&mut self, line: impl Into<String>) {
        self.emit(EngineEvent::Print(line.into()));
    }

    pub fn take_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    // ========================================================================
    // Objects
    // ========================================================================

    /// Creates an object from its text at patch position `(x, y)`.
    ///
    /// Unknown classes still produce an object (without ports) so that the
    /// text is kept; a console line reports the failure.
    pub fn create_object(
        &mut self,
        patch: PatchId,
        text: &str,
        x: i32,
        y: i32,
    ) -> Result<ObjectId, CreateError> {
        let spec = ObjectSpec::parse(text);
        self.create_from_spec(patch, spec, x, y)
    }

    fn create_from_spec(
        &mut self,
        patch: PatchId,
        spec: ObjectSpec,
        x: i32,
        y: i32,
    ) -> Result<ObjectId, CreateError> {
        check_spec(&spec)?;
        if !self.patches.contains_key(patch) {
            return Err(CreateError::MissingPatch);
        }

        let class = self.catalog.resolve(&spec);
        if class.broken {
            self.print(format!("{} ... couldn't create", spec.to_text()));
        }

        let subpatch_name = class.is_subpatch().then(|| subpatch_name(&spec));
        let object = EngineObject::new(spec, class, x, y);

        let graph = self.patches.get_mut(patch).ok_or(CreateError::MissingPatch)?;
        let id = graph.add_object(object);

        if let Some(name) = subpatch_name {
            let child = self
                .patches
                .insert(PatchGraph::child(&name, patch, id));
            self.order.push(child);
            if let Some(object) = self.patches.get_mut(patch).and_then(|g| g.object_mut(id)) {
                object.subpatch = Some(child);
            }
        }

        self.refresh_parent_ports(patch);
        Ok(id)
    }

    /// Changes an object's text.
    ///
    /// Objects and comments are retyped in place and keep their identity.
    /// A subpatch renamed to a subpatch of the same kind also stays in
    /// place, keeping its contents; only the child patch is renamed.
    /// Messages and atoms (on either side of the change) and changes into or
    /// out of a subpatch are recreated at the same position with their
    /// connections restored; the returned id is the new object's.
    pub fn rename_object(
        &mut self,
        patch: PatchId,
        id: ObjectId,
        text: &str,
    ) -> Result<ObjectId, CreateError> {
        let spec = ObjectSpec::parse(text);
        check_spec(&spec)?;

        let graph = self.patches.get(patch).ok_or(CreateError::MissingPatch)?;
        let object = graph.object(id).ok_or(CreateError::MissingObject)?;
        if object.text() == spec.to_text() {
            return Ok(id);
        }

        let class = self.catalog.resolve(&spec);
        let renamable = spec.type_symbol.is_renamable() && object.spec.type_symbol.is_renamable();
        let child = object.subpatch;
        let same_subpatch_kind = class.is_subpatch()
            && object.class.is_subpatch()
            && class.gui == object.class.gui
            && child.is_some();
        let in_place = renamable
            && (same_subpatch_kind || (!class.is_subpatch() && !object.class.is_subpatch()));

        if !in_place {
            return self.recreate_object(patch, id, spec);
        }

        if class.broken {
            self.print(format!("{} ... couldn't create", spec.to_text()));
        }
        let name = same_subpatch_kind.then(|| subpatch_name(&spec));
        let graph = self.patches.get_mut(patch).ok_or(CreateError::MissingPatch)?;
        graph.retext(id, spec, class);

        if let (Some(child), Some(name)) = (child, name) {
            if let Some(child) = self.patches.get_mut(child) {
                child.set_name(&name);
            }
        }
        self.refresh_parent_ports(patch);
        Ok(id)
    }

    fn recreate_object(
        &mut self,
        patch: PatchId,
        id: ObjectId,
        spec: ObjectSpec,
    ) -> Result<ObjectId, CreateError> {
        let graph = self.patches.get_mut(patch).ok_or(CreateError::MissingPatch)?;
        let (x, y) = graph
            .object(id)
            .map(|object| (object.x, object.y))
            .ok_or(CreateError::MissingObject)?;
        let stowed: Vec<Connection> = graph
            .connections()
            .iter()
            .filter(|connection| connection.touches(id))
            .copied()
            .collect();

        let opened = graph.begin_undo_group("typing");
        graph.remove_object(id);

        let created = self.create_from_spec(patch, spec, x, y);
        if let (Ok(new_id), Some(graph)) = (&created, self.patches.get_mut(patch)) {
            for connection in stowed {
                let restored = Connection {
                    source: if connection.source == id { *new_id } else { connection.source },
                    sink: if connection.sink == id { *new_id } else { connection.sink },
                    ..connection
                };
                // Connections that no longer fit are left out
                let _ = graph.connect(restored);
            }
        }

        if opened {
            if let Some(graph) = self.patches.get_mut(patch) {
                graph.end_undo_group();
            }
        }
        created
    }

    /// Removes one object and its connections.
    pub fn remove_object(&mut self, patch: PatchId, id: ObjectId) -> bool {
        let removed = self
            .patches
            .get_mut(patch)
            .is_some_and(|graph| graph.remove_object(id));
        if removed {
            self.refresh_parent_ports(patch);
        }
        removed
    }

    /// Removes the engine selection; see [`PatchGraph::remove_selection`].
    pub fn remove_selection(&mut self, patch: PatchId) {
        if let Some(graph) = self.patches.get_mut(patch) {
            graph.remove_selection();
        }
        self.refresh_parent_ports(patch);
    }

    pub fn finish_remove(&mut self, patch: PatchId) {
        if let Some(graph) = self.patches.get_mut(patch) {
            graph.finish_remove();
        }
    }

    /// Engine-side key handling. Backspace and delete remove the engine
    /// selection (objects and connections) as one undo step, escape clears
    /// it. Returns whether the key changed anything.
    pub fn key_press(&mut self, patch: PatchId, key: u32, down: bool) -> bool {
        if !down {
            return false;
        }
        let Some(graph) = self.patches.get_mut(patch) else {
            return false;
        };
        let has_selection =
            !graph.selected().is_empty() || !graph.selected_connections().is_empty();

        match key {
            KEY_BACKSPACE | KEY_DELETE if has_selection => {
                graph.remove_selection();
                graph.finish_remove();
                self.refresh_parent_ports(patch);
                true
            }
            KEY_ESCAPE if has_selection => {
                graph.deselect_all();
                true
            }
            _ => false,
        }
    }

    /// Moves objects by a delta as one undo step.
    pub fn move_objects(&mut self, patch: PatchId, objects: &[ObjectId], dx: i32, dy: i32) {
        if let Some(graph) = self.patches.get_mut(patch) {
            graph.move_objects(objects, dx, dy);
        }
        // Inlet order follows x position
        self.refresh_parent_ports(patch);
    }

    /// Connects two objects, reporting failures on the console.
    pub fn connect(
        &mut self,
        patch: PatchId,
        connection: Connection,
    ) -> Result<(), ConnectionError> {
        let result = match self.patches.get_mut(patch) {
            Some(graph) => graph.connect(connection),
            None => Err(ConnectionError::MissingObject),
        };
        if let Err(error) = &result {
            log::debug!("connection rejected: {}", error);
        }
        result
    }

    pub fn disconnect(&mut self, patch: PatchId, connection: &Connection) -> bool {
        self.patches
            .get_mut(patch)
            .is_some_and(|graph| graph.disconnect(connection))
    }

    /// Which of the given connections currently exist.
    pub fn are_connected(&self, patch: PatchId, connections: &[Connection]) -> Vec<bool> {
        match self.patches.get(patch) {
            Some(graph) => connections.iter().map(|c| graph.is_connected(c)).collect(),
            None => vec![false; connections.len()],
        }
    }

    pub fn undo(&mut self, patch: PatchId) -> bool {
        let undone = self.patches.get_mut(patch).is_some_and(|graph| {
            graph.deselect_all();
            graph.undo()
        });
        self.refresh_parent_ports(patch);
        self.refresh_child_names(patch);
        undone
    }

    pub fn redo(&mut self, patch: PatchId) -> bool {
        let redone = self.patches.get_mut(patch).is_some_and(|graph| {
            graph.deselect_all();
            graph.redo()
        });
        self.refresh_parent_ports(patch);
        self.refresh_child_names(patch);
        redone
    }

    /// Stores patch metadata, creating the hidden info object on first use.
    pub fn set_info(&mut self, patch: PatchId, key: &str, value: Option<String>) -> bool {
        let Some(graph) = self.patches.get_mut(patch) else {
            return false;
        };
        if !graph.has_info_object() {
            let spec = ObjectSpec::parse(INFO_CLASS);
            let class = self.catalog.resolve(&spec);
            graph.add_object(EngineObject::new(spec, class, 0, 0));
        }
        graph.set_info(key, value)
    }

    pub fn info(&self, patch: PatchId, key: &str) -> Option<String> {
        self.patches.get(patch)?.info(key).map(str::to_string)
    }

    /// Sets a widget value (toggle state, slider position...).
    pub fn set_value(&mut self, patch: PatchId, id: ObjectId, value: f32) -> bool {
        self.patches
            .get_mut(patch)
            .is_some_and(|graph| graph.set_value(id, value))
    }

    /// Name of the help patch for an object's class.
    pub fn help_name(&self, patch: PatchId, id: ObjectId) -> Option<String> {
        let object = self.patches.get(patch)?.object(id)?;
        match object.spec.type_symbol {
            TypeSymbol::Object => self.catalog.help_name(&object.class.name),
            other => other.keyword().map(|keyword| format!("{}-help", keyword)),
        }
    }

    // ========================================================================
    // Clipboard
    // ========================================================================

    /// Serialises the engine selection of a patch.
    pub fn selection_fragment(&self, patch: PatchId) -> PatchFragment {
        let Some(graph) = self.patches.get(patch) else {
            return PatchFragment::new();
        };
        self.fragment_of(graph, &graph.selected())
    }

    /// Serialises a whole patch, metadata and subpatches included.
    pub fn patch_fragment(&self, patch: PatchId) -> PatchFragment {
        let Some(graph) = self.patches.get(patch) else {
            return PatchFragment::new();
        };
        let mut fragment = self.fragment_of(graph, &graph.objects());
        fragment.info = graph.info_entries();
        fragment
    }

    fn fragment_of(&self, graph: &PatchGraph, objects: &[ObjectId]) -> PatchFragment {
        let positions: HashMap<ObjectId, usize> = objects
            .iter()
            .enumerate()
            .map(|(position, id)| (*id, position))
            .collect();

        let mut fragment = PatchFragment::new();
        for id in objects {
            if let Some(object) = graph.object(*id) {
                let mut record = ObjectRecord::new(object.text(), (object.x, object.y));
                if object.class.gui.is_some() && object.value != 0.0 {
                    record.value = Some(object.value);
                }
                record.subpatch = object.subpatch.map(|child| self.patch_fragment(child));
                fragment.objects.push(record);
            }
        }
        for connection in graph.connections() {
            if let (Some(source), Some(sink)) =
                (positions.get(&connection.source), positions.get(&connection.sink))
            {
                fragment.connections.push(ConnectionRecord::new(
                    *source,
                    connection.outlet,
                    *sink,
                    connection.inlet,
                ));
            }
        }
        fragment
    }

    /// Copies the selection and publishes it as a clipboard event.
    pub fn copy(&mut self, patch: PatchId) -> Result<String, FragmentError> {
        let text = self.selection_fragment(patch).to_json()?;
        if let Some(graph) = self.patches.get_mut(patch) {
            graph.reset_paste_onset();
        }
        self.emit(EngineEvent::ClipboardText {
            patch,
            text: text.clone(),
        });
        Ok(text)
    }

    /// Pastes serialised objects. With a position the fragment's top-left
    /// lands there; without one it is offset from its original place by a
    /// step that grows with every paste. The pasted objects end up as the
    /// engine selection.
    pub fn paste(
        &mut self,
        patch: PatchId,
        text: &str,
        at: Option<(i32, i32)>,
        step: i32,
    ) -> Result<Vec<ObjectId>, FragmentError> {
        let fragment = PatchFragment::from_json(text)?;
        let Some(graph) = self.patches.get_mut(patch) else {
            return Ok(Vec::new());
        };

        let offset = match (at, fragment.origin()) {
            (Some((x, y)), Some((ox, oy))) => (x - ox, y - oy),
            _ => {
                let onset = graph.next_paste_onset(step);
                (onset, onset)
            }
        };
        Ok(self.insert_fragment(patch, &fragment, offset, "paste"))
    }

    /// Pastes a copy of the selection offset by `step`.
    pub fn duplicate(&mut self, patch: PatchId, step: i32) -> Vec<ObjectId> {
        let fragment = self.selection_fragment(patch);
        self.insert_fragment(patch, &fragment, (step, step), "duplicate")
    }

    /// Opens a patch from a serialised whole-patch fragment.
    pub fn load_patch(&mut self, name: &str, text: &str) -> Result<PatchId, FragmentError> {
        let fragment = PatchFragment::from_json(text)?;
        let patch = self.new_patch(name);
        self.fill_patch(patch, &fragment);
        Ok(patch)
    }

    /// Loads a whole-patch fragment into an empty patch, which ends up
    /// clean and without history.
    fn fill_patch(&mut self, patch: PatchId, fragment: &PatchFragment) {
        self.insert_fragment(patch, fragment, (0, 0), "load");
        for (key, value) in &fragment.info {
            self.set_info(patch, key, Some(value.clone()));
        }
        if let Some(graph) = self.patches.get_mut(patch) {
            graph.deselect_all();
            graph.clear_history();
        }
    }

    fn insert_fragment(
        &mut self,
        patch: PatchId,
        fragment: &PatchFragment,
        (dx, dy): (i32, i32),
        undo_name: &'static str,
    ) -> Vec<ObjectId> {
        let opened = match self.patches.get_mut(patch) {
            Some(graph) => {
                graph.deselect_all();
                graph.begin_undo_group(undo_name)
            }
            None => return Vec::new(),
        };

        let mut slots: Vec<Option<ObjectId>> = Vec::with_capacity(fragment.objects.len());
        for record in &fragment.objects {
            let (x, y) = record.position;
            match self.create_object(patch, &record.text, x + dx, y + dy) {
                Ok(id) => {
                    if let Some(value) = record.value {
                        self.set_value(patch, id, value);
                    }
                    let child = self
                        .patches
                        .get(patch)
                        .and_then(|graph| graph.object(id))
                        .and_then(|object| object.subpatch);
                    if let (Some(child), Some(contents)) = (child, &record.subpatch) {
                        // Contents first, so the box has its ports before
                        // the fragment's connections are made
                        self.fill_patch(child, contents);
                    }
                    slots.push(Some(id));
                }
                Err(error) => {
                    log::warn!("skipping pasted object '{}': {}", record.text, error);
                    slots.push(None);
                }
            }
        }

        for record in &fragment.connections {
            let endpoints = (
                slots.get(record.source).copied().flatten(),
                slots.get(record.sink).copied().flatten(),
            );
            if let (Some(source), Some(sink)) = endpoints {
                let _ = self.connect(
                    patch,
                    Connection::new(source, record.outlet, sink, record.inlet),
                );
            }
        }

        let created: Vec<ObjectId> = slots.into_iter().flatten().collect();
        if let Some(graph) = self.patches.get_mut(patch) {
            for id in &created {
                graph.select(*id);
            }
            if opened {
                graph.end_undo_group();
            }
        }
        created
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn object_info(&self, patch: PatchId, id: ObjectId) -> Option<ObjectInfo> {
        let graph = self.patches.get(patch)?;
        let object = graph.object(id)?;
        let index = graph.index_of(id)?;
        let (width, height) = object.size();

        let gui = object.class.gui.map(|kind| GuiState {
            kind,
            value: object.value,
            radio_count: object.radio_count(),
            label: object.label(),
        });

        Some(ObjectInfo {
            id,
            index,
            text: object.text(),
            type_symbol: object.spec.type_symbol,
            class_name: object.class.name.clone(),
            x: object.x,
            y: object.y,
            width,
            height,
            inlets: object.class.inlets.clone(),
            outlets: object.class.outlets.clone(),
            gui,
            selected: object.is_selected(),
            subpatch: object.subpatch,
            broken: object.class.broken,
        })
    }

    /// Objects and connections of a patch, read in one step.
    pub fn snapshot(&self, patch: PatchId) -> Option<PatchSnapshot> {
        let graph = self.patches.get(patch)?;
        let objects = graph
            .objects()
            .into_iter()
            .filter_map(|id| self.object_info(patch, id))
            .collect();

        let connections = graph
            .connections()
            .iter()
            .filter_map(|connection| {
                let key = graph.connection_key(connection)?;
                let path = graph
                    .info(&format!("{}/{}", key, PATH_KEY))
                    .map(str::to_string);
                Some(ConnectionInfo {
                    connection: *connection,
                    key,
                    path,
                })
            })
            .collect();

        Some(PatchSnapshot {
            title: graph.name().to_string(),
            objects,
            connections,
            dirty: graph.is_dirty(),
            can_undo: graph.can_undo(),
            can_redo: graph.can_redo(),
            undo_name: graph.undo_name(),
            redo_name: graph.redo_name(),
        })
    }

    // ========================================================================
    // DSP
    // ========================================================================

    /// Switches DSP on or off. Signal loops are reported on the console.
    pub fn set_dsp(&mut self, running: bool) {
        self.dsp_running = running;
        if running {
            let loops: Vec<String> = self
                .order
                .iter()
                .filter_map(|id| self.patches.get(*id))
                .filter_map(|graph| graph.dsp_order().err())
                .map(|error| format!("error: {}", error))
                .collect();
            for line in loops {
                self.print(line);
            }
        }
        self.emit(EngineEvent::DspState(running));
    }

    pub fn is_dsp_running(&self) -> bool {
        self.dsp_running
    }

    // ========================================================================
    // Subpatch ports
    // ========================================================================

    /// Recomputes the ports of the object owning `child` from the child's
    /// inlet and outlet objects, ordered left to right.
    fn refresh_parent_ports(&mut self, child: PatchId) {
        let Some(graph) = self.patches.get(child) else {
            return;
        };
        let Some((parent, owner)) = graph.parent() else {
            return;
        };

        let mut inlets: Vec<(i32, PortKind)> = Vec::new();
        let mut outlets: Vec<(i32, PortKind)> = Vec::new();
        for id in graph.objects() {
            let Some(object) = graph.object(id) else {
                continue;
            };
            match object.class.name.as_str() {
                "inlet" => inlets.push((object.x, PortKind::Control)),
                "inlet~" => inlets.push((object.x, PortKind::Signal)),
                "outlet" => outlets.push((object.x, PortKind::Control)),
                "outlet~" => outlets.push((object.x, PortKind::Signal)),
                _ => {}
            }
        }
        inlets.sort_by_key(|(x, _)| *x);
        outlets.sort_by_key(|(x, _)| *x);

        let (inlet_count, outlet_count) = (inlets.len(), outlets.len());
        let Some(parent_graph) = self.patches.get_mut(parent) else {
            return;
        };
        if let Some(object) = parent_graph.object_mut(owner) {
            object.class.inlets = inlets.into_iter().map(|(_, kind)| kind).collect();
            object.class.outlets = outlets.into_iter().map(|(_, kind)| kind).collect();
        }

        // Connections to ports that went away
        let stale: Vec<Connection> = parent_graph
            .connections()
            .iter()
            .filter(|connection| {
                (connection.sink == owner && connection.inlet >= inlet_count)
                    || (connection.source == owner && connection.outlet >= outlet_count)
            })
            .copied()
            .collect();
        if !stale.is_empty() {
            let opened = parent_graph.begin_undo_group("disconnect");
            for connection in &stale {
                parent_graph.disconnect(connection);
            }
            if opened {
                parent_graph.end_undo_group();
            }
        }
        self.refresh_parent_ports(parent);
    }

    /// Names every child patch of `patch` after its box text.
    fn refresh_child_names(&mut self, patch: PatchId) {
        let Some(graph) = self.patches.get(patch) else {
            return;
        };
        let names: Vec<(PatchId, String)> = graph
            .objects()
            .into_iter()
            .filter_map(|id| graph.object(id))
            .filter_map(|object| Some((object.subpatch?, subpatch_name(&object.spec))))
            .collect();
        for (child, name) in names {
            if let Some(child) = self.patches.get_mut(child) {
                child.set_name(&name);
            }
        }
    }
}

impl Default for Instance {
    fn default() -> Self {
        Self::new()
    }
}

fn check_spec(spec: &ObjectSpec) -> Result<(), CreateError> {
    if spec.is_empty() {
        return Err(CreateError::Empty);
    }
    if spec.type_symbol == TypeSymbol::Object && spec.class_name().as_deref() == Some(INFO_CLASS) {
        return Err(CreateError::Reserved(INFO_CLASS.to_string()));
    }
    Ok(())
}

fn subpatch_name(spec: &ObjectSpec) -> String {
    spec.arguments()
        .first()
        .map(|atom| atom.to_string())
        .unwrap_or_else(|| spec.class_name().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn texts(instance: &Instance, patch: PatchId) -> Vec<String> {
        instance
            .snapshot(patch)
            .map(|snapshot| snapshot.objects.into_iter().map(|o| o.text).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_create_and_snapshot() {
        let mut instance = Instance::new();
        let patch = instance.new_patch("main");
        let osc = instance.create_object(patch, "osc~ 440", 10, 20).unwrap();
        let dac = instance.create_object(patch, "dac~", 10, 80).unwrap();
        instance.connect(patch, Connection::new(osc, 0, dac, 0)).unwrap();

        let snapshot = instance.snapshot(patch).unwrap();
        assert_eq!(snapshot.title, "main");
        assert_eq!(snapshot.objects.len(), 2);
        assert_eq!(snapshot.objects[0].text, "osc~ 440");
        assert_eq!(snapshot.objects[0].index, 0);
        assert_eq!((snapshot.objects[0].x, snapshot.objects[0].y), (10, 20));
        assert_eq!(snapshot.connections.len(), 1);
        assert_eq!(snapshot.connections[0].key, "0_0_1_0");
        assert!(snapshot.dirty);
    }

    #[test]
    fn test_rejected_creations() {
        let mut instance = Instance::new();
        let patch = instance.new_patch("main");
        assert_eq!(instance.create_object(patch, "  ", 0, 0), Err(CreateError::Empty));
        assert_eq!(
            instance.create_object(patch, "__info", 0, 0),
            Err(CreateError::Reserved("__info".into()))
        );
        assert!(texts(&instance, patch).is_empty());
    }

    #[test]
    fn test_unknown_class_prints() {
        let mut instance = Instance::new();
        let patch = instance.new_patch("main");
        let id = instance.create_object(patch, "bogus 1", 0, 0).unwrap();

        let info = instance.object_info(patch, id).unwrap();
        assert!(info.broken);
        assert!(instance
            .take_events()
            .contains(&EngineEvent::Print("bogus 1 ... couldn't create".into())));
    }

    #[test]
    fn test_rename_in_place_keeps_identity() {
        let mut instance = Instance::new();
        let patch = instance.new_patch("main");
        let metro = instance.create_object(patch, "metro 100", 0, 0).unwrap();
        let print = instance.create_object(patch, "print", 0, 50).unwrap();
        instance.connect(patch, Connection::new(metro, 0, print, 0)).unwrap();

        let renamed = instance.rename_object(patch, metro, "metro 250").unwrap();
        assert_eq!(renamed, metro);
        assert_eq!(texts(&instance, patch), vec!["metro 250", "print"]);
        assert_eq!(instance.snapshot(patch).unwrap().connections.len(), 1);
    }

    #[test]
    fn test_rename_message_recreates_with_connections() {
        let mut instance = Instance::new();
        let patch = instance.new_patch("main");
        let msg = instance.create_object(patch, "msg 1", 30, 40).unwrap();
        let print = instance.create_object(patch, "print", 30, 90).unwrap();
        instance.connect(patch, Connection::new(msg, 0, print, 0)).unwrap();

        let renamed = instance.rename_object(patch, msg, "msg 2").unwrap();
        assert_ne!(renamed, msg);

        let snapshot = instance.snapshot(patch).unwrap();
        assert_eq!(texts(&instance, patch), vec!["print", "msg 2"]);
        let info = instance.object_info(patch, renamed).unwrap();
        assert_eq!((info.x, info.y), (30, 40));
        assert_eq!(
            snapshot.connections[0].connection,
            Connection::new(renamed, 0, print, 0)
        );

        // The whole recreate undoes as one step
        assert!(instance.undo(patch));
        assert_eq!(texts(&instance, patch), vec!["msg 1", "print"]);
        assert_eq!(instance.snapshot(patch).unwrap().connections.len(), 1);
    }

    #[test]
    fn test_subpatch_ports_follow_children() {
        let mut instance = Instance::new();
        let patch = instance.new_patch("main");
        let sub = instance.create_object(patch, "pd voice", 0, 0).unwrap();
        let child = instance.object_info(patch, sub).unwrap().subpatch.unwrap();
        assert_eq!(instance.patch(child).map(|p| p.name()), Some("voice"));

        instance.create_object(child, "outlet~", 50, 100).unwrap();
        instance.create_object(child, "inlet", 100, 0).unwrap();
        instance.create_object(child, "inlet~", 10, 0).unwrap();

        let info = instance.object_info(patch, sub).unwrap();
        assert_eq!(info.inlets, vec![PortKind::Signal, PortKind::Control]);
        assert_eq!(info.outlets, vec![PortKind::Signal]);

        assert!(instance.close_patch(patch));
        assert!(instance.patch(child).is_none());
        assert_eq!(instance.patch_count(), 0);
    }

    /// `f` feeding a `pd voice` whose child holds `osc~ 440` and an `inlet`.
    fn voice(instance: &mut Instance, patch: PatchId) -> (ObjectId, ObjectId, PatchId) {
        let f = instance.create_object(patch, "f", 0, 0).unwrap();
        let sub = instance.create_object(patch, "pd voice", 0, 60).unwrap();
        let child = instance.object_info(patch, sub).unwrap().subpatch.unwrap();
        instance.create_object(child, "osc~ 440", 0, 60).unwrap();
        instance.create_object(child, "inlet", 0, 0).unwrap();
        instance.connect(patch, Connection::new(f, 0, sub, 0)).unwrap();
        (f, sub, child)
    }

    #[test]
    fn test_rename_subpatch_keeps_contents() {
        let mut instance = Instance::new();
        let patch = instance.new_patch("main");
        let (_, sub, child) = voice(&mut instance, patch);

        let renamed = instance.rename_object(patch, sub, "pd lead").unwrap();
        assert_eq!(renamed, sub);

        let info = instance.object_info(patch, sub).unwrap();
        assert_eq!(info.subpatch, Some(child));
        assert_eq!(info.inlets, vec![PortKind::Control]);
        assert_eq!(instance.patch(child).map(|p| p.len()), Some(2));
        assert_eq!(instance.patch(child).map(|p| p.name()), Some("lead"));
        assert_eq!(instance.snapshot(patch).unwrap().connections.len(), 1);

        instance.undo(patch);
        assert_eq!(texts(&instance, patch), vec!["f", "pd voice"]);
        assert_eq!(instance.patch(child).map(|p| p.name()), Some("voice"));
    }

    #[test]
    fn test_removed_child_inlet_drops_parent_connection() {
        let mut instance = Instance::new();
        let patch = instance.new_patch("main");
        let (_, sub, child) = voice(&mut instance, patch);
        let inlet = instance.patch(child).unwrap().objects()[1];

        assert!(instance.remove_object(child, inlet));
        assert!(instance.object_info(patch, sub).unwrap().inlets.is_empty());
        assert!(instance.snapshot(patch).unwrap().connections.is_empty());
        assert_eq!(instance.patch(patch).and_then(|p| p.undo_name()), Some("disconnect"));
    }

    #[test]
    fn test_save_and_load_subpatch() {
        let mut instance = Instance::new();
        let patch = instance.new_patch("main");
        voice(&mut instance, patch);

        let text = instance.patch_fragment(patch).to_json().unwrap();
        let loaded = instance.load_patch("copy", &text).unwrap();

        let snapshot = instance.snapshot(loaded).unwrap();
        assert_eq!(snapshot.objects.len(), 2);
        assert_eq!(snapshot.connections.len(), 1);
        let child = snapshot.objects[1].subpatch.unwrap();
        assert_eq!(texts(&instance, child), vec!["osc~ 440", "inlet"]);
        assert_eq!(instance.patch(child).map(|p| p.name()), Some("voice"));
        assert!(!instance.snapshot(child).unwrap().dirty);
    }

    #[test]
    fn test_delete_key_removes_selection() {
        let mut instance = Instance::new();
        let patch = instance.new_patch("main");
        let (f, sub, _) = voice(&mut instance, patch);
        let print = instance.create_object(patch, "print", 80, 0).unwrap();
        instance.connect(patch, Connection::new(f, 0, print, 0)).unwrap();

        // Nothing selected: the key is not used
        assert!(!instance.key_press(patch, KEY_DELETE, true));

        let graph = instance.patch_mut(patch).unwrap();
        graph.select(print);
        assert!(graph.select_connection(Connection::new(f, 0, sub, 0)));
        assert!(!instance.key_press(patch, KEY_DELETE, false));
        assert!(instance.key_press(patch, KEY_DELETE, true));

        assert_eq!(texts(&instance, patch), vec!["f", "pd voice"]);
        assert!(instance.snapshot(patch).unwrap().connections.is_empty());

        // One undo step brings everything back
        instance.undo(patch);
        assert_eq!(texts(&instance, patch), vec!["f", "pd voice", "print"]);
        assert_eq!(instance.snapshot(patch).unwrap().connections.len(), 2);
    }

    #[test]
    fn test_escape_key_deselects() {
        let mut instance = Instance::new();
        let patch = instance.new_patch("main");
        let id = instance.create_object(patch, "print", 0, 0).unwrap();
        instance.patch_mut(patch).unwrap().select(id);

        assert!(instance.key_press(patch, KEY_ESCAPE, true));
        assert!(instance.patch(patch).unwrap().selected().is_empty());
        assert!(!instance.key_press(patch, KEY_ESCAPE, true));
        assert!(!instance.key_press(patch, 'a' as u32, true));
    }

    #[test]
    fn test_copy_paste() {
        let mut instance = Instance::new();
        let patch = instance.new_patch("main");
        let a = instance.create_object(patch, "metro 100", 10, 10).unwrap();
        let b = instance.create_object(patch, "print", 10, 60).unwrap();
        instance.connect(patch, Connection::new(a, 0, b, 0)).unwrap();
        instance.patch_mut(patch).unwrap().select(a);
        instance.patch_mut(patch).unwrap().select(b);

        let text = instance.copy(patch).unwrap();
        assert!(instance
            .take_events()
            .iter()
            .any(|event| matches!(event, EngineEvent::ClipboardText { .. })));

        let pasted = instance.paste(patch, &text, None, 10).unwrap();
        assert_eq!(pasted.len(), 2);
        let first = instance.object_info(patch, pasted[0]).unwrap();
        assert_eq!((first.x, first.y), (20, 20));
        assert!(first.selected);
        assert!(!instance.patch(patch).unwrap().is_selected(a));
        assert_eq!(instance.snapshot(patch).unwrap().connections.len(), 2);

        // Repeated pastes keep moving
        let again = instance.paste(patch, &text, None, 10).unwrap();
        let moved = instance.object_info(patch, again[0]).unwrap();
        assert_eq!((moved.x, moved.y), (30, 30));

        // Pasting at a point puts the top-left corner there
        let placed = instance.paste(patch, &text, Some((200, 300)), 10).unwrap();
        let corner = instance.object_info(patch, placed[0]).unwrap();
        assert_eq!((corner.x, corner.y), (200, 300));

        // One undo removes one paste
        instance.undo(patch);
        assert_eq!(instance.patch(patch).unwrap().len(), 6);
    }

    #[test]
    fn test_paste_garbage_fails() {
        let mut instance = Instance::new();
        let patch = instance.new_patch("main");
        assert!(instance.paste(patch, "{not json", None, 10).is_err());
    }

    #[test]
    fn test_duplicate() {
        let mut instance = Instance::new();
        let patch = instance.new_patch("main");
        let a = instance.create_object(patch, "tgl 25", 40, 40).unwrap();
        instance.set_value(patch, a, 1.0);
        instance.patch_mut(patch).unwrap().select(a);

        let copies = instance.duplicate(patch, 10);
        let copy = instance.object_info(patch, copies[0]).unwrap();
        assert_eq!((copy.x, copy.y), (50, 50));
        assert_eq!(copy.gui.map(|gui| gui.value), Some(1.0));
    }

    #[test]
    fn test_save_and_load() {
        let mut instance = Instance::new();
        let patch = instance.new_patch("main");
        let a = instance.create_object(patch, "osc~ 220", 0, 0).unwrap();
        let b = instance.create_object(patch, "dac~", 0, 60).unwrap();
        instance.connect(patch, Connection::new(a, 0, b, 0)).unwrap();
        instance.set_info(patch, "0_0_1_0/Path", Some("5,5".into()));

        let text = instance.patch_fragment(patch).to_json().unwrap();
        let loaded = instance.load_patch("copy", &text).unwrap();

        let snapshot = instance.snapshot(loaded).unwrap();
        assert_eq!(texts(&instance, loaded), vec!["osc~ 220", "dac~"]);
        assert_eq!(snapshot.connections[0].path.as_deref(), Some("5,5"));
        assert!(!snapshot.dirty);
        assert!(!snapshot.can_undo);
        assert!(snapshot.objects.iter().all(|o| !o.selected));
    }

    #[test]
    fn test_are_connected() {
        let mut instance = Instance::new();
        let patch = instance.new_patch("main");
        let a = instance.create_object(patch, "metro 100", 0, 0).unwrap();
        let b = instance.create_object(patch, "print", 0, 60).unwrap();
        instance.connect(patch, Connection::new(a, 0, b, 0)).unwrap();

        assert_eq!(
            instance.are_connected(
                patch,
                &[Connection::new(a, 0, b, 0), Connection::new(a, 1, b, 0)]
            ),
            vec![true, false]
        );
    }

    #[test]
    fn test_help_names() {
        let mut instance = Instance::new();
        let patch = instance.new_patch("main");
        let t = instance.create_object(patch, "t b b", 0, 0).unwrap();
        let msg = instance.create_object(patch, "msg hi", 0, 0).unwrap();
        let bogus = instance.create_object(patch, "bogus", 0, 0).unwrap();

        assert_eq!(instance.help_name(patch, t).as_deref(), Some("trigger-help"));
        assert_eq!(instance.help_name(patch, msg).as_deref(), Some("msg-help"));
        assert_eq!(instance.help_name(patch, bogus), None);
    }

    #[test]
    fn test_dsp_loop_reported() {
        let mut instance = Instance::new();
        let patch = instance.new_patch("main");
        let a = instance.create_object(patch, "*~", 0, 0).unwrap();
        let b = instance.create_object(patch, "+~", 0, 50).unwrap();
        instance.connect(patch, Connection::new(a, 0, b, 0)).unwrap();
        instance.connect(patch, Connection::new(b, 0, a, 1)).unwrap();
        instance.take_events();

        instance.set_dsp(true);
        let events = instance.take_events();
        assert!(instance.is_dsp_running());
        assert!(events.iter().any(|e| matches!(e, EngineEvent::Print(line) if line.contains("DSP loop"))));
        assert_eq!(events.last(), Some(&EngineEvent::DspState(true)));
    }
}
