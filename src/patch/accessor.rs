//! Patch Accessor
//!
//! Read and edit one engine patch from the UI thread. Every operation goes
//! through the [`EngineBridge`]: edits are queued and return immediately,
//! queries block until the engine has applied everything queued before
//! them, so a query always sees the effect of earlier edits.
//!
//! Nothing is cached here. The engine is the only source of truth.

use std::path::Path;

use crate::engine::{
    BridgeError, Connection, CreateError, EngineBridge, Instance, ObjectId, ObjectInfo,
    PatchGraph, PatchId, PatchSnapshot,
};
use crate::persistence::save_to_file;

use super::gui_defaults::{GuiDefaults, TemplateColours};
use super::PatchError;

/// Handle to one patch inside the engine.
#[derive(Clone)]
pub struct Patch {
    id: PatchId,
    bridge: EngineBridge,
    gui_defaults: GuiDefaults,
    colours: TemplateColours,
}

impl Patch {
    pub fn new(id: PatchId, bridge: EngineBridge) -> Self {
        Self {
            id,
            bridge,
            gui_defaults: GuiDefaults::new(),
            colours: TemplateColours::default(),
        }
    }

    /// Opens a new empty patch in the engine.
    pub fn open(bridge: EngineBridge, name: &str) -> Result<Self, PatchError> {
        let name = name.to_string();
        let id = bridge.call(move |instance| instance.new_patch(&name))?;
        log::info!("opened patch {:?}", id);
        Ok(Self::new(id, bridge))
    }

    /// Opens a patch from serialised whole-patch text.
    pub fn load(bridge: EngineBridge, name: &str, text: &str) -> Result<Self, PatchError> {
        let (name, text) = (name.to_string(), text.to_string());
        let id = bridge.call(move |instance| instance.load_patch(&name, &text))??;
        log::info!("loaded patch {:?}", id);
        Ok(Self::new(id, bridge))
    }

    /// Opens a patch from a file, named after the file.
    pub fn load_file(bridge: EngineBridge, path: &Path) -> Result<Self, PatchError> {
        let text = std::fs::read_to_string(path)?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Untitled".to_string());
        Self::load(bridge, &name, &text)
    }

    /// Replaces the GUI templates and the colours substituted into them.
    pub fn with_gui_defaults(mut self, defaults: GuiDefaults, colours: TemplateColours) -> Self {
        self.gui_defaults = defaults;
        self.colours = colours;
        self
    }

    pub fn id(&self) -> PatchId {
        self.id
    }

    pub fn bridge(&self) -> &EngineBridge {
        &self.bridge
    }

    /// Runs a read-only query against this patch's graph.
    fn query<R, F>(&self, query: F) -> Result<R, PatchError>
    where
        R: Send + 'static,
        F: FnOnce(&PatchGraph) -> R + Send + 'static,
    {
        let id = self.id;
        self.bridge
            .call(move |instance| instance.patch(id).map(query))?
            .ok_or(PatchError::MissingPatch)
    }

    /// Queues an edit of this patch.
    fn edit<F>(&self, edit: F) -> Result<(), PatchError>
    where
        F: FnOnce(&mut Instance, PatchId) + Send + 'static,
    {
        let id = self.id;
        self.bridge.enqueue(move |instance| edit(instance, id))?;
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Object identities in canonical order, hidden objects excluded.
    pub fn get_objects(&self) -> Result<Vec<ObjectId>, PatchError> {
        self.query(PatchGraph::objects)
    }

    pub fn get_connections(&self) -> Result<Vec<Connection>, PatchError> {
        self.query(|graph| graph.connections().to_vec())
    }

    /// Position of an object in [`get_objects`](Self::get_objects).
    pub fn get_index(&self, object: ObjectId) -> Result<Option<usize>, PatchError> {
        self.query(move |graph| graph.index_of(object))
    }

    pub fn object_info(&self, object: ObjectId) -> Result<Option<ObjectInfo>, PatchError> {
        let id = self.id;
        Ok(self
            .bridge
            .call(move |instance| instance.object_info(id, object))?)
    }

    /// Objects, connections and connection metadata read in one step.
    pub fn snapshot(&self) -> Result<PatchSnapshot, PatchError> {
        let id = self.id;
        self.bridge
            .call(move |instance| instance.snapshot(id))?
            .ok_or(PatchError::MissingPatch)
    }

    /// Which of `connections` still exist, in one round trip.
    pub fn are_connected(&self, connections: Vec<Connection>) -> Result<Vec<bool>, PatchError> {
        let id = self.id;
        Ok(self
            .bridge
            .call(move |instance| instance.are_connected(id, &connections))?)
    }

    /// Whether a connection would be accepted.
    pub fn can_connect(&self, connection: Connection) -> bool {
        match self.query(move |graph| graph.validate(&connection)) {
            Ok(result) => result.is_ok(),
            Err(error) => {
                log::warn!("cannot check connection: {}", error);
                false
            }
        }
    }

    /// Bounding rectangle `(x, y, w, h)` of the patch's objects.
    pub fn get_bounds(&self) -> Result<Option<(i32, i32, i32, i32)>, PatchError> {
        self.query(PatchGraph::bounds)
    }

    pub fn title(&self) -> Result<String, PatchError> {
        self.query(|graph| graph.name().to_string())
    }

    pub fn is_dirty(&self) -> Result<bool, PatchError> {
        self.query(PatchGraph::is_dirty)
    }

    pub fn can_undo(&self) -> Result<bool, PatchError> {
        self.query(PatchGraph::can_undo)
    }

    pub fn can_redo(&self) -> Result<bool, PatchError> {
        self.query(PatchGraph::can_redo)
    }

    pub fn help_name(&self, object: ObjectId) -> Result<Option<String>, PatchError> {
        let id = self.id;
        Ok(self.bridge.call(move |instance| instance.help_name(id, object))?)
    }

    /// The accessor for a subpatch object's contents.
    pub fn open_subpatch(&self, object: ObjectId) -> Result<Option<Patch>, PatchError> {
        let info = self.object_info(object)?.ok_or(PatchError::MissingObject)?;
        Ok(info.subpatch.map(|child| Patch {
            id: child,
            ..self.clone()
        }))
    }

    // ========================================================================
    // Objects
    // ========================================================================

    /// Creates an object and waits until it exists.
    ///
    /// A bare GUI class name is expanded with its default template first.
    pub fn create_object(&self, text: &str, x: i32, y: i32) -> Result<ObjectId, PatchError> {
        let text = self.gui_defaults.apply(text, &self.colours);
        let id = self.id;
        let spec = text.clone();
        let created = self
            .bridge
            .call(move |instance| instance.create_object(id, &spec, x, y))?;
        created.map_err(|error| creation_error(error, text))
    }

    /// Changes an object's text. Returns the identity of the object that
    /// carries the new text, which differs from `object` when the engine
    /// had to recreate it.
    pub fn rename_object(&self, object: ObjectId, text: &str) -> Result<ObjectId, PatchError> {
        let id = self.id;
        let spec = text.to_string();
        let renamed = self
            .bridge
            .call(move |instance| instance.rename_object(id, object, &spec))?;
        renamed.map_err(|error| creation_error(error, text.to_string()))
    }

    pub fn remove_object(&self, object: ObjectId) -> Result<(), PatchError> {
        self.edit(move |instance, id| {
            instance.remove_object(id, object);
        })
    }

    /// Moves objects by a delta as one undo step.
    pub fn move_objects(&self, objects: Vec<ObjectId>, dx: i32, dy: i32) -> Result<(), PatchError> {
        if objects.is_empty() || (dx == 0 && dy == 0) {
            return Ok(());
        }
        self.edit(move |instance, id| instance.move_objects(id, &objects, dx, dy))
    }

    /// Raises an object to the end of the canonical order.
    pub fn to_front(&self, object: ObjectId) -> Result<(), PatchError> {
        self.edit(move |instance, id| {
            if let Some(graph) = instance.patch_mut(id) {
                graph.to_front(object);
            }
        })
    }

    pub fn set_gui_value(&self, object: ObjectId, value: f32) -> Result<(), PatchError> {
        self.edit(move |instance, id| {
            instance.set_value(id, object, value);
        })
    }

    /// Forwards a key the canvas does not handle itself. Returns whether
    /// the engine acted on it.
    pub fn key_press(&self, key: u32, down: bool) -> Result<bool, PatchError> {
        let id = self.id;
        Ok(self
            .bridge
            .call(move |instance| instance.key_press(id, key, down))?)
    }

    // ========================================================================
    // Connections
    // ========================================================================

    /// Connects two objects. Returns whether the engine accepted it.
    pub fn create_connection(&self, source: ObjectId, outlet: usize, sink: ObjectId, inlet: usize) -> bool {
        let id = self.id;
        let connection = Connection::new(source, outlet, sink, inlet);
        match self.bridge.call(move |instance| instance.connect(id, connection)) {
            Ok(result) => result.is_ok(),
            Err(error) => {
                log::warn!("cannot connect: {}", error);
                false
            }
        }
    }

    pub fn remove_connection(&self, connection: Connection) -> Result<(), PatchError> {
        self.edit(move |instance, id| {
            instance.disconnect(id, &connection);
        })
    }

    // ========================================================================
    // Selection
    // ========================================================================

    pub fn select_object(&self, object: ObjectId) -> Result<(), PatchError> {
        self.edit(move |instance, id| {
            if let Some(graph) = instance.patch_mut(id) {
                graph.select(object);
            }
        })
    }

    pub fn deselect_all(&self) -> Result<(), PatchError> {
        self.edit(|instance, id| {
            if let Some(graph) = instance.patch_mut(id) {
                graph.deselect_all();
            }
        })
    }

    /// Makes the engine selection exactly `objects` and `connections`.
    pub fn set_selection(
        &self,
        objects: Vec<ObjectId>,
        connections: Vec<Connection>,
    ) -> Result<(), PatchError> {
        self.edit(move |instance, id| {
            if let Some(graph) = instance.patch_mut(id) {
                graph.deselect_all();
                for object in objects {
                    graph.select(object);
                }
                for connection in connections {
                    graph.select_connection(connection);
                }
            }
        })
    }

    /// Removes the engine selection, objects and connections alike. Must be
    /// followed by [`finish_remove`](Self::finish_remove), which closes the
    /// undo step; edits queued in between join it.
    pub fn remove_selection(&self) -> Result<(), PatchError> {
        self.edit(|instance, id| instance.remove_selection(id))
    }

    pub fn finish_remove(&self) -> Result<(), PatchError> {
        self.edit(|instance, id| instance.finish_remove(id))
    }

    /// Opens an undo group; edits until [`end_undo_group`](Self::end_undo_group)
    /// undo together.
    pub fn begin_undo_group(&self, name: &'static str) -> Result<(), PatchError> {
        self.edit(move |instance, id| {
            if let Some(graph) = instance.patch_mut(id) {
                graph.begin_undo_group(name);
            }
        })
    }

    pub fn end_undo_group(&self) -> Result<(), PatchError> {
        self.edit(|instance, id| {
            if let Some(graph) = instance.patch_mut(id) {
                graph.end_undo_group();
            }
        })
    }

    // ========================================================================
    // Clipboard
    // ========================================================================

    /// Serialises the engine selection. The text arrives later as an
    /// [`EngineEvent::ClipboardText`](crate::engine::EngineEvent::ClipboardText).
    pub fn copy(&self) -> Result<(), PatchError> {
        self.edit(|instance, id| {
            if let Err(error) = instance.copy(id) {
                log::error!("copy failed: {}", error);
            }
        })
    }

    /// Pastes clipboard text, at `at` when given. Returns the new objects,
    /// which are also the engine selection.
    pub fn paste(&self, text: &str, at: Option<(i32, i32)>, step: i32) -> Result<Vec<ObjectId>, PatchError> {
        let id = self.id;
        let text = text.to_string();
        Ok(self
            .bridge
            .call(move |instance| instance.paste(id, &text, at, step))??)
    }

    pub fn duplicate(&self, step: i32) -> Result<Vec<ObjectId>, PatchError> {
        let id = self.id;
        Ok(self.bridge.call(move |instance| instance.duplicate(id, step))?)
    }

    // ========================================================================
    // History
    // ========================================================================

    pub fn undo(&self) -> Result<(), PatchError> {
        self.edit(|instance, id| {
            instance.undo(id);
        })
    }

    pub fn redo(&self) -> Result<(), PatchError> {
        self.edit(|instance, id| {
            instance.redo(id);
        })
    }

    // ========================================================================
    // Metadata and saving
    // ========================================================================

    pub fn set_info(&self, key: &str, value: Option<String>) -> Result<(), PatchError> {
        let key = key.to_string();
        self.edit(move |instance, id| {
            instance.set_info(id, &key, value);
        })
    }

    pub fn get_info(&self, key: &str) -> Result<Option<String>, PatchError> {
        let id = self.id;
        let key = key.to_string();
        Ok(self.bridge.call(move |instance| instance.info(id, &key))?)
    }

    /// Writes the whole patch to `path` and clears the dirty flag.
    pub fn save_to(&self, path: &Path) -> Result<(), PatchError> {
        let id = self.id;
        let fragment = self.bridge.call(move |instance| instance.patch_fragment(id))?;
        save_to_file(&fragment, path)?;
        self.edit(|instance, id| {
            if let Some(graph) = instance.patch_mut(id) {
                graph.set_dirty(false);
            }
        })?;
        log::info!("saved patch to {}", path.display());
        Ok(())
    }

    /// Blocks until every queued edit has been applied.
    pub fn wait_for_state_update(&self) -> Result<(), BridgeError> {
        self.bridge.wait_for_state_update()
    }
}

fn creation_error(error: CreateError, text: String) -> PatchError {
    match error {
        CreateError::MissingPatch => PatchError::MissingPatch,
        CreateError::MissingObject => PatchError::MissingObject,
        CreateError::Empty | CreateError::Reserved(_) => PatchError::CreationFailed(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::{launch, EngineEvent, EngineHost};
    use pretty_assertions::assert_eq;
    use std::time::{Duration, Instant};

    fn setup() -> (Patch, EngineHost) {
        let config = EngineConfig {
            use_audio_device: false,
            ..EngineConfig::default()
        };
        let (bridge, host) = launch(&config, Instance::new());
        (Patch::open(bridge, "test").unwrap(), host)
    }

    #[test]
    fn test_create_and_enumerate() {
        let (patch, _host) = setup();
        let a = patch.create_object("osc~ 440", 10, 10).unwrap();
        let b = patch.create_object("dac~", 10, 60).unwrap();

        assert_eq!(patch.get_objects().unwrap(), vec![a, b]);
        assert_eq!(patch.get_index(b).unwrap(), Some(1));
    }

    #[test]
    fn test_missing_index() {
        let (patch, _host) = setup();
        let a = patch.create_object("f", 0, 0).unwrap();
        patch.remove_object(a).unwrap();
        assert_eq!(patch.get_index(a).unwrap(), None);
    }

    #[test]
    fn test_info_object_is_hidden() {
        let (patch, _host) = setup();
        let a = patch.create_object("f", 0, 0).unwrap();
        patch.set_info("colour", Some("red".into())).unwrap();

        assert_eq!(patch.get_objects().unwrap(), vec![a]);
        assert_eq!(patch.get_info("colour").unwrap().as_deref(), Some("red"));
    }

    #[test]
    fn test_empty_text_fails() {
        let (patch, _host) = setup();
        assert!(matches!(
            patch.create_object("   ", 0, 0),
            Err(PatchError::CreationFailed(_))
        ));
    }

    #[test]
    fn test_gui_template_applied() {
        let (patch, _host) = setup();
        let toggle = patch.create_object("tgl", 0, 0).unwrap();
        let info = patch.object_info(toggle).unwrap().unwrap();

        assert!(info.text.starts_with("tgl 25 "));
        assert_eq!((info.width, info.height), (25, 25));
    }

    #[test]
    fn test_connections() {
        let (patch, _host) = setup();
        let osc = patch.create_object("osc~ 440", 0, 0).unwrap();
        let float = patch.create_object("f", 0, 50).unwrap();
        let dac = patch.create_object("dac~", 0, 100).unwrap();

        assert!(patch.create_connection(osc, 0, dac, 0));
        // Signal outlet into a control inlet
        assert!(!patch.create_connection(osc, 0, float, 0));
        // Duplicate
        assert!(!patch.create_connection(osc, 0, dac, 0));

        let connections = patch.get_connections().unwrap();
        assert_eq!(connections, vec![Connection::new(osc, 0, dac, 0)]);
        assert!(!patch.can_connect(Connection::new(osc, 0, float, 0)));

        patch.remove_connection(connections[0]).unwrap();
        assert_eq!(patch.are_connected(connections).unwrap(), vec![false]);
    }

    #[test]
    fn test_rename_in_place_keeps_identity() {
        let (patch, _host) = setup();
        let object = patch.create_object("f", 0, 0).unwrap();
        let renamed = patch.rename_object(object, "pack 0 0 0").unwrap();

        assert_eq!(renamed, object);
        let info = patch.object_info(object).unwrap().unwrap();
        assert_eq!(info.inlets.len(), 3);
    }

    #[test]
    fn test_rename_message_recreates_with_connections() {
        let (patch, _host) = setup();
        let message = patch.create_object("msg hello", 0, 0).unwrap();
        let print = patch.create_object("print", 0, 50).unwrap();
        assert!(patch.create_connection(message, 0, print, 0));

        let renamed = patch.rename_object(message, "msg world").unwrap();
        assert_ne!(renamed, message);
        assert_eq!(patch.get_objects().unwrap(), vec![print, renamed]);
        assert_eq!(
            patch.get_connections().unwrap(),
            vec![Connection::new(renamed, 0, print, 0)]
        );
    }

    #[test]
    fn test_move_objects_clears_selection() {
        let (patch, _host) = setup();
        let a = patch.create_object("f", 10, 10).unwrap();
        patch.move_objects(vec![a], 25, -5).unwrap();

        let info = patch.object_info(a).unwrap().unwrap();
        assert_eq!((info.x, info.y), (35, 5));
        assert!(!info.selected);
        assert!(patch.can_undo().unwrap());

        patch.undo().unwrap();
        let info = patch.object_info(a).unwrap().unwrap();
        assert_eq!((info.x, info.y), (10, 10));
    }

    #[test]
    fn test_remove_selection_is_one_undo_step() {
        let (patch, _host) = setup();
        let a = patch.create_object("f", 0, 0).unwrap();
        let b = patch.create_object("f", 0, 50).unwrap();
        assert!(patch.create_connection(a, 0, b, 0));

        patch.set_selection(vec![a, b], Vec::new()).unwrap();
        patch.remove_selection().unwrap();
        patch.finish_remove().unwrap();
        assert!(patch.get_objects().unwrap().is_empty());

        patch.undo().unwrap();
        assert_eq!(patch.get_objects().unwrap(), vec![a, b]);
        assert_eq!(
            patch.get_connections().unwrap(),
            vec![Connection::new(a, 0, b, 0)]
        );
    }

    #[test]
    fn test_copy_publishes_clipboard_text() {
        let (patch, _host) = setup();
        let a = patch.create_object("f 3", 0, 0).unwrap();
        patch.select_object(a).unwrap();
        patch.copy().unwrap();
        patch.wait_for_state_update().unwrap();

        let deadline = Instant::now() + Duration::from_secs(1);
        let mut text = None;
        while text.is_none() && Instant::now() < deadline {
            text = patch.bridge().drain_events().into_iter().find_map(|event| match event {
                EngineEvent::ClipboardText { text, .. } => Some(text),
                _ => None,
            });
            std::thread::sleep(Duration::from_millis(1));
        }

        let text = text.unwrap();
        let pasted = patch.paste(&text, Some((100, 100)), 10).unwrap();
        assert_eq!(pasted.len(), 1);
        let info = patch.object_info(pasted[0]).unwrap().unwrap();
        assert_eq!((info.x, info.y), (100, 100));
        assert!(info.selected);
    }

    #[test]
    fn test_duplicate() {
        let (patch, _host) = setup();
        let a = patch.create_object("f", 0, 0).unwrap();
        patch.select_object(a).unwrap();

        let copies = patch.duplicate(10).unwrap();
        assert_eq!(copies.len(), 1);
        let info = patch.object_info(copies[0]).unwrap().unwrap();
        assert_eq!((info.x, info.y), (10, 10));
    }

    #[test]
    fn test_connection_path_metadata() {
        let (patch, _host) = setup();
        let a = patch.create_object("f", 0, 0).unwrap();
        let b = patch.create_object("f", 0, 50).unwrap();
        assert!(patch.create_connection(a, 0, b, 0));

        let key = patch.snapshot().unwrap().connections[0].key.clone();
        patch.set_info(&format!("{}/Path", key), Some("5,25".into())).unwrap();
        assert_eq!(
            patch.snapshot().unwrap().connections[0].path.as_deref(),
            Some("5,25")
        );
    }

    #[test]
    fn test_forwarded_delete_removes_selection() {
        let (patch, _host) = setup();
        let a = patch.create_object("f", 0, 0).unwrap();
        let b = patch.create_object("f", 0, 50).unwrap();
        let c = patch.create_object("print", 50, 50).unwrap();
        assert!(patch.create_connection(a, 0, b, 0));
        assert!(patch.create_connection(a, 0, c, 0));

        patch
            .set_selection(vec![c], vec![Connection::new(a, 0, b, 0)])
            .unwrap();
        assert!(patch.key_press(127, true).unwrap());
        assert_eq!(patch.get_objects().unwrap(), vec![a, b]);
        assert!(patch.get_connections().unwrap().is_empty());

        // Nothing left selected
        assert!(!patch.key_press(127, true).unwrap());
        patch.undo().unwrap();
        assert_eq!(patch.get_connections().unwrap().len(), 2);
    }

    #[test]
    fn test_open_subpatch() {
        let (patch, _host) = setup();
        let sub = patch.create_object("pd inner", 0, 0).unwrap();
        let plain = patch.create_object("f", 0, 50).unwrap();

        let inner = patch.open_subpatch(sub).unwrap().unwrap();
        assert_eq!(inner.title().unwrap(), "inner");
        assert!(patch.open_subpatch(plain).unwrap().is_none());

        inner.create_object("inlet", 0, 0).unwrap();
        let info = patch.object_info(sub).unwrap().unwrap();
        assert_eq!(info.inlets.len(), 1);
    }

    #[test]
    fn test_save_clears_dirty() {
        let (patch, _host) = setup();
        patch.create_object("f", 0, 0).unwrap();
        assert!(patch.is_dirty().unwrap());

        let path = std::env::temp_dir().join(format!(
            "patch_canvas_accessor_{}.json",
            std::process::id()
        ));
        patch.save_to(&path).unwrap();
        assert!(!patch.is_dirty().unwrap());

        let reloaded = Patch::load_file(patch.bridge().clone(), &path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(reloaded.get_objects().unwrap().len(), 1);
        assert!(!reloaded.can_undo().unwrap());
    }
}
