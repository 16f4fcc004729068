//! Reconciliation of the visual scene with the engine.

use std::collections::HashMap;

use egui::{pos2, vec2, Rect};

use crate::engine::{Connection, ConnectionInfo, ObjectId};
use crate::patch::SharedClipboard;

use super::connection::VisualConnection;
use super::gui_widget::GuiWidget;
use super::object_box::ObjectBox;
use super::{Canvas, Deferred, PatchStatus};

impl Canvas {
    /// Brings boxes and connections in line with the engine.
    ///
    /// Boxes are matched by object identity and keep their UI state; new
    /// objects get a box, vanished ones lose theirs, and the box list ends
    /// up in canonical engine order. Bounds are only taken from the engine
    /// when `update_positions` is set. The selection survives except for
    /// elements that were destroyed.
    pub fn synchronise(&mut self, update_positions: bool) {
        let snapshot = match self.patch.snapshot() {
            Ok(snapshot) => snapshot,
            Err(error) => {
                log::warn!("cannot synchronise {}: {}", self.status.title, error);
                return;
            }
        };

        let order: HashMap<ObjectId, usize> = snapshot
            .objects
            .iter()
            .enumerate()
            .map(|(index, info)| (info.id, index))
            .collect();
        let shows_connections = !self.is_graph && !self.flags.presentation_mode;

        if shows_connections {
            self.prune_connections(&order);
        }
        self.prune_boxes(&order);

        let mut existing: HashMap<ObjectId, usize> = self
            .boxes
            .iter()
            .enumerate()
            .map(|(index, object_box)| (object_box.id(), index))
            .collect();
        for info in &snapshot.objects {
            match existing.get(&info.id).copied() {
                Some(index) => self.boxes[index].update_from(info, update_positions),
                None => {
                    existing.insert(info.id, self.boxes.len());
                    self.boxes.push(ObjectBox::from_info(info));
                }
            }
        }
        self.boxes
            .sort_by_key(|object_box| order.get(&object_box.id()).copied().unwrap_or(usize::MAX));

        if shows_connections {
            self.reconcile_connections(snapshot.connections);
        }
        self.synchronise_graphs(update_positions);
        if self.is_graph {
            self.graph_bounds = match self.patch.get_bounds() {
                Ok(bounds) => bounds.map(|(x, y, width, height)| {
                    Rect::from_min_size(pos2(x as f32, y as f32), vec2(width as f32, height as f32))
                }),
                Err(error) => {
                    log::warn!("cannot measure graph {}: {}", snapshot.title, error);
                    None
                }
            };
        }

        self.status = PatchStatus {
            title: snapshot.title,
            dirty: snapshot.dirty,
            can_undo: snapshot.can_undo,
            can_redo: snapshot.can_redo,
            undo_name: snapshot.undo_name,
            redo_name: snapshot.redo_name,
        };
        if !self.deferred.contains(&Deferred::CheckBounds) {
            self.deferred.push_back(Deferred::CheckBounds);
        }
    }

    /// Keeps one graph canvas per graph-on-parent or array box.
    fn synchronise_graphs(&mut self, update_positions: bool) {
        let shown: Vec<ObjectId> = self
            .boxes
            .iter()
            .filter(|object_box| {
                matches!(
                    object_box.widget,
                    Some(GuiWidget::Subpatch { graph: true }) | Some(GuiWidget::Array)
                )
            })
            .map(ObjectBox::id)
            .collect();
        self.graphs.retain(|object, _| shown.contains(object));

        for object in shown {
            if let Some(graph) = self.graphs.get_mut(&object) {
                graph.synchronise(update_positions);
                continue;
            }
            match self.patch.open_subpatch(object) {
                Ok(Some(child)) => {
                    let graph = Canvas::new(
                        child,
                        &self.config,
                        &self.shared_flags,
                        Box::new(SharedClipboard::default()),
                    )
                    .into_graph();
                    self.graphs.insert(object, graph);
                }
                Ok(None) => {}
                Err(error) => log::warn!("cannot open graph: {}", error),
            }
        }
    }

    /// Drops connections with a vanished endpoint or that the engine no
    /// longer reports.
    fn prune_connections(&mut self, order: &HashMap<ObjectId, usize>) {
        let boxes = &self.boxes;
        let endpoint_alive = |object: ObjectId, outlet: bool, index: usize| {
            order.contains_key(&object)
                && boxes.iter().any(|object_box| {
                    let edges = if outlet { &object_box.outlets } else { &object_box.inlets };
                    object_box.id() == object && index < edges.len()
                })
        };

        let mut dropped: Vec<Connection> = Vec::new();
        let mut kept: Vec<VisualConnection> = Vec::new();
        for visual in std::mem::take(&mut self.connections) {
            let connection = visual.connection();
            if endpoint_alive(connection.source, true, connection.outlet)
                && endpoint_alive(connection.sink, false, connection.inlet)
            {
                kept.push(visual);
            } else {
                dropped.push(connection);
            }
        }

        if !kept.is_empty() {
            let tuples = kept.iter().map(VisualConnection::connection).collect();
            match self.patch.are_connected(tuples) {
                Ok(connected) => {
                    let (live, stale): (Vec<_>, Vec<_>) = kept
                        .into_iter()
                        .zip(connected)
                        .partition(|(_, connected)| *connected);
                    dropped.extend(stale.into_iter().map(|(visual, _)| visual.connection()));
                    kept = live.into_iter().map(|(visual, _)| visual).collect();
                }
                Err(error) => log::warn!("cannot verify connections: {}", error),
            }
        }

        self.connections = kept;
        for connection in dropped {
            self.selection.evict_connection(connection);
        }
    }

    fn prune_boxes(&mut self, order: &HashMap<ObjectId, usize>) {
        let selection = &mut self.selection;
        let sidebar = &mut self.sidebar;
        self.boxes.retain(|object_box| {
            let live = order.contains_key(&object_box.id());
            if !live {
                selection.evict_object(object_box.id());
                if sidebar.object() == Some(object_box.id()) {
                    sidebar.hide_parameters();
                }
            }
            live
        });
        // Connections hidden in presentation mode may still point at them
        self.connections.retain(|visual| {
            let connection = visual.connection();
            order.contains_key(&connection.source) && order.contains_key(&connection.sink)
        });
    }

    /// Adds or refreshes a visual connection for every engine connection.
    /// Boxes must already be in canonical order.
    fn reconcile_connections(&mut self, infos: Vec<ConnectionInfo>) {
        let boxes = &self.boxes;
        self.connections.retain(|visual| {
            let connection = visual.connection();
            let source = boxes.iter().find(|object_box| object_box.id() == connection.source);
            let sink = boxes.iter().find(|object_box| object_box.id() == connection.sink);
            source.is_some_and(|object_box| connection.outlet < object_box.outlets.len())
                && sink.is_some_and(|object_box| connection.inlet < object_box.inlets.len())
        });

        let index: HashMap<ObjectId, usize> = self
            .boxes
            .iter()
            .enumerate()
            .map(|(position, object_box)| (object_box.id(), position))
            .collect();

        for info in infos {
            let connection = info.connection;
            let (Some(&source), Some(&sink)) = (index.get(&connection.source), index.get(&connection.sink))
            else {
                log::error!("connection {} refers to an object outside the patch", info.key);
                continue;
            };
            if connection.outlet >= self.boxes[source].outlets.len() {
                log::error!(
                    "connection {}: outlet {} out of range on {}",
                    info.key,
                    connection.outlet,
                    self.boxes[source].text
                );
                continue;
            }
            if connection.inlet >= self.boxes[sink].inlets.len() {
                log::error!(
                    "connection {}: inlet {} out of range on {}",
                    info.key,
                    connection.inlet,
                    self.boxes[sink].text
                );
                continue;
            }

            match self
                .connections
                .iter_mut()
                .find(|visual| visual.connection() == connection)
            {
                Some(existing) => existing.set_state(info.key, info.path),
                None => self
                    .connections
                    .push(VisualConnection::new(connection, info.key, info.path)),
            }
        }
    }
}
