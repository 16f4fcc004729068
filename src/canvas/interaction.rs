//! Pointer and keyboard editing.
//!
//! Input arrives in view coordinates together with the modifier keys held.
//! Each gesture is one [`Interaction`] state; a press picks the state from
//! what is under the pointer, moves update it and the release commits it
//! through the patch accessor, after which the canvas synchronises.
//!
//! | Press on            | Unlocked            | Locked              |
//! |---------------------|---------------------|---------------------|
//! | background          | lasso               | nothing             |
//! | box                 | select, then drag   | actuate widget      |
//! | edge                | connect             | actuate widget      |
//! | secondary button    | context menu        | context menu        |
//! | middle button       | pan                 | pan                 |

use egui::{Modifiers, Pos2, Rect, Vec2};

use crate::engine::instance::{KEY_BACKSPACE, KEY_DELETE, KEY_ESCAPE};
use crate::engine::{Connection, ObjectId};

use super::connection::polyline_intersects_rect;
use super::context_menu::{ContextMenu, MenuContext};
use super::object_box::{EdgeRef, Polarity};
use super::selection::Selectable;
use super::Canvas;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Middle,
}

/// Keys the canvas sees.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CanvasKey {
    Left,
    Right,
    Up,
    Down,
    Backspace,
    Delete,
    Escape,
    Enter,
    Tab,
    PageUp,
    PageDown,
    Home,
    Character(char),
}

impl CanvasKey {
    /// Key code forwarded to the engine's key handling.
    pub fn code(self) -> u32 {
        match self {
            CanvasKey::Backspace => KEY_BACKSPACE,
            CanvasKey::Tab => 9,
            CanvasKey::Enter => 10,
            CanvasKey::Escape => KEY_ESCAPE,
            CanvasKey::Delete => KEY_DELETE,
            CanvasKey::Left => 0x1001,
            CanvasKey::Right => 0x1002,
            CanvasKey::Up => 0x1003,
            CanvasKey::Down => 0x1004,
            CanvasKey::PageUp => 0x1005,
            CanvasKey::PageDown => 0x1006,
            CanvasKey::Home => 0x1007,
            CanvasKey::Character(character) => character as u32,
        }
    }

    /// Nudge offset for arrow keys.
    pub fn nudge(self, step: i32) -> Option<(i32, i32)> {
        match self {
            CanvasKey::Left => Some((-step, 0)),
            CanvasKey::Right => Some((step, 0)),
            CanvasKey::Up => Some((0, -step)),
            CanvasKey::Down => Some((0, step)),
            _ => None,
        }
    }
}

/// The gesture in progress. Positions are canvas coordinates unless noted.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Interaction {
    #[default]
    Idle,
    /// Rectangle selection from the background.
    Lasso {
        origin: Pos2,
        current: Pos2,
        /// Adds to `base` instead of replacing the selection.
        additive: bool,
        base: Vec<Selectable>,
    },
    /// Button down on a box, drag threshold not yet exceeded.
    Pressed {
        object: ObjectId,
        press: Pos2,
        /// Press position in view coordinates.
        screen: Pos2,
        toggle: bool,
        was_selected: bool,
    },
    /// Selected boxes follow the pointer.
    Dragging {
        press: Pos2,
        /// Press-time top-left of every dragged box.
        origins: Vec<(ObjectId, Pos2)>,
        /// Grid-snapped offset applied so far.
        delta: Vec2,
        /// Connection the single dragged box will be inserted into.
        snap: Option<Connection>,
    },
    /// Rubber-band lines from one or more anchor edges.
    Connecting {
        anchors: Vec<EdgeRef>,
        pointer: Pos2,
        target: Option<EdgeRef>,
        /// Keep the anchor after connecting.
        chaining: bool,
    },
    /// Locked mode: the pointer operates widgets.
    Actuating { object: Option<ObjectId> },
    /// Middle-button scrolling; `last` is in view coordinates.
    Panning { last: Pos2 },
}

impl Canvas {
    // ========================================================================
    // Pointer
    // ========================================================================

    pub fn pointer_pressed(&mut self, screen: Pos2, button: PointerButton, modifiers: Modifiers) {
        let point = self.viewport.to_canvas(screen);

        match button {
            PointerButton::Middle => {
                self.interaction = Interaction::Panning { last: screen };
                return;
            }
            PointerButton::Secondary => {
                self.cancel_interaction();
                self.open_context_menu(screen);
                return;
            }
            PointerButton::Primary => {}
        }

        self.context_menu = None;
        if let Interaction::Connecting { chaining: true, .. } = self.interaction {
            if modifiers.shift {
                return;
            }
        }
        self.cancel_interaction();

        if self.is_locked() {
            self.interaction = Interaction::Actuating { object: None };
            self.actuate_at(point);
            return;
        }

        if let Some(edge) = self.edge_at(point) {
            let anchors = self.connection_anchors(edge, modifiers.shift);
            self.interaction = Interaction::Connecting {
                anchors,
                pointer: point,
                target: None,
                chaining: false,
            };
            return;
        }

        if let Some(object) = self.box_at(point) {
            let was_selected = self.selection.contains_object(object);
            if !modifiers.shift && !was_selected {
                self.deselect_all();
                self.set_selected(Selectable::Object(object), true);
            }
            self.interaction = Interaction::Pressed {
                object,
                press: point,
                screen,
                toggle: modifiers.shift,
                was_selected,
            };
            return;
        }

        if let Some(connection) = self.connection_at(point) {
            if !modifiers.shift {
                self.deselect_all();
            }
            let item = Selectable::Connection(connection);
            let selected = !self.selection.contains(item);
            self.set_selected(item, selected);
            return;
        }

        let additive = modifiers.shift;
        if !additive {
            self.deselect_all();
        }
        self.interaction = Interaction::Lasso {
            origin: point,
            current: point,
            additive,
            base: self.selection.items().to_vec(),
        };
    }

    pub fn pointer_moved(&mut self, screen: Pos2, modifiers: Modifiers) {
        match &mut self.interaction {
            Interaction::Idle => return,
            Interaction::Panning { last } => {
                let delta = screen - *last;
                *last = screen;
                self.viewport.pan(delta);
                return;
            }
            Interaction::Lasso { .. } | Interaction::Dragging { .. } | Interaction::Connecting { .. } => {
                self.viewport.auto_scroll(
                    screen,
                    self.config.autoscroll_margin,
                    self.config.autoscroll_speed,
                );
            }
            Interaction::Pressed { .. } | Interaction::Actuating { .. } => {}
        }

        let point = self.viewport.to_canvas(screen);
        match self.interaction.clone() {
            Interaction::Lasso { origin, additive, base, .. } => {
                self.interaction = Interaction::Lasso {
                    origin,
                    current: point,
                    additive,
                    base,
                };
                self.update_lasso();
            }
            Interaction::Pressed {
                object,
                press,
                screen: pressed_at,
                toggle,
                ..
            } => {
                if screen.distance(pressed_at) < self.config.min_drag_distance {
                    return;
                }
                if toggle {
                    self.set_selected(Selectable::Object(object), true);
                }
                self.start_drag(press);
                self.drag_to(point, modifiers.shift);
            }
            Interaction::Dragging { .. } => self.drag_to(point, modifiers.shift),
            Interaction::Connecting { anchors, .. } => self.retarget(&anchors, point),
            Interaction::Actuating { .. } => self.actuate_at(point),
            Interaction::Idle | Interaction::Panning { .. } => {}
        }
    }

    pub fn pointer_released(&mut self, screen: Pos2, modifiers: Modifiers) {
        let point = self.viewport.to_canvas(screen);

        match std::mem::take(&mut self.interaction) {
            Interaction::Idle | Interaction::Panning { .. } => {}
            Interaction::Lasso { .. } => self.update_sidebar_selection(),
            Interaction::Pressed {
                object,
                toggle,
                was_selected,
                ..
            } => {
                if toggle {
                    self.set_selected(Selectable::Object(object), !was_selected);
                } else {
                    self.deselect_all();
                    self.set_selected(Selectable::Object(object), true);
                }
            }
            Interaction::Dragging {
                origins,
                delta,
                snap,
                ..
            } => self.finish_drag(origins, delta, snap),
            Interaction::Connecting {
                anchors, target, ..
            } => {
                let target = target.or_else(|| {
                    let polarity = anchors.first()?.polarity.opposite();
                    let exclude: Vec<ObjectId> = anchors.iter().map(|anchor| anchor.object).collect();
                    self.nearest_edge(point, polarity, &exclude)
                });
                self.clear_targets();
                let connected = target.is_some_and(|target| self.connect_anchors(&anchors, target));
                if connected {
                    self.synchronise(true);
                }
                if connected && modifiers.shift && anchors.len() == 1 {
                    self.interaction = Interaction::Connecting {
                        anchors,
                        pointer: point,
                        target: None,
                        chaining: true,
                    };
                }
            }
            Interaction::Actuating { .. } => self.untoggle_all(),
        }
    }

    /// Abandons the current gesture without committing it.
    pub fn cancel_interaction(&mut self) {
        match std::mem::take(&mut self.interaction) {
            Interaction::Dragging { origins, .. } => {
                for (object, origin) in origins {
                    if let Some(object_box) = self.box_for_mut(object) {
                        object_box.bounds = Rect::from_min_size(origin, object_box.bounds.size());
                    }
                }
                self.clear_targets();
            }
            Interaction::Connecting { .. } => self.clear_targets(),
            Interaction::Actuating { .. } => self.untoggle_all(),
            _ => {}
        }
    }

    // ========================================================================
    // Keyboard
    // ========================================================================

    /// Handles a key press. Returns whether the canvas consumed it.
    ///
    /// Arrow keys nudge the selection; everything else goes on to the
    /// engine's key handling and is left for the caller. The engine sees
    /// the canvas selection while it handles the key, so delete and
    /// backspace remove the selected boxes and connections.
    pub fn key_pressed(&mut self, key: CanvasKey, modifiers: Modifiers) -> bool {
        if let Some((dx, dy)) = key.nudge(self.config.nudge_step) {
            let objects = self.selected_objects();
            if !self.is_locked() && !objects.is_empty() {
                let (dx, dy) = if modifiers.shift {
                    (dx * self.grid.size, dy * self.grid.size)
                } else {
                    (dx, dy)
                };
                match self.patch.move_objects(objects, dx, dy) {
                    Ok(()) => self.synchronise(true),
                    Err(error) => log::warn!("nudge failed: {}", error),
                }
                self.consumed_keys.push(key);
                return true;
            }
        }

        if self.forward_key(key) {
            self.deselect_all();
            self.synchronise(false);
        }
        false
    }

    /// Releases a key. Only keys whose press went to the engine are
    /// forwarded.
    pub fn key_released(&mut self, key: CanvasKey) {
        if let Some(position) = self.consumed_keys.iter().position(|consumed| *consumed == key) {
            self.consumed_keys.swap_remove(position);
            return;
        }
        if let Err(error) = self.patch.key_press(key.code(), false) {
            log::warn!("{}", error);
        }
    }

    /// Sends a key press to the engine with the canvas selection mirrored
    /// for the duration. Returns whether the engine acted on it.
    fn forward_key(&mut self, key: CanvasKey) -> bool {
        let mirrored = !self.is_locked() && !self.selection.is_empty();
        if mirrored {
            let (objects, connections) = (self.selection.objects(), self.selection.connections());
            if let Err(error) = self.patch.set_selection(objects, connections) {
                log::warn!("{}", error);
            }
        }

        let handled = match self.patch.key_press(key.code(), true) {
            Ok(handled) => handled,
            Err(error) => {
                log::warn!("{}", error);
                false
            }
        };

        if mirrored {
            if let Err(error) = self.patch.deselect_all() {
                log::warn!("{}", error);
            }
        }
        handled
    }

    // ========================================================================
    // Lasso
    // ========================================================================

    fn update_lasso(&mut self) {
        let Interaction::Lasso {
            origin,
            current,
            base,
            ..
        } = &self.interaction
        else {
            return;
        };
        let rect = Rect::from_two_pos(*origin, *current);

        let mut items = base.clone();
        for object_box in &self.boxes {
            let item = Selectable::Object(object_box.id());
            if object_box.intersects(rect) && !items.contains(&item) {
                items.push(item);
            }
        }
        for visual in &self.connections {
            let item = Selectable::Connection(visual.connection());
            let hit = self
                .connection_points(visual)
                .is_some_and(|points| polyline_intersects_rect(&points, rect));
            if hit && !items.contains(&item) {
                items.push(item);
            }
        }

        self.selection.clear();
        for item in items {
            self.selection.select(item);
        }
    }

    // ========================================================================
    // Dragging
    // ========================================================================

    fn start_drag(&mut self, press: Pos2) {
        let origins = self
            .selection
            .objects()
            .into_iter()
            .filter_map(|object| Some((object, self.box_for(object)?.bounds.min)))
            .collect();
        self.interaction = Interaction::Dragging {
            press,
            origins,
            delta: Vec2::ZERO,
            snap: None,
        };
    }

    fn drag_to(&mut self, point: Pos2, snap_modifier: bool) {
        let Interaction::Dragging { press, origins, .. } = &self.interaction else {
            return;
        };
        let delta = self.grid.snap_delta(point - *press);
        let origins = origins.clone();

        for (object, origin) in &origins {
            if let Some(object_box) = self.box_for_mut(*object) {
                object_box.bounds = Rect::from_min_size(*origin + delta, object_box.bounds.size());
            }
        }

        let snap = if snap_modifier { self.snap_target(&origins) } else { None };
        self.clear_targets();
        if let (Some(_), [(object, _)]) = (snap, origins.as_slice()) {
            if let Some(object_box) = self.box_for_mut(*object) {
                for polarity in [Polarity::Inlet, Polarity::Outlet] {
                    if let Some(edge) = object_box.edge_mut(polarity, 0) {
                        edge.targeted = true;
                    }
                }
            }
        }

        if let Interaction::Dragging {
            delta: current,
            snap: target,
            ..
        } = &mut self.interaction
        {
            *current = delta;
            *target = snap;
        }
    }

    /// Connection the dragged box would be inserted into. Only a single
    /// box with both inlets and outlets can snap. The current target is
    /// kept while it still intersects; otherwise the first hit wins.
    fn snap_target(&self, origins: &[(ObjectId, Pos2)]) -> Option<Connection> {
        let [(object, _)] = origins else {
            return None;
        };
        let object_box = self.box_for(*object)?;
        if !object_box.is_multi_port() {
            return None;
        }

        let hits = |connection: &Connection| {
            self.connections
                .iter()
                .find(|visual| visual.connection() == *connection)
                .and_then(|visual| self.connection_points(visual))
                .is_some_and(|points| polyline_intersects_rect(&points, object_box.bounds))
        };

        if let Interaction::Dragging {
            snap: Some(current),
            ..
        } = &self.interaction
        {
            if hits(current) {
                return Some(*current);
            }
        }

        self.connections
            .iter()
            .map(|visual| visual.connection())
            .filter(|connection| !connection.touches(*object))
            .find(|connection| hits(connection))
    }

    fn finish_drag(&mut self, origins: Vec<(ObjectId, Pos2)>, delta: Vec2, snap: Option<Connection>) {
        self.clear_targets();
        let objects: Vec<ObjectId> = origins.iter().map(|(object, _)| *object).collect();
        let (dx, dy) = (delta.x.round() as i32, delta.y.round() as i32);

        if let Err(error) = self.patch.move_objects(objects.clone(), dx, dy) {
            log::warn!("move failed: {}", error);
        }

        if let (Some(connection), [object]) = (snap, objects.as_slice()) {
            self.insert_into_connection(*object, connection);
        }

        self.synchronise(true);
    }

    /// Replaces `connection` with two connections through `object`, as one
    /// undo step.
    fn insert_into_connection(&mut self, object: ObjectId, connection: Connection) {
        let result = self
            .patch
            .begin_undo_group("snap")
            .and_then(|()| self.patch.remove_connection(connection));
        if let Err(error) = result {
            log::warn!("cannot insert into connection: {}", error);
            return;
        }

        let incoming = self
            .patch
            .create_connection(connection.source, connection.outlet, object, 0);
        let outgoing = self
            .patch
            .create_connection(object, 0, connection.sink, connection.inlet);
        if !(incoming && outgoing) {
            log::warn!("inserted object only partly connected");
        }

        if let Err(error) = self.patch.end_undo_group() {
            log::warn!("{}", error);
        }
    }

    // ========================================================================
    // Connecting
    // ========================================================================

    /// Anchors for a connection started on `edge`. With `multi` held and
    /// the edge's box part of a larger selection, the same edge on every
    /// selected box becomes an anchor.
    fn connection_anchors(&self, edge: EdgeRef, multi: bool) -> Vec<EdgeRef> {
        let selected = self.selection.objects();
        if !multi || selected.len() < 2 || !selected.contains(&edge.object) {
            return vec![edge];
        }

        selected
            .into_iter()
            .filter_map(|object| {
                let object_box = self.box_for(object)?;
                (edge.index < object_box.edges(edge.polarity).len())
                    .then(|| object_box.edge_ref(edge.polarity, edge.index))
            })
            .collect()
    }

    /// Moves the rubber band to `point` and targets the nearest edge the
    /// first anchor may connect to.
    fn retarget(&mut self, anchors: &[EdgeRef], point: Pos2) {
        let Some(first) = anchors.first().copied() else {
            return;
        };
        let previous = match &self.interaction {
            Interaction::Connecting { target, .. } => *target,
            _ => None,
        };
        let exclude: Vec<ObjectId> = anchors.iter().map(|anchor| anchor.object).collect();
        let target = self
            .nearest_edge(point, first.polarity.opposite(), &exclude)
            .filter(|edge| {
                previous == Some(*edge)
                    || connection_between(first, *edge)
                        .is_some_and(|connection| self.patch.can_connect(connection))
            });

        self.clear_targets();
        if let Some(edge) = target {
            if let Some(target_edge) = self
                .box_for_mut(edge.object)
                .and_then(|object_box| object_box.edge_mut(edge.polarity, edge.index))
            {
                target_edge.targeted = true;
            }
        }

        if let Interaction::Connecting {
            pointer,
            target: current,
            ..
        } = &mut self.interaction
        {
            *pointer = point;
            *current = target;
        }
    }

    /// Connects every anchor to `target`. Returns whether any connection
    /// was made.
    fn connect_anchors(&mut self, anchors: &[EdgeRef], target: EdgeRef) -> bool {
        let mut connected = false;
        for anchor in anchors {
            let Some(connection) = connection_between(*anchor, target) else {
                continue;
            };
            if self.patch.create_connection(
                connection.source,
                connection.outlet,
                connection.sink,
                connection.inlet,
            ) {
                connected = true;
            } else {
                log::debug!("connection {:?} rejected", connection);
            }
        }
        connected
    }

    fn clear_targets(&mut self) {
        for object_box in &mut self.boxes {
            object_box.clear_targets();
        }
    }

    // ========================================================================
    // Locked mode
    // ========================================================================

    /// Operates the widget under `point`. Leaving a widget releases it.
    fn actuate_at(&mut self, point: Pos2) {
        let hovered = self.box_at(point).filter(|object| {
            self.box_for(*object)
                .and_then(|object_box| object_box.widget.as_ref())
                .is_some_and(|widget| widget.is_toggle_like())
        });

        let previous = match &self.interaction {
            Interaction::Actuating { object } => *object,
            _ => None,
        };
        if previous.is_some() && previous != hovered {
            self.untoggle_all();
        }
        self.interaction = Interaction::Actuating { object: hovered };

        let Some(object) = hovered else {
            return;
        };
        let Some(object_box) = self.box_for_mut(object) else {
            return;
        };
        let at = object_box.relative_position(point);
        let value = object_box
            .widget
            .as_mut()
            .and_then(|widget| widget.toggle_object(at));
        if let Some(value) = value {
            if let Err(error) = self.patch.set_gui_value(object, value) {
                log::warn!("{}", error);
            }
        }
    }

    fn untoggle_all(&mut self) {
        for widget in self.boxes.iter_mut().filter_map(|object_box| object_box.widget.as_mut()) {
            widget.untoggle_object();
        }
    }

    // ========================================================================
    // Context menu
    // ========================================================================

    fn open_context_menu(&mut self, screen: Pos2) {
        let point = self.viewport.to_canvas(screen);
        let target = self.box_at(point);
        if let Some(object) = target {
            if !self.selection.contains_object(object) && !self.is_locked() {
                self.deselect_all();
                self.set_selected(Selectable::Object(object), true);
            }
        }

        let context = MenuContext::new(
            target.and_then(|object| self.box_for(object)),
            !self.selection.is_empty() && !self.is_locked(),
            self.clipboard.get_text().is_some() && !self.is_locked(),
        );
        self.context_menu = Some(ContextMenu::new(screen, context));
    }
}

/// The connection from whichever of two edges is an outlet to the other.
fn connection_between(anchor: EdgeRef, target: EdgeRef) -> Option<Connection> {
    let (outlet, inlet) = match anchor.polarity {
        Polarity::Outlet => (anchor, target),
        Polarity::Inlet => (target, anchor),
    };
    (outlet.polarity == Polarity::Outlet && inlet.polarity == Polarity::Inlet)
        .then(|| Connection::new(outlet.object, outlet.index, inlet.object, inlet.index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::flags::SharedFlags;
    use crate::config::{CanvasConfig, EngineConfig};
    use crate::engine::{launch, EngineHost, Instance};
    use crate::patch::{Patch, SharedClipboard};
    use egui::pos2;

    fn canvas() -> (EngineHost, Patch, Canvas) {
        let config = EngineConfig {
            use_audio_device: false,
            ..EngineConfig::default()
        };
        let (bridge, host) = launch(&config, Instance::new());
        let patch = Patch::open(bridge, "gestures").unwrap();
        let canvas = Canvas::new(
            patch.clone(),
            &CanvasConfig::default(),
            &SharedFlags::default(),
            Box::new(SharedClipboard::default()),
        );
        (host, patch, canvas)
    }

    /// Places a box over `rect` without telling the engine.
    fn place(canvas: &mut Canvas, object: ObjectId, rect: Rect) {
        if let Some(object_box) = canvas.box_for_mut(object) {
            object_box.bounds = rect;
        }
    }

    #[test]
    fn test_key_codes() {
        assert_eq!(CanvasKey::Backspace.code(), 8);
        assert_eq!(CanvasKey::Delete.code(), 127);
        assert_eq!(CanvasKey::Escape.code(), 27);
        assert_eq!(CanvasKey::Character('a').code(), 97);
    }

    #[test]
    fn test_only_arrows_nudge() {
        assert_eq!(CanvasKey::Left.nudge(10), Some((-10, 0)));
        assert_eq!(CanvasKey::Down.nudge(10), Some((0, 10)));
        assert_eq!(CanvasKey::Delete.nudge(10), None);
        assert_eq!(CanvasKey::Tab.nudge(10), None);
    }

    #[test]
    fn test_snap_keeps_current_target() {
        let (_host, patch, mut canvas) = canvas();
        let left = patch.create_object("osc~ 440", 100, 100).unwrap();
        let left_out = patch.create_object("dac~", 100, 300).unwrap();
        let right = patch.create_object("osc~ 220", 160, 100).unwrap();
        let right_out = patch.create_object("dac~", 160, 300).unwrap();
        let filter = patch.create_object("lop~ 500", 400, 400).unwrap();
        assert!(patch.create_connection(left, 0, left_out, 0));
        assert!(patch.create_connection(right, 0, right_out, 0));
        canvas.synchronise(true);

        let first = Connection::new(left, 0, left_out, 0);
        let second = Connection::new(right, 0, right_out, 0);
        let origins = vec![(filter, pos2(400.0, 400.0))];

        // Across both connections: the first hit wins
        place(&mut canvas, filter, Rect::from_min_max(pos2(90.0, 180.0), pos2(190.0, 220.0)));
        assert_eq!(canvas.snap_target(&origins), Some(first));

        // An existing target is kept while it still intersects
        canvas.interaction = Interaction::Dragging {
            press: pos2(400.0, 400.0),
            origins: origins.clone(),
            delta: Vec2::ZERO,
            snap: Some(second),
        };
        assert_eq!(canvas.snap_target(&origins), Some(second));

        // and dropped once it does not
        place(&mut canvas, filter, Rect::from_min_max(pos2(90.0, 180.0), pos2(130.0, 220.0)));
        assert_eq!(canvas.snap_target(&origins), Some(first));

        place(&mut canvas, filter, Rect::from_min_max(pos2(500.0, 180.0), pos2(560.0, 220.0)));
        assert_eq!(canvas.snap_target(&origins), None);
    }

    #[test]
    fn test_secondary_press_cancels_drag() {
        let (_host, patch, mut canvas) = canvas();
        let object = patch.create_object("f", 100, 100).unwrap();
        canvas.synchronise(true);
        let origin = canvas.box_for(object).unwrap().bounds;

        let centre = origin.center();
        canvas.pointer_pressed(centre, PointerButton::Primary, Modifiers::NONE);
        canvas.pointer_moved(centre + egui::vec2(60.0, 40.0), Modifiers::NONE);
        assert!(matches!(canvas.interaction(), Interaction::Dragging { .. }));

        canvas.pointer_pressed(centre + egui::vec2(60.0, 40.0), PointerButton::Secondary, Modifiers::NONE);
        assert_eq!(canvas.interaction(), &Interaction::Idle);
        assert_eq!(canvas.box_for(object).unwrap().bounds, origin);
        assert!(canvas.context_menu().is_some());

        // Nothing was moved in the engine
        let info = patch.object_info(object).unwrap().unwrap();
        assert_eq!((info.x, info.y), (100, 100));
    }

    #[test]
    fn test_secondary_press_cancels_connecting() {
        let (_host, patch, mut canvas) = canvas();
        let osc = patch.create_object("osc~ 440", 100, 100).unwrap();
        patch.create_object("dac~", 100, 200).unwrap();
        canvas.synchronise(true);

        let outlet = canvas
            .edge_position(canvas.box_for(osc).unwrap().edge_ref(Polarity::Outlet, 0))
            .unwrap();
        canvas.pointer_pressed(outlet, PointerButton::Primary, Modifiers::NONE);
        canvas.pointer_moved(pos2(104.0, 195.0), Modifiers::NONE);
        assert!(!canvas.pending_connection_lines().is_empty());

        canvas.pointer_pressed(pos2(104.0, 195.0), PointerButton::Secondary, Modifiers::NONE);
        assert_eq!(canvas.interaction(), &Interaction::Idle);
        assert!(canvas.pending_connection_lines().is_empty());
        assert!(canvas
            .boxes()
            .iter()
            .all(|object_box| object_box.inlets.iter().all(|edge| !edge.targeted)));
        assert!(patch.get_connections().unwrap().is_empty());
    }

    #[test]
    fn test_rejected_edge_is_not_targeted() {
        let (_host, patch, mut canvas) = canvas();
        let osc = patch.create_object("osc~ 440", 100, 100).unwrap();
        let number = patch.create_object("f", 100, 200).unwrap();
        canvas.synchronise(true);

        let outlet = canvas
            .edge_position(canvas.box_for(osc).unwrap().edge_ref(Polarity::Outlet, 0))
            .unwrap();
        let inlet = canvas
            .edge_position(canvas.box_for(number).unwrap().edge_ref(Polarity::Inlet, 0))
            .unwrap();
        canvas.pointer_pressed(outlet, PointerButton::Primary, Modifiers::NONE);
        canvas.pointer_moved(inlet, Modifiers::NONE);

        // A signal outlet cannot feed a control inlet
        assert!(matches!(canvas.interaction(), Interaction::Connecting { target: None, .. }));
        assert!(!canvas.box_for(number).unwrap().inlets[0].targeted);
    }

    #[test]
    fn test_consumed_press_swallows_release() {
        let (_host, _patch, mut canvas) = canvas();

        // Nothing selected: the arrow goes to the engine both ways
        assert!(!canvas.key_pressed(CanvasKey::Right, Modifiers::NONE));
        assert!(canvas.consumed_keys.is_empty());
        canvas.key_released(CanvasKey::Right);

        canvas.create_object("f", pos2(100.0, 100.0)).unwrap();
        assert!(canvas.key_pressed(CanvasKey::Right, Modifiers::NONE));
        assert_eq!(canvas.consumed_keys, vec![CanvasKey::Right]);
        canvas.key_released(CanvasKey::Right);
        assert!(canvas.consumed_keys.is_empty());
    }
}
