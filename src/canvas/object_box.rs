//! Visual boxes and their edges.
//!
//! An [`ObjectBox`] is the canvas proxy for one engine object. It refers to
//! the object by its generational id only, so a box can never keep a
//! deleted object alive or mistake a new object for an old one.

use egui::{pos2, vec2, Pos2, Rect, Vec2};

use crate::engine::{ObjectId, ObjectInfo, PatchId, PortKind, TypeSymbol};

use super::gui_widget::GuiWidget;
use super::sidebar::ObjectParameter;

/// Width of an inlet or outlet on the box border.
pub const PORT_WIDTH: f32 = 7.0;

/// Radius around an edge that counts as hitting it.
pub const EDGE_HIT_RADIUS: f32 = 5.0;

/// Which side of an object an edge sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Polarity {
    Inlet,
    Outlet,
}

impl Polarity {
    pub fn opposite(self) -> Self {
        match self {
            Polarity::Inlet => Polarity::Outlet,
            Polarity::Outlet => Polarity::Inlet,
        }
    }
}

/// Weak reference to one edge of one box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EdgeRef {
    pub object: ObjectId,
    pub polarity: Polarity,
    pub index: usize,
}

/// One inlet or outlet.
#[derive(Clone, Debug, PartialEq)]
pub struct Edge {
    pub polarity: Polarity,
    pub index: usize,
    pub kind: PortKind,
    /// Highlighted as the target of a connection being formed.
    pub targeted: bool,
}

fn edges(polarity: Polarity, kinds: &[PortKind]) -> Vec<Edge> {
    kinds
        .iter()
        .enumerate()
        .map(|(index, kind)| Edge {
            polarity,
            index,
            kind: *kind,
            targeted: false,
        })
        .collect()
}

fn same_ports(edges: &[Edge], kinds: &[PortKind]) -> bool {
    edges.len() == kinds.len() && edges.iter().zip(kinds).all(|(edge, kind)| edge.kind == *kind)
}

fn engine_bounds(info: &ObjectInfo) -> Rect {
    Rect::from_min_size(
        pos2(info.x as f32, info.y as f32),
        vec2(info.width as f32, info.height as f32),
    )
}

/// The visual proxy for one engine object.
#[derive(Clone, Debug)]
pub struct ObjectBox {
    id: ObjectId,
    pub text: String,
    pub class_name: String,
    pub type_symbol: TypeSymbol,
    /// Bounds in canvas coordinates.
    pub bounds: Rect,
    pub inlets: Vec<Edge>,
    pub outlets: Vec<Edge>,
    pub widget: Option<GuiWidget>,
    pub label: Option<String>,
    pub subpatch: Option<PatchId>,
    pub broken: bool,
}

impl ObjectBox {
    pub fn from_info(info: &ObjectInfo) -> Self {
        Self {
            id: info.id,
            text: info.text.clone(),
            class_name: info.class_name.clone(),
            type_symbol: info.type_symbol,
            bounds: engine_bounds(info),
            inlets: edges(Polarity::Inlet, &info.inlets),
            outlets: edges(Polarity::Outlet, &info.outlets),
            widget: GuiWidget::from_info(info),
            label: info.gui.as_ref().and_then(|gui| gui.label.clone()),
            subpatch: info.subpatch,
            broken: info.broken,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Refreshes the box from the engine. Bounds are only taken over when
    /// `update_position` is set.
    pub fn update_from(&mut self, info: &ObjectInfo, update_position: bool) {
        if self.text != info.text {
            self.text = info.text.clone();
            self.widget = GuiWidget::from_info(info);
        } else if let (Some(widget), Some(state)) = (self.widget.as_mut(), info.gui.as_ref()) {
            widget.update(state);
        }
        self.class_name = info.class_name.clone();
        self.type_symbol = info.type_symbol;
        self.label = info.gui.as_ref().and_then(|gui| gui.label.clone());
        self.subpatch = info.subpatch;
        self.broken = info.broken;
        self.update_ports(info);

        if update_position {
            self.bounds = engine_bounds(info);
        }
    }

    /// Rebuilds the edges when the engine reports different ports.
    pub fn update_ports(&mut self, info: &ObjectInfo) {
        if !same_ports(&self.inlets, &info.inlets) {
            self.inlets = edges(Polarity::Inlet, &info.inlets);
        }
        if !same_ports(&self.outlets, &info.outlets) {
            self.outlets = edges(Polarity::Outlet, &info.outlets);
        }
    }

    pub fn edges(&self, polarity: Polarity) -> &[Edge] {
        match polarity {
            Polarity::Inlet => &self.inlets,
            Polarity::Outlet => &self.outlets,
        }
    }

    pub fn edge_mut(&mut self, polarity: Polarity, index: usize) -> Option<&mut Edge> {
        match polarity {
            Polarity::Inlet => self.inlets.get_mut(index),
            Polarity::Outlet => self.outlets.get_mut(index),
        }
    }

    /// Centre of an edge on the box border, in canvas coordinates.
    pub fn edge_position(&self, polarity: Polarity, index: usize) -> Option<Pos2> {
        let count = self.edges(polarity).len();
        if index >= count {
            return None;
        }

        let span = (self.bounds.width() - PORT_WIDTH).max(0.0);
        let offset = if count > 1 {
            span * index as f32 / (count - 1) as f32
        } else {
            0.0
        };
        let x = self.bounds.left() + offset + PORT_WIDTH / 2.0;
        let y = match polarity {
            Polarity::Inlet => self.bounds.top(),
            Polarity::Outlet => self.bounds.bottom(),
        };
        Some(pos2(x, y))
    }

    pub fn edge_ref(&self, polarity: Polarity, index: usize) -> EdgeRef {
        EdgeRef {
            object: self.id,
            polarity,
            index,
        }
    }

    /// The edge under `point`, if any.
    pub fn edge_at(&self, point: Pos2) -> Option<EdgeRef> {
        [Polarity::Inlet, Polarity::Outlet]
            .into_iter()
            .flat_map(|polarity| (0..self.edges(polarity).len()).map(move |index| (polarity, index)))
            .find(|(polarity, index)| {
                self.edge_position(*polarity, *index)
                    .is_some_and(|centre| centre.distance(point) <= EDGE_HIT_RADIUS)
            })
            .map(|(polarity, index)| self.edge_ref(polarity, index))
    }

    pub fn clear_targets(&mut self) {
        for edge in self.inlets.iter_mut().chain(self.outlets.iter_mut()) {
            edge.targeted = false;
        }
    }

    pub fn contains(&self, point: Pos2) -> bool {
        self.bounds.contains(point)
    }

    pub fn intersects(&self, rect: Rect) -> bool {
        self.bounds.intersects(rect)
    }

    /// Pointer position as a fraction of the box size.
    pub fn relative_position(&self, point: Pos2) -> Vec2 {
        let size = self.bounds.size().max(vec2(1.0, 1.0));
        let offset = point - self.bounds.min;
        vec2(offset.x / size.x, offset.y / size.y)
    }

    /// Has at least one inlet and one outlet.
    pub fn is_multi_port(&self) -> bool {
        !self.inlets.is_empty() && !self.outlets.is_empty()
    }

    pub fn parameters(&self) -> Vec<ObjectParameter> {
        let mut parameters = self
            .widget
            .as_ref()
            .map(GuiWidget::parameters)
            .unwrap_or_default();
        if let Some(label) = &self.label {
            parameters.push(ObjectParameter::new("label", label));
        }
        parameters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::PortKind::{Control, Signal};
    use slotmap::SlotMap;

    fn info(inlets: Vec<PortKind>, outlets: Vec<PortKind>) -> ObjectInfo {
        let mut ids: SlotMap<ObjectId, ()> = SlotMap::with_key();
        ObjectInfo {
            id: ids.insert(()),
            index: 0,
            text: "osc~ 440".to_string(),
            type_symbol: TypeSymbol::Object,
            class_name: "osc~".to_string(),
            x: 100,
            y: 50,
            width: 57,
            height: 22,
            inlets,
            outlets,
            gui: None,
            selected: false,
            subpatch: None,
            broken: false,
        }
    }

    #[test]
    fn test_edges_span_the_border() {
        let object = ObjectBox::from_info(&info(vec![Signal, Control], vec![Signal]));

        assert_eq!(object.edge_position(Polarity::Inlet, 0), Some(pos2(103.5, 50.0)));
        assert_eq!(object.edge_position(Polarity::Inlet, 1), Some(pos2(153.5, 50.0)));
        assert_eq!(object.edge_position(Polarity::Outlet, 0), Some(pos2(103.5, 72.0)));
        assert_eq!(object.edge_position(Polarity::Outlet, 1), None);
    }

    #[test]
    fn test_edge_hit() {
        let object = ObjectBox::from_info(&info(vec![Signal, Control], vec![Signal]));
        let hit = object.edge_at(pos2(152.0, 51.0)).unwrap();
        assert_eq!((hit.polarity, hit.index), (Polarity::Inlet, 1));
        assert!(object.edge_at(pos2(128.0, 61.0)).is_none());
    }

    #[test]
    fn test_position_only_updated_on_request() {
        let original = info(vec![Control], vec![Control]);
        let mut object = ObjectBox::from_info(&original);

        let mut moved = original.clone();
        moved.x = 300;
        moved.outlets = vec![Control, Control];
        object.update_from(&moved, false);
        assert_eq!(object.bounds.left(), 100.0);
        assert_eq!(object.outlets.len(), 2);

        object.update_from(&moved, true);
        assert_eq!(object.bounds.left(), 300.0);
    }

    #[test]
    fn test_targets_survive_unchanged_ports() {
        let original = info(vec![Control], vec![Control]);
        let mut object = ObjectBox::from_info(&original);
        object.inlets[0].targeted = true;

        object.update_ports(&original);
        assert!(object.inlets[0].targeted);

        object.clear_targets();
        assert!(!object.inlets[0].targeted);
    }

    #[test]
    fn test_multi_port() {
        assert!(ObjectBox::from_info(&info(vec![Control], vec![Control])).is_multi_port());
        assert!(!ObjectBox::from_info(&info(vec![Control], vec![])).is_multi_port());
    }
}
