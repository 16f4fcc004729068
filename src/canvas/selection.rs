//! The canvas selection.
//!
//! Holds weak references (ids and connection tuples) in selection order.
//! The canvas evicts entries when it destroys the element they refer to.

use crate::engine::{Connection, ObjectId};

/// Something that can be selected on the canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Selectable {
    Object(ObjectId),
    Connection(Connection),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SelectionSet {
    items: Vec<Selectable>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an item. Returns false if it was already selected.
    pub fn select(&mut self, item: Selectable) -> bool {
        if self.contains(item) {
            return false;
        }
        self.items.push(item);
        true
    }

    /// Removes an item. Returns false if it was not selected.
    pub fn deselect(&mut self, item: Selectable) -> bool {
        let before = self.items.len();
        self.items.retain(|other| *other != item);
        self.items.len() != before
    }

    pub fn set(&mut self, item: Selectable, selected: bool) -> bool {
        if selected {
            self.select(item)
        } else {
            self.deselect(item)
        }
    }

    pub fn contains(&self, item: Selectable) -> bool {
        self.items.contains(&item)
    }

    pub fn contains_object(&self, object: ObjectId) -> bool {
        self.contains(Selectable::Object(object))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[Selectable] {
        &self.items
    }

    /// Selected objects, in selection order.
    pub fn objects(&self) -> Vec<ObjectId> {
        self.items
            .iter()
            .filter_map(|item| match item {
                Selectable::Object(object) => Some(*object),
                Selectable::Connection(_) => None,
            })
            .collect()
    }

    pub fn connections(&self) -> Vec<Connection> {
        self.items
            .iter()
            .filter_map(|item| match item {
                Selectable::Connection(connection) => Some(*connection),
                Selectable::Object(_) => None,
            })
            .collect()
    }

    /// Drops an object and every selected connection touching it.
    pub fn evict_object(&mut self, object: ObjectId) {
        self.items.retain(|item| match item {
            Selectable::Object(other) => *other != object,
            Selectable::Connection(connection) => !connection.touches(object),
        });
    }

    pub fn evict_connection(&mut self, connection: Connection) {
        self.deselect(Selectable::Connection(connection));
    }
}
