//! Undo history for a patch graph.
//!
//! Every editing operation records one [`UndoAction`] describing how to
//! reverse and replay it. Actions are collected into named [`UndoEntry`]s;
//! normally one per operation, but a group can be held open so that several
//! operations (a multi-object delete, a recreate that also restores
//! connections) undo as one step.

use super::object_class::ObjectClass;
use super::object_spec::ObjectSpec;
use super::patch_graph::{Connection, ObjectId};

/// Maximum number of entries kept on the undo side.
pub const DEFAULT_UNDO_LIMIT: usize = 256;

/// One reversible edit.
#[derive(Clone, Debug, PartialEq)]
pub enum UndoAction {
    /// An object was created at `position` in the object order.
    Create { object: ObjectId, position: usize },
    /// An object was removed from `position`, taking `connections` with it.
    Remove {
        object: ObjectId,
        position: usize,
        connections: Vec<Connection>,
    },
    /// A connection was made.
    Connect(Connection),
    /// A connection was removed.
    Disconnect(Connection),
    /// Objects were moved by a delta.
    Move {
        objects: Vec<ObjectId>,
        dx: i32,
        dy: i32,
    },
    /// An object's text was replaced in place. Connections that no longer
    /// fit the new ports were dropped.
    Retext {
        object: ObjectId,
        from: (ObjectSpec, ObjectClass),
        to: (ObjectSpec, ObjectClass),
        dropped: Vec<Connection>,
    },
    /// An object moved within the object order.
    Arrange {
        object: ObjectId,
        from: usize,
        to: usize,
    },
    /// A patch metadata entry changed.
    SetInfo {
        key: String,
        from: Option<String>,
        to: Option<String>,
    },
}

/// A named group of actions undone and redone together.
#[derive(Clone, Debug, PartialEq)]
pub struct UndoEntry {
    pub name: &'static str,
    pub actions: Vec<UndoAction>,
}

/// Done/undone stacks plus an optional open group.
#[derive(Debug)]
pub struct UndoStack {
    done: Vec<UndoEntry>,
    undone: Vec<UndoEntry>,
    group: Option<UndoEntry>,
    limit: usize,
}

impl UndoStack {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_UNDO_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            done: Vec::new(),
            undone: Vec::new(),
            group: None,
            limit: limit.max(1),
        }
    }

    /// Records an action. Joins the open group if there is one; otherwise
    /// becomes its own entry. Any redo history is discarded.
    pub fn record(&mut self, name: &'static str, action: UndoAction) {
        if let Some(group) = &mut self.group {
            group.actions.push(action);
            return;
        }

        self.push_done(UndoEntry {
            name,
            actions: vec![action],
        });
        self.undone.clear();
    }

    /// Opens a group. Returns false if one is already open, in which case
    /// further actions keep joining the existing group.
    pub fn begin_group(&mut self, name: &'static str) -> bool {
        if self.group.is_some() {
            return false;
        }
        self.group = Some(UndoEntry {
            name,
            actions: Vec::new(),
        });
        true
    }

    /// Closes the open group. Empty groups leave no entry behind.
    pub fn end_group(&mut self) {
        if let Some(group) = self.group.take() {
            if !group.actions.is_empty() {
                self.push_done(group);
                self.undone.clear();
            }
        }
    }

    /// Whether a group is currently open.
    pub fn in_group(&self) -> bool {
        self.group.is_some()
    }

    /// Takes the newest entry for undoing. Closes any open group first.
    pub fn take_undo(&mut self) -> Option<UndoEntry> {
        self.end_group();
        self.done.pop()
    }

    /// Takes the newest undone entry for redoing.
    pub fn take_redo(&mut self) -> Option<UndoEntry> {
        self.end_group();
        self.undone.pop()
    }

    /// Files an entry that was just undone.
    pub fn push_undone(&mut self, entry: UndoEntry) {
        self.undone.push(entry);
    }

    /// Files an entry that was just redone (or newly recorded).
    pub fn push_done(&mut self, entry: UndoEntry) {
        self.done.push(entry);
        if self.done.len() > self.limit {
            let excess = self.done.len() - self.limit;
            self.done.drain(..excess);
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.done.is_empty() || self.group.as_ref().is_some_and(|g| !g.actions.is_empty())
    }

    pub fn can_redo(&self) -> bool {
        !self.undone.is_empty()
    }

    /// Name of the entry undo would revert.
    pub fn undo_name(&self) -> Option<&'static str> {
        self.done.last().map(|entry| entry.name)
    }

    /// Name of the entry redo would replay.
    pub fn redo_name(&self) -> Option<&'static str> {
        self.undone.last().map(|entry| entry.name)
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn ids(n: usize) -> Vec<ObjectId> {
        let mut map: SlotMap<ObjectId, ()> = SlotMap::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    fn moved(id: ObjectId) -> UndoAction {
        UndoAction::Move {
            objects: vec![id],
            dx: 1,
            dy: 1,
        }
    }

    #[test]
    fn test_record_and_take() {
        let id = ids(1)[0];
        let mut stack = UndoStack::new();
        assert!(!stack.can_undo());

        stack.record("motion", moved(id));
        assert!(stack.can_undo());
        assert_eq!(stack.undo_name(), Some("motion"));

        let entry = stack.take_undo().unwrap();
        assert_eq!(entry.actions.len(), 1);
        stack.push_undone(entry);
        assert!(stack.can_redo());
        assert!(!stack.can_undo());
    }

    #[test]
    fn test_new_action_clears_redo() {
        let id = ids(1)[0];
        let mut stack = UndoStack::new();
        stack.record("motion", moved(id));
        let entry = stack.take_undo().unwrap();
        stack.push_undone(entry);

        stack.record("motion", moved(id));
        assert!(!stack.can_redo());
    }

    #[test]
    fn test_group_collects_actions() {
        let objects = ids(3);
        let mut stack = UndoStack::new();

        assert!(stack.begin_group("clear"));
        assert!(!stack.begin_group("clear"));
        for id in &objects {
            stack.record("remove", moved(*id));
        }
        stack.end_group();

        assert_eq!(stack.undo_name(), Some("clear"));
        let entry = stack.take_undo().unwrap();
        assert_eq!(entry.actions.len(), 3);
        assert!(stack.take_undo().is_none());
    }

    #[test]
    fn test_empty_group_leaves_nothing() {
        let mut stack = UndoStack::new();
        stack.begin_group("clear");
        stack.end_group();
        assert!(!stack.can_undo());
    }

    #[test]
    fn test_limit_drops_oldest() {
        let id = ids(1)[0];
        let mut stack = UndoStack::with_limit(2);
        stack.record("a", moved(id));
        stack.record("b", moved(id));
        stack.record("c", moved(id));

        assert_eq!(stack.take_undo().map(|e| e.name), Some("c"));
        assert_eq!(stack.take_undo().map(|e| e.name), Some("b"));
        assert!(stack.take_undo().is_none());
    }
}
