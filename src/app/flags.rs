//! Editor-wide flags shared by every canvas.
//!
//! The window layer owns a [`SharedFlags`] and changes it from menus and
//! shortcuts. Each canvas subscribes once and receives the full flag set
//! whenever something changes, then works out its own reaction when it
//! polls.

use std::cell::RefCell;
use std::rc::Rc;

use crossbeam_channel::{Receiver, Sender};

/// The flag set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EditorFlags {
    /// Run mode: pointer actions operate widgets instead of editing.
    pub locked: bool,
    /// Temporary lock while the command key is held.
    pub command_locked: bool,
    /// Hides connections and disables editing.
    pub presentation_mode: bool,
    pub grid_enabled: bool,
}

impl Default for EditorFlags {
    fn default() -> Self {
        Self {
            locked: false,
            command_locked: false,
            presentation_mode: false,
            grid_enabled: true,
        }
    }
}

struct FlagsInner {
    flags: EditorFlags,
    subscribers: Vec<Sender<EditorFlags>>,
}

/// Single-threaded shared flag state with change subscriptions.
#[derive(Clone)]
pub struct SharedFlags {
    inner: Rc<RefCell<FlagsInner>>,
}

impl SharedFlags {
    pub fn new(flags: EditorFlags) -> Self {
        Self {
            inner: Rc::new(RefCell::new(FlagsInner {
                flags,
                subscribers: Vec::new(),
            })),
        }
    }

    pub fn get(&self) -> EditorFlags {
        self.inner.borrow().flags
    }

    /// Receives the flag set after every change.
    pub fn subscribe(&self) -> Receiver<EditorFlags> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.inner.borrow_mut().subscribers.push(tx);
        rx
    }

    /// Applies `change` and publishes the result if anything differs.
    pub fn update(&self, change: impl FnOnce(&mut EditorFlags)) {
        let mut inner = self.inner.borrow_mut();
        let mut flags = inner.flags;
        change(&mut flags);
        if flags == inner.flags {
            return;
        }
        inner.flags = flags;
        // Subscribers that went away are dropped
        inner.subscribers.retain(|tx| tx.send(flags).is_ok());
    }

    pub fn set_locked(&self, locked: bool) {
        self.update(|flags| flags.locked = locked);
    }

    pub fn set_command_locked(&self, command_locked: bool) {
        self.update(|flags| flags.command_locked = command_locked);
    }

    pub fn set_presentation_mode(&self, presentation_mode: bool) {
        self.update(|flags| flags.presentation_mode = presentation_mode);
    }

    pub fn set_grid_enabled(&self, grid_enabled: bool) {
        self.update(|flags| flags.grid_enabled = grid_enabled);
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }
}

impl Default for SharedFlags {
    fn default() -> Self {
        Self::new(EditorFlags::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_on_change_only() {
        let flags = SharedFlags::default();
        let rx = flags.subscribe();

        flags.set_locked(false);
        assert!(rx.try_recv().is_err());

        flags.set_locked(true);
        let received = rx.try_recv().unwrap();
        assert!(received.locked);
        assert!(received.grid_enabled);
        assert!(flags.get().locked);
    }

    #[test]
    fn test_every_subscriber_is_notified() {
        let flags = SharedFlags::default();
        let first = flags.subscribe();
        let second = flags.subscribe();

        flags.set_presentation_mode(true);
        assert!(first.try_recv().unwrap().presentation_mode);
        assert!(second.try_recv().unwrap().presentation_mode);
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let flags = SharedFlags::default();
        let kept = flags.subscribe();
        drop(flags.subscribe());
        assert_eq!(flags.subscriber_count(), 2);

        flags.set_grid_enabled(false);
        assert_eq!(flags.subscriber_count(), 1);
        assert!(!kept.try_recv().unwrap().grid_enabled);
    }
}
