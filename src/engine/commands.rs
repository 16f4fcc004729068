//! Engine Mutations and Events
//!
//! Defines what flows between the UI thread and the engine thread. The UI
//! never touches engine state directly: it queues [`Mutation`]s, closures
//! that the engine runs against its [`Instance`] in the order they were
//! queued. The engine answers with [`EngineEvent`]s.
//! All types here must be Send + 'static for safe cross-thread communication.

use super::instance::{Instance, PatchId};

/// A deferred edit run on the engine thread.
///
/// Mutations run strictly in enqueue order and each one sees the effects
/// of all mutations queued before it.
pub type Mutation = Box<dyn FnOnce(&mut Instance) + Send + 'static>;

/// Events sent from the engine to the UI thread.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A batch of mutations was applied.
    StateChanged {
        /// Number of mutations in the batch.
        mutations: usize,
    },

    /// A patch serialised its selection for the clipboard.
    ClipboardText {
        /// The patch that was copied from.
        patch: PatchId,
        /// Serialised selection.
        text: String,
    },

    /// DSP was switched on or off.
    DspState(bool),

    /// A line of engine console output (errors, print objects).
    Print(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_debug() {
        let event = EngineEvent::DspState(true);
        assert!(format!("{:?}", event).contains("DspState"));
    }

    #[test]
    fn test_event_clone() {
        let event = EngineEvent::Print("error: connection failed".to_string());
        assert_eq!(event.clone(), event);
    }

    #[test]
    fn test_mutation_runs_against_instance() {
        let mut instance = Instance::new();
        let mutation: Mutation = Box::new(|instance: &mut Instance| {
            instance.new_patch("from mutation");
        });
        mutation(&mut instance);
        assert_eq!(instance.patch_count(), 1);
    }

    #[test]
    fn test_mutation_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Mutation>();
    }

    #[test]
    fn test_event_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<EngineEvent>();
    }
}
