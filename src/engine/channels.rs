//! Engine Channels
//!
//! Lock-free communication between the UI thread and the engine thread.
//! Uses rtrb ring buffers for SPSC (single-producer, single-consumer) queues.

use rtrb::{Consumer, Producer, RingBuffer};

use super::commands::{EngineEvent, Mutation};

/// Default buffer size for the mutation queue (UI -> Engine).
pub const DEFAULT_MUTATION_BUFFER_SIZE: usize = 1024;

/// Default buffer size for the event queue (Engine -> UI).
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

/// Holds both directions of communication channels.
/// Split into producer/consumer pairs for the two threads.
pub struct EngineChannels {
    /// Send mutations from UI to engine.
    pub mutation_tx: Producer<Mutation>,
    /// Receive mutations in engine from UI.
    pub mutation_rx: Consumer<Mutation>,
    /// Send events from engine to UI.
    pub event_tx: Producer<EngineEvent>,
    /// Receive events in UI from engine.
    pub event_rx: Consumer<EngineEvent>,
}

impl EngineChannels {
    /// Creates both queues. Capacities are counted in items.
    pub fn new(mutation_capacity: usize, event_capacity: usize) -> Self {
        let (mutation_tx, mutation_rx) = RingBuffer::new(mutation_capacity);
        let (event_tx, event_rx) = RingBuffer::new(event_capacity);

        Self {
            mutation_tx,
            mutation_rx,
            event_tx,
            event_rx,
        }
    }

    /// Split the channels into UI-side and Engine-side handles.
    /// This consumes self and returns two handles that can be sent to different threads.
    pub fn split(self) -> (UiHandle, EngineHandle) {
        let ui_handle = UiHandle {
            mutation_tx: self.mutation_tx,
            event_rx: self.event_rx,
        };
        let engine_handle = EngineHandle {
            mutation_rx: self.mutation_rx,
            event_tx: self.event_tx,
        };
        (ui_handle, engine_handle)
    }
}

/// UI-side handle for communicating with the engine.
/// Holds the mutation producer and event consumer.
pub struct UiHandle {
    mutation_tx: Producer<Mutation>,
    event_rx: Consumer<EngineEvent>,
}

impl UiHandle {
    /// Queues a mutation without waiting for space. A full queue hands the
    /// mutation back.
    pub fn send_mutation(&mut self, mutation: Mutation) -> Result<(), Mutation> {
        self.mutation_tx
            .push(mutation)
            .map_err(|rtrb::PushError::Full(mutation)| mutation)
    }

    /// Next pending engine event, if any.
    pub fn recv_event(&mut self) -> Option<EngineEvent> {
        self.event_rx.pop().ok()
    }

    /// Everything the engine has published so far.
    pub fn drain_events(&mut self) -> impl Iterator<Item = EngineEvent> + '_ {
        std::iter::from_fn(|| self.recv_event())
    }

    /// True once the engine side has been dropped; nothing queued from now
    /// on will ever run.
    pub fn is_engine_gone(&self) -> bool {
        self.mutation_tx.is_abandoned()
    }
}

/// Engine-side handle for communicating with the UI.
/// Holds the mutation consumer and event producer.
///
/// Receiving and sending never block.
pub struct EngineHandle {
    mutation_rx: Consumer<Mutation>,
    event_tx: Producer<EngineEvent>,
}

impl EngineHandle {
    /// Next queued mutation, if any.
    pub fn recv_mutation(&mut self) -> Option<Mutation> {
        self.mutation_rx.pop().ok()
    }

    /// Hands every queued mutation to `handler`, oldest first.
    pub fn process_mutations<F>(&mut self, mut handler: F)
    where
        F: FnMut(Mutation),
    {
        while let Some(mutation) = self.recv_mutation() {
            handler(mutation);
        }
    }

    /// Publishes an event. A full queue hands the event back.
    pub fn send_event(&mut self, event: EngineEvent) -> Result<(), EngineEvent> {
        self.event_tx
            .push(event)
            .map_err(|rtrb::PushError::Full(event)| event)
    }

    /// Publishes an event, dropping it when the UI is not keeping up.
    pub fn send_event_lossy(&mut self, event: EngineEvent) {
        let _ = self.event_tx.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::instance::Instance;

    fn named(name: &'static str) -> Mutation {
        Box::new(move |instance: &mut Instance| {
            instance.new_patch(name);
        })
    }

    #[test]
    fn test_channel_creation() {
        let channels = EngineChannels::new(64, 32);
        assert_eq!(channels.mutation_tx.slots(), 64);
        assert_eq!(channels.event_tx.slots(), 32);
    }

    #[test]
    fn test_mutation_send_receive() {
        let channels = EngineChannels::new(64, 64);
        let (mut ui, mut engine) = channels.split();

        assert!(ui.send_mutation(named("a")).is_ok());

        let mut instance = Instance::new();
        let mutation = engine.recv_mutation();
        assert!(mutation.is_some());
        if let Some(mutation) = mutation {
            mutation(&mut instance);
        }
        assert_eq!(instance.patch_count(), 1);
    }

    #[test]
    fn test_event_send_receive() {
        let channels = EngineChannels::new(64, 64);
        let (mut ui, mut engine) = channels.split();

        let result = engine.send_event(EngineEvent::StateChanged { mutations: 3 });
        assert!(result.is_ok());

        assert_eq!(ui.recv_event(), Some(EngineEvent::StateChanged { mutations: 3 }));
    }

    #[test]
    fn test_buffer_full_handling() {
        let channels = EngineChannels::new(2, 2);
        let (mut ui, _engine) = channels.split();

        assert!(ui.send_mutation(named("a")).is_ok());
        assert!(ui.send_mutation(named("b")).is_ok());

        // The rejected mutation comes back and can still be run
        let rejected = ui.send_mutation(named("c"));
        let mut instance = Instance::new();
        if let Err(mutation) = rejected {
            mutation(&mut instance);
        } else {
            panic!("Full buffer accepted a mutation");
        }
        assert_eq!(instance.patch_count(), 1);
    }

    #[test]
    fn test_process_mutations_in_order() {
        let channels = EngineChannels::new(64, 64);
        let (mut ui, mut engine) = channels.split();

        for name in ["first", "second", "third"] {
            assert!(ui.send_mutation(named(name)).is_ok());
        }

        let mut instance = Instance::new();
        engine.process_mutations(|mutation| mutation(&mut instance));

        let names: Vec<String> = instance
            .patch_ids()
            .into_iter()
            .filter_map(|id| instance.patch(id).map(|patch| patch.name().to_string()))
            .collect();
        assert_eq!(names, vec!["first", "second", "third"]);
        assert!(engine.recv_mutation().is_none());
    }

    #[test]
    fn test_drain_events() {
        let channels = EngineChannels::new(64, 64);
        let (mut ui, mut engine) = channels.split();

        engine.send_event_lossy(EngineEvent::DspState(true));
        engine.send_event_lossy(EngineEvent::Print("hello".into()));
        engine.send_event_lossy(EngineEvent::StateChanged { mutations: 1 });

        let events: Vec<_> = ui.drain_events().collect();
        assert_eq!(events.len(), 3);

        assert!(ui.recv_event().is_none());
    }

    #[test]
    fn test_lossy_event_send() {
        let channels = EngineChannels::new(1, 1);
        let (mut ui, mut engine) = channels.split();

        engine.send_event_lossy(EngineEvent::DspState(true));
        engine.send_event_lossy(EngineEvent::DspState(false)); // Should be dropped

        assert_eq!(ui.recv_event(), Some(EngineEvent::DspState(true)));
        assert!(ui.recv_event().is_none());
    }

    #[test]
    fn test_engine_gone_detection() {
        let channels = EngineChannels::new(4, 4);
        let (ui, engine) = channels.split();

        assert!(!ui.is_engine_gone());
        drop(engine);
        assert!(ui.is_engine_gone());
    }

    #[test]
    fn test_handles_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<UiHandle>();
        assert_send::<EngineHandle>();
    }
}
