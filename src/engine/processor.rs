//! Engine Processor
//!
//! Owns the engine [`Instance`] on the engine thread. Each block it first
//! drains the mutation queue, applying mutations in order, then publishes
//! the events they raised. The processor is driven either by the audio
//! device callback or by a headless timer thread.

use super::channels::EngineHandle;
use super::commands::EngineEvent;
use super::instance::Instance;

/// Runs queued mutations against the instance, once per block.
pub struct EngineProcessor {
    /// The engine state.
    instance: Instance,
    /// Handle for receiving mutations from the UI thread.
    engine_handle: EngineHandle,
    /// Number of blocks processed so far.
    blocks: u64,
}

impl EngineProcessor {
    pub fn new(instance: Instance, engine_handle: EngineHandle) -> Self {
        Self {
            instance,
            engine_handle,
            blocks: 0,
        }
    }

    /// Applies all pending mutations in enqueue order.
    ///
    /// Returns how many were applied. A non-empty batch is announced with a
    /// [`EngineEvent::StateChanged`] after the events the batch raised.
    pub fn process_mutations(&mut self) -> usize {
        let mut applied = 0;
        let instance = &mut self.instance;
        self.engine_handle.process_mutations(|mutation| {
            mutation(instance);
            applied += 1;
        });

        if applied > 0 {
            self.instance.emit(EngineEvent::StateChanged { mutations: applied });
        }
        self.flush_events();
        applied
    }

    /// Processes one block of audio.
    ///
    /// Mutations are applied first; the output is silent since the patch
    /// objects carry no signal processing of their own.
    pub fn process(&mut self, output: &mut [f32], _channels: usize) {
        self.process_mutations();
        output.fill(0.0);
        self.blocks += 1;
    }

    /// Processes one block without an audio buffer.
    pub fn tick(&mut self) {
        self.process_mutations();
        self.blocks += 1;
    }

    pub fn blocks_processed(&self) -> u64 {
        self.blocks
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    fn flush_events(&mut self) {
        for event in self.instance.take_events() {
            if let Err(event) = self.engine_handle.send_event(event) {
                log::warn!("event queue full, dropping {:?}", event);
            }
        }
    }
}
