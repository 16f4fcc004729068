//! Engine hosts.
//!
//! The engine processor needs something to call it regularly: the audio
//! device callback when a device is available, otherwise a plain thread
//! ticking at a fixed block period. [`launch`] wires up the queues and
//! picks the host.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::audio_engine::AudioEngine;
use super::bridge::{EngineBridge, TimeoutPolicy};
use super::channels::EngineChannels;
use super::instance::Instance;
use super::processor::EngineProcessor;
use crate::config::EngineConfig;

/// Runs the processor on its own thread until stopped or dropped.
pub struct HeadlessEngine {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl HeadlessEngine {
    /// Spawns the processing thread.
    pub fn start(processor: Arc<Mutex<EngineProcessor>>, block_period: Duration) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let thread = thread::Builder::new()
            .name("engine".to_string())
            .spawn(move || {
                while flag.load(Ordering::Acquire) {
                    processor
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .tick();
                    thread::sleep(block_period);
                }
            });

        let thread = match thread {
            Ok(handle) => Some(handle),
            Err(error) => {
                log::error!("failed to spawn engine thread: {}", error);
                running.store(false, Ordering::Release);
                None
            }
        };

        Self { running, thread }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire) && self.thread.is_some()
    }

    /// Stops the thread and waits for it. The processor is dropped with it.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                log::error!("engine thread panicked");
            }
        }
    }
}

impl Drop for HeadlessEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Whichever host is driving the engine.
pub enum EngineHost {
    Audio(AudioEngine),
    Headless(HeadlessEngine),
}

impl EngineHost {
    pub fn is_running(&self) -> bool {
        match self {
            EngineHost::Audio(engine) => engine.is_running(),
            EngineHost::Headless(engine) => engine.is_running(),
        }
    }

    pub fn description(&self) -> String {
        match self {
            EngineHost::Audio(engine) => format!("audio device '{}'", engine.current_device_name()),
            EngineHost::Headless(_) => "headless".to_string(),
        }
    }
}

/// Builds the queues and processor around `instance` and starts a host.
///
/// Tries the audio device first when configured to; any audio failure
/// falls back to the headless host.
pub fn launch(config: &EngineConfig, instance: Instance) -> (EngineBridge, EngineHost) {
    let (ui, engine) =
        EngineChannels::new(config.mutation_capacity, config.event_capacity).split();
    let bridge = EngineBridge::new(
        ui,
        TimeoutPolicy {
            reply_timeout: Duration::from_millis(config.reply_timeout_ms),
            enqueue_timeout: Duration::from_millis(config.enqueue_timeout_ms),
        },
    );
    let processor = Arc::new(Mutex::new(EngineProcessor::new(instance, engine)));

    if config.use_audio_device {
        match AudioEngine::new() {
            Ok(mut audio) => match audio.start_with_processor(Arc::clone(&processor)) {
                Ok(()) => return (bridge, EngineHost::Audio(audio)),
                Err(error) => log::warn!("{}, running headless", error),
            },
            Err(error) => log::warn!("{}, running headless", error),
        }
    }

    let period = Duration::from_micros(config.block_period_us);
    (bridge, EngineHost::Headless(HeadlessEngine::start(processor, period)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headless_config() -> EngineConfig {
        EngineConfig {
            use_audio_device: false,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_headless_launch_processes_mutations() {
        let (bridge, host) = launch(&headless_config(), Instance::new());
        assert!(host.is_running());
        assert_eq!(host.description(), "headless");

        bridge
            .enqueue(|instance| {
                instance.new_patch("main");
            })
            .unwrap();
        assert_eq!(bridge.call(|instance| instance.patch_count()), Ok(1));
    }

    #[test]
    fn test_dropping_host_disconnects_bridge() {
        let (bridge, host) = launch(&headless_config(), Instance::new());
        bridge.wait_for_state_update().unwrap();

        drop(host);
        assert!(bridge.is_engine_gone());
        assert!(bridge.wait_for_state_update().is_err());
    }

    #[test]
    fn test_state_changed_events_arrive() {
        let (bridge, _host) = launch(&headless_config(), Instance::new());
        bridge.enqueue(|_| {}).unwrap();
        bridge.wait_for_state_update().unwrap();

        // The announcement follows the batch, so it may trail the reply
        let deadline = std::time::Instant::now() + Duration::from_secs(1);
        let mut seen = false;
        while !seen && std::time::Instant::now() < deadline {
            seen = bridge
                .drain_events()
                .iter()
                .any(|event| matches!(event, crate::engine::EngineEvent::StateChanged { .. }));
            thread::sleep(Duration::from_millis(1));
        }
        assert!(seen);
    }
}
