//! Engine module
//!
//! The embedded dataflow engine and the queue that feeds it.
//! Holds the patch model, the mutation bridge, and the hosts that drive it.

pub mod audio_engine;
pub mod bridge;
pub mod channels;
pub mod commands;
pub mod host;
pub mod instance;
pub mod object_class;
pub mod object_spec;
pub mod patch_graph;
pub mod processor;
pub mod undo;
pub mod validation;

pub use audio_engine::{AudioEngine, AudioError};
pub use bridge::{BridgeError, EngineBridge, TimeoutPolicy};
pub use channels::{EngineChannels, EngineHandle, UiHandle};
pub use commands::{EngineEvent, Mutation};
pub use host::{launch, EngineHost, HeadlessEngine};
pub use instance::{
    ConnectionInfo, CreateError, GuiState, Instance, ObjectInfo, PatchId, PatchSnapshot,
};
pub use object_class::{GuiKind, ObjectCatalog, ObjectClass, PortKind};
pub use object_spec::{Atom, ObjectSpec, TypeSymbol};
pub use patch_graph::{connection_key, Connection, ObjectId, PatchGraph};
pub use processor::EngineProcessor;
pub use validation::ConnectionError;
