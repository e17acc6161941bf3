pub mod backend;
pub mod builder;
pub mod clip;
pub mod config;
pub mod cue;
pub mod driver;
pub mod error;
pub mod global;
pub mod manager;
pub mod pool;
pub mod rodio_backend;
pub mod voice;

// Re-exportar tipos públicos para uso externo
pub use backend::{BackendFactory, PlaybackBackend, SimClock, SimulatedBackend, SimulatedBackendFactory};
pub use builder::{PlaybackRequest, PlaybackRequestBuilder};
pub use config::{EvictionPolicy, ManagerConfig};
pub use cue::{CueBank, CueParameters, Position, RolloffMode};
pub use driver::TickDriver;
pub use error::{Result, SoundError};
pub use manager::{ManagerStats, PlaybackManager, VoiceHandle};
pub use pool::{Pool, PoolPolicy, PoolStats, SlotId};
pub use rodio_backend::{RodioBackend, RodioBackendFactory, RodioDevice};
pub use voice::{Voice, VoiceId, VoicePool, VoiceState};

// Versión y metadatos del crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
