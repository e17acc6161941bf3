use std::path::PathBuf;
use thiserror::Error;

use crate::voice::VoiceId;

/// Errors raised by the voice pool and playback manager.
///
/// Saturation (full active set, exhausted pool) is not an error at the
/// request level: `submit()` reports it as "not played". The variants here
/// cover misuse and genuine faults.
#[derive(Debug, Error)]
pub enum SoundError {
    /// Cue parameters are malformed (missing clip, bad numeric field).
    #[error("Invalid cue parameters: {0}")]
    InvalidParameters(String),

    /// A request was submitted without a cue.
    #[error("Playback request has no cue")]
    MissingCue,

    /// Every voice the pool may create is checked out.
    #[error("Voice pool exhausted (max: {max})")]
    PoolExhausted { max: usize },

    /// The pool was torn down.
    #[error("Voice pool is closed")]
    PoolClosed,

    /// A voice was released while not checked out.
    #[error("Voice {0} released twice")]
    DoubleRelease(VoiceId),

    /// The id does not name a voice this pool created.
    #[error("Unknown voice {0}")]
    UnknownVoice(VoiceId),

    /// The playback backend failed to start or stop a stream.
    #[error("Playback backend error: {0}")]
    Backend(String),

    /// A clip could not be opened or probed.
    #[error("Clip error for '{path}': {message}")]
    Clip { path: PathBuf, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    /// No manager is installed in the global slot.
    #[error("Playback manager not initialized")]
    NotInitialized,

    /// The global manager was accessed from inside its own callback.
    #[error("Playback manager is already in use")]
    ManagerBusy,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SoundError {
    /// True for conditions that mean "drop this sound", not "caller bug".
    pub fn is_saturation(&self) -> bool {
        matches!(self, SoundError::PoolExhausted { .. })
    }
}

pub type Result<T> = std::result::Result<T, SoundError>;
