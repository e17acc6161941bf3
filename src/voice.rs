use rand::Rng;
use tracing::trace;

use crate::backend::{BackendFactory, PlaybackBackend};
use crate::cue::{CueParameters, Position};
use crate::error::{Result, SoundError};
use crate::pool::{Pool, PoolPolicy, SlotId};

/// A voice is identified by its pool slot.
pub type VoiceId = SlotId;

pub const DEFAULT_JITTER_MIN: f32 = -0.05;
pub const DEFAULT_JITTER_MAX: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Pooled,
    Active,
}

/// Completion-watch step. `Armed` means the next poll that finds the
/// backend silent reports completion, once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Watch {
    Idle,
    Armed,
}

/// A reusable playback slot bound to one backend stream for its whole
/// lifetime.
pub struct Voice {
    backend: Box<dyn PlaybackBackend>,
    state: VoiceState,
    params: Option<CueParameters>,
    position: Position,
    watch: Watch,
    lease: u64,
}

impl std::fmt::Debug for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Voice")
            .field("state", &self.state)
            .field("params", &self.params)
            .field("position", &self.position)
            .field("watch", &self.watch)
            .field("lease", &self.lease)
            .finish_non_exhaustive()
    }
}

impl Voice {
    pub fn new(backend: Box<dyn PlaybackBackend>) -> Self {
        Self {
            backend,
            state: VoiceState::Pooled,
            params: None,
            position: Position::ORIGIN,
            watch: Watch::Idle,
            lease: 0,
        }
    }

    /// Copy a cue into this voice. Does not touch playback.
    pub fn configure(&mut self, params: CueParameters) -> Result<()> {
        params.validate()?;
        self.params = Some(params);
        Ok(())
    }

    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    /// Offset the configured pitch by a value drawn from `[min, max)`.
    /// Returns the offset. Only later `play` calls hear it.
    pub fn apply_pitch_jitter<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        min: f32,
        max: f32,
    ) -> Result<f32> {
        let params = self.params.as_mut().ok_or_else(|| {
            SoundError::InvalidParameters("pitch jitter before configure".to_string())
        })?;

        let offset = if min < max { rng.gen_range(min..max) } else { min };
        params.pitch += offset;
        Ok(offset)
    }

    /// Start playback, cancelling whatever this voice was already playing.
    pub fn play(&mut self) -> Result<()> {
        let params = self.params.as_ref().ok_or_else(|| {
            SoundError::InvalidParameters("voice played before configure".to_string())
        })?;

        if self.watch == Watch::Armed {
            self.watch = Watch::Idle;
            self.backend.stop();
        }

        self.backend.start(params, self.position)?;
        self.watch = Watch::Armed;
        Ok(())
    }

    /// Stop immediately. Disarms the completion watch first so a stopped
    /// voice never reports natural completion.
    pub fn stop(&mut self) {
        self.watch = Watch::Idle;
        self.backend.stop();
    }

    /// One completion-watch step. True exactly once per `play`, on the
    /// first poll after the backend goes silent.
    pub fn poll_completion(&mut self) -> bool {
        if self.watch != Watch::Armed {
            return false;
        }
        if self.backend.is_producing_sound() {
            return false;
        }
        self.watch = Watch::Idle;
        true
    }

    pub fn is_watching(&self) -> bool {
        self.watch == Watch::Armed
    }

    pub fn is_producing_sound(&self) -> bool {
        self.backend.is_producing_sound()
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    pub fn params(&self) -> Option<&CueParameters> {
        self.params.as_ref()
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Bumped on every take, so a stale reference to a recycled voice can
    /// be told apart from the current use.
    pub fn lease(&self) -> u64 {
        self.lease
    }

    fn mark_taken(&mut self) {
        self.state = VoiceState::Active;
        self.lease += 1;
    }

    fn mark_returned(&mut self) {
        self.stop();
        self.backend.reset();
        self.params = None;
        self.position = Position::ORIGIN;
        self.state = VoiceState::Pooled;
    }
}

/// Pool hooks for voices: one backend per voice from the factory.
pub struct VoicePolicy {
    factory: Box<dyn BackendFactory>,
}

impl VoicePolicy {
    pub fn new(factory: Box<dyn BackendFactory>) -> Self {
        Self { factory }
    }
}

impl PoolPolicy<Voice> for VoicePolicy {
    fn create(&mut self) -> Result<Voice> {
        Ok(Voice::new(self.factory.create()?))
    }

    fn on_take(&mut self, voice: &mut Voice) {
        voice.mark_taken();
    }

    fn on_return(&mut self, voice: &mut Voice) {
        voice.mark_returned();
    }

    fn on_destroy(&mut self, mut voice: Voice) {
        voice.stop();
        trace!(lease = voice.lease, "voice destroyed");
    }
}

pub type VoicePool = Pool<Voice, VoicePolicy>;

impl Pool<Voice, VoicePolicy> {
    pub fn with_factory(
        factory: Box<dyn BackendFactory>,
        capacity: usize,
        max_size: usize,
        strict: bool,
    ) -> Self {
        Pool::new(VoicePolicy::new(factory), capacity, max_size, strict)
    }
}
