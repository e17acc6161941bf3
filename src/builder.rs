use crate::cue::{CueParameters, Position};
use crate::error::{Result, SoundError};
use crate::manager::{PlaybackManager, VoiceHandle};

/// A validated play request.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackRequest {
    pub cue: CueParameters,
    pub position: Position,
    pub pitch_jitter: bool,
}

/// Fluent accumulator for a play request.
///
/// Submitting twice is allowed and makes two independent playback
/// attempts with the same settings.
pub struct PlaybackRequestBuilder<'a> {
    manager: &'a mut PlaybackManager,
    cue: Option<CueParameters>,
    position: Position,
    pitch_jitter: bool,
}

impl<'a> PlaybackRequestBuilder<'a> {
    pub(crate) fn new(manager: &'a mut PlaybackManager) -> Self {
        Self {
            manager,
            cue: None,
            position: Position::ORIGIN,
            pitch_jitter: false,
        }
    }

    pub fn with_cue(mut self, cue: CueParameters) -> Self {
        self.cue = Some(cue);
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn with_pitch_jitter(mut self) -> Self {
        self.pitch_jitter = true;
        self
    }

    pub fn build(&self) -> Result<PlaybackRequest> {
        let cue = self.cue.clone().ok_or(SoundError::MissingCue)?;
        Ok(PlaybackRequest {
            cue,
            position: self.position,
            pitch_jitter: self.pitch_jitter,
        })
    }

    /// Run admission and play. `Ok(false)` means the sound was dropped
    /// because no voice was available.
    pub fn submit(&mut self) -> Result<bool> {
        Ok(self.submit_tracked()?.is_some())
    }

    /// Like [`submit`](Self::submit) but returns a handle to the sound,
    /// for stopping it later.
    pub fn submit_tracked(&mut self) -> Result<Option<VoiceHandle>> {
        let request = self.build()?;
        self.manager.play(&request)
    }
}
