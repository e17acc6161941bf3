use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clip;
use crate::error::{Result, SoundError};

/// World-space position of a sound source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub const ORIGIN: Position = Position { x: 0.0, y: 0.0, z: 0.0 };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RolloffMode {
    #[default]
    Logarithmic,
    Linear,
    Custom,
}

/// Static audio attributes of a single cue.
///
/// The pool and manager copy this into a voice and hand it to the backend
/// untouched. Only `frequent` and `priority` are read by the admission logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CueParameters {
    /// Clip the backend streams from. `None` is rejected at configure time.
    pub clip: Option<PathBuf>,
    /// Mixer group the backend routes output to.
    pub mixer_group: Option<String>,
    pub looped: bool,
    pub play_on_awake: bool,
    /// High-repetition cue, tracked in the manager's frequent queue.
    pub frequent: bool,

    pub mute: bool,
    pub bypass_effects: bool,
    pub bypass_listener_effects: bool,
    pub bypass_reverb_zones: bool,

    /// 0..=256, greater number means less important.
    pub priority: i32,
    pub volume: f32,
    pub pitch: f32,
    pub pan_stereo: f32,
    pub spatial_blend: f32,
    pub reverb_zone_mix: f32,
    pub doppler_level: f32,
    pub spread: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub ignore_listener_volume: bool,
    pub ignore_listener_pause: bool,
    pub rolloff_mode: RolloffMode,
}

impl Default for CueParameters {
    fn default() -> Self {
        Self {
            clip: None,
            mixer_group: None,
            looped: false,
            play_on_awake: false,
            frequent: false,
            mute: false,
            bypass_effects: false,
            bypass_listener_effects: false,
            bypass_reverb_zones: false,
            priority: 128,
            volume: 1.0,
            pitch: 1.0,
            pan_stereo: 0.0,
            spatial_blend: 0.0,
            reverb_zone_mix: 1.0,
            doppler_level: 1.0,
            spread: 0.0,
            min_distance: 1.0,
            max_distance: 500.0,
            ignore_listener_volume: false,
            ignore_listener_pause: false,
            rolloff_mode: RolloffMode::Logarithmic,
        }
    }
}

impl CueParameters {
    pub fn for_clip<P: Into<PathBuf>>(clip: P) -> Self {
        Self {
            clip: Some(clip.into()),
            ..Self::default()
        }
    }

    pub fn frequent(mut self, frequent: bool) -> Self {
        self.frequent = frequent;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn looped(mut self, looped: bool) -> Self {
        self.looped = looped;
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_pitch(mut self, pitch: f32) -> Self {
        self.pitch = pitch;
        self
    }

    pub fn validate(&self) -> Result<()> {
        match &self.clip {
            None => {
                return Err(SoundError::InvalidParameters(
                    "cue has no clip".to_string(),
                ))
            }
            Some(path) if path.as_os_str().is_empty() => {
                return Err(SoundError::InvalidParameters(
                    "cue clip path is empty".to_string(),
                ))
            }
            Some(_) => {}
        }

        let floats = [
            ("volume", self.volume),
            ("pitch", self.pitch),
            ("pan_stereo", self.pan_stereo),
            ("spatial_blend", self.spatial_blend),
            ("reverb_zone_mix", self.reverb_zone_mix),
            ("doppler_level", self.doppler_level),
            ("spread", self.spread),
            ("min_distance", self.min_distance),
            ("max_distance", self.max_distance),
        ];
        if let Some((name, _)) = floats.iter().find(|(_, v)| !v.is_finite()) {
            return Err(SoundError::InvalidParameters(format!(
                "{} is not a finite number",
                name
            )));
        }

        Ok(())
    }
}

/// Named cue library stored as a JSON object of name to cue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CueBank {
    cues: BTreeMap<String, CueParameters>,
}

impl CueBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a bank from disk. Relative clip paths resolve against the
    /// bank file's directory.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut bank: CueBank = serde_json::from_str(&content)?;

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        for cue in bank.cues.values_mut() {
            if let Some(clip) = cue.clip.as_mut() {
                if clip.is_relative() {
                    *clip = base_dir.join(&*clip);
                }
            }
        }

        debug!(path = %path.display(), cues = bank.cues.len(), "loaded cue bank");
        Ok(bank)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        fs::write(path, content)?;
        Ok(())
    }

    pub fn insert<S: Into<String>>(&mut self, name: S, cue: CueParameters) -> Option<CueParameters> {
        self.cues.insert(name.into(), cue)
    }

    pub fn get(&self, name: &str) -> Option<&CueParameters> {
        self.cues.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.cues.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// Names of cues whose clip is missing or cannot be probed.
    pub fn validate_clips(&self) -> Vec<String> {
        let mut broken = Vec::new();
        for (name, cue) in &self.cues {
            let ok = match &cue.clip {
                Some(path) => clip::is_supported_clip(path),
                None => false,
            };
            if !ok {
                warn!(cue = %name, "cue clip is missing or unreadable");
                broken.push(name.clone());
            }
        }
        broken
    }
}
