use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SoundError};
use crate::voice::{DEFAULT_JITTER_MAX, DEFAULT_JITTER_MIN};

/// Which active voice gives way when the active set is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Earliest-acquired voice.
    #[default]
    Oldest,
    /// Voice with the greatest `priority` number, oldest among equals.
    LowestPriority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub max_active_voices: usize,
    pub max_pool_size: usize,
    pub default_pool_capacity: usize,
    /// Reject releases of voices that are not checked out.
    pub strict_pool_accounting: bool,
    pub eviction: EvictionPolicy,
    /// Cap on live frequent cues; `None` leaves the frequent queue as
    /// tracking only.
    pub max_frequent_voices: Option<usize>,
    /// Create `default_pool_capacity` voices up front.
    pub prewarm: bool,
    /// Fixed seed for pitch jitter, for reproducible runs.
    pub jitter_seed: Option<u64>,
    pub pitch_jitter: (f32, f32),
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_active_voices: 30,
            max_pool_size: 100,
            default_pool_capacity: 10,
            strict_pool_accounting: true,
            eviction: EvictionPolicy::Oldest,
            max_frequent_voices: None,
            prewarm: false,
            jitter_seed: None,
            pitch_jitter: (DEFAULT_JITTER_MIN, DEFAULT_JITTER_MAX),
        }
    }
}

impl ManagerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: ManagerConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_active_voices == 0 {
            return Err(SoundError::Config(
                "max_active_voices must be at least 1".to_string(),
            ));
        }
        if self.max_pool_size == 0 {
            return Err(SoundError::Config(
                "max_pool_size must be at least 1".to_string(),
            ));
        }
        if self.default_pool_capacity > self.max_pool_size {
            return Err(SoundError::Config(format!(
                "default_pool_capacity ({}) exceeds max_pool_size ({})",
                self.default_pool_capacity, self.max_pool_size
            )));
        }
        if self.max_frequent_voices == Some(0) {
            return Err(SoundError::Config(
                "max_frequent_voices must be at least 1 when set".to_string(),
            ));
        }
        let (min, max) = self.pitch_jitter;
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(SoundError::Config(format!(
                "pitch_jitter range ({}, {}) is invalid",
                min, max
            )));
        }
        Ok(())
    }

    pub fn with_max_active_voices(mut self, max: usize) -> Self {
        self.max_active_voices = max;
        self
    }

    pub fn with_max_pool_size(mut self, max: usize) -> Self {
        self.max_pool_size = max;
        self.default_pool_capacity = self.default_pool_capacity.min(max);
        self
    }

    pub fn with_eviction(mut self, eviction: EvictionPolicy) -> Self {
        self.eviction = eviction;
        self
    }

    pub fn with_jitter_seed(mut self, seed: u64) -> Self {
        self.jitter_seed = Some(seed);
        self
    }
}
