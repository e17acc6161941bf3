use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, trace, warn};

use crate::backend::BackendFactory;
use crate::builder::{PlaybackRequest, PlaybackRequestBuilder};
use crate::config::{EvictionPolicy, ManagerConfig};
use crate::cue::CueParameters;
use crate::error::{Result, SoundError};
use crate::pool::PoolStats;
use crate::voice::{Voice, VoiceId, VoicePool, VoiceState};

/// Handle to one admitted sound. `lease` pins the use of the voice it was
/// issued for; once the voice finishes or is recycled the handle is stale
/// and no longer controls it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceHandle {
    pub voice: VoiceId,
    pub lease: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerStats {
    pub admitted: u64,
    pub rejected: u64,
    pub evicted: u64,
    pub completed: u64,
}

/// Owns the voice pool and decides which requests get a voice.
///
/// All bookkeeping happens on the caller's thread. The host calls
/// [`PlaybackManager::tick`] once per frame to reclaim finished voices.
pub struct PlaybackManager {
    config: ManagerConfig,
    pool: VoicePool,
    /// Acquisition order, oldest first.
    active: VecDeque<VoiceId>,
    frequent: VecDeque<VoiceHandle>,
    rng: StdRng,
    stats: ManagerStats,
}

impl std::fmt::Debug for PlaybackManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackManager")
            .field("config", &self.config)
            .field("active", &self.active)
            .field("frequent", &self.frequent)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl PlaybackManager {
    pub fn new(config: ManagerConfig, factory: Box<dyn BackendFactory>) -> Result<Self> {
        config.validate()?;

        let mut pool = VoicePool::with_factory(
            factory,
            config.default_pool_capacity,
            config.max_pool_size,
            config.strict_pool_accounting,
        );
        if config.prewarm {
            let made = pool.prewarm(config.default_pool_capacity)?;
            debug!(made, "prewarmed voice pool");
        }

        let rng = match config.jitter_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        info!(
            max_active = config.max_active_voices,
            max_pool = config.max_pool_size,
            eviction = ?config.eviction,
            "playback manager created"
        );

        Ok(Self {
            active: VecDeque::with_capacity(config.max_active_voices),
            frequent: VecDeque::new(),
            config,
            pool,
            rng,
            stats: ManagerStats::default(),
        })
    }

    /// Start building a play request against this manager.
    pub fn begin_request(&mut self) -> PlaybackRequestBuilder<'_> {
        PlaybackRequestBuilder::new(self)
    }

    /// Admission check. When the active set is full this evicts one voice
    /// and checks again; the eviction stands even if the answer is still
    /// no.
    pub fn can_play(&mut self, cue: &CueParameters) -> Result<bool> {
        let max = self.config.max_active_voices;
        if self.active.len() < max {
            return Ok(true);
        }

        if let Some(victim) = self.pick_victim() {
            warn!(voice = %victim, incoming_priority = cue.priority, "active set full, evicting");
            self.evict(victim)?;
        }

        Ok(self.active.len() < max)
    }

    /// Admit, acquire, configure and start. `Ok(None)` means the sound was
    /// dropped for lack of room.
    pub fn play(&mut self, request: &PlaybackRequest) -> Result<Option<VoiceHandle>> {
        request.cue.validate()?;
        if self.pool.is_closed() {
            return Err(SoundError::PoolClosed);
        }

        if request.cue.frequent {
            if let Some(limit) = self.config.max_frequent_voices {
                self.trim_frequent(limit - 1)?;
            }
        }

        if !self.can_play(&request.cue)? {
            self.stats.rejected += 1;
            debug!("request rejected by admission");
            return Ok(None);
        }

        let id = match self.pool.acquire() {
            Ok(id) => id,
            Err(e) if e.is_saturation() => {
                self.stats.rejected += 1;
                warn!(error = %e, "admitted request found no free voice");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let (min, max) = self.config.pitch_jitter;
        let voice = self.pool.get_mut(id).ok_or(SoundError::UnknownVoice(id))?;
        if let Err(e) = prepare_voice(voice, request, &mut self.rng, min, max) {
            self.pool.release(id)?;
            return Err(e);
        }
        let lease = voice.lease();

        self.active.push_back(id);
        if let Err(e) = voice.play() {
            self.reclaim(id)?;
            return Err(e);
        }

        let handle = VoiceHandle { voice: id, lease };
        if request.cue.frequent {
            self.frequent.push_back(handle);
        }

        self.stats.admitted += 1;
        debug!(voice = %id, lease, active = self.active.len(), "voice started");
        Ok(Some(handle))
    }

    /// One completion-watch pass over every active voice. Returns how
    /// many voices finished and went back to the pool.
    pub fn tick(&mut self) -> Result<usize> {
        if self.pool.is_closed() {
            return Ok(0);
        }

        let pool = &mut self.pool;
        let finished: Vec<VoiceId> = self
            .active
            .iter()
            .copied()
            .filter(|&id| pool.get_mut(id).map(Voice::poll_completion).unwrap_or(false))
            .collect();

        for &id in &finished {
            self.reclaim(id)?;
            self.stats.completed += 1;
        }

        if !finished.is_empty() {
            trace!(finished = finished.len(), active = self.active.len(), "tick reclaimed voices");
        }
        Ok(finished.len())
    }

    /// Stop the sound `handle` was issued for and return its voice to the
    /// pool. `Ok(false)` if that sound already ended, even when the voice
    /// has since been reused.
    pub fn stop(&mut self, handle: VoiceHandle) -> Result<bool> {
        if !self.is_live(&handle) {
            trace!(voice = %handle.voice, lease = handle.lease, "stop ignored for stale handle");
            return Ok(false);
        }
        self.stop_voice(handle.voice)
    }

    pub fn stop_all(&mut self) -> Result<usize> {
        let ids: Vec<VoiceId> = self.active.iter().copied().collect();
        for &id in &ids {
            self.stop_voice(id)?;
        }
        Ok(ids.len())
    }

    /// Whether a handle still refers to the use it was issued for.
    pub fn is_live(&self, handle: &VoiceHandle) -> bool {
        is_live_in(&self.pool, handle)
    }

    pub fn frequent_entries(&self) -> impl Iterator<Item = &VoiceHandle> {
        self.frequent.iter()
    }

    /// Hand the frequent queue to the caller, stale entries included.
    pub fn drain_frequent(&mut self) -> Vec<VoiceHandle> {
        self.frequent.drain(..).collect()
    }

    /// Drop frequent entries whose sound has ended. Returns how many went.
    pub fn prune_frequent(&mut self) -> usize {
        let before = self.frequent.len();
        let pool = &self.pool;
        self.frequent.retain(|entry| is_live_in(pool, entry));
        before - self.frequent.len()
    }

    /// Drop stale frequent entries, then stop the oldest live frequent
    /// voices until at most `limit` remain. Returns how many were stopped.
    pub fn trim_frequent(&mut self, limit: usize) -> Result<usize> {
        self.prune_frequent();

        let mut stopped = 0;
        while self.frequent.len() > limit {
            let Some(entry) = self.frequent.pop_front() else {
                break;
            };
            if self.stop(entry)? {
                self.stats.evicted += 1;
                stopped += 1;
            }
        }

        if stopped > 0 {
            debug!(stopped, limit, "trimmed frequent voices");
        }
        Ok(stopped)
    }

    /// Stop everything and tear the pool down. Later requests fail with
    /// `PoolClosed`.
    pub fn shutdown(&mut self) {
        for &id in &self.active {
            if let Some(voice) = self.pool.get_mut(id) {
                voice.stop();
            }
        }
        self.active.clear();
        self.frequent.clear();
        self.pool.teardown();
        info!(stats = ?self.stats, "playback manager shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.pool.is_closed()
    }

    pub fn active_voices(&self) -> impl Iterator<Item = VoiceId> + '_ {
        self.active.iter().copied()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, id: VoiceId) -> bool {
        self.active.contains(&id)
    }

    pub fn voice(&self, id: VoiceId) -> Option<&Voice> {
        self.pool.get(id)
    }

    pub fn free_voices(&self) -> Vec<VoiceId> {
        self.pool.free_ids().collect()
    }

    pub fn stats(&self) -> ManagerStats {
        self.stats
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    fn pick_victim(&self) -> Option<VoiceId> {
        match self.config.eviction {
            EvictionPolicy::Oldest => self.active.front().copied(),
            EvictionPolicy::LowestPriority => {
                let mut best: Option<(VoiceId, i32)> = None;
                for &id in &self.active {
                    let priority = self
                        .pool
                        .get(id)
                        .and_then(Voice::params)
                        .map(|p| p.priority)
                        .unwrap_or(i32::MAX);
                    match best {
                        Some((_, current)) if priority <= current => {}
                        _ => best = Some((id, priority)),
                    }
                }
                best.map(|(id, _)| id)
            }
        }
    }

    /// Stop whatever the voice is playing now, if it is active.
    fn stop_voice(&mut self, id: VoiceId) -> Result<bool> {
        if !self.active.contains(&id) {
            return Ok(false);
        }
        if let Some(voice) = self.pool.get_mut(id) {
            voice.stop();
        }
        self.reclaim(id)?;
        Ok(true)
    }

    fn evict(&mut self, id: VoiceId) -> Result<()> {
        if self.stop_voice(id)? {
            self.stats.evicted += 1;
        }
        Ok(())
    }

    /// Remove from the active set and release to the pool.
    fn reclaim(&mut self, id: VoiceId) -> Result<()> {
        if let Some(index) = self.active.iter().position(|&a| a == id) {
            self.active.remove(index);
        }
        self.pool.release(id)
    }
}

fn prepare_voice(
    voice: &mut Voice,
    request: &PlaybackRequest,
    rng: &mut StdRng,
    jitter_min: f32,
    jitter_max: f32,
) -> Result<()> {
    voice.configure(request.cue.clone())?;
    voice.set_position(request.position);
    if request.pitch_jitter {
        voice.apply_pitch_jitter(rng, jitter_min, jitter_max)?;
    }
    Ok(())
}

fn is_live_in(pool: &VoicePool, handle: &VoiceHandle) -> bool {
    pool.get(handle.voice)
        .map(|v| v.state() == VoiceState::Active && v.lease() == handle.lease)
        .unwrap_or(false)
}
