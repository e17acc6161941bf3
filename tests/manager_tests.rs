use std::rc::Rc;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sfxpool::backend::{SimClock, SimCounters, SimulatedBackendFactory};
use sfxpool::{
    CueParameters, EvictionPolicy, ManagerConfig, PlaybackManager, Position, SoundError,
    VoiceHandle, VoicePool, VoiceState,
};

#[cfg(test)]
mod tests {
    use super::*;

    struct Harness {
        clock: SimClock,
        counters: Rc<SimCounters>,
        manager: PlaybackManager,
    }

    fn harness(config: ManagerConfig, default_length: u64) -> Harness {
        let clock = SimClock::new();
        let factory = SimulatedBackendFactory::new(clock.clone(), default_length)
            .with_clip_length("short.wav", 2)
            .with_clip_length("long.wav", 50);
        let counters = factory.counters();
        let manager = PlaybackManager::new(config.with_jitter_seed(11), Box::new(factory)).unwrap();
        Harness {
            clock,
            counters,
            manager,
        }
    }

    fn cue(name: &str) -> CueParameters {
        CueParameters::for_clip(name)
    }

    fn play(manager: &mut PlaybackManager, name: &str) -> Result<Option<VoiceHandle>> {
        Ok(manager.begin_request().with_cue(cue(name)).submit_tracked()?)
    }

    /// A voice is active exactly when the manager tracks it and the pool
    /// does not hold it free.
    fn assert_voice_accounting(manager: &PlaybackManager) {
        let free = manager.free_voices();
        for id in manager.active_voices() {
            assert!(!free.contains(&id), "active voice {} is in the free list", id);
            assert_eq!(manager.voice(id).map(|v| v.state()), Some(VoiceState::Active));
        }
        for &id in &free {
            assert!(!manager.is_active(id));
            assert_eq!(manager.voice(id).map(|v| v.state()), Some(VoiceState::Pooled));
        }
        assert_eq!(manager.pool_stats().checked_out, manager.active_count());
    }

    #[test]
    fn test_active_set_never_exceeds_cap() -> Result<()> {
        let mut h = harness(ManagerConfig::default().with_max_active_voices(4).with_max_pool_size(6), 5);
        let mut rng = StdRng::seed_from_u64(42);
        let mut handles: Vec<VoiceHandle> = Vec::new();

        for _ in 0..500 {
            match rng.gen_range(0..5) {
                0 => {
                    h.clock.advance_by(rng.gen_range(0..4));
                    h.manager.tick()?;
                }
                1 => {
                    let clip = if rng.gen_bool(0.5) { "short.wav" } else { "long.wav" };
                    let handle = h
                        .manager
                        .begin_request()
                        .with_cue(cue(clip).frequent(rng.gen_bool(0.3)))
                        .submit_tracked()?;
                    handles.extend(handle);
                }
                2 if !handles.is_empty() => {
                    // Old handles are often stale by now; stopping them must be harmless.
                    let handle = handles.swap_remove(rng.gen_range(0..handles.len()));
                    let was_live = h.manager.is_live(&handle);
                    assert_eq!(h.manager.stop(handle)?, was_live);
                }
                _ => {
                    h.manager.begin_request().with_cue(cue("fx.wav")).with_pitch_jitter().submit()?;
                }
            }
            assert!(h.manager.active_count() <= 4);
            assert!(h.manager.pool_stats().created <= 6);
            assert_voice_accounting(&h.manager);
        }
        Ok(())
    }

    #[test]
    fn test_eviction_targets_earliest_acquired() -> Result<()> {
        let mut h = harness(ManagerConfig::default().with_max_active_voices(3), 100);

        let a = play(&mut h.manager, "a.wav")?.unwrap();
        let b = play(&mut h.manager, "b.wav")?.unwrap();
        let c = play(&mut h.manager, "c.wav")?.unwrap();
        let d = play(&mut h.manager, "d.wav")?.unwrap();

        let active: Vec<_> = h.manager.active_voices().collect();
        assert_eq!(active, vec![b.voice, c.voice, d.voice]);
        assert!(!h.manager.is_live(&a));
        assert_eq!(h.manager.stats().evicted, 1);
        // The freed voice was recycled for d.
        assert_eq!(a.voice, d.voice);
        assert_eq!(h.manager.pool_stats().created, 3);
        Ok(())
    }

    #[test]
    fn test_single_slot_evicts_previous_and_frees_its_voice() -> Result<()> {
        let config = ManagerConfig::default().with_max_active_voices(1).with_max_pool_size(5);
        let mut h = harness(config, 100);

        let x = play(&mut h.manager, "x.wav")?.unwrap();
        assert_eq!(h.manager.active_voices().collect::<Vec<_>>(), vec![x.voice]);

        // Acquire happens after the eviction, so y reuses x's voice.
        let y = play(&mut h.manager, "y.wav")?.unwrap();
        assert_eq!(h.manager.active_voices().collect::<Vec<_>>(), vec![y.voice]);
        assert_eq!(x.voice, y.voice);
        assert!(!h.manager.is_live(&x));
        assert_eq!(
            h.manager.voice(y.voice).unwrap().params().unwrap().clip.as_deref(),
            Some(std::path::Path::new("y.wav"))
        );
        assert_eq!(h.counters.stops.get(), 1);
        assert_eq!(h.manager.stats().evicted, 1);

        assert!(!h.manager.stop(x)?);
        assert!(h.manager.stop(y)?);
        assert!(h.manager.free_voices().contains(&x.voice));
        assert_eq!(h.manager.pool_stats().created, 1);
        Ok(())
    }

    #[test]
    fn test_pool_exhaustion_is_a_dropped_sound_not_an_error() -> Result<()> {
        let config = ManagerConfig::default().with_max_active_voices(5).with_max_pool_size(1);
        let mut h = harness(config, 100);

        assert!(h.manager.begin_request().with_cue(cue("a.wav")).submit()?);
        assert!(!h.manager.begin_request().with_cue(cue("b.wav")).submit()?);
        assert_eq!(h.manager.active_count(), 1);
        assert_eq!(h.manager.stats().rejected, 1);
        Ok(())
    }

    #[test]
    fn test_voice_pool_recycles_single_voice() {
        let clock = SimClock::new();
        let factory = SimulatedBackendFactory::new(clock, 10);
        let counters = factory.counters();
        let mut pool = VoicePool::with_factory(Box::new(factory), 1, 1, true);

        let v1 = pool.acquire().unwrap();
        assert_eq!(pool.get(v1).unwrap().state(), VoiceState::Active);
        assert!(matches!(pool.acquire(), Err(SoundError::PoolExhausted { max: 1 })));

        pool.release(v1).unwrap();
        assert_eq!(pool.get(v1).unwrap().state(), VoiceState::Pooled);

        let again = pool.acquire().unwrap();
        assert_eq!(again, v1);
        assert_eq!(counters.created.get(), 1);
        assert_eq!(pool.get(again).unwrap().lease(), 2);
    }

    #[test]
    fn test_acquire_below_cap_creates_exactly_one() {
        let factory = SimulatedBackendFactory::new(SimClock::new(), 10);
        let mut pool = VoicePool::with_factory(Box::new(factory), 2, 3, true);

        for expected in 1..=3 {
            pool.acquire().unwrap();
            assert_eq!(pool.created(), expected);
        }
        assert!(matches!(pool.acquire(), Err(SoundError::PoolExhausted { .. })));
    }

    #[test]
    fn test_missing_cue_acquires_nothing() {
        let mut h = harness(ManagerConfig::default(), 10);
        play(&mut h.manager, "a.wav").unwrap();

        let result = h.manager.begin_request().with_position(Position::new(1.0, 1.0, 1.0)).submit();
        assert!(matches!(result, Err(SoundError::MissingCue)));
        assert_eq!(h.manager.active_count(), 1);
        assert_eq!(h.manager.pool_stats().created, 1);
    }

    #[test]
    fn test_stop_then_natural_end_releases_once() -> Result<()> {
        let mut h = harness(ManagerConfig::default(), 10);
        let id = play(&mut h.manager, "short.wav")?.unwrap();

        assert!(h.manager.stop(id)?);
        h.clock.advance_by(5);
        // Strict accounting would surface a second release as DoubleRelease.
        assert_eq!(h.manager.tick()?, 0);
        assert_eq!(h.manager.pool_stats().free, 1);
        assert_eq!(h.manager.stats().completed, 0);
        Ok(())
    }

    #[test]
    fn test_stop_with_old_handle_spares_new_sound() -> Result<()> {
        let mut h = harness(ManagerConfig::default().with_max_pool_size(1), 10);
        let old = play(&mut h.manager, "short.wav")?.unwrap();
        h.clock.advance_by(2);
        assert_eq!(h.manager.tick()?, 1);

        let new = play(&mut h.manager, "long.wav")?.unwrap();
        assert_eq!(old.voice, new.voice);
        let stops = h.counters.stops.get();

        assert!(!h.manager.stop(old)?);
        assert!(h.manager.is_live(&new));
        assert!(h.manager.is_active(new.voice));
        assert_eq!(h.counters.stops.get(), stops);
        Ok(())
    }

    #[test]
    fn test_finished_voices_are_reclaimed_on_tick() -> Result<()> {
        let mut h = harness(ManagerConfig::default(), 10);
        let short = play(&mut h.manager, "short.wav")?.unwrap();
        let long = play(&mut h.manager, "long.wav")?.unwrap();

        h.clock.advance();
        assert_eq!(h.manager.tick()?, 0);
        h.clock.advance();
        assert_eq!(h.manager.tick()?, 1);

        assert!(!h.manager.is_live(&short));
        assert!(h.manager.is_live(&long));
        assert_eq!(h.manager.voice(short.voice).unwrap().state(), VoiceState::Pooled);
        assert_eq!(h.manager.stats().completed, 1);
        Ok(())
    }

    #[test]
    fn test_recycled_voice_has_no_residual_parameters() -> Result<()> {
        let mut h = harness(ManagerConfig::default().with_max_pool_size(1), 10);
        let first = h
            .manager
            .begin_request()
            .with_cue(cue("short.wav").looped(true).with_volume(0.2).frequent(true))
            .with_position(Position::new(9.0, 9.0, 9.0))
            .submit_tracked()?
            .unwrap();
        h.manager.stop(first)?;
        assert!(h.manager.voice(first.voice).unwrap().params().is_none());

        let second = play(&mut h.manager, "long.wav")?.unwrap();
        assert_eq!(first.voice, second.voice);
        let voice = h.manager.voice(second.voice).unwrap();
        let params = voice.params().unwrap();
        assert_eq!(params, &cue("long.wav"));
        assert_eq!(voice.position(), Position::ORIGIN);
        Ok(())
    }

    #[test]
    fn test_frequent_queue_tracks_and_goes_stale() -> Result<()> {
        let mut h = harness(ManagerConfig::default(), 10);
        h.manager.begin_request().with_cue(cue("short.wav").frequent(true)).submit()?;
        h.manager.begin_request().with_cue(cue("long.wav")).submit()?;
        h.manager.begin_request().with_cue(cue("long.wav").frequent(true)).submit()?;

        let entries: Vec<_> = h.manager.frequent_entries().copied().collect();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| h.manager.is_live(e)));

        h.clock.advance_by(2);
        h.manager.tick()?;
        // The finished entry stays queued but is no longer live.
        assert_eq!(h.manager.frequent_entries().count(), 2);
        assert!(!h.manager.is_live(&entries[0]));
        assert!(h.manager.is_live(&entries[1]));

        // Recycling the voice does not revive the stale entry.
        play(&mut h.manager, "fx.wav")?;
        assert!(!h.manager.is_live(&entries[0]));

        let drained = h.manager.drain_frequent();
        assert_eq!(drained, entries);
        assert_eq!(h.manager.frequent_entries().count(), 0);
        Ok(())
    }

    #[test]
    fn test_trim_frequent_stops_oldest_live() -> Result<()> {
        let mut h = harness(ManagerConfig::default(), 100);
        let ids: Vec<_> = (0..4)
            .map(|_| {
                h.manager
                    .begin_request()
                    .with_cue(cue("step.wav").frequent(true))
                    .submit_tracked()
                    .unwrap()
                    .unwrap()
            })
            .collect();
        let other = play(&mut h.manager, "music.wav")?.unwrap();

        assert_eq!(h.manager.trim_frequent(2)?, 2);
        assert!(!h.manager.is_live(&ids[0]));
        assert!(!h.manager.is_live(&ids[1]));
        assert!(h.manager.is_live(&ids[2]));
        assert!(h.manager.is_live(&ids[3]));
        assert!(h.manager.is_live(&other));
        Ok(())
    }

    #[test]
    fn test_max_frequent_voices_caps_live_frequent_cues() -> Result<()> {
        let mut config = ManagerConfig::default();
        config.max_frequent_voices = Some(2);
        let mut h = harness(config, 100);

        for _ in 0..5 {
            assert!(h.manager.begin_request().with_cue(cue("step.wav").frequent(true)).submit()?);
        }
        play(&mut h.manager, "boom.wav")?;

        let live = h
            .manager
            .frequent_entries()
            .filter(|e| h.manager.is_live(e))
            .count();
        assert_eq!(live, 2);
        assert_eq!(h.manager.active_count(), 3);
        Ok(())
    }

    #[test]
    fn test_priority_eviction_spares_important_cues() -> Result<()> {
        let config = ManagerConfig::default()
            .with_max_active_voices(2)
            .with_eviction(EvictionPolicy::LowestPriority);
        let mut h = harness(config, 100);

        let music = h
            .manager
            .begin_request()
            .with_cue(cue("music.wav").with_priority(0))
            .submit_tracked()?
            .unwrap();
        for _ in 0..5 {
            h.manager.begin_request().with_cue(cue("step.wav").with_priority(200)).submit()?;
        }

        assert!(h.manager.is_live(&music));
        assert_eq!(h.manager.active_count(), 2);
        assert_eq!(h.manager.stats().evicted, 4);
        Ok(())
    }

    #[test]
    fn test_shutdown_closes_pool() -> Result<()> {
        let mut h = harness(ManagerConfig::default(), 100);
        play(&mut h.manager, "a.wav")?;
        play(&mut h.manager, "b.wav")?;

        h.manager.shutdown();
        assert!(h.manager.is_shut_down());
        assert_eq!(h.manager.active_count(), 0);
        assert_eq!(h.counters.stops.get(), 2);
        assert_eq!(h.manager.tick()?, 0);

        let err = h.manager.begin_request().with_cue(cue("c.wav")).submit().unwrap_err();
        assert!(matches!(err, SoundError::PoolClosed));
        Ok(())
    }

    #[test]
    fn test_prewarm_fills_free_list() {
        let mut config = ManagerConfig::default();
        config.prewarm = true;
        config.default_pool_capacity = 4;
        let h = harness(config, 10);

        let stats = h.manager.pool_stats();
        assert_eq!(stats.created, 4);
        assert_eq!(stats.free, 4);
        assert_eq!(h.counters.created.get(), 4);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let factory = SimulatedBackendFactory::new(SimClock::new(), 10);
        let result = PlaybackManager::new(ManagerConfig::default().with_max_active_voices(0), Box::new(factory));
        assert!(matches!(result, Err(SoundError::Config(_))));
    }
}
