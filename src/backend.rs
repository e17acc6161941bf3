use std::cell::Cell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use crate::cue::{CueParameters, Position};
use crate::error::Result;

/// A physical audio stream the voice drives.
///
/// `start` receives the voice's current parameter snapshot, including any
/// pitch jitter. `stop` must be safe to call on a stream that is not
/// playing.
#[cfg_attr(test, mockall::automock)]
pub trait PlaybackBackend {
    fn start(&mut self, cue: &CueParameters, position: Position) -> Result<()>;

    fn stop(&mut self);

    fn is_producing_sound(&self) -> bool;

    /// Drop transient state when the voice goes back to the pool. The
    /// stream itself stays alive.
    fn reset(&mut self) {}
}

/// Creates one backend per pooled voice.
pub trait BackendFactory {
    fn create(&mut self) -> Result<Box<dyn PlaybackBackend>>;
}

/// Shared frame counter for the simulated backend.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    now: Rc<Cell<u64>>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> u64 {
        self.now.get()
    }

    pub fn advance(&self) {
        self.advance_by(1);
    }

    pub fn advance_by(&self, frames: u64) {
        self.now.set(self.now.get() + frames);
    }
}

/// Totals across every backend a simulated factory has made.
#[derive(Debug, Default)]
pub struct SimCounters {
    pub created: Cell<usize>,
    pub starts: Cell<usize>,
    pub stops: Cell<usize>,
    pub resets: Cell<usize>,
}

fn bump(cell: &Cell<usize>) {
    cell.set(cell.get() + 1);
}

/// Deterministic headless backend: a clip plays for a fixed number of
/// clock frames, looped clips play until stopped.
#[derive(Debug)]
pub struct SimulatedBackend {
    clock: SimClock,
    lengths: Rc<HashMap<PathBuf, u64>>,
    default_length: u64,
    counters: Rc<SimCounters>,
    started_at: Option<u64>,
    length: u64,
    looped: bool,
    last_cue: Option<CueParameters>,
}

impl SimulatedBackend {
    pub fn last_cue(&self) -> Option<&CueParameters> {
        self.last_cue.as_ref()
    }
}

impl PlaybackBackend for SimulatedBackend {
    fn start(&mut self, cue: &CueParameters, _position: Position) -> Result<()> {
        self.length = cue
            .clip
            .as_ref()
            .and_then(|clip| self.lengths.get(clip).copied())
            .unwrap_or(self.default_length);
        self.looped = cue.looped;
        self.started_at = Some(self.clock.now());
        self.last_cue = Some(cue.clone());
        bump(&self.counters.starts);
        Ok(())
    }

    fn stop(&mut self) {
        if self.started_at.take().is_some() {
            bump(&self.counters.stops);
        }
    }

    fn is_producing_sound(&self) -> bool {
        match self.started_at {
            Some(start) => self.looped || self.clock.now() < start + self.length,
            None => false,
        }
    }

    fn reset(&mut self) {
        self.started_at = None;
        self.looped = false;
        self.last_cue = None;
        bump(&self.counters.resets);
    }
}

#[derive(Debug)]
pub struct SimulatedBackendFactory {
    clock: SimClock,
    lengths: HashMap<PathBuf, u64>,
    shared_lengths: Option<Rc<HashMap<PathBuf, u64>>>,
    default_length: u64,
    counters: Rc<SimCounters>,
}

impl SimulatedBackendFactory {
    pub fn new(clock: SimClock, default_length: u64) -> Self {
        Self {
            clock,
            lengths: HashMap::new(),
            shared_lengths: None,
            default_length,
            counters: Rc::new(SimCounters::default()),
        }
    }

    /// Give a specific clip its own length in frames.
    pub fn with_clip_length<P: Into<PathBuf>>(mut self, clip: P, frames: u64) -> Self {
        self.lengths.insert(clip.into(), frames);
        self.shared_lengths = None;
        self
    }

    pub fn counters(&self) -> Rc<SimCounters> {
        Rc::clone(&self.counters)
    }
}

impl BackendFactory for SimulatedBackendFactory {
    fn create(&mut self) -> Result<Box<dyn PlaybackBackend>> {
        let lengths = self
            .shared_lengths
            .get_or_insert_with(|| Rc::new(self.lengths.clone()))
            .clone();
        bump(&self.counters.created);

        Ok(Box::new(SimulatedBackend {
            clock: self.clock.clone(),
            lengths,
            default_length: self.default_length,
            counters: Rc::clone(&self.counters),
            started_at: None,
            length: 0,
            looped: false,
            last_cue: None,
        }))
    }
}
