use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use rodio::source::Buffered;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use tracing::{debug, info, trace};

use crate::backend::{BackendFactory, PlaybackBackend};
use crate::cue::{CueParameters, Position};
use crate::error::{Result, SoundError};

type CachedClip = Buffered<Decoder<BufReader<File>>>;

/// The default output device. Every backend holds a reference so the
/// stream outlives all sinks.
pub struct RodioDevice {
    _stream: OutputStream,
    handle: OutputStreamHandle,
}

impl std::fmt::Debug for RodioDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RodioDevice").finish_non_exhaustive()
    }
}

impl RodioDevice {
    pub fn open_default() -> Result<Self> {
        let (stream, handle) = OutputStream::try_default()
            .map_err(|e| SoundError::Backend(format!("failed to open output stream: {}", e)))?;

        info!("audio output stream initialized");

        Ok(Self {
            _stream: stream,
            handle,
        })
    }

    fn create_sink(&self) -> Result<Sink> {
        Sink::try_new(&self.handle)
            .map_err(|e| SoundError::Backend(format!("failed to create sink: {}", e)))
    }
}

/// Decoded clips keyed by path. Short cues decode once and are cloned
/// into each sink afterwards.
#[derive(Default)]
struct ClipCache {
    clips: HashMap<PathBuf, CachedClip>,
}

impl ClipCache {
    fn get_or_decode(&mut self, path: &Path) -> Result<CachedClip> {
        if let Some(clip) = self.clips.get(path) {
            return Ok(clip.clone());
        }

        let file = File::open(path).map_err(|e| SoundError::Clip {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let decoder = Decoder::new(BufReader::new(file)).map_err(|e| SoundError::Clip {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let clip = decoder.buffered();
        self.clips.insert(path.to_path_buf(), clip.clone());
        debug!(path = %path.display(), "decoded clip into cache");
        Ok(clip)
    }
}

pub struct RodioBackend {
    device: Rc<RodioDevice>,
    cache: Rc<RefCell<ClipCache>>,
    sink: Option<Sink>,
}

impl PlaybackBackend for RodioBackend {
    fn start(&mut self, cue: &CueParameters, position: Position) -> Result<()> {
        let path = cue
            .clip
            .as_deref()
            .ok_or_else(|| SoundError::InvalidParameters("cue has no clip".to_string()))?;
        let clip = self.cache.borrow_mut().get_or_decode(path)?;

        // A fresh sink per start; the old one is dropped after stopping.
        let sink = self.device.create_sink()?;
        sink.set_volume(if cue.mute { 0.0 } else { cue.volume.max(0.0) });
        sink.set_speed(cue.pitch.abs().max(0.01));

        if cue.looped {
            sink.append(clip.repeat_infinite());
        } else {
            sink.append(clip);
        }

        if let Some(old) = self.sink.replace(sink) {
            old.stop();
        }

        // Spatialization is left to the host; position is informational.
        trace!(clip = %path.display(), x = position.x, y = position.y, z = position.z, "sink started");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(sink) = &self.sink {
            sink.stop();
        }
    }

    fn is_producing_sound(&self) -> bool {
        match &self.sink {
            Some(sink) => !sink.empty(),
            None => false,
        }
    }

    fn reset(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }
}

pub struct RodioBackendFactory {
    device: Rc<RodioDevice>,
    cache: Rc<RefCell<ClipCache>>,
}

impl RodioBackendFactory {
    pub fn new(device: RodioDevice) -> Self {
        Self {
            device: Rc::new(device),
            cache: Rc::new(RefCell::new(ClipCache::default())),
        }
    }

    pub fn open_default() -> Result<Self> {
        Ok(Self::new(RodioDevice::open_default()?))
    }

    /// Decode a clip ahead of its first use.
    pub fn preload<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.cache.borrow_mut().get_or_decode(path.as_ref()).map(|_| ())
    }
}

impl BackendFactory for RodioBackendFactory {
    fn create(&mut self) -> Result<Box<dyn PlaybackBackend>> {
        Ok(Box::new(RodioBackend {
            device: Rc::clone(&self.device),
            cache: Rc::clone(&self.cache),
            sink: None,
        }))
    }
}
