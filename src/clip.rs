use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{Result, SoundError};

/// What a probe learned about a clip file.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipInfo {
    pub path: PathBuf,
    pub duration: Option<f64>,
    pub sample_rate: Option<u32>,
    pub channels: Option<usize>,
}

impl std::fmt::Display for ClipInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({:.2}s, {} Hz, {} ch)",
            self.path.display(),
            self.duration.unwrap_or(0.0),
            self.sample_rate.unwrap_or(0),
            self.channels.unwrap_or(0)
        )
    }
}

fn clip_error(path: &Path, message: impl Into<String>) -> SoundError {
    SoundError::Clip {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

/// Probe a clip's container and first decodable track.
pub fn probe_clip<P: AsRef<Path>>(path: P) -> Result<ClipInfo> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(clip_error(path, "file does not exist"));
    }

    let file = File::open(path).map_err(|e| clip_error(path, e.to_string()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &fmt_opts, &meta_opts)
        .map_err(|e| clip_error(path, e.to_string()))?;

    let track = probed
        .format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| clip_error(path, "no decodable track"))?;

    let params = &track.codec_params;
    let duration = match (params.n_frames, params.sample_rate) {
        (Some(frames), Some(rate)) if rate > 0 => Some(frames as f64 / rate as f64),
        _ => None,
    };

    Ok(ClipInfo {
        path: path.to_path_buf(),
        duration,
        sample_rate: params.sample_rate,
        channels: params.channels.map(|c| c.count()),
    })
}

pub fn is_supported_clip<P: AsRef<Path>>(path: P) -> bool {
    probe_clip(path).is_ok()
}
