// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Wave file import.
//!
//! Decodes `.wav` files into planar `f32` buffers at the engine sample
//! rate. Resampling uses linear interpolation, which is sufficient for
//! drum hits and one-shots.

use std::path::Path;

use tracing::{debug, info};

/// Error type for wave import operations.
#[derive(Debug, thiserror::Error)]
pub enum WaveError {
    #[error("Wav file error: {0}")]
    WavError(#[from] hound::Error),

    #[error("Unsupported channel count: {0}")]
    UnsupportedChannels(u16),

    #[error("Empty wave file")]
    Empty,
}

/// Metadata for a decoded sample buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WaveInfo {
    pub valid: bool,
    pub num_chans: usize,
    pub num_frames: usize,
    pub sample_rate: u32,
    pub length_ms: f64,
}

/// A decoded sample: metadata plus one `f32` buffer per channel.
#[derive(Debug, Clone, Default)]
pub struct DecodedWave {
    pub info: WaveInfo,
    pub pcm: Vec<Vec<f32>>,
}

/// Imports a wave file, normalised to full-scale float and resampled to
/// `target_rate`. Sources with more than two channels keep their first
/// two; everything else is an error.
pub fn import(path: &Path, target_rate: u32) -> Result<DecodedWave, WaveError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    if spec.channels == 0 {
        return Err(WaveError::UnsupportedChannels(0));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|x| x as f32 / scale))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    if interleaved.is_empty() {
        return Err(WaveError::Empty);
    }

    let source_chans = spec.channels as usize;
    let num_chans = source_chans.min(2);
    let num_frames = interleaved.len() / source_chans;

    let mut pcm: Vec<Vec<f32>> = (0..num_chans)
        .map(|chan| {
            (0..num_frames)
                .map(|frame| interleaved[frame * source_chans + chan])
                .collect()
        })
        .collect();

    if spec.sample_rate != target_rate {
        debug!(
            source_rate = spec.sample_rate,
            target_rate, "Resampling wave file"
        );
        for channel in &mut pcm {
            *channel = resample_linear(channel, spec.sample_rate, target_rate);
        }
    }

    let num_frames = pcm[0].len();
    let length_ms = num_frames as f64 * 1000.0 / target_rate as f64;
    let info = WaveInfo {
        valid: true,
        num_chans,
        num_frames,
        sample_rate: target_rate,
        length_ms,
    };

    info!(
        path = %path.display(),
        channels = num_chans,
        frames = num_frames,
        length_ms = format!("{:.1}", length_ms),
        "Imported wave file"
    );

    Ok(DecodedWave { info, pcm })
}

/// Linear-interpolation resampling of one channel.
fn resample_linear(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let out_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let source_pos = i as f64 / ratio;
        let idx = source_pos.floor() as usize;
        let frac = source_pos.fract() as f32;

        let s0 = samples.get(idx).copied().unwrap_or(0.0);
        let s1 = samples.get(idx + 1).copied().unwrap_or(s0);
        out.push(s0 + (s1 - s0) * frac);
    }

    out
}
