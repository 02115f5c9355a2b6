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

//! Sample pack browsing and preview playback.
//!
//! The browser side runs on the control thread; the preview voice is
//! mixed by the audio callback at the end of each period through the
//! same double-buffer discipline the pad store uses.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use crate::config::{scan_packs, SamplePack};
use crate::wave;

use super::store::SampleStore;
use super::Shared;

/// Shared state of the preview voice.
pub struct PreviewShared {
    store: SampleStore,
    playing: AtomicBool,
    restart: AtomicBool,
}

impl PreviewShared {
    pub fn new() -> Self {
        PreviewShared {
            store: SampleStore::new(1),
            playing: AtomicBool::new(false),
            restart: AtomicBool::new(false),
        }
    }
}

/// Mixes the preview voice into the period output. Audio callback only.
pub fn process_audio(preview: &PreviewShared, pos: &mut usize, out_l: &mut [f32], out_r: &mut [f32]) {
    preview.store.commit_pending();

    if !preview.playing.load(Ordering::Acquire) {
        return;
    }
    if preview.restart.swap(false, Ordering::AcqRel) {
        *pos = 0;
    }

    let data = preview.store.live(0);
    if !data.info.valid {
        preview.playing.store(false, Ordering::Release);
        return;
    }

    let nframes = out_l.len().min(out_r.len());
    let len = nframes.min(data.info.num_frames.saturating_sub(*pos));

    if data.info.num_chans > 1 {
        for i in 0..len {
            out_l[i] += data.pcm[0][*pos + i];
            out_r[i] += data.pcm[1][*pos + i];
        }
    } else {
        // Center the mono preview with the same equal-power level the
        // pads use at pan zero.
        let gain = std::f32::consts::FRAC_1_SQRT_2;
        for i in 0..len {
            let sample = data.pcm[0][*pos + i];
            out_l[i] += sample * gain;
            out_r[i] += sample * gain;
        }
    }

    *pos += len;
    if *pos >= data.info.num_frames {
        preview.playing.store(false, Ordering::Release);
    }
}

/// Metadata reply for sample browser commands.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WaveInfoDetail {
    pub valid: bool,
    pub name: String,
    pub pack_idx: usize,
    pub sample_idx: usize,
    pub num_chans: usize,
    pub sample_rate: u32,
    pub num_frames: usize,
    pub length_ms: f64,
}

/// The control-thread side of the sample browser.
pub struct SampleExplorer {
    shared: Arc<Shared>,
    pack_root: PathBuf,
    sample_rate: u32,
    packs: Vec<SamplePack>,
    loaded: Option<(usize, usize)>,
}

impl SampleExplorer {
    pub fn new(shared: Arc<Shared>, pack_root: PathBuf, sample_rate: u32) -> Self {
        SampleExplorer {
            shared,
            pack_root,
            sample_rate,
            packs: Vec::new(),
            loaded: None,
        }
    }

    /// Rescans the pack root.
    pub fn refresh(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.packs = scan_packs(&self.pack_root)?;
        info!(packs = self.packs.len(), "Refreshed sample packs");
        Ok(())
    }

    pub fn packs(&self) -> &[SamplePack] {
        &self.packs
    }

    /// The sample's full path and its path relative to the pack root.
    pub fn sample_path(&self, pack_idx: usize, sample_idx: usize) -> Option<(PathBuf, String)> {
        let pack = self.packs.get(pack_idx)?;
        let sample = pack.samples.get(sample_idx)?;
        let relative = format!("{}/{}", pack.name, sample.relative_path);
        Some((PathBuf::from(&sample.full_path), relative))
    }

    pub fn sample_name(&self, pack_idx: usize, sample_idx: usize) -> Option<String> {
        Some(
            self.packs
                .get(pack_idx)?
                .samples
                .get(sample_idx)?
                .name
                .clone(),
        )
    }

    /// Decodes a sample into the preview slot and reports its metadata.
    pub fn load(&mut self, pack_idx: usize, sample_idx: usize) -> WaveInfoDetail {
        let mut detail = WaveInfoDetail {
            pack_idx,
            sample_idx,
            ..WaveInfoDetail::default()
        };

        let Some((full_path, _)) = self.sample_path(pack_idx, sample_idx) else {
            return detail;
        };
        detail.name = self
            .sample_name(pack_idx, sample_idx)
            .unwrap_or_default();

        let decoded = match wave::import(&full_path, self.sample_rate) {
            Ok(decoded) => decoded,
            Err(e) => {
                error!(path = %full_path.display(), err = %e, "Failed to load preview sample");
                return detail;
            }
        };

        detail.valid = true;
        detail.num_chans = decoded.info.num_chans;
        detail.sample_rate = decoded.info.sample_rate;
        detail.num_frames = decoded.info.num_frames;
        detail.length_ms = decoded.info.length_ms;

        let preview = &self.shared.preview;
        self.shared
            .process_sync
            .wait_while(|| preview.store.any_pending());
        preview.store.stage(0, decoded);
        preview.store.publish(0);
        self.loaded = Some((pack_idx, sample_idx));

        detail
    }

    /// Starts preview playback, loading the sample first if needed.
    pub fn play(&mut self, pack_idx: usize, sample_idx: usize) -> WaveInfoDetail {
        let detail = if self.loaded == Some((pack_idx, sample_idx)) {
            let mut detail = WaveInfoDetail {
                pack_idx,
                sample_idx,
                name: self.sample_name(pack_idx, sample_idx).unwrap_or_default(),
                ..WaveInfoDetail::default()
            };
            let info = self.shared.preview.store.live_info(0);
            detail.valid = info.valid;
            detail.num_chans = info.num_chans;
            detail.sample_rate = info.sample_rate;
            detail.num_frames = info.num_frames;
            detail.length_ms = info.length_ms;
            detail
        } else {
            self.load(pack_idx, sample_idx)
        };

        if detail.valid {
            self.shared.preview.restart.store(true, Ordering::Release);
            self.shared.preview.playing.store(true, Ordering::Release);
        }
        detail
    }

    /// Stops preview playback.
    pub fn stop(&self) {
        self.shared.preview.playing.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wave::{DecodedWave, WaveInfo};

    fn preview_with(frames: usize, value: f32) -> PreviewShared {
        let preview = PreviewShared::new();
        preview.store.stage(
            0,
            DecodedWave {
                info: WaveInfo {
                    valid: true,
                    num_chans: 1,
                    num_frames: frames,
                    sample_rate: 48000,
                    length_ms: frames as f64 * 1000.0 / 48000.0,
                },
                pcm: vec![vec![value; frames]],
            },
        );
        preview.store.publish(0);
        preview
    }

    #[test]
    fn test_preview_idle_is_silent() {
        let preview = PreviewShared::new();
        let mut pos = 0;
        let mut out_l = vec![0.0f32; 64];
        let mut out_r = vec![0.0f32; 64];
        process_audio(&preview, &mut pos, &mut out_l, &mut out_r);
        assert!(out_l.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_preview_plays_to_end_and_stops() {
        let preview = preview_with(96, 1.0);
        preview.restart.store(true, Ordering::Release);
        preview.playing.store(true, Ordering::Release);

        let mut pos = 0;
        let mut out_l = vec![0.0f32; 64];
        let mut out_r = vec![0.0f32; 64];
        process_audio(&preview, &mut pos, &mut out_l, &mut out_r);
        assert!(preview.playing.load(Ordering::Acquire));
        assert!((out_l[0] - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);

        out_l.fill(0.0);
        out_r.fill(0.0);
        process_audio(&preview, &mut pos, &mut out_l, &mut out_r);
        assert!(!preview.playing.load(Ordering::Acquire));
        // Only the 32-frame tail lands in the second period.
        assert!(out_l[..32].iter().all(|&s| s != 0.0));
        assert!(out_l[32..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_preview_restart_rewinds() {
        let preview = preview_with(96, 1.0);
        preview.restart.store(true, Ordering::Release);
        preview.playing.store(true, Ordering::Release);

        let mut pos = 0;
        let mut out_l = vec![0.0f32; 64];
        let mut out_r = vec![0.0f32; 64];
        process_audio(&preview, &mut pos, &mut out_l, &mut out_r);
        assert_eq!(pos, 64);

        preview.restart.store(true, Ordering::Release);
        process_audio(&preview, &mut pos, &mut out_l, &mut out_r);
        assert_eq!(pos, 64);
    }
}
