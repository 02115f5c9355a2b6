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

//! The fixed voice pool and stereo mixdown.
//!
//! Voices are allocated by overwriting the slot at the round-robin
//! cursor unconditionally; the oldest voice is stolen when the pool is
//! exhausted. There is no free-slot scan, so allocation is constant
//! time in the callback.

use super::store::SampleStore;

/// Concurrent instances a single pad can sustain before stealing itself.
pub const VOICES_PER_PAD: usize = 4;

/// One sounding instance of a pad's sample.
#[derive(Debug, Clone, Copy, Default)]
pub struct Voice {
    pub playing: bool,
    pub pad_idx: usize,
    /// Offset into the current output period where playback starts.
    pub start_idx: usize,
    /// Read position in the source PCM.
    pub buffer_idx: usize,
    pub buffer_len: usize,
    pub gain_l: f32,
    pub gain_r: f32,
    /// Carried per-voice for playback-rate control; the mixer currently
    /// plays at unity rate.
    #[allow(dead_code)]
    pub pitch: f64,
}

pub struct VoicePool {
    voices: Vec<Voice>,
    voice_idx: usize,
}

impl VoicePool {
    pub fn new(num_pads: usize) -> Self {
        VoicePool {
            voices: vec![Voice::default(); VOICES_PER_PAD * num_pads],
            voice_idx: 0,
        }
    }

    /// Writes a new voice into the slot at the cursor and advances it.
    /// The slot is overwritten regardless of its current state.
    pub fn assign(
        &mut self,
        pad_idx: usize,
        start_idx: usize,
        buffer_len: usize,
        gain_l: f32,
        gain_r: f32,
        pitch: f64,
    ) {
        self.voices[self.voice_idx] = Voice {
            playing: true,
            pad_idx,
            start_idx,
            buffer_idx: 0,
            buffer_len,
            gain_l,
            gain_r,
            pitch,
        };
        self.voice_idx = (self.voice_idx + 1) % self.voices.len();
    }

    /// Mixes all playing voices into the output buffers, in slot order.
    /// The buffers must already be zeroed.
    pub fn mix(&mut self, store: &SampleStore, out_l: &mut [f32], out_r: &mut [f32]) {
        let nframes = out_l.len().min(out_r.len());

        for voice in &mut self.voices {
            if !voice.playing {
                continue;
            }

            let data = store.live(voice.pad_idx);
            if !data.info.valid {
                voice.playing = false;
                continue;
            }

            let remaining = voice.buffer_len.saturating_sub(voice.buffer_idx);
            let len = nframes
                .min(remaining)
                .saturating_sub(voice.start_idx)
                .min(data.info.num_frames.saturating_sub(voice.buffer_idx));

            if data.info.num_chans > 1 {
                // Compensate the mono pan law for stereo material.
                let gain_l = (voice.gain_l * std::f32::consts::SQRT_2).min(1.0);
                let gain_r = (voice.gain_r * std::f32::consts::SQRT_2).min(1.0);
                for i in 0..len {
                    out_l[voice.start_idx + i] += data.pcm[0][voice.buffer_idx + i] * gain_l;
                    out_r[voice.start_idx + i] += data.pcm[1][voice.buffer_idx + i] * gain_r;
                }
            } else {
                for i in 0..len {
                    let sample = data.pcm[0][voice.buffer_idx + i];
                    out_l[voice.start_idx + i] += sample * voice.gain_l;
                    out_r[voice.start_idx + i] += sample * voice.gain_r;
                }
            }

            voice.buffer_idx += len;
            voice.start_idx = 0;

            if voice.buffer_idx >= voice.buffer_len || voice.buffer_idx >= data.info.num_frames {
                voice.playing = false;
            }
        }
    }

    #[cfg(test)]
    pub fn playing_count(&self) -> usize {
        self.voices.iter().filter(|v| v.playing).count()
    }

    #[cfg(test)]
    pub fn cursor(&self) -> usize {
        self.voice_idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wave::{DecodedWave, WaveInfo};

    fn store_with(num_pads: usize, pad_idx: usize, decoded: DecodedWave) -> SampleStore {
        let store = SampleStore::new(num_pads);
        store.stage(pad_idx, decoded);
        store.publish(pad_idx);
        store.commit_pending();
        store
    }

    fn mono(frames: usize, value: f32) -> DecodedWave {
        DecodedWave {
            info: WaveInfo {
                valid: true,
                num_chans: 1,
                num_frames: frames,
                sample_rate: 48000,
                length_ms: frames as f64 * 1000.0 / 48000.0,
            },
            pcm: vec![vec![value; frames]],
        }
    }

    fn stereo(frames: usize, left: f32, right: f32) -> DecodedWave {
        DecodedWave {
            info: WaveInfo {
                valid: true,
                num_chans: 2,
                num_frames: frames,
                sample_rate: 48000,
                length_ms: frames as f64 * 1000.0 / 48000.0,
            },
            pcm: vec![vec![left; frames], vec![right; frames]],
        }
    }

    #[test]
    fn test_cursor_advances_by_trigger_count() {
        let mut pool = VoicePool::new(8);
        assert_eq!(pool.cursor(), 0);
        for _ in 0..5 {
            pool.assign(0, 0, 64, 1.0, 1.0, 1.0);
        }
        assert_eq!(pool.cursor(), 5);
        assert_eq!(pool.playing_count(), 5);
    }

    #[test]
    fn test_cursor_wraps() {
        let mut pool = VoicePool::new(1);
        for _ in 0..VOICES_PER_PAD {
            pool.assign(0, 0, 64, 1.0, 1.0, 1.0);
        }
        assert_eq!(pool.cursor(), 0);
    }

    #[test]
    fn test_voice_stealing_keeps_pool_size() {
        // Pool of four: six triggers in one period steal the first two.
        let mut pool = VoicePool::new(1);
        for gain in [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0] {
            pool.assign(0, 0, 64, gain, gain, 1.0);
        }
        assert_eq!(pool.playing_count(), VOICES_PER_PAD);
        let gains: Vec<f32> = pool.voices.iter().map(|v| v.gain_l).collect();
        // Slots 0 and 1 were overwritten by the fifth and sixth trigger.
        assert_eq!(gains, vec![5.0, 6.0, 3.0, 4.0]);
    }

    #[test]
    fn test_mix_mono_applies_gains() {
        let store = store_with(1, 0, mono(16, 1.0));
        let mut pool = VoicePool::new(1);
        pool.assign(0, 0, 16, 0.5, 0.25, 1.0);

        let mut out_l = vec![0.0f32; 16];
        let mut out_r = vec![0.0f32; 16];
        pool.mix(&store, &mut out_l, &mut out_r);

        assert!(out_l.iter().all(|&s| (s - 0.5).abs() < 1e-6));
        assert!(out_r.iter().all(|&s| (s - 0.25).abs() < 1e-6));
        assert_eq!(pool.playing_count(), 0);
    }

    #[test]
    fn test_mix_stereo_compensation_clamps_at_unity() {
        // Pan center at 0 dB gives 1/sqrt(2) per side; the stereo
        // sqrt(2) compensation lands exactly at the 1.0 clamp.
        let store = store_with(1, 0, stereo(8, 1.0, -1.0));
        let mut pool = VoicePool::new(1);
        let side = (0.5f32).sqrt();
        pool.assign(0, 0, 8, side, side, 1.0);

        let mut out_l = vec![0.0f32; 8];
        let mut out_r = vec![0.0f32; 8];
        pool.mix(&store, &mut out_l, &mut out_r);

        assert!(out_l.iter().all(|&s| (s - 1.0).abs() < 1e-6));
        assert!(out_r.iter().all(|&s| (s + 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_mix_spans_periods_and_stops_at_end() {
        let store = store_with(1, 0, mono(24, 1.0));
        let mut pool = VoicePool::new(1);
        pool.assign(0, 0, 24, 1.0, 1.0, 1.0);

        let mut out_l = vec![0.0f32; 16];
        let mut out_r = vec![0.0f32; 16];
        pool.mix(&store, &mut out_l, &mut out_r);
        assert_eq!(pool.playing_count(), 1);

        out_l.fill(0.0);
        out_r.fill(0.0);
        pool.mix(&store, &mut out_l, &mut out_r);
        assert_eq!(pool.playing_count(), 0);
        // Only the eight-frame tail lands in the second period.
        assert!(out_l[..8].iter().all(|&s| s == 1.0));
        assert!(out_l[8..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_mix_start_offset() {
        let store = store_with(1, 0, mono(4, 1.0));
        let mut pool = VoicePool::new(1);
        pool.assign(0, 10, 4, 1.0, 1.0, 1.0);

        let mut out_l = vec![0.0f32; 16];
        let mut out_r = vec![0.0f32; 16];
        pool.mix(&store, &mut out_l, &mut out_r);

        assert!(out_l[..10].iter().all(|&s| s == 0.0));
        assert!(out_l[10..14].iter().all(|&s| s == 1.0));
        assert!(out_l[14..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_mix_invalid_sample_clears_voice() {
        let store = SampleStore::new(1);
        let mut pool = VoicePool::new(1);
        pool.assign(0, 0, 64, 1.0, 1.0, 1.0);

        let mut out_l = vec![0.0f32; 16];
        let mut out_r = vec![0.0f32; 16];
        pool.mix(&store, &mut out_l, &mut out_r);

        assert_eq!(pool.playing_count(), 0);
        assert!(out_l.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_mix_truncated_source_stops_voice() {
        // buffer_len claims more frames than the PCM actually has.
        let store = store_with(1, 0, mono(8, 1.0));
        let mut pool = VoicePool::new(1);
        pool.assign(0, 0, 64, 1.0, 1.0, 1.0);

        let mut out_l = vec![0.0f32; 16];
        let mut out_r = vec![0.0f32; 16];
        pool.mix(&store, &mut out_l, &mut out_r);

        assert_eq!(pool.playing_count(), 0);
        assert!(out_l[..8].iter().all(|&s| s == 1.0));
        assert!(out_l[8..].iter().all(|&s| s == 0.0));
    }
}
