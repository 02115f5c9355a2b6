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

//! Step sequencer: maps the transport position to pad triggers.

use crate::config::Config;
use crate::transport::{TransportSnapshot, TransportState};

use super::voice::VoicePool;

/// Sixteenth-note grid length of one bar.
pub const STEPS_PER_BAR: usize = 16;

/// The step index for the given transport position, or `None` while
/// the transport is not running.
pub fn step_index(ts: &TransportSnapshot) -> Option<usize> {
    if ts.state != TransportState::Running || ts.n_pulses == 0 {
        return None;
    }
    let sixteenth = (ts.pulse as f64 / ts.n_pulses as f64 * 4.0).floor() as usize;
    Some((ts.beat as usize * 4 + sixteenth) % STEPS_PER_BAR)
}

/// Allocates a voice for every pad whose pattern has an active step at
/// `step_idx`. Called once per step transition.
pub fn evaluate(
    step_idx: usize,
    config: &Config,
    ts: &TransportSnapshot,
    buffer_size: usize,
    voices: &mut VoicePool,
) {
    let pattern_idx = step_idx / STEPS_PER_BAR;

    for (pad_idx, pad) in config.pads.iter().enumerate() {
        if !pad.available || pad.n_patterns == 0 {
            continue;
        }

        let Some(pattern) = pad.patterns.get(pattern_idx % pad.n_patterns) else {
            continue;
        };
        if pattern.n_steps == 0 {
            continue;
        }
        let Some(step) = pattern.steps.get(step_idx % pattern.n_steps) else {
            continue;
        };
        if !step.active {
            continue;
        }

        let strength = step.velocity as f32 / 127.0;
        let start_idx = if buffer_size > 0 {
            (ts.pulse_idx % buffer_size as u64) as usize
        } else {
            0
        };
        voices.assign(
            pad_idx,
            start_idx,
            pad.length_samps,
            pad.gain_left_lin * strength,
            pad.gain_right_lin * strength,
            pad.pitch,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::PULSES_PER_QUARTER;

    fn running(beat: u32, pulse: u32, pulse_idx: u64) -> TransportSnapshot {
        TransportSnapshot {
            state: TransportState::Running,
            beat,
            pulse,
            pulse_idx,
            n_pulses: PULSES_PER_QUARTER,
            ..TransportSnapshot::default()
        }
    }

    fn config_with_active_step(pad_idx: usize, n_steps: usize, active: &[usize]) -> Config {
        let mut config = Config::default();
        let pad = &mut config.pads[pad_idx];
        pad.available = true;
        pad.length_ms = 100.0;
        let pattern = &mut pad.patterns[0];
        pattern.n_steps = n_steps;
        for &step in active {
            pattern.steps[step].active = true;
        }
        config.compute_derived(48000);
        config
    }

    #[test]
    fn test_step_index_idle() {
        let ts = TransportSnapshot::default();
        assert_eq!(step_index(&ts), None);
    }

    #[test]
    fn test_step_index_grid() {
        // Six pulses per sixteenth at 24 PPQN.
        assert_eq!(step_index(&running(0, 0, 0)), Some(0));
        assert_eq!(step_index(&running(0, 5, 0)), Some(0));
        assert_eq!(step_index(&running(0, 6, 0)), Some(1));
        assert_eq!(step_index(&running(0, 23, 0)), Some(3));
        assert_eq!(step_index(&running(1, 0, 0)), Some(4));
        assert_eq!(step_index(&running(3, 18, 0)), Some(15));
    }

    #[test]
    fn test_evaluate_triggers_active_step() {
        let config = config_with_active_step(2, 16, &[0]);
        let mut voices = VoicePool::new(crate::config::NUM_PADS);

        evaluate(0, &config, &running(0, 0, 0), 1024, &mut voices);
        assert_eq!(voices.playing_count(), 1);

        evaluate(1, &config, &running(0, 6, 6000), 1024, &mut voices);
        assert_eq!(voices.playing_count(), 1);
    }

    #[test]
    fn test_evaluate_short_pattern_wraps_every_beat() {
        // A four-step pattern with step 0 active fires on steps 0, 4,
        // 8 and 12: once per beat.
        let config = config_with_active_step(0, 4, &[0]);
        let mut voices = VoicePool::new(crate::config::NUM_PADS);

        for step in 0..STEPS_PER_BAR {
            evaluate(step, &config, &running(0, 0, 0), 1024, &mut voices);
        }
        assert_eq!(voices.playing_count(), 4);
    }

    #[test]
    fn test_evaluate_skips_unavailable_pads() {
        let mut config = config_with_active_step(0, 16, &[0]);
        config.pads[0].available = false;
        let mut voices = VoicePool::new(crate::config::NUM_PADS);
        evaluate(0, &config, &running(0, 0, 0), 1024, &mut voices);
        assert_eq!(voices.playing_count(), 0);
    }

    #[test]
    fn test_evaluate_start_offset_from_pulse_position() {
        let config = config_with_active_step(0, 16, &[4]);
        let mut voices = VoicePool::new(crate::config::NUM_PADS);
        // Pulse landed 200 samples into a period.
        evaluate(4, &config, &running(1, 0, 24200), 1024, &mut voices);
        assert_eq!(voices.playing_count(), 1);

        // The start offset is observable through the mix: the sample
        // begins 24200 % 1024 = 648 frames into the buffer.
        let store = crate::engine::store::SampleStore::new(crate::config::NUM_PADS);
        let frames = 4;
        store.stage(
            0,
            crate::wave::DecodedWave {
                info: crate::wave::WaveInfo {
                    valid: true,
                    num_chans: 1,
                    num_frames: frames,
                    sample_rate: 48000,
                    length_ms: 100.0,
                },
                pcm: vec![vec![1.0; frames]],
            },
        );
        store.publish(0);
        store.commit_pending();

        let mut out_l = vec![0.0f32; 1024];
        let mut out_r = vec![0.0f32; 1024];
        voices.mix(&store, &mut out_l, &mut out_r);
        let onset = out_l.iter().position(|&s| s != 0.0).unwrap();
        assert_eq!(onset, 24200 % 1024);
    }

    #[test]
    fn test_evaluate_velocity_scales_gain() {
        let mut config = config_with_active_step(0, 16, &[0]);
        config.pads[0].patterns[0].steps[0].velocity = 64;
        config.compute_derived(48000);
        let mut voices = VoicePool::new(crate::config::NUM_PADS);
        evaluate(0, &config, &running(0, 0, 0), 1024, &mut voices);

        let store = crate::engine::store::SampleStore::new(crate::config::NUM_PADS);
        store.stage(
            0,
            crate::wave::DecodedWave {
                info: crate::wave::WaveInfo {
                    valid: true,
                    num_chans: 1,
                    num_frames: 1,
                    sample_rate: 48000,
                    length_ms: 100.0,
                },
                pcm: vec![vec![1.0]],
            },
        );
        store.publish(0);
        store.commit_pending();

        let mut out_l = vec![0.0f32; 16];
        let mut out_r = vec![0.0f32; 16];
        voices.mix(&store, &mut out_l, &mut out_r);

        let expected = config.pads[0].gain_left_lin * 64.0 / 127.0;
        assert!((out_l[0] - expected).abs() < 1e-6);
    }
}
