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

//! Pad, pattern and step configuration.

use serde::{Deserialize, Deserializer, Serialize};

use crate::dsp;

/// Number of steps in a default pattern (one bar of sixteenths).
pub const DEFAULT_PATTERN_STEPS: usize = 16;

/// One sequencer cell: on/off plus a trigger velocity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Step {
    pub active: bool,
    #[serde(deserialize_with = "de_velocity")]
    pub velocity: u8,
}

impl Default for Step {
    fn default() -> Self {
        Step {
            active: false,
            velocity: 127,
        }
    }
}

/// Velocity is clamped to the MIDI range on ingest rather than rejected.
fn de_velocity<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = u32::deserialize(deserializer)?;
    Ok(value.min(127) as u8)
}

/// An ordered sequence of steps. The sequencer wraps modulo `n_steps`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Pattern {
    pub n_steps: usize,
    pub steps: Vec<Step>,
}

impl Default for Pattern {
    fn default() -> Self {
        Pattern {
            n_steps: DEFAULT_PATTERN_STEPS,
            steps: vec![Step::default(); DEFAULT_PATTERN_STEPS],
        }
    }
}

impl Pattern {
    /// Repairs the pattern in place: at least one step, `n_steps` within
    /// the actual step list.
    pub fn repair(&mut self) {
        if self.steps.is_empty() {
            self.steps = vec![Step::default(); DEFAULT_PATTERN_STEPS];
        }
        self.n_steps = self.n_steps.clamp(1, self.steps.len());
    }
}

/// One drum pad: a sample binding, a MIDI tone/controller, gain staging
/// and its sequencer patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pad {
    pub available: bool,
    pub tone: u8,
    pub ctrl: u8,
    pub sample_path: String,
    pub sample_name: String,
    pub sample_idx: usize,
    /// Gain in dB, clamped to [-200, 6].
    pub gain: f64,
    /// Pan position, clamped to [-100, 100].
    pub pan: f64,
    pub length_ms: f64,
    pub pitch: f64,
    pub n_patterns: usize,
    pub patterns: Vec<Pattern>,

    /// Playback length in samples, derived from `length_ms`.
    #[serde(skip)]
    pub length_samps: usize,
    /// Linear left gain, derived from `gain` and `pan`.
    #[serde(skip)]
    pub gain_left_lin: f32,
    /// Linear right gain, derived from `gain` and `pan`.
    #[serde(skip)]
    pub gain_right_lin: f32,
}

impl Default for Pad {
    fn default() -> Self {
        Pad {
            available: false,
            tone: 0,
            ctrl: 0,
            sample_path: String::new(),
            sample_name: String::new(),
            sample_idx: 0,
            gain: 0.0,
            pan: 0.0,
            length_ms: 0.0,
            pitch: 1.0,
            n_patterns: 1,
            patterns: vec![Pattern::default()],
            length_samps: 0,
            gain_left_lin: 0.0,
            gain_right_lin: 0.0,
        }
    }
}

impl Pad {
    /// Repairs the pad in place: clamps gain and pan, restores a default
    /// pattern set if none survived deserialisation.
    pub fn repair(&mut self) {
        self.gain = self.gain.clamp(dsp::GAIN_DB_MIN, dsp::GAIN_DB_MAX);
        self.pan = self.pan.clamp(-100.0, 100.0);
        if self.patterns.is_empty() {
            self.patterns = vec![Pattern::default()];
        }
        for pattern in &mut self.patterns {
            pattern.repair();
        }
        self.n_patterns = self.n_patterns.clamp(1, self.patterns.len());
    }

    /// Recomputes the derived playback fields from the user-facing ones.
    /// Must run after any change to gain, pan or length.
    pub fn compute_derived(&mut self, sample_rate: u32) {
        let (left, right) = dsp::pan_gains(self.gain, self.pan);
        self.gain_left_lin = left;
        self.gain_right_lin = right;
        self.length_samps = dsp::ms_to_samples(self.length_ms, sample_rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_velocity_clamped_on_ingest() {
        let step: Step = serde_json::from_str(r#"{"active":true,"velocity":200}"#).unwrap();
        assert_eq!(step.velocity, 127);
        assert!(step.active);
    }

    #[test]
    fn test_velocity_round_trip() {
        let json = r#"{"active":false,"velocity":200}"#;
        let step: Step = serde_json::from_str(json).unwrap();
        let back: Step = serde_json::from_str(&serde_json::to_string(&step).unwrap()).unwrap();
        assert_eq!(back.velocity, 127);
    }

    #[test]
    fn test_pad_defaults_patterns() {
        let pad: Pad = serde_json::from_str(r#"{"tone":36}"#).unwrap();
        assert_eq!(pad.n_patterns, 1);
        assert_eq!(pad.patterns.len(), 1);
        assert_eq!(pad.patterns[0].n_steps, DEFAULT_PATTERN_STEPS);
        assert!(pad.patterns[0].steps.iter().all(|s| !s.active));
    }

    #[test]
    fn test_pad_repair_clamps() {
        let mut pad = Pad {
            gain: 20.0,
            pan: -500.0,
            n_patterns: 4,
            ..Pad::default()
        };
        pad.repair();
        assert_eq!(pad.gain, dsp::GAIN_DB_MAX);
        assert_eq!(pad.pan, -100.0);
        assert_eq!(pad.n_patterns, 1);
    }

    #[test]
    fn test_compute_derived() {
        let mut pad = Pad {
            gain: 0.0,
            pan: 0.0,
            length_ms: 1000.0,
            ..Pad::default()
        };
        pad.compute_derived(48000);
        assert_eq!(pad.length_samps, 48000);
        let expected = (0.5f64).sqrt() as f32;
        assert!((pad.gain_left_lin - expected).abs() < 1e-6);
        assert!((pad.gain_right_lin - expected).abs() < 1e-6);
    }
}
