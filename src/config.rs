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

//! The sampler configuration model.
//!
//! Configuration invariants are repaired in place (clamped or resized)
//! rather than rejected, so a hand-edited config file always produces a
//! runnable engine.

use serde::{Deserialize, Serialize};

mod file;
mod packs;
mod pad;
mod sample;

pub use file::{default_config_path, default_pack_path, load, save};
pub use packs::{scan_packs, scan_sample_folder, SamplePack};
pub use pad::{Pad, Pattern, Step, DEFAULT_PATTERN_STEPS};
pub use sample::Sample;

/// Number of drum pads. The pad list is always exactly this long.
pub const NUM_PADS: usize = 8;

/// Default transport tempo in BPM.
pub const DEFAULT_TEMPO: f64 = 120.0;

/// The full sampler configuration, persisted as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub tempo: f64,
    pub num_pads: usize,
    pub num_samples: usize,
    pub pads: Vec<Pad>,
    pub samples: Vec<Sample>,
    pub midi_chan: u8,
    pub reconnect: bool,
    pub midi_in_connections: Vec<String>,
    pub midi_out_connections: Vec<String>,
    pub audio_left_connections: Vec<String>,
    pub audio_right_connections: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            tempo: DEFAULT_TEMPO,
            num_pads: NUM_PADS,
            num_samples: 0,
            pads: vec![Pad::default(); NUM_PADS],
            samples: Vec::new(),
            midi_chan: 0,
            reconnect: false,
            midi_in_connections: Vec::new(),
            midi_out_connections: Vec::new(),
            audio_left_connections: Vec::new(),
            audio_right_connections: Vec::new(),
        }
    }
}

impl Config {
    /// Repairs the configuration in place: exactly `NUM_PADS` pads, all
    /// per-pad clamps applied, counts and catalog indices consistent.
    pub fn repair(&mut self) {
        self.pads.resize_with(NUM_PADS, Pad::default);
        self.num_pads = NUM_PADS;
        self.num_samples = self.samples.len();
        self.midi_chan = self.midi_chan.min(15);
        if !self.tempo.is_finite() || self.tempo <= 0.0 {
            self.tempo = DEFAULT_TEMPO;
        }

        for pad in &mut self.pads {
            pad.repair();
        }

        // Re-resolve catalog indices from the sample paths.
        for pad in &mut self.pads {
            pad.sample_idx = self
                .samples
                .iter()
                .position(|s| !pad.sample_path.is_empty() && s.relative_path == pad.sample_path)
                .unwrap_or(0);
        }
    }

    /// Recomputes every pad's derived playback fields.
    pub fn compute_derived(&mut self, sample_rate: u32) {
        for pad in &mut self.pads {
            pad.compute_derived(sample_rate);
        }
    }
}
