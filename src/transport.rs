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

//! The tempo clock.
//!
//! Runs at 24 pulses per quarter note inside the audio callback,
//! emitting MIDI clock to the out port. Commands arrive from the
//! control thread through `TransportControl`, a pair of atomics the
//! callback samples once per period.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

use crate::midi::MidiOutBuffer;

/// MIDI clock resolution.
pub const PULSES_PER_QUARTER: u32 = 24;

/// Beats per bar; the sequencer grid assumes common time.
pub const BEATS_PER_BAR: u32 = 4;

const MIDI_CLOCK: u8 = 0xf8;
const MIDI_START: u8 = 0xfa;
const MIDI_STOP: u8 = 0xfc;

const REQUEST_NONE: u8 = 0;
const REQUEST_START: u8 = 1;
const REQUEST_STOP: u8 = 2;
const REQUEST_PAUSE: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    Idle,
    Running,
}

/// The clock position the callback reports once per step or heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportSnapshot {
    pub state: TransportState,
    pub bar: u32,
    pub beat: u32,
    pub pulse: u32,
    pub n_pulses: u32,
    /// Global sample index of the most recent pulse.
    pub pulse_idx: u64,
    pub tempo: f64,
}

impl Default for TransportSnapshot {
    fn default() -> Self {
        TransportSnapshot {
            state: TransportState::Idle,
            bar: 0,
            beat: 0,
            pulse: 0,
            n_pulses: PULSES_PER_QUARTER,
            pulse_idx: 0,
            tempo: crate::config::DEFAULT_TEMPO,
        }
    }
}

/// A transport command from the UI.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum TransportCommand {
    /// Begin (or resume) playback.
    Start,
    /// Halt and rewind to the top.
    Stop,
    /// Halt, keeping the position.
    Pause,
    /// Change the tempo.
    Tempo { tempo: f64 },
}

/// Cross-thread command mailbox. The control thread writes, the
/// callback samples once per period.
pub struct TransportControl {
    request: AtomicU8,
    tempo_bits: AtomicU64,
}

impl TransportControl {
    pub fn new(tempo: f64) -> Self {
        TransportControl {
            request: AtomicU8::new(REQUEST_NONE),
            tempo_bits: AtomicU64::new(clamp_tempo(tempo).to_bits()),
        }
    }

    pub fn apply(&self, command: TransportCommand) {
        match command {
            TransportCommand::Start => self.request.store(REQUEST_START, Ordering::Release),
            TransportCommand::Stop => self.request.store(REQUEST_STOP, Ordering::Release),
            TransportCommand::Pause => self.request.store(REQUEST_PAUSE, Ordering::Release),
            TransportCommand::Tempo { tempo } => self.set_tempo(tempo),
        }
    }

    pub fn set_tempo(&self, tempo: f64) {
        self.tempo_bits
            .store(clamp_tempo(tempo).to_bits(), Ordering::Release);
    }

    fn take_request(&self) -> u8 {
        self.request.swap(REQUEST_NONE, Ordering::Acquire)
    }

    fn tempo(&self) -> f64 {
        f64::from_bits(self.tempo_bits.load(Ordering::Acquire))
    }
}

fn clamp_tempo(tempo: f64) -> f64 {
    if !tempo.is_finite() {
        return crate::config::DEFAULT_TEMPO;
    }
    tempo.clamp(20.0, 999.0)
}

/// The clock state owned by the audio callback.
pub struct Transport {
    tempo: f64,
    sample_rate: u32,
    samples_per_pulse: f64,
    /// Frames from the current period start to the next pulse.
    next_pulse: f64,
    /// Position of the next pulse to fire.
    pulse: u32,
    beat: u32,
    bar: u32,
    /// Global frames processed so far.
    sample_pos: u64,
    state: TransportState,
    snapshot: TransportSnapshot,
}

impl Transport {
    pub fn new(sample_rate: u32, tempo: f64) -> Self {
        let tempo = clamp_tempo(tempo);
        Transport {
            tempo,
            sample_rate,
            samples_per_pulse: samples_per_pulse(sample_rate, tempo),
            next_pulse: 0.0,
            pulse: 0,
            beat: 0,
            bar: 0,
            sample_pos: 0,
            state: TransportState::Idle,
            snapshot: TransportSnapshot {
                tempo,
                ..TransportSnapshot::default()
            },
        }
    }

    /// Advances the clock by one period, emitting realtime MIDI to the
    /// out buffer, and returns the position after the period.
    pub fn process(
        &mut self,
        control: &TransportControl,
        nframes: usize,
        out: &mut MidiOutBuffer,
    ) -> TransportSnapshot {
        let tempo = control.tempo();
        if tempo != self.tempo {
            self.tempo = tempo;
            self.samples_per_pulse = samples_per_pulse(self.sample_rate, tempo);
        }

        match control.take_request() {
            REQUEST_START => {
                if self.state != TransportState::Running {
                    self.state = TransportState::Running;
                    out.push(0, &[MIDI_START]);
                }
            }
            REQUEST_STOP => {
                if self.state == TransportState::Running {
                    out.push(0, &[MIDI_STOP]);
                }
                self.state = TransportState::Idle;
                self.pulse = 0;
                self.beat = 0;
                self.bar = 0;
                self.next_pulse = 0.0;
            }
            REQUEST_PAUSE => {
                if self.state == TransportState::Running {
                    out.push(0, &[MIDI_STOP]);
                }
                self.state = TransportState::Idle;
            }
            _ => {}
        }

        if self.state == TransportState::Running {
            while self.next_pulse < nframes as f64 {
                let offset = self.next_pulse.max(0.0) as u32;
                out.push(offset, &[MIDI_CLOCK]);

                self.snapshot = TransportSnapshot {
                    state: TransportState::Running,
                    bar: self.bar,
                    beat: self.beat,
                    pulse: self.pulse,
                    n_pulses: PULSES_PER_QUARTER,
                    pulse_idx: self.sample_pos + offset as u64,
                    tempo: self.tempo,
                };

                self.pulse += 1;
                if self.pulse >= PULSES_PER_QUARTER {
                    self.pulse = 0;
                    self.beat += 1;
                    if self.beat >= BEATS_PER_BAR {
                        self.beat = 0;
                        self.bar += 1;
                    }
                }
                self.next_pulse += self.samples_per_pulse;
            }
            self.next_pulse -= nframes as f64;
        }

        self.sample_pos += nframes as u64;
        self.snapshot.state = self.state;
        self.snapshot.tempo = self.tempo;
        self.snapshot
    }
}

fn samples_per_pulse(sample_rate: u32, tempo: f64) -> f64 {
    sample_rate as f64 * 60.0 / (tempo * PULSES_PER_QUARTER as f64)
}
