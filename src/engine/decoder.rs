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

//! Inbound MIDI decoding.
//!
//! Drains the period's raw events, filters them down to the configured
//! channel and turns note-ons into voice allocations and control
//! changes into gain overrides. Runs inside the audio callback, so
//! parse failures are skipped silently.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use midly::live::LiveEvent;
use midly::MidiMessage;
use ringbuf::traits::Consumer;
use ringbuf::HeapCons;

use crate::config::Config;
use crate::midi::MidiEvent;

use super::voice::VoicePool;

/// Per-pad normalised gain overrides written by the CC handler.
///
/// The callback writes a single scalar per pad; the control thread
/// folds it into the pad's dB gain at the next configuration publish.
/// Keeping the override out of the config slots keeps those
/// single-writer.
pub struct CcOverrides {
    pads: Vec<PadCc>,
}

struct PadCc {
    level: AtomicU32,
    set: AtomicBool,
}

impl CcOverrides {
    pub fn new(num_pads: usize) -> Self {
        CcOverrides {
            pads: (0..num_pads)
                .map(|_| PadCc {
                    level: AtomicU32::new(0),
                    set: AtomicBool::new(false),
                })
                .collect(),
        }
    }

    /// Records a normalised level for a pad. Audio callback only.
    pub fn set(&self, pad_idx: usize, level: f32) {
        let pad = &self.pads[pad_idx];
        pad.level.store(level.to_bits(), Ordering::Relaxed);
        pad.set.store(true, Ordering::Release);
    }

    /// Consumes the pending override for a pad, if any. Control thread.
    pub fn take(&self, pad_idx: usize) -> Option<f32> {
        let pad = &self.pads[pad_idx];
        if pad.set.swap(false, Ordering::Acquire) {
            Some(f32::from_bits(pad.level.load(Ordering::Relaxed)))
        } else {
            None
        }
    }
}

/// Drains and decodes the period's inbound events.
pub fn decode_pending(
    events: &mut HeapCons<MidiEvent>,
    config: &Config,
    cc: &CcOverrides,
    voices: &mut VoicePool,
) {
    while let Some(event) = events.try_pop() {
        decode_one(&event, config, cc, voices);
    }
}

fn decode_one(event: &MidiEvent, config: &Config, cc: &CcOverrides, voices: &mut VoicePool) {
    // System messages and anything on another channel are rejected
    // before the message type is even looked at.
    let parsed = match LiveEvent::parse(event.bytes()) {
        Ok(parsed) => parsed,
        Err(_) => return,
    };
    let LiveEvent::Midi { channel, message } = parsed else {
        return;
    };
    if u8::from(channel) != config.midi_chan {
        return;
    }

    match message {
        MidiMessage::NoteOn { key, vel } => {
            let tone = u8::from(key);
            let velocity = u8::from(vel) as f32 / 127.0;
            // Every pad listening on this tone fires.
            for (pad_idx, pad) in config.pads.iter().enumerate() {
                if pad.tone != tone || !pad.available {
                    continue;
                }
                voices.assign(
                    pad_idx,
                    event.time as usize,
                    pad.length_samps,
                    velocity * pad.gain_left_lin,
                    velocity * pad.gain_right_lin,
                    pad.pitch,
                );
            }
        }
        MidiMessage::Controller { controller, value } => {
            let ctrl = u8::from(controller);
            let level = u8::from(value) as f32 / 127.0;
            for (pad_idx, pad) in config.pads.iter().enumerate() {
                if pad.ctrl == ctrl {
                    cc.set(pad_idx, level);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NUM_PADS;
    use ringbuf::traits::{Producer, Split};
    use ringbuf::HeapRb;

    fn config_with_pad(pad_idx: usize, tone: u8, ctrl: u8) -> Config {
        let mut config = Config::default();
        config.midi_chan = 3;
        let pad = &mut config.pads[pad_idx];
        pad.available = true;
        pad.tone = tone;
        pad.ctrl = ctrl;
        pad.length_ms = 100.0;
        config.compute_derived(48000);
        config
    }

    fn decode(events: &[MidiEvent], config: &Config) -> (VoicePool, CcOverrides) {
        let (mut prod, mut cons) = HeapRb::<MidiEvent>::new(64).split();
        for event in events {
            prod.try_push(*event).unwrap();
        }
        let mut voices = VoicePool::new(NUM_PADS);
        let cc = CcOverrides::new(NUM_PADS);
        decode_pending(&mut cons, config, &cc, &mut voices);
        (voices, cc)
    }

    #[test]
    fn test_note_on_matching_channel_triggers() {
        let config = config_with_pad(0, 36, 20);
        let (voices, _) = decode(&[MidiEvent::new(7, &[0x93, 36, 100])], &config);
        assert_eq!(voices.playing_count(), 1);
    }

    #[test]
    fn test_note_on_wrong_channel_ignored() {
        let config = config_with_pad(0, 36, 20);
        let (voices, _) = decode(&[MidiEvent::new(0, &[0x94, 36, 100])], &config);
        assert_eq!(voices.playing_count(), 0);
    }

    #[test]
    fn test_system_message_rejected() {
        let config = config_with_pad(0, 36, 20);
        // Clock and start are realtime system messages even though the
        // low nibble happens to match the channel filter.
        let (voices, _) = decode(
            &[MidiEvent::new(0, &[0xf8]), MidiEvent::new(0, &[0xfa])],
            &config,
        );
        assert_eq!(voices.playing_count(), 0);
    }

    #[test]
    fn test_shared_tone_fans_out() {
        let mut config = config_with_pad(0, 36, 20);
        config.pads[4].available = true;
        config.pads[4].tone = 36;
        config.pads[4].length_ms = 100.0;
        config.compute_derived(48000);

        let (voices, _) = decode(&[MidiEvent::new(0, &[0x93, 36, 127])], &config);
        assert_eq!(voices.playing_count(), 2);
    }

    #[test]
    fn test_unavailable_pad_not_triggered() {
        let mut config = config_with_pad(0, 36, 20);
        config.pads[0].available = false;
        let (voices, _) = decode(&[MidiEvent::new(0, &[0x93, 36, 127])], &config);
        assert_eq!(voices.playing_count(), 0);
    }

    #[test]
    fn test_control_change_records_override() {
        let config = config_with_pad(2, 36, 21);
        let (voices, cc) = decode(&[MidiEvent::new(0, &[0xb3, 21, 64])], &config);
        assert_eq!(voices.playing_count(), 0);
        let level = cc.take(2).unwrap();
        assert!((level - 64.0 / 127.0).abs() < 1e-6);
        // Consumed on take.
        assert!(cc.take(2).is_none());
    }

    #[test]
    fn test_garbage_bytes_skipped() {
        let config = config_with_pad(0, 36, 20);
        let (voices, _) = decode(&[MidiEvent::new(0, &[0x03, 0x42])], &config);
        assert_eq!(voices.playing_count(), 0);
    }
}
