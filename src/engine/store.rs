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

//! Per-pad double-buffered sample storage.
//!
//! Each pad holds two decoded PCM slots. The audio callback reads the
//! live slot; the control thread decodes into the staging slot and
//! flags it, and the callback flips at the next period boundary, so the
//! live slot never changes mid-period. All allocation happens on the
//! control thread.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::wave::{DecodedWave, WaveInfo};

struct PadSlot {
    slots: [UnsafeCell<DecodedWave>; 2],
    cur: AtomicUsize,
    update: AtomicBool,
}

pub struct SampleStore {
    pads: Vec<PadSlot>,
}

// Slot access is disciplined by `cur`/`update`: the callback only reads
// the live slot, the control thread only writes the staging slot and
// only while no flip is pending.
unsafe impl Sync for SampleStore {}
unsafe impl Send for SampleStore {}

impl SampleStore {
    pub fn new(num_pads: usize) -> Self {
        SampleStore {
            pads: (0..num_pads)
                .map(|_| PadSlot {
                    slots: [
                        UnsafeCell::new(DecodedWave::default()),
                        UnsafeCell::new(DecodedWave::default()),
                    ],
                    cur: AtomicUsize::new(0),
                    update: AtomicBool::new(false),
                })
                .collect(),
        }
    }

    /// True while any pad has a staged buffer the callback has not yet
    /// flipped to.
    pub fn any_pending(&self) -> bool {
        self.pads.iter().any(|p| p.update.load(Ordering::Acquire))
    }

    /// Writes a decoded sample into the staging slot. Control thread
    /// only, and only while no flip is pending for this pad; the staged
    /// buffer becomes live once `publish` marks it and the callback
    /// commits.
    pub fn stage(&self, pad_idx: usize, decoded: DecodedWave) {
        let pad = &self.pads[pad_idx];
        let staging = 1 - pad.cur.load(Ordering::Relaxed);
        unsafe {
            *pad.slots[staging].get() = decoded;
        }
    }

    /// Marks the staged buffer for pickup at the next period boundary.
    /// Control thread only.
    pub fn publish(&self, pad_idx: usize) {
        self.pads[pad_idx].update.store(true, Ordering::Release);
    }

    /// Flips every flagged pad to its staged buffer. Called by the
    /// audio callback at period start.
    pub fn commit_pending(&self) {
        for pad in &self.pads {
            if pad.update.load(Ordering::Acquire) {
                let cur = pad.cur.load(Ordering::Relaxed);
                pad.cur.store(1 - cur, Ordering::Relaxed);
                pad.update.store(false, Ordering::Release);
            }
        }
    }

    /// The live sample for a pad. Audio callback only; valid for the
    /// remainder of the period.
    pub fn live(&self, pad_idx: usize) -> &DecodedWave {
        let pad = &self.pads[pad_idx];
        unsafe { &*pad.slots[pad.cur.load(Ordering::Relaxed)].get() }
    }

    /// A copy of the live slot's metadata for the control thread. The
    /// live slot's contents only change through a control-thread stage
    /// followed by a flip, so this read cannot observe a torn write.
    pub fn live_info(&self, pad_idx: usize) -> WaveInfo {
        let pad = &self.pads[pad_idx];
        unsafe { (*pad.slots[pad.cur.load(Ordering::Relaxed)].get()).info }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoded(frames: usize, value: f32) -> DecodedWave {
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

    #[test]
    fn test_live_slot_fixed_until_commit() {
        let store = SampleStore::new(2);
        assert!(!store.live(0).info.valid);

        store.stage(0, decoded(64, 0.5));
        store.publish(0);
        assert!(store.any_pending());

        // Not yet committed: the live slot is still the empty default.
        assert!(!store.live(0).info.valid);

        store.commit_pending();
        assert!(!store.any_pending());
        let live = store.live(0);
        assert!(live.info.valid);
        assert_eq!(live.info.num_frames, 64);
        assert_eq!(live.pcm[0][0], 0.5);
    }

    #[test]
    fn test_stage_without_publish_is_invisible() {
        let store = SampleStore::new(1);
        store.stage(0, decoded(16, 1.0));
        store.commit_pending();
        assert!(!store.live(0).info.valid);
    }

    #[test]
    fn test_restage_replaces_live_buffer() {
        let store = SampleStore::new(1);
        store.stage(0, decoded(16, 0.25));
        store.publish(0);
        store.commit_pending();

        store.stage(0, decoded(32, 0.75));
        store.publish(0);
        store.commit_pending();

        let live = store.live(0);
        assert_eq!(live.info.num_frames, 32);
        assert_eq!(live.pcm[0][0], 0.75);
    }

    #[test]
    fn test_live_info_copy() {
        let store = SampleStore::new(1);
        store.stage(0, decoded(128, 0.1));
        store.publish(0);
        store.commit_pending();

        let info = store.live_info(0);
        assert!(info.valid);
        assert_eq!(info.num_frames, 128);
    }
}
