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

//! Two-slot configuration handoff between the control thread and the
//! audio callback.
//!
//! The callback reads only the active slot; the control thread writes
//! only the inactive slot and flags the swap. The flag is release-stored
//! by the writer and acquire-loaded by the reader, so a published config
//! is fully visible before the callback flips to it. The active slot is
//! never written by anyone, which keeps concurrent snapshot reads sound.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::config::Config;

pub struct ConfigSwap {
    slots: [UnsafeCell<Config>; 2],
    cur: AtomicUsize,
    next: AtomicUsize,
    update: AtomicBool,
}

// Slot access is disciplined by `cur`/`update`: the callback only
// dereferences the active slot, the control thread only writes the
// inactive slot and only while no swap is pending.
unsafe impl Sync for ConfigSwap {}
unsafe impl Send for ConfigSwap {}

impl ConfigSwap {
    pub fn new(initial: Config) -> Self {
        ConfigSwap {
            slots: [
                UnsafeCell::new(initial.clone()),
                UnsafeCell::new(initial),
            ],
            cur: AtomicUsize::new(0),
            next: AtomicUsize::new(0),
            update: AtomicBool::new(false),
        }
    }

    /// True while a published config has not yet been observed by the
    /// callback.
    pub fn pending(&self) -> bool {
        self.update.load(Ordering::Acquire)
    }

    /// Publishes a new configuration. Control thread only, and only
    /// while no swap is pending (the caller waits out a pending swap
    /// first), which guarantees the inactive slot is not in use.
    pub fn publish(&self, config: Config) {
        let staging = 1 - self.cur.load(Ordering::Relaxed);
        unsafe {
            *self.slots[staging].get() = config;
        }
        self.next.store(staging, Ordering::Relaxed);
        self.update.store(true, Ordering::Release);
    }

    /// Observes a pending swap. Called by the audio callback at period
    /// start; the active slot then stays fixed for the whole period.
    pub fn begin_period(&self) {
        if self.update.load(Ordering::Acquire) {
            self.cur
                .store(self.next.load(Ordering::Relaxed), Ordering::Relaxed);
            self.update.store(false, Ordering::Release);
        }
    }

    /// The active configuration. Audio callback only; valid for the
    /// remainder of the period.
    pub fn active(&self) -> &Config {
        unsafe { &*self.slots[self.cur.load(Ordering::Relaxed)].get() }
    }

    /// A clone of the active configuration for the control thread.
    pub fn snapshot(&self) -> Config {
        unsafe { (*self.slots[self.cur.load(Ordering::Relaxed)].get()).clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_visible_after_period_boundary() {
        let swap = ConfigSwap::new(Config::default());
        assert_eq!(swap.active().tempo, crate::config::DEFAULT_TEMPO);

        let mut config = Config::default();
        config.tempo = 133.0;
        swap.publish(config);
        assert!(swap.pending());

        // Not yet observed: the active slot is unchanged.
        assert_eq!(swap.active().tempo, crate::config::DEFAULT_TEMPO);

        swap.begin_period();
        assert!(!swap.pending());
        assert_eq!(swap.active().tempo, 133.0);
    }

    #[test]
    fn test_begin_period_without_pending_is_noop() {
        let swap = ConfigSwap::new(Config::default());
        swap.begin_period();
        assert_eq!(swap.active().tempo, crate::config::DEFAULT_TEMPO);
    }

    #[test]
    fn test_snapshot_matches_active() {
        let swap = ConfigSwap::new(Config::default());
        let mut config = Config::default();
        config.midi_chan = 5;
        swap.publish(config);
        swap.begin_period();
        assert_eq!(swap.snapshot().midi_chan, 5);
    }

    #[test]
    fn test_alternating_publishes_use_both_slots() {
        let swap = ConfigSwap::new(Config::default());
        for tempo in [100.0, 110.0, 120.0, 130.0] {
            let mut config = Config::default();
            config.tempo = tempo;
            swap.publish(config);
            swap.begin_period();
            assert_eq!(swap.active().tempo, tempo);
        }
    }
}
