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

use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::ProcessFn;

/// A mock host. Periods run only when the test asks for them, which
/// makes engine behaviour deterministic period by period.
pub struct Host {
    name: String,
    buffer_size: usize,
    sample_rate: u32,
    process: Mutex<Option<ProcessFn>>,
    connections: Mutex<Vec<(String, Vec<String>)>>,
    active: AtomicBool,
}

impl Host {
    /// Gets the given mock host.
    pub fn get(name: &str, buffer_size: usize, sample_rate: u32) -> Host {
        Host {
            name: name.to_string(),
            buffer_size,
            sample_rate,
            process: Mutex::new(None),
            connections: Mutex::new(Vec::new()),
            active: AtomicBool::new(false),
        }
    }

    /// Runs one period of `nframes` frames and returns the output.
    #[cfg(test)]
    pub fn run_period(&self, nframes: usize) -> (Vec<f32>, Vec<f32>) {
        assert!(nframes <= self.buffer_size);
        let mut out_l = vec![0.0f32; nframes];
        let mut out_r = vec![0.0f32; nframes];
        if self.active.load(Ordering::Acquire) {
            if let Some(process) = self.process.lock().as_mut() {
                process(&mut out_l, &mut out_r);
            }
        }
        (out_l, out_r)
    }

    /// The output connections recorded so far.
    #[cfg(test)]
    pub fn connections(&self) -> Vec<(String, Vec<String>)> {
        self.connections.lock().clone()
    }
}

impl super::Host for Host {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn activate(&self, process: ProcessFn) -> Result<(), Box<dyn Error>> {
        let mut slot = self.process.lock();
        if slot.is_some() {
            return Err("mock host is already active".into());
        }
        *slot = Some(process);
        self.active.store(true, Ordering::Release);
        Ok(())
    }

    fn connect_outputs(&self, left: &[String], right: &[String]) -> Result<(), Box<dyn Error>> {
        let mut connections = self.connections.lock();
        connections.push(("audio_out_l".to_string(), left.to_vec()));
        connections.push(("audio_out_r".to_string(), right.to_vec()));
        Ok(())
    }

    fn close(&self) {
        self.active.store(false, Ordering::Release);
        self.process.lock().take();
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
