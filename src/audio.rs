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
use std::sync::Arc;

mod cpal;
mod mock;

/// The per-period callback the engine hands to the host. Receives the
/// left and right output buffers for one period; the host guarantees
/// their length never exceeds the negotiated buffer size.
pub type ProcessFn = Box<dyn FnMut(&mut [f32], &mut [f32]) + Send>;

/// A realtime audio host driving the engine's process callback.
pub trait Host: fmt::Display + Send + Sync {
    fn name(&self) -> String;

    /// The engine sample rate, fixed at creation.
    fn sample_rate(&self) -> u32;

    /// Upper bound on frames per period.
    fn buffer_size(&self) -> usize;

    /// Registers the process callback and starts the realtime thread.
    fn activate(&self, process: ProcessFn) -> Result<(), Box<dyn Error>>;

    /// Attaches the stereo outputs to the given targets, best effort.
    fn connect_outputs(&self, left: &[String], right: &[String]) -> Result<(), Box<dyn Error>>;

    /// Stops the realtime thread. Blocks until the callback has exited.
    fn close(&self);
}

/// Lists output devices known to cpal.
pub fn list_devices() -> Result<Vec<String>, Box<dyn Error>> {
    cpal::list()
}

/// Gets a host with the given device name.
pub fn get_host(name: &str, buffer_size: usize) -> Result<Arc<dyn Host>, Box<dyn Error>> {
    if name.starts_with("mock") {
        return Ok(Arc::new(mock::Host::get(name, buffer_size, 48000)));
    }

    Ok(Arc::new(cpal::Host::get(name, buffer_size)?))
}
