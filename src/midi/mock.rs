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

use parking_lot::Mutex;
#[cfg(test)]
use ringbuf::traits::Producer;
use ringbuf::HeapProd;
#[cfg(test)]
use tracing::debug;

use super::MidiEvent;

/// A mock input port. Tests inject events directly.
pub struct MidiIn {
    name: String,
    producer: Mutex<Option<HeapProd<MidiEvent>>>,
}

impl MidiIn {
    pub fn get(name: &str) -> MidiIn {
        MidiIn {
            name: name.to_string(),
            producer: Mutex::new(None),
        }
    }

    /// Queues an event for the next engine period.
    #[cfg(test)]
    pub fn inject(&self, event: MidiEvent) {
        if let Some(producer) = self.producer.lock().as_mut() {
            if producer.try_push(event).is_err() {
                debug!("Mock MIDI queue full, dropping event");
            }
        }
    }
}

impl super::MidiIn for MidiIn {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn start(&self, producer: HeapProd<MidiEvent>) -> Result<(), Box<dyn Error>> {
        *self.producer.lock() = Some(producer);
        Ok(())
    }

    fn connect(&self, _: &[String]) -> Result<(), Box<dyn Error>> {
        Ok(())
    }

    fn stop(&self) {
        self.producer.lock().take();
    }
}

impl fmt::Display for MidiIn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (mock input)", self.name)
    }
}

/// A mock output port that records everything sent to it.
pub struct MidiOut {
    name: String,
    sent: Mutex<Vec<MidiEvent>>,
}

impl MidiOut {
    pub fn get(name: &str) -> MidiOut {
        MidiOut {
            name: name.to_string(),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Drains everything sent so far.
    #[cfg(test)]
    pub fn take_sent(&self) -> Vec<MidiEvent> {
        std::mem::take(&mut self.sent.lock())
    }
}

impl super::MidiOut for MidiOut {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn connect(&self, _: &[String]) -> Result<(), Box<dyn Error>> {
        Ok(())
    }

    fn send(&self, events: &[MidiEvent]) {
        self.sent.lock().extend_from_slice(events);
    }
}

impl fmt::Display for MidiOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (mock output)", self.name)
    }
}
