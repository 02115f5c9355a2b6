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

use ringbuf::HeapProd;

mod midir;
mod mock;

/// Capacity of the inbound MIDI event ring.
pub const MIDI_QUEUE_LEN: usize = 1024;

/// A raw MIDI event with its frame offset into the current period.
///
/// Three bytes cover every channel message; the inbound path rejects
/// system exclusive data before it gets here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MidiEvent {
    /// Frame offset within the period the event applies to.
    pub time: u32,
    pub len: u8,
    pub data: [u8; 3],
}

impl MidiEvent {
    pub fn new(time: u32, data: &[u8]) -> Self {
        let mut event = MidiEvent {
            time,
            len: data.len().min(3) as u8,
            ..MidiEvent::default()
        };
        event.data[..event.len as usize].copy_from_slice(&data[..event.len as usize]);
        event
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }
}

/// Outbound events collected during one period. The buffer is
/// preallocated; events beyond capacity are dropped rather than grown,
/// so the callback never allocates.
pub struct MidiOutBuffer {
    events: Vec<MidiEvent>,
}

impl MidiOutBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        MidiOutBuffer {
            events: Vec::with_capacity(capacity),
        }
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn push(&mut self, time: u32, data: &[u8]) {
        if self.events.len() < self.events.capacity() {
            self.events.push(MidiEvent::new(time, data));
        }
    }

    pub fn events(&self) -> &[MidiEvent] {
        &self.events
    }
}

/// An inbound MIDI port. The backend pushes timestamped events into the
/// producer half of the engine's event ring.
pub trait MidiIn: fmt::Display + Send + Sync {
    fn name(&self) -> String;

    /// Starts delivering events into the given producer.
    fn start(&self, producer: HeapProd<MidiEvent>) -> Result<(), Box<dyn Error>>;

    /// Attaches the port to the given device names, best effort.
    fn connect(&self, targets: &[String]) -> Result<(), Box<dyn Error>>;

    /// Stops delivering events.
    fn stop(&self);
}

/// An outbound MIDI port. `send` is called from the audio callback and
/// must not block.
pub trait MidiOut: fmt::Display + Send + Sync {
    fn name(&self) -> String;

    /// Attaches the port to the given device names, best effort.
    fn connect(&self, targets: &[String]) -> Result<(), Box<dyn Error>>;

    /// Emits the period's outbound events.
    fn send(&self, events: &[MidiEvent]);
}

/// Lists MIDI devices known to midir.
pub fn list_devices() -> Result<Vec<String>, Box<dyn Error>> {
    midir::list()
}

/// Gets an input port with the given name.
pub fn get_midi_in(name: &str) -> Arc<dyn MidiIn> {
    if name.starts_with("mock") {
        return Arc::new(mock::MidiIn::get(name));
    }
    Arc::new(midir::MidiIn::get(name))
}

/// Gets an output port with the given name.
pub fn get_midi_out(name: &str) -> Arc<dyn MidiOut> {
    if name.starts_with("mock") {
        return Arc::new(mock::MidiOut::get(name));
    }
    Arc::new(midir::MidiOut::get(name))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_truncates_to_three_bytes() {
        let event = MidiEvent::new(5, &[0x90, 0x24, 0x7f, 0x00, 0x01]);
        assert_eq!(event.time, 5);
        assert_eq!(event.bytes(), &[0x90, 0x24, 0x7f]);
    }

    #[test]
    fn test_out_buffer_drops_beyond_capacity() {
        let mut buffer = MidiOutBuffer::with_capacity(2);
        buffer.push(0, &[0xf8]);
        buffer.push(1, &[0xf8]);
        buffer.push(2, &[0xf8]);
        assert_eq!(buffer.events().len(), 2);

        buffer.clear();
        assert!(buffer.events().is_empty());
    }
}
