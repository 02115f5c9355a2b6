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
use std::mem;

use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use ringbuf::traits::Producer;
use ringbuf::HeapProd;
use tracing::{debug, info, warn};

use super::MidiEvent;

/// Lists the names of all MIDI input and output ports midir can see.
pub fn list() -> Result<Vec<String>, Box<dyn Error>> {
    let mut names = Vec::new();

    let input = MidiInput::new("padtrack enumerate input")?;
    for port in input.ports() {
        names.push(format!("{} (input)", input.port_name(&port)?));
    }
    let output = MidiOutput::new("padtrack enumerate output")?;
    for port in output.ports() {
        names.push(format!("{} (output)", output.port_name(&port)?));
    }

    Ok(names)
}

/// The midir-backed input port.
///
/// midir delivers events on its own thread with no relation to audio
/// periods, so events are stamped at frame offset zero and picked up at
/// the start of the next period.
pub struct MidiIn {
    name: String,
    producer: Mutex<Option<HeapProd<MidiEvent>>>,
    connection: Mutex<Option<MidiInputConnection<()>>>,
}

impl MidiIn {
    pub fn get(name: &str) -> MidiIn {
        MidiIn {
            name: name.to_string(),
            producer: Mutex::new(None),
            connection: Mutex::new(None),
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

    fn connect(&self, targets: &[String]) -> Result<(), Box<dyn Error>> {
        let mut connection = self.connection.lock();
        if connection.is_some() {
            return Ok(());
        }

        let mut producer = match self.producer.lock().take() {
            Some(producer) => producer,
            None => return Err("MIDI input has not been started".into()),
        };

        let input = MidiInput::new("padtrack input")?;
        let port = input
            .ports()
            .into_iter()
            .find(|p| {
                input
                    .port_name(p)
                    .map(|n| targets.iter().any(|t| n.contains(t.as_str())))
                    .unwrap_or(false)
            })
            .ok_or_else(|| format!("no MIDI input port matches {:?}", targets))?;

        let port_name = input.port_name(&port)?;
        info!(port = port_name, "Connecting MIDI input");

        *connection = Some(input.connect(
            &port,
            "padtrack input watcher",
            move |_, raw, _| {
                // System exclusive and other long messages are dropped
                // here; the decoder only handles channel messages.
                if raw.is_empty() || raw.len() > 3 {
                    return;
                }
                if producer.try_push(MidiEvent::new(0, raw)).is_err() {
                    debug!("Inbound MIDI queue full, dropping event");
                }
            },
            (),
        )?);

        Ok(())
    }

    fn stop(&self) {
        let connection = self.connection.lock().take();
        mem::drop(connection);
    }
}

impl fmt::Display for MidiIn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (midir input)", self.name)
    }
}

/// The midir-backed output port.
pub struct MidiOut {
    name: String,
    connection: Mutex<Option<MidiOutputConnection>>,
}

impl MidiOut {
    pub fn get(name: &str) -> MidiOut {
        MidiOut {
            name: name.to_string(),
            connection: Mutex::new(None),
        }
    }
}

impl super::MidiOut for MidiOut {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn connect(&self, targets: &[String]) -> Result<(), Box<dyn Error>> {
        let mut connection = self.connection.lock();
        if connection.is_some() {
            return Ok(());
        }

        let output = MidiOutput::new("padtrack output")?;
        let port = output
            .ports()
            .into_iter()
            .find(|p| {
                output
                    .port_name(p)
                    .map(|n| targets.iter().any(|t| n.contains(t.as_str())))
                    .unwrap_or(false)
            })
            .ok_or_else(|| format!("no MIDI output port matches {:?}", targets))?;

        let port_name = output.port_name(&port)?;
        info!(port = port_name, "Connecting MIDI output");

        *connection = Some(output.connect(&port, "padtrack output")?);
        Ok(())
    }

    fn send(&self, events: &[MidiEvent]) {
        if events.is_empty() {
            return;
        }
        // try_lock keeps the audio callback from blocking on a
        // concurrent connect; clock events are droppable.
        let Some(mut connection) = self.connection.try_lock() else {
            return;
        };
        let Some(connection) = connection.as_mut() else {
            return;
        };
        for event in events {
            if let Err(e) = connection.send(event.bytes()) {
                warn!(err = %e, "Failed to send MIDI event");
                return;
            }
        }
    }
}

impl fmt::Display for MidiOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (midir output)", self.name)
    }
}
