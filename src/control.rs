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

//! The control plane.
//!
//! Services UI messages off the realtime thread: pad triggers, transport
//! commands, configuration reads and patches, and sample browsing.
//! Configuration changes are staged (including any wave decodes) and
//! handed to the audio callback through the two-slot swap.

use std::path::PathBuf;
use std::sync::Arc;

use crossbeam_channel::Receiver;
use ringbuf::traits::Producer;
use ringbuf::HeapProd;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::audio::Host;
use crate::config::{self, Config, NUM_PADS};
use crate::dsp;
use crate::engine::Shared;
use crate::engine::{SampleExplorer, WaveInfoDetail};
use crate::midi::{MidiIn, MidiOut};
use crate::transport::TransportCommand;
use crate::wave;

/// A UI message: a section, a message type within it, and a payload.
#[derive(Debug, Clone)]
pub struct Message {
    pub section: String,
    pub msg_type: String,
    pub data: Value,
}

/// Outbound link to the GUI. The transport carrying these is external;
/// the engine only ever formats payloads.
pub trait GuiLink: Send + Sync {
    fn send_message(&self, section: &str, msg_type: &str, payload: Value);
}

#[derive(Debug, Deserialize)]
struct TriggerData {
    index: usize,
    strength: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SampleCommand {
    #[serde(rename = "type")]
    cmd_type: String,
    #[serde(default)]
    pack_idx: usize,
    #[serde(default)]
    sample_idx: usize,
    #[serde(default)]
    pad_idx: usize,
}

pub struct Control {
    shared: Arc<Shared>,
    trigger_tx: HeapProd<(usize, f64)>,
    explorer: SampleExplorer,
    gui: Arc<dyn GuiLink>,
    host: Arc<dyn Host>,
    midi_in: Arc<dyn MidiIn>,
    midi_out: Arc<dyn MidiOut>,
    config_path: PathBuf,
    pack_root: PathBuf,
    sample_rate: u32,
}

impl Control {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        shared: Arc<Shared>,
        trigger_tx: HeapProd<(usize, f64)>,
        gui: Arc<dyn GuiLink>,
        host: Arc<dyn Host>,
        midi_in: Arc<dyn MidiIn>,
        midi_out: Arc<dyn MidiOut>,
        config_path: PathBuf,
        pack_root: PathBuf,
    ) -> Self {
        let sample_rate = host.sample_rate();
        let mut explorer = SampleExplorer::new(shared.clone(), pack_root.clone(), sample_rate);
        if let Err(e) = explorer.refresh() {
            warn!(err = %e, "Initial sample pack scan failed");
        }
        Control {
            shared,
            trigger_tx,
            explorer,
            gui,
            host,
            midi_in,
            midi_out,
            config_path,
            pack_root,
            sample_rate,
        }
    }

    /// Services messages until every sender is gone.
    pub fn run(&mut self, rx: Receiver<Message>) {
        info!("Control plane started");
        for message in rx.iter() {
            self.handle_message(&message);
        }
        info!("Control plane stopped");
    }

    /// Dispatches one UI message.
    pub fn handle_message(&mut self, message: &Message) {
        match (message.section.as_str(), message.msg_type.as_str()) {
            ("pads", "trigger") => self.handle_trigger(&message.data),
            ("transport", "command") => self.handle_transport(&message.data),
            ("data", "get") => self.push_full_config(),
            ("data", "patch") => self.handle_patch(&message.data),
            ("samples", "get") => self.handle_samples_get(),
            ("samples", "command") => self.handle_sample_command(&message.data),
            _ => debug!(
                section = message.section,
                msg_type = message.msg_type,
                "Unrecognized message"
            ),
        }
    }

    fn handle_trigger(&mut self, data: &Value) {
        let trigger: TriggerData = match serde_json::from_value(data.clone()) {
            Ok(trigger) => trigger,
            Err(e) => {
                warn!(err = %e, "Malformed trigger message");
                return;
            }
        };
        debug!(pad = trigger.index, "Triggering pad");
        if self
            .trigger_tx
            .try_push((trigger.index, trigger.strength))
            .is_err()
        {
            debug!(pad = trigger.index, "Trigger queue full, dropping trigger");
        }
    }

    fn handle_transport(&mut self, data: &Value) {
        match serde_json::from_value::<TransportCommand>(data.clone()) {
            Ok(command) => self.shared.transport_ctl.apply(command),
            Err(e) => warn!(err = %e, "Malformed transport command"),
        }
    }

    fn push_full_config(&self) {
        let config = self.shared.swap.snapshot();
        self.gui.send_message(
            "data",
            "full",
            serde_json::to_value(&config).unwrap_or(Value::Null),
        );
    }

    /// Applies a JSON Patch operation list against the active
    /// configuration. On any failure the full active config is pushed
    /// back as a rollback.
    fn handle_patch(&mut self, data: &Value) {
        let active = self.shared.swap.snapshot();
        let mut value = match serde_json::to_value(&active) {
            Ok(value) => value,
            Err(e) => {
                error!(err = %e, "Failed to serialise active config");
                return;
            }
        };
        if let Err(e) = apply_patch(&mut value, data) {
            error!(err = %e, "Failed to apply data patch");
            self.push_full_config();
            return;
        }
        match serde_json::from_value::<Config>(value) {
            Ok(config) => self.set_configuration(config, false),
            Err(e) => {
                error!(err = %e, "Failed to apply data patch");
                self.push_full_config();
            }
        }
    }

    fn handle_samples_get(&mut self) {
        if let Err(e) = self.explorer.refresh() {
            error!(err = %e, "Failed to refresh sample packs");
        }
        self.gui.send_message(
            "samples",
            "packs",
            serde_json::to_value(self.explorer.packs()).unwrap_or(Value::Null),
        );
    }

    fn handle_sample_command(&mut self, data: &Value) {
        let command: SampleCommand = match serde_json::from_value(data.clone()) {
            Ok(command) => command,
            Err(e) => {
                warn!(err = %e, "Malformed sample command");
                return;
            }
        };

        match command.cmd_type.as_str() {
            "load" => {
                let info = self.explorer.load(command.pack_idx, command.sample_idx);
                self.send_sample_info(&info);
            }
            "play" => {
                let info = self.explorer.play(command.pack_idx, command.sample_idx);
                self.send_sample_info(&info);
            }
            "stop" => self.explorer.stop(),
            "assign" => self.assign_sample(&command),
            other => debug!(cmd = other, "Unrecognized sample command"),
        }
    }

    fn send_sample_info(&self, info: &WaveInfoDetail) {
        self.gui.send_message(
            "samples",
            "info",
            serde_json::to_value(info).unwrap_or(Value::Null),
        );
    }

    /// Binds a pack sample to a pad. The actual wave reload happens in
    /// `set_configuration` when it sees the changed path.
    fn assign_sample(&mut self, command: &SampleCommand) {
        let mut config = self.shared.swap.snapshot();
        if command.pad_idx >= config.pads.len() {
            warn!(pad = command.pad_idx, "Assign to out-of-range pad");
            return;
        }
        let Some((_, relative)) = self
            .explorer
            .sample_path(command.pack_idx, command.sample_idx)
        else {
            warn!(
                pack = command.pack_idx,
                sample = command.sample_idx,
                "Assign of unknown sample"
            );
            return;
        };
        config.pads[command.pad_idx].sample_path = relative;
        config.pads[command.pad_idx].sample_name = self
            .explorer
            .sample_name(command.pack_idx, command.sample_idx)
            .unwrap_or_default();
        self.set_configuration(config, false);
    }

    /// Validates and publishes a new configuration: repairs invariants,
    /// stages any wave decodes for changed pads, recomputes derived
    /// gains, waits out the in-flight period, and flips the swap. Also
    /// persists the result and pushes it to the GUI.
    pub fn set_configuration(&mut self, mut config: Config, connect: bool) {
        config.repair();
        let active = self.shared.swap.snapshot();

        // A previous publish may still be unobserved; staging over it
        // would hand the callback a half-written slot.
        let shared = self.shared.clone();
        self.shared
            .process_sync
            .wait_while(move || shared.swap.pending() || shared.store.any_pending());

        let mut update_samples = [false; NUM_PADS];
        for i in 0..NUM_PADS {
            let prev_path = active
                .pads
                .get(i)
                .map(|p| p.sample_path.as_str())
                .unwrap_or_default();
            let prev_available = active.pads.get(i).map(|p| p.available).unwrap_or(false);

            let pad = &mut config.pads[i];
            if let Some(level) = self.shared.cc.take(i) {
                pad.gain = dsp::lin_to_db(level as f64);
            }
            pad.available = false;
            if pad.sample_path.is_empty() {
                continue;
            }

            let mut full_path = PathBuf::from(&pad.sample_path);
            if !full_path.is_absolute() {
                full_path = self.pack_root.join(&pad.sample_path);
            }
            if !full_path.is_file() {
                warn!(pad = i, path = %full_path.display(), "Sample file missing");
                continue;
            }
            pad.available = true;

            if pad.sample_path != prev_path || !prev_available {
                match wave::import(&full_path, self.sample_rate) {
                    Ok(decoded) => {
                        pad.length_ms = decoded.info.length_ms;
                        self.shared.store.stage(i, decoded);
                        update_samples[i] = true;
                    }
                    Err(e) => {
                        error!(pad = i, err = %e, "Failed to import sample");
                        pad.available = false;
                        continue;
                    }
                }
            } else {
                let live = self.shared.store.live_info(i);
                if live.valid {
                    pad.length_ms = pad.length_ms.min(live.length_ms);
                }
            }

            pad.compute_derived(self.sample_rate);
        }

        // Let any in-flight period finish before the flags flip.
        self.shared.process_sync.wait_period();

        for (i, update) in update_samples.iter().enumerate() {
            if *update {
                self.shared.store.publish(i);
            }
        }
        self.shared.transport_ctl.set_tempo(config.tempo);
        self.shared.swap.publish(config.clone());

        self.gui.send_message(
            "data",
            "full",
            serde_json::to_value(&config).unwrap_or(Value::Null),
        );
        if let Err(e) = config::save(&self.config_path, &config) {
            error!(err = %e, "Failed to persist config");
        }

        if connect && config.reconnect {
            if let Err(e) = self
                .host
                .connect_outputs(&config.audio_left_connections, &config.audio_right_connections)
            {
                warn!(err = %e, "Failed to connect audio outputs");
            }
            if let Err(e) = self.midi_in.connect(&config.midi_in_connections) {
                warn!(err = %e, "Failed to connect MIDI input");
            }
            if let Err(e) = self.midi_out.connect(&config.midi_out_connections) {
                warn!(err = %e, "Failed to connect MIDI output");
            }
        }
    }
}

/// Applies an RFC 6902 JSON Patch document: an array of
/// `{op, path, value?, from?}` operations addressed by JSON Pointer.
/// Operations apply in order; the first failure aborts the patch, and
/// the caller discards the half-applied document.
fn apply_patch(target: &mut Value, patch: &Value) -> Result<(), Box<dyn std::error::Error>> {
    let Value::Array(operations) = patch else {
        return Err("patch document must be an array of operations".into());
    };
    for operation in operations {
        apply_operation(target, operation)?;
    }
    Ok(())
}

fn apply_operation(
    target: &mut Value,
    operation: &Value,
) -> Result<(), Box<dyn std::error::Error>> {
    let op = operation
        .get("op")
        .and_then(Value::as_str)
        .ok_or("operation is missing \"op\"")?;
    let path = operation
        .get("path")
        .and_then(Value::as_str)
        .ok_or("operation is missing \"path\"")?;

    match op {
        "add" => {
            let value = operation
                .get("value")
                .ok_or("add operation is missing \"value\"")?
                .clone();
            pointer_add(target, path, value)
        }
        "remove" => pointer_remove(target, path).map(|_| ()),
        "replace" => {
            let value = operation
                .get("value")
                .ok_or("replace operation is missing \"value\"")?
                .clone();
            let slot = target
                .pointer_mut(path)
                .ok_or(format!("no value at {}", path))?;
            *slot = value;
            Ok(())
        }
        "move" => {
            let from = operation
                .get("from")
                .and_then(Value::as_str)
                .ok_or("move operation is missing \"from\"")?;
            let moved = pointer_remove(target, from)?;
            pointer_add(target, path, moved)
        }
        "copy" => {
            let from = operation
                .get("from")
                .and_then(Value::as_str)
                .ok_or("copy operation is missing \"from\"")?;
            let copied = target
                .pointer(from)
                .ok_or(format!("no value at {}", from))?
                .clone();
            pointer_add(target, path, copied)
        }
        "test" => {
            let expected = operation
                .get("value")
                .ok_or("test operation is missing \"value\"")?;
            let current = target
                .pointer(path)
                .ok_or(format!("no value at {}", path))?;
            if current != expected {
                return Err(format!("test failed at {}", path).into());
            }
            Ok(())
        }
        other => Err(format!("unknown patch operation {}", other).into()),
    }
}

/// Splits a JSON Pointer into its parent pointer and final, unescaped
/// token. The root pointer has no parent.
fn split_pointer(pointer: &str) -> Result<Option<(&str, String)>, Box<dyn std::error::Error>> {
    if pointer.is_empty() {
        return Ok(None);
    }
    if !pointer.starts_with('/') {
        return Err(format!("invalid JSON pointer {}", pointer).into());
    }
    let split = pointer.rfind('/').unwrap_or(0);
    let token = pointer[split + 1..].replace("~1", "/").replace("~0", "~");
    Ok(Some((&pointer[..split], token)))
}

fn pointer_add(
    target: &mut Value,
    pointer: &str,
    value: Value,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some((parent_pointer, token)) = split_pointer(pointer)? else {
        *target = value;
        return Ok(());
    };
    let parent = target
        .pointer_mut(parent_pointer)
        .ok_or(format!("no value at {}", parent_pointer))?;
    match parent {
        Value::Object(map) => {
            map.insert(token, value);
            Ok(())
        }
        Value::Array(items) => {
            if token == "-" {
                items.push(value);
                return Ok(());
            }
            let index: usize = token
                .parse()
                .map_err(|_| format!("invalid array index {}", token))?;
            if index > items.len() {
                return Err(format!("array index {} out of bounds", index).into());
            }
            items.insert(index, value);
            Ok(())
        }
        _ => Err(format!("{} does not address a container", pointer).into()),
    }
}

fn pointer_remove(
    target: &mut Value,
    pointer: &str,
) -> Result<Value, Box<dyn std::error::Error>> {
    let Some((parent_pointer, token)) = split_pointer(pointer)? else {
        return Err("cannot remove the document root".into());
    };
    let parent = target
        .pointer_mut(parent_pointer)
        .ok_or(format!("no value at {}", parent_pointer))?;
    match parent {
        Value::Object(map) => map
            .remove(&token)
            .ok_or_else(|| format!("no value at {}", pointer).into()),
        Value::Array(items) => {
            let index: usize = token
                .parse()
                .map_err(|_| format!("invalid array index {}", token))?;
            if index >= items.len() {
                return Err(format!("array index {} out of bounds", index).into());
            }
            Ok(items.remove(index))
        }
        _ => Err(format!("{} does not address a container", pointer).into()),
    }
}
