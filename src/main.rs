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
mod audio;
mod config;
mod control;
mod dsp;
mod engine;
mod midi;
#[cfg(test)]
mod testutil;
mod transport;
mod wave;

use std::error::Error;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use clap::{crate_version, Parser, Subcommand};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::control::{GuiLink, Message};
use crate::engine::Engine;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A MIDI-driven drum pad sampler."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Starts the sampler engine. UI messages are read from stdin as
    /// JSON lines and replies are written to stdout.
    Start {
        /// The path to the sampler config. Defaults to
        /// ~/.mck/sampler/config.json.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// The audio output device name.
        #[arg(short, long)]
        device: Option<String>,
        /// The engine period size in frames.
        #[arg(short, long, default_value_t = 1024)]
        buffer_size: usize,
    },
    /// Lists the available audio output devices.
    Devices {},
    /// Lists the available MIDI input/output devices.
    MidiDevices {},
    /// Lists the samples found in the sample packs.
    Samples {},
}

/// The stdin message shape: {"section": ..., "msgType": ..., "data": ...}.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    section: String,
    msg_type: String,
    #[serde(default)]
    data: Value,
}

/// Pushes GUI messages to stdout as JSON lines.
struct StdoutGui;

impl GuiLink for StdoutGui {
    fn send_message(&self, section: &str, msg_type: &str, payload: Value) {
        println!(
            "{}",
            serde_json::json!({
                "section": section,
                "msgType": msg_type,
                "data": payload,
            })
        );
    }
}

fn main() {
    // Initialize tracing with a filter that sets default logging to off,
    // with padtrack at info level.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off,padtrack=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            config,
            device,
            buffer_size,
        } => {
            let config_path = match config {
                Some(path) => path,
                None => config::default_config_path()?,
            };
            let pack_root = config::default_pack_path()?;

            let host = audio::get_host(&device.unwrap_or_default(), buffer_size)?;
            let midi_in = midi::get_midi_in("midi_in");
            let midi_out = midi::get_midi_out("midi_out");

            let (mut engine, mut control) = Engine::init(
                host,
                midi_in,
                midi_out,
                Arc::new(StdoutGui),
                config_path,
                pack_root,
            )?;

            let (tx, rx) = crossbeam_channel::unbounded::<Message>();
            let reader = thread::spawn(move || {
                for line in io::stdin().lock().lines() {
                    let line = match line {
                        Ok(line) => line,
                        Err(_) => break,
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<WireMessage>(&line) {
                        Ok(wire) => {
                            let message = Message {
                                section: wire.section,
                                msg_type: wire.msg_type,
                                data: wire.data,
                            };
                            if tx.send(message).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(err = %e, "Malformed message on stdin"),
                    }
                }
            });

            // Runs until stdin closes.
            control.run(rx);
            reader.join().ok();
            engine.close();
            info!("Goodbye");
        }
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::MidiDevices {} => {
            let devices = midi::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Samples {} => {
            let pack_root = config::default_pack_path()?;
            let packs = config::scan_packs(&pack_root)?;

            if packs.is_empty() {
                println!("No sample packs found in {}.", pack_root.display());
                return Ok(());
            }

            for pack in packs {
                println!("{} ({} samples):", pack.name, pack.samples.len());
                for sample in pack.samples {
                    println!(
                        "- {} ({} ch, {} Hz, {} frames)",
                        sample.relative_path,
                        sample.num_channels,
                        sample.sample_rate,
                        sample.num_frames
                    );
                }
            }
        }
    }

    Ok(())
}
