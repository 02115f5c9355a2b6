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
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use parking_lot::Mutex;
use tracing::{error, info};

use super::ProcessFn;

/// Lists the names of all cpal output devices.
pub fn list() -> Result<Vec<String>, Box<dyn Error>> {
    let host = cpal::default_host();
    let mut names = Vec::new();
    for device in host.output_devices()? {
        names.push(device.name()?);
    }
    Ok(names)
}

/// The cpal-backed host.
///
/// The device callback hands over buffers of arbitrary size; they are
/// chunked into periods of at most `buffer_size` frames so the engine
/// sees the negotiated upper bound.
pub struct Host {
    name: String,
    sample_rate: u32,
    buffer_size: usize,
    shutdown: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Host {
    /// Gets a host for the named output device. An empty name or
    /// "default" selects the default device.
    pub fn get(name: &str, buffer_size: usize) -> Result<Host, Box<dyn Error>> {
        let device = find_device(name)?;
        let device_name = device.name()?;
        let config = device.default_output_config()?;
        let sample_rate = config.sample_rate().0;

        info!(
            device = device_name,
            sample_rate, buffer_size, "Using cpal output device"
        );

        Ok(Host {
            name: device_name,
            sample_rate,
            buffer_size,
            shutdown: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        })
    }
}

fn find_device(name: &str) -> Result<cpal::Device, Box<dyn Error>> {
    let host = cpal::default_host();
    if name.is_empty() || name == "default" {
        return host
            .default_output_device()
            .ok_or_else(|| "no default output device".into());
    }
    for device in host.output_devices()? {
        if device.name()? == name {
            return Ok(device);
        }
    }
    Err(format!("no output device named {}", name).into())
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

    fn activate(&self, mut process: ProcessFn) -> Result<(), Box<dyn Error>> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Err("cpal host is already active".into());
        }

        let device_name = self.name.clone();
        let sample_rate = self.sample_rate;
        let period = self.buffer_size;
        let shutdown = self.shutdown.clone();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();

        // The stream is not Send, so it lives and dies on this thread.
        let handle = thread::spawn(move || {
            let device = match find_device(&device_name) {
                Ok(device) => device,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };

            let config = StreamConfig {
                channels: 2,
                sample_rate: SampleRate(sample_rate),
                buffer_size: cpal::BufferSize::Default,
            };

            let mut scratch_l = vec![0.0f32; period];
            let mut scratch_r = vec![0.0f32; period];

            let stream = device.build_output_stream(
                &config,
                move |data: &mut [f32], _| {
                    for chunk in data.chunks_mut(2 * period) {
                        let frames = chunk.len() / 2;
                        process(&mut scratch_l[..frames], &mut scratch_r[..frames]);
                        for (i, frame) in chunk.chunks_exact_mut(2).enumerate() {
                            frame[0] = scratch_l[i];
                            frame[1] = scratch_r[i];
                        }
                    }
                },
                |e| error!(err = %e, "cpal stream error"),
                None,
            );

            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(e.to_string()));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            while !shutdown.load(Ordering::Acquire) {
                thread::sleep(Duration::from_millis(50));
            }
            drop(stream);
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {
                *worker = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                handle.join().ok();
                Err(e.into())
            }
            Err(_) => {
                handle.join().ok();
                Err("cpal worker exited before the stream started".into())
            }
        }
    }

    fn connect_outputs(&self, _: &[String], _: &[String]) -> Result<(), Box<dyn Error>> {
        // Routing is fixed by the device selection; connection lists
        // only apply to hosts with patchable ports.
        Ok(())
    }

    fn close(&self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(worker) = self.worker.lock().take() {
            worker.join().ok();
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (cpal)", self.name)
    }
}
