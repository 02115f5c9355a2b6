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

//! The realtime sampler engine.
//!
//! The audio host owns the realtime thread and calls the process
//! callback once per period. Everything the callback touches is either
//! owned by it outright (`RtState`) or shared through the swap/store
//! double buffers and atomics in `Shared`. The callback never
//! allocates, blocks, or takes a lock another thread might hold.

use std::error::Error;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use ringbuf::traits::{Consumer, Split};
use ringbuf::{HeapCons, HeapRb};
use tracing::{error, info, warn};

use crate::audio::Host;
use crate::config::{self, Config, NUM_PADS};
use crate::control::{Control, GuiLink};
use crate::midi::{MidiEvent, MidiIn, MidiOut, MidiOutBuffer, MIDI_QUEUE_LEN};
use crate::transport::{Transport, TransportControl, TransportState};

pub mod decoder;
pub mod explorer;
pub mod sequencer;
pub mod store;
pub mod swap;
pub mod voice;

pub use decoder::CcOverrides;
pub use explorer::{PreviewShared, SampleExplorer, WaveInfoDetail};
pub use store::SampleStore;
pub use swap::ConfigSwap;
pub use voice::{VoicePool, VOICES_PER_PAD};

/// Capacity of the UI trigger queue. Far above any realistic UI rate;
/// overflow drops are logged by the producer.
pub const TRIGGER_QUEUE_LEN: usize = 256;

/// Outbound MIDI events a single period can carry.
const MIDI_OUT_CAPACITY: usize = 128;

/// Synchronisation between the callback and the control thread. The
/// callback flags the period in flight and notifies at period end; the
/// control thread can wait out at most one period before touching
/// staged state.
pub struct ProcessSync {
    processing: AtomicBool,
    lock: Mutex<()>,
    cond: Condvar,
}

impl ProcessSync {
    fn new() -> Self {
        ProcessSync {
            processing: AtomicBool::new(false),
            lock: Mutex::new(()),
            cond: Condvar::new(),
        }
    }

    fn begin(&self) {
        self.processing.store(true, Ordering::Relaxed);
    }

    fn end(&self) {
        self.processing.store(false, Ordering::Relaxed);
        self.cond.notify_all();
    }

    /// Waits for an in-flight period to finish, bounded by well over
    /// one period length. Control thread only.
    pub fn wait_period(&self) {
        if !self.processing.load(Ordering::Relaxed) {
            return;
        }
        let mut guard = self.lock.lock();
        if self.processing.load(Ordering::Relaxed) {
            let _ = self.cond.wait_for(&mut guard, Duration::from_millis(100));
        }
    }

    /// Waits until `pending` clears, bounded. Used before staging into
    /// a slot the callback may not have consumed yet. Control thread
    /// only.
    pub fn wait_while<F: Fn() -> bool>(&self, pending: F) {
        let deadline = Instant::now() + Duration::from_millis(500);
        let mut guard = self.lock.lock();
        while pending() {
            if Instant::now() >= deadline {
                warn!("Timed out waiting for the audio callback to drain updates");
                return;
            }
            let _ = self.cond.wait_for(&mut guard, Duration::from_millis(20));
        }
    }
}

/// Hands transport snapshots from the callback to the report thread.
/// The callback never waits: it updates the slot with a try-lock and
/// signals.
pub struct ReportSync {
    state: Mutex<crate::transport::TransportSnapshot>,
    cond: Condvar,
    done: AtomicBool,
}

impl ReportSync {
    fn new() -> Self {
        ReportSync {
            state: Mutex::new(crate::transport::TransportSnapshot::default()),
            cond: Condvar::new(),
            done: AtomicBool::new(false),
        }
    }

    fn publish(&self, snapshot: crate::transport::TransportSnapshot) {
        if let Some(mut guard) = self.state.try_lock() {
            *guard = snapshot;
        }
        self.cond.notify_one();
    }

    fn wait(&self) -> Option<crate::transport::TransportSnapshot> {
        let mut guard = self.state.lock();
        self.cond.wait(&mut guard);
        if self.done.load(Ordering::Acquire) {
            None
        } else {
            Some(*guard)
        }
    }

    fn shutdown(&self) {
        self.done.store(true, Ordering::Release);
        self.cond.notify_all();
    }
}

/// State shared between the callback and the other threads.
pub struct Shared {
    pub swap: ConfigSwap,
    pub store: SampleStore,
    pub cc: CcOverrides,
    pub transport_ctl: TransportControl,
    pub preview: PreviewShared,
    pub process_sync: ProcessSync,
    pub report: ReportSync,
    pub initialized: AtomicBool,
}

impl Shared {
    fn new(tempo: f64) -> Self {
        Shared {
            swap: ConfigSwap::new(Config::default()),
            store: SampleStore::new(NUM_PADS),
            cc: CcOverrides::new(NUM_PADS),
            transport_ctl: TransportControl::new(tempo),
            preview: PreviewShared::new(),
            process_sync: ProcessSync::new(),
            report: ReportSync::new(),
            initialized: AtomicBool::new(false),
        }
    }
}

/// State owned exclusively by the audio callback.
struct RtState {
    voices: VoicePool,
    transport: Transport,
    trigger_rx: HeapCons<(usize, f64)>,
    midi_rx: HeapCons<MidiEvent>,
    midi_buf: MidiOutBuffer,
    last_step: Option<usize>,
    last_state: TransportState,
    transport_rate: usize,
    sample_rate: usize,
    buffer_size: usize,
    preview_pos: usize,
}

/// One audio period, end to end.
fn run_period(shared: &Shared, rt: &mut RtState, out_l: &mut [f32], out_r: &mut [f32]) {
    if !shared.initialized.load(Ordering::Acquire) {
        out_l.fill(0.0);
        out_r.fill(0.0);
        return;
    }

    shared.process_sync.begin();
    let nframes = out_l.len().min(out_r.len());
    rt.midi_buf.clear();

    // Configuration swaps land at the period boundary, before anything
    // reads pad state.
    shared.swap.begin_period();
    let cfg = shared.swap.active();

    let ts = rt
        .transport
        .process(&shared.transport_ctl, nframes, &mut rt.midi_buf);
    let step_idx = sequencer::step_index(&ts);

    decoder::decode_pending(&mut rt.midi_rx, cfg, &shared.cc, &mut rt.voices);

    while let Some((pad_idx, strength)) = rt.trigger_rx.try_pop() {
        if pad_idx >= cfg.pads.len() {
            continue;
        }
        let pad = &cfg.pads[pad_idx];
        if !pad.available {
            continue;
        }
        rt.voices.assign(
            pad_idx,
            0,
            pad.length_samps,
            pad.gain_left_lin * strength as f32,
            pad.gain_right_lin * strength as f32,
            pad.pitch,
        );
    }

    let step_change = step_idx.filter(|&step| rt.last_step != Some(step));
    if let Some(step) = step_change {
        sequencer::evaluate(step, cfg, &ts, rt.buffer_size, &mut rt.voices);
        rt.last_step = Some(step);
        shared.report.publish(ts);
        rt.transport_rate += nframes;
    } else if rt.transport_rate >= rt.sample_rate || ts.state != rt.last_state {
        shared.report.publish(ts);
        rt.transport_rate = 0;
    } else {
        rt.transport_rate += nframes;
    }
    rt.last_state = ts.state;

    shared.store.commit_pending();

    out_l.fill(0.0);
    out_r.fill(0.0);
    rt.voices
        .mix(&shared.store, &mut out_l[..nframes], &mut out_r[..nframes]);

    explorer::process_audio(
        &shared.preview,
        &mut rt.preview_pos,
        &mut out_l[..nframes],
        &mut out_r[..nframes],
    );

    shared.process_sync.end();
}

/// The engine: owns the shared state and the report thread, and wires
/// the process callback into the host.
pub struct Engine {
    shared: Arc<Shared>,
    host: Arc<dyn Host>,
    midi_in: Arc<dyn MidiIn>,
    report_thread: Option<JoinHandle<()>>,
    config_path: PathBuf,
}

impl Engine {
    /// Brings the engine up: loads the config, wires the callback into
    /// the host, starts the report thread and publishes the initial
    /// configuration. Any host failure here is terminal.
    pub fn init(
        host: Arc<dyn Host>,
        midi_in: Arc<dyn MidiIn>,
        midi_out: Arc<dyn MidiOut>,
        gui: Arc<dyn GuiLink>,
        config_path: PathBuf,
        pack_root: PathBuf,
    ) -> Result<(Engine, Control), Box<dyn Error>> {
        let sample_rate = host.sample_rate();
        let buffer_size = host.buffer_size();
        let config = config::load(&config_path);

        let shared = Arc::new(Shared::new(config.tempo));

        let (trigger_tx, trigger_rx) = HeapRb::<(usize, f64)>::new(TRIGGER_QUEUE_LEN).split();
        let (midi_tx, midi_rx) = HeapRb::<MidiEvent>::new(MIDI_QUEUE_LEN).split();
        midi_in.start(midi_tx)?;

        let mut rt = RtState {
            voices: VoicePool::new(NUM_PADS),
            transport: Transport::new(sample_rate, config.tempo),
            trigger_rx,
            midi_rx,
            midi_buf: MidiOutBuffer::with_capacity(MIDI_OUT_CAPACITY),
            last_step: None,
            last_state: TransportState::Idle,
            // Starts saturated so the first period reports a heartbeat.
            transport_rate: sample_rate as usize,
            sample_rate: sample_rate as usize,
            buffer_size,
            preview_pos: 0,
        };

        {
            let shared = shared.clone();
            let midi_out = midi_out.clone();
            host.activate(Box::new(move |out_l, out_r| {
                run_period(&shared, &mut rt, out_l, out_r);
                midi_out.send(rt.midi_buf.events());
            }))?;
        }

        let report_thread = {
            let shared = shared.clone();
            let gui = gui.clone();
            thread::Builder::new()
                .name("transport-report".to_string())
                .spawn(move || loop {
                    match shared.report.wait() {
                        Some(snapshot) => gui.send_message(
                            "transport",
                            "realtime",
                            serde_json::to_value(snapshot).unwrap_or(serde_json::Value::Null),
                        ),
                        None => return,
                    }
                })?
        };

        let mut control = Control::new(
            shared.clone(),
            trigger_tx,
            gui,
            host.clone(),
            midi_in.clone(),
            midi_out,
            config_path.clone(),
            pack_root,
        );
        control.set_configuration(config, true);

        shared.initialized.store(true, Ordering::Release);
        info!(
            sample_rate,
            buffer_size,
            voices = VOICES_PER_PAD * NUM_PADS,
            "Engine initialized"
        );

        let engine = Engine {
            shared,
            host,
            midi_in,
            report_thread: Some(report_thread),
            config_path,
        };
        Ok((engine, control))
    }

    /// Tears the engine down: stops the callback, persists the active
    /// configuration and joins the report thread.
    pub fn close(&mut self) {
        if self.report_thread.is_none() {
            return;
        }

        self.shared.initialized.store(false, Ordering::Release);
        self.shared.report.shutdown();
        self.host.close();
        self.midi_in.stop();

        if let Err(e) = config::save(&self.config_path, &self.shared.swap.snapshot()) {
            error!(err = %e, "Failed to persist config on shutdown");
        }

        if let Some(report_thread) = self.report_thread.take() {
            if report_thread.join().is_err() {
                error!("Report thread panicked");
            }
        }
        info!("Engine closed");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.close();
    }
}
