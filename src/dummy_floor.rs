//! A board that isn't there.
//!
//! [`DummyFloor`] runs a background thread that pretends to be one board:
//! it announces itself, then sweeps its sensors over and over while a few
//! touches circle around the board, and hands out the SLIP-framed bytes
//! through [`ByteSource`]. It is what the monitor and the tests run against
//! when no hardware is plugged in.

use crate::assembler::sweep_packets;
use crate::board_frame::{pixel_for, FULL_SCALE};
use crate::board_model::{BoardInfo, BoardModel};
use crate::error::FloorError;
use crate::frame_codec::{encode_packet, FRAME_END};
use crate::transport::{ByteSource, READ_TIMEOUT};
use crate::Point;
use log::{debug, info};
use rand::prelude::*;
use std::f32::consts::PI;
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::thread;
use std::time::Duration;

/// Reading of an untouched sensor.
pub const IDLE_LEVEL: u16 = 4000;

/// Reading of a sensor under the centre of a touch.
pub const PRESSED_LEVEL: u16 = 40000;

/// Radius, in board pixels, over which a touch fades out.
const TOUCH_RADIUS: f32 = 1.5;

/// Angle each touch moves per sweep.
const STEP: f32 = 0.05;

enum Signal {
    Touches(usize),
    Noise(u16),
    Flood(bool),
    Stop,
}

/// Emits the traffic of one simulated board.
pub struct DummyFloor {
    handle: Option<thread::JoinHandle<()>>,
    tx: mpsc::Sender<Signal>,
    rx: mpsc::Receiver<Vec<u8>>,
    leftover: Vec<u8>,
}

/// Configures a [`DummyFloor`] before its thread starts.
pub struct DummyFloorBuilder {
    model: BoardModel,
    mode_count: u8,
    touches: usize,
    noise: u16,
    sweep_period: Duration,
}

impl DummyFloorBuilder {
    /// Number of touches circling the board.
    pub fn touches(mut self, touches: usize) -> Self {
        self.touches = touches;
        self
    }

    /// Largest random noise added to each reading.
    pub fn noise(mut self, noise: u16) -> Self {
        self.noise = noise;
        self
    }

    /// Time between sweeps.
    pub fn sweep_period(mut self, sweep_period: Duration) -> Self {
        self.sweep_period = sweep_period;
        self
    }

    /// Starts the board.
    pub fn build(self) -> DummyFloor {
        let (tx, signal_rx) = mpsc::channel::<Signal>();
        let (bytes_tx, rx) = mpsc::channel::<Vec<u8>>();
        let Self {
            model,
            mode_count,
            mut touches,
            mut noise,
            sweep_period,
        } = self;

        let handle = thread::spawn(move || {
            let mut rng = thread_rng();
            let mut flood = false;
            let mut phase = 0.0f32;

            let info = BoardInfo {
                version: model.version(),
                chain: 0,
                sensors: model.sensor_count() as u8,
            };
            let mut hello = vec![FRAME_END];
            hello.extend(encode_packet(&info.to_packet()));
            if bytes_tx.send(hello).is_err() {
                return;
            }

            loop {
                match signal_rx.try_recv() {
                    Ok(Signal::Touches(n)) => touches = n,
                    Ok(Signal::Noise(n)) => noise = n,
                    Ok(Signal::Flood(on)) => flood = on,
                    Ok(Signal::Stop) | Err(TryRecvError::Disconnected) => break,
                    Err(TryRecvError::Empty) => {}
                }

                let modes = if flood {
                    synthetic_sweep(model, mode_count, &[], FULL_SCALE, noise, &mut rng)
                } else {
                    let points = circling_touches(model, mode_count, touches, phase);
                    synthetic_sweep(model, mode_count, &points, IDLE_LEVEL, noise, &mut rng)
                };
                let bytes: Vec<u8> = sweep_packets(model, &modes)
                    .iter()
                    .flat_map(encode_packet)
                    .collect();
                if bytes_tx.send(bytes).is_err() {
                    debug!("dummy floor: reader hung up");
                    break;
                }

                phase = (phase + STEP) % (2.0 * PI);
                thread::sleep(sweep_period);
            }
            info!("dummy floor: stopped");
        });

        DummyFloor {
            handle: Some(handle),
            tx,
            rx,
            leftover: Vec::new(),
        }
    }
}

impl DummyFloor {
    /// Starts configuring a simulated board of `model` running `mode_count`
    /// modes.
    pub fn builder(model: BoardModel, mode_count: u8) -> DummyFloorBuilder {
        DummyFloorBuilder {
            model,
            mode_count,
            touches: 1,
            noise: 0,
            sweep_period: Duration::from_millis(20),
        }
    }

    /// A handle for steering the board after it has been handed to a
    /// worker.
    pub fn handle(&self) -> DummyFloorHandle {
        DummyFloorHandle {
            tx: self.tx.clone(),
        }
    }

    /// Stops the board and waits for its thread.
    pub fn stop(&mut self) {
        let _ = self.tx.send(Signal::Stop);
        if let Some(thread) = self.handle.take() {
            let _ = thread.join();
        }
    }
}

/// Steers a running [`DummyFloor`]. Commands sent after the board stopped
/// are ignored.
#[derive(Clone)]
pub struct DummyFloorHandle {
    tx: mpsc::Sender<Signal>,
}

impl DummyFloorHandle {
    /// Changes the number of circling touches.
    pub fn set_touches(&self, touches: usize) {
        let _ = self.tx.send(Signal::Touches(touches));
    }

    /// Changes the noise amplitude.
    pub fn set_noise(&self, noise: u16) {
        let _ = self.tx.send(Signal::Noise(noise));
    }

    /// Presses every sensor at once, for capturing the upper calibration.
    pub fn set_flood(&self, flood: bool) {
        let _ = self.tx.send(Signal::Flood(flood));
    }
}

impl Drop for DummyFloor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl ByteSource for DummyFloor {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, FloorError> {
        if self.leftover.is_empty() {
            match self.rx.recv_timeout(READ_TIMEOUT) {
                Ok(bytes) => self.leftover = bytes,
                Err(RecvTimeoutError::Timeout) => return Ok(0),
                Err(RecvTimeoutError::Disconnected) => return Err(FloorError::ChannelClosed),
            }
        }
        let n = self.leftover.len().min(buf.len());
        buf[..n].copy_from_slice(&self.leftover[..n]);
        self.leftover.drain(..n);
        Ok(n)
    }
}

/// Places `count` touches evenly on a circle around the centre of the
/// board, rotated by `phase`, in board pixels.
pub fn circling_touches(model: BoardModel, mode_count: u8, count: usize, phase: f32) -> Vec<Point> {
    let (w, h) = model.frame_size(mode_count as usize);
    let (cx, cy) = ((w as f32 - 1.0) / 2.0, (h as f32 - 1.0) / 2.0);
    let radius = w.min(h) as f32 / 4.0;
    (0..count)
        .map(|i| phase + (i as f32 / count as f32) * 2.0 * PI)
        .map(|angle| Point {
            x: cx + angle.cos() * radius,
            y: cy + angle.sin() * radius,
        })
        .collect()
}

/// One sweep's readings with `touches` pressed on the board, `modes[mode]
/// [sensor]`. Untouched sensors read `idle` plus up to `noise`.
pub fn synthetic_sweep(
    model: BoardModel,
    mode_count: u8,
    touches: &[Point],
    idle: u16,
    noise: u16,
    rng: &mut impl Rng,
) -> Vec<Vec<u16>> {
    (0..mode_count as usize)
        .map(|mode| {
            model
                .coordinate_table()
                .iter()
                .map(|&coord| {
                    let (x, y) = pixel_for(coord, mode, mode_count as usize);
                    let here = Point {
                        x: x as f32,
                        y: y as f32,
                    };
                    let press = touches
                        .iter()
                        .map(|t| (1.0 - t.distance(&here) / TOUCH_RADIUS).max(0.0))
                        .fold(0.0f32, f32::max);
                    let level = idle as f32 + press * (PRESSED_LEVEL.saturating_sub(idle)) as f32;
                    let jitter = if noise > 0 { rng.gen_range(0..=noise) } else { 0 };
                    (level as u16).saturating_add(jitter)
                })
                .collect()
        })
        .collect()
}
