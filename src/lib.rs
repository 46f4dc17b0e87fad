//! touchfloor is the host-side software for a modular multi-touch sensing
//! floor. The floor is built from daisy-chained boards, each carrying a
//! small matrix of sensors that it sweeps through several sensing modes.
//! Boards stream their readings over a serial line or TCP as SLIP-framed
//! packets.
//!
//! The pipeline turns those bytes into touches:
//!
//! 1. [`frame_codec`] splits the byte stream into [`SensorPacket`]s.
//! 2. [`assembler`] collects a board's packets into complete sweeps.
//! 3. [`board_frame`] maps each sweep onto the board's pixel grid and
//!    calibrates it against captured lower and upper references.
//! 4. [`surface_mapper`] composites every board into one global surface.
//! 5. [`blob`] finds the touched regions on the surface.
//! 6. [`tracker`] gives every touch an id that stays stable while it moves.
//!
//! [`pipeline`] wires those stages onto worker threads, and the `touchfloor`
//! and `monitor` binaries drive it from a configuration file.
//!
//! [`SensorPacket`]: frame_codec::SensorPacket

#![warn(missing_docs)]
pub mod args;
pub mod assembler;
pub mod blob;
pub mod board_frame;
pub mod board_model;
pub mod component;
pub mod config;
pub mod dummy_floor;
pub mod error;
pub mod frame_codec;
pub mod grid;
pub mod gui;
pub mod pipeline;
pub mod registry;
pub mod surface_mapper;
pub mod tracker;
pub mod transport;

use std::fmt::Display;

/// A position on the global surface, in surface pixels.
#[derive(Debug, PartialEq, Clone, Copy, Default)]
pub struct Point {
    /// Column.
    pub x: f32,
    /// Row.
    pub y: f32,
}

impl Point {
    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Self) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

impl Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}
