//! The floor's configuration file.
//!
//! A configuration lists the boards on the floor, how to reach each one,
//! and the tuning for blob extraction and tracking. It is stored as
//! [RON](https://github.com/ron-rs/ron); every section has a default, so a
//! file only needs to name what it changes.
//!
//! ```ron
//! (
//!     tick_hz: 30.0,
//!     tracker: (distance_threshold: 12.0),
//!     boards: [
//!         (
//!             board: (board_id: 0, model_version: 4, mode_count: 5, panel_layout: (0, 0)),
//!             transport: Serial(path: "/dev/ttyACM0", baud_rate: 115200),
//!         ),
//!     ],
//! )
//! ```

use crate::blob::ThresholdBlobs;
use crate::error::FloorError;
use crate::registry::{BoardRegistration, StaticRegistry};
use crate::tracker::TrackerConfig;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

/// How to reach a board.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum TransportConfig {
    /// A serial device.
    Serial {
        /// Device path, e.g. `/dev/ttyACM0`.
        path: PathBuf,
        /// Line speed.
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
    /// A TCP stream carrying the same framed bytes, e.g. `"10.0.0.12:5000"`.
    Tcp {
        /// Socket address of the board.
        address: String,
    },
    /// A synthetic board driven by [`DummyFloor`](crate::dummy_floor::DummyFloor).
    Synthetic {
        /// Number of touches moving across the board.
        #[serde(default = "default_touches")]
        touches: usize,
        /// Largest random noise added to each sample.
        #[serde(default)]
        noise: u16,
    },
}

fn default_baud_rate() -> u32 {
    115200
}

fn default_touches() -> usize {
    1
}

/// One board on the floor.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BoardConfig {
    /// What the registry knows about the board.
    pub board: BoardRegistration,
    /// Where its bytes come from.
    pub transport: TransportConfig,
}

/// Everything needed to run the floor.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FloorConfig {
    /// Processing ticks per second.
    pub tick_hz: f32,
    /// Capacity of each bounded queue between workers.
    pub queue_capacity: usize,
    /// Tracker tuning.
    pub tracker: TrackerConfig,
    /// Blob extraction tuning.
    pub blobs: ThresholdBlobs,
    /// The boards, in registration order.
    pub boards: Vec<BoardConfig>,
}

impl Default for FloorConfig {
    fn default() -> Self {
        Self {
            tick_hz: 30.0,
            queue_capacity: 64,
            tracker: TrackerConfig::default(),
            blobs: ThresholdBlobs::default(),
            boards: Vec::new(),
        }
    }
}

impl FloorConfig {
    /// Read a [`FloorConfig`] from the path provided.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, FloorError> {
        let mut handle = File::open(path)?;
        Self::from_reader(&mut handle)
    }

    /// Read a [`FloorConfig`] from the [`Read`]able object provided.
    pub fn from_reader(reader: &mut impl Read) -> Result<Self, FloorError> {
        let mut raw_text = Vec::new();
        reader.read_to_end(&mut raw_text)?;
        Ok(ron::de::from_bytes(&raw_text)?)
    }

    /// Write out a [`FloorConfig`] to the path provided.
    pub fn to_path(&self, path: impl AsRef<Path>) -> Result<(), FloorError> {
        let mut handle = File::create(path)?;
        self.to_writer(&mut handle)
    }

    /// Write out a [`FloorConfig`] to the [`Write`]able object provided.
    pub fn to_writer(&self, writer: &mut impl Write) -> Result<(), FloorError> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        writer.write_all(text.as_bytes())?;
        Ok(())
    }

    /// The time between processing ticks. A non-positive rate means "as fast
    /// as possible".
    pub fn tick_period(&self) -> Duration {
        if self.tick_hz > 0.0 {
            Duration::from_secs_f32(1.0 / self.tick_hz)
        } else {
            Duration::ZERO
        }
    }

    /// The board registrations, in order.
    pub fn registrations(&self) -> Vec<BoardRegistration> {
        self.boards.iter().map(|b| b.board).collect()
    }

    /// A registry holding the configured boards.
    pub fn registry(&self) -> Result<StaticRegistry, FloorError> {
        StaticRegistry::new(&self.registrations())
    }
}
