//! One physical board's latest readings and its calibration.
//!
//! A [`BoardFrame`] holds the most recent full buffer for each sensing mode.
//! Assembling those buffers through the board's coordinate table gives a
//! rectangular grid; two captured grids (idle and full press) turn that into
//! a calibrated grid that spans the whole `u16` range.

use crate::board_model::{BoardModel, GridCoord, INTERLEAVED_MODES};
use crate::error::FloorError;
use crate::grid::Grid;
use log::{debug, warn};

/// Largest calibrated output value.
pub const FULL_SCALE: u16 = u16::MAX;

/// Where a sample from `mode` lands for a sensor at `coord`, as `(x, y)`.
///
/// Interleaved boards double the coordinate and give each of modes 1 to 4
/// its own sub-pixel: mode 1 one row down, mode 2 one row down and one
/// column right, mode 3 in place and mode 4 one column right. Boards with
/// fewer modes apply the same offsets to the undoubled coordinate. Any other
/// mode writes in place.
pub fn pixel_for(coord: GridCoord, mode: usize, mode_count: usize) -> (usize, usize) {
    let (mut x, mut y) = (coord.0 as usize, coord.1 as usize);
    if mode_count == INTERLEAVED_MODES {
        x *= 2;
        y *= 2;
    }
    let (d_row, d_col) = match mode {
        1 => (1, 0),
        2 => (1, 1),
        3 => (0, 0),
        4 => (0, 1),
        _ => (0, 0),
    };
    (x + d_col, y + d_row)
}

/// The latest readings and calibration state of one board.
#[derive(Debug, Clone)]
pub struct BoardFrame {
    board_id: u16,
    model: BoardModel,
    mode_count: u8,
    raw: Vec<Vec<u16>>,
    lower: Grid,
    upper: Grid,
    gain: Vec<f32>,
    layout_offset: (i32, i32),
    rejected: u64,
}

impl BoardFrame {
    /// A board with every sample and calibration value at zero.
    pub fn new(board_id: u16, model: BoardModel, mode_count: u8, layout_offset: (i32, i32)) -> Self {
        let (width, height) = model.frame_size(mode_count as usize);
        Self {
            board_id,
            model,
            mode_count,
            raw: vec![vec![0; model.sensor_count()]; mode_count as usize],
            lower: Grid::new(width, height),
            upper: Grid::new(width, height),
            gain: vec![0.0; width * height],
            layout_offset,
            rejected: 0,
        }
    }

    /// The registry's id for this board.
    pub fn board_id(&self) -> u16 {
        self.board_id
    }

    /// The board's hardware generation.
    pub fn model(&self) -> BoardModel {
        self.model
    }

    /// Number of sensing modes the board runs.
    pub fn mode_count(&self) -> u8 {
        self.mode_count
    }

    /// Top-left corner of this board on the global surface.
    pub fn layout_offset(&self) -> (i32, i32) {
        self.layout_offset
    }

    /// `(width, height)` of the assembled grid.
    pub fn frame_size(&self) -> (usize, usize) {
        self.model.frame_size(self.mode_count as usize)
    }

    /// Number of buffers refused by [`BoardFrame::update`].
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// The latest raw buffer for `mode`.
    pub fn raw(&self, mode: usize) -> Option<&[u16]> {
        self.raw.get(mode).map(Vec::as_slice)
    }

    /// Per-pixel gain, row-major over the assembled grid.
    pub fn gain(&self) -> &[f32] {
        &self.gain
    }

    /// The captured idle baseline.
    pub fn calibration_lower(&self) -> &Grid {
        &self.lower
    }

    /// The captured full-press ceiling.
    pub fn calibration_upper(&self) -> &Grid {
        &self.upper
    }

    /// Replaces the whole buffer for `mode`.
    ///
    /// Buffers that do not hold exactly one sample per sensor, or that name a
    /// mode the board does not run, are logged and discarded; the previous
    /// buffer for that mode stays in place.
    pub fn update(&mut self, mode: u8, samples: &[u16]) -> Result<(), FloorError> {
        let expected = self.model.sensor_count();
        if samples.len() != expected {
            self.rejected += 1;
            warn!(
                "board {}: mode {} buffer has {} samples, expected {}",
                self.board_id,
                mode,
                samples.len(),
                expected
            );
            return Err(FloorError::SampleCount {
                expected,
                actual: samples.len(),
            });
        }

        match self.raw.get_mut(mode as usize) {
            Some(buf) => {
                buf.copy_from_slice(samples);
                Ok(())
            }
            None => {
                self.rejected += 1;
                warn!(
                    "board {}: mode {} is out of range ({} modes)",
                    self.board_id, mode, self.mode_count
                );
                Err(FloorError::ModeOutOfRange {
                    mode,
                    mode_count: self.mode_count,
                })
            }
        }
    }

    /// Lays the current raw buffers out on the board's grid. Later modes
    /// overwrite earlier ones where they share a pixel.
    pub fn assemble(&self) -> Grid {
        let (width, height) = self.frame_size();
        let mut grid = Grid::new(width, height);
        let table = self.model.coordinate_table();
        let mode_count = self.mode_count as usize;

        for (mode, samples) in self.raw.iter().enumerate() {
            for (&coord, &value) in table.iter().zip(samples) {
                let (x, y) = pixel_for(coord, mode, mode_count);
                if !grid.set(x, y, value) {
                    debug!(
                        "board {}: mode {} pixel ({}, {}) is off the grid",
                        self.board_id, mode, x, y
                    );
                }
            }
        }
        grid
    }

    /// Stores the current readings as the idle baseline.
    pub fn capture_lower(&mut self) {
        self.lower = self.assemble();
    }

    /// Stores the current readings as the full-press ceiling.
    pub fn capture_upper(&mut self) {
        self.upper = self.assemble();
    }

    /// Derives the per-pixel gain from the captured baseline and ceiling.
    /// Pixels whose ceiling is not above their baseline get a gain of zero.
    pub fn recompute_gain(&mut self) {
        let full_scale = FULL_SCALE as f32;
        for ((gain, &lower), &upper) in self
            .gain
            .iter_mut()
            .zip(self.lower.data())
            .zip(self.upper.data())
        {
            *gain = if upper > lower {
                full_scale / (upper - lower) as f32
            } else {
                0.0
            };
        }
    }

    /// A calibrated snapshot of the current readings.
    pub fn calibrated_grid(&self) -> Grid {
        let mut grid = self.assemble();
        let full_scale = FULL_SCALE as f32;
        for ((value, &lower), &gain) in grid
            .data_mut()
            .iter_mut()
            .zip(self.lower.data())
            .zip(&self.gain)
        {
            let above = if *value > lower { *value - lower } else { 0 };
            *value = (above as f32 * gain).clamp(0.0, full_scale) as u16;
        }
        grid
    }
}
