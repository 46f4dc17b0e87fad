//! Static descriptions of each hardware generation of sensing board.
//!
//! Every generation has a fixed number of sensors and a lookup table that
//! says where on the board's native grid each sensor sits. Newer boards are
//! mounted at 45 degrees to the LED panels above them, so their placement on
//! the global surface goes through an extra transform, see
//! [`BoardModel::place`].

use crate::error::FloorError;
use crate::frame_codec::SensorPacket;
use std::f64::consts::FRAC_1_SQRT_2;

/// Sensor index used by a board to announce itself instead of a sample.
pub const BOARD_INFO_SENSOR: u8 = 0xFF;

/// Number of modes at which boards interleave their modes into sub-pixels.
pub const INTERLEAVED_MODES: usize = 5;

/// Sensor pixels per LED along a panel edge for generation 4 boards
/// (an 18 LED panel edge spans 12 interleaved sensor pixels).
pub const V4_PANEL_SCALE: f64 = 2.0 / 3.0;

/// A sensor's position on its board's native grid, `(x, y)`.
pub type GridCoord = (u8, u8);

const fn row_major<const N: usize>(width: u8) -> [GridCoord; N] {
    let mut table = [(0, 0); N];
    let mut i = 0;
    while i < N {
        table[i] = ((i % width as usize) as u8, (i / width as usize) as u8);
        i += 1;
    }
    table
}

static V2_TABLE: [GridCoord; 36] = row_major::<36>(6);

static V3_TABLE: [GridCoord; 60] = row_major::<60>(10);

// The generation 4 sensors form a diamond on a 6 x 5 grid.
static V4_TABLE: [GridCoord; 18] = [
    (3, 0),
    (4, 1),
    (5, 2),
    (2, 0),
    (3, 1),
    //
    (4, 2),
    (2, 1),
    (3, 2),
    (4, 3),
    (1, 1),
    (2, 2),
    //
    (3, 3),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 2),
    //
    (1, 3),
    (2, 4),
];

/// The hardware generations we know how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoardModel {
    /// Generation 2, serial link, 6 x 6 sensors.
    V2,
    /// Generation 3, serial link, 10 x 6 sensors.
    V3,
    /// Generation 4, rotated diamond of 18 sensors, flat addressing.
    V4,
}

impl BoardModel {
    /// Looks up the model for a hardware version number as reported by the
    /// board or stored in the registry.
    pub fn from_version(version: u8) -> Result<Self, FloorError> {
        match version {
            2 => Ok(Self::V2),
            3 => Ok(Self::V3),
            4 => Ok(Self::V4),
            other => Err(FloorError::UnknownModel(other)),
        }
    }

    /// The hardware version number of this model.
    pub fn version(self) -> u8 {
        match self {
            Self::V2 => 2,
            Self::V3 => 3,
            Self::V4 => 4,
        }
    }

    /// Sensor index to native grid coordinate.
    pub fn coordinate_table(self) -> &'static [GridCoord] {
        match self {
            Self::V2 => &V2_TABLE,
            Self::V3 => &V3_TABLE,
            Self::V4 => &V4_TABLE,
        }
    }

    /// Number of sensors on the board, and so the number of samples in one
    /// mode's buffer.
    pub fn sensor_count(self) -> usize {
        self.coordinate_table().len()
    }

    /// Width of the native sensor grid.
    pub fn grid_width(self) -> usize {
        match self {
            Self::V2 => 6,
            Self::V3 => 10,
            Self::V4 => 6,
        }
    }

    /// Height of the native sensor grid.
    pub fn grid_height(self) -> usize {
        match self {
            Self::V2 => 6,
            Self::V3 => 6,
            Self::V4 => 5,
        }
    }

    /// Size of the assembled grid for a board running `mode_count` modes.
    /// Interleaved boards get one sub-pixel per mode quadrant.
    pub fn frame_size(self, mode_count: usize) -> (usize, usize) {
        if mode_count == INTERLEAVED_MODES {
            (self.grid_width() * 2, self.grid_height() * 2)
        } else {
            (self.grid_width(), self.grid_height())
        }
    }

    /// Splits a packet address into `(sensor, mode)`.
    ///
    /// The serial generations pack the sensor index in the high byte and the
    /// mode in the low byte; generation 4 sends a flat index that runs over
    /// every sensor of mode 0, then every sensor of mode 1, and so on.
    pub fn split_address(self, address: u16) -> (usize, usize) {
        match self {
            Self::V2 | Self::V3 => ((address >> 8) as usize, (address & 0xFF) as usize),
            Self::V4 => {
                let sensors = self.sensor_count();
                (address as usize % sensors, address as usize / sensors)
            }
        }
    }

    /// The inverse of [`BoardModel::split_address`].
    pub fn join_address(self, sensor: usize, mode: usize) -> u16 {
        match self {
            Self::V2 | Self::V3 => ((sensor as u16) << 8) | (mode as u16 & 0xFF),
            Self::V4 => (mode * self.sensor_count() + sensor) as u16,
        }
    }

    /// Turns a stored panel layout coordinate into the board's offset on the
    /// global surface.
    ///
    /// Generation 4 boards sit at 45 degrees under the panels, so the panel
    /// coordinate is scaled into sensor pixels, rotated by +45 degrees and
    /// floored. Older boards are placed at the panel coordinate unchanged.
    pub fn place(self, panel: (i32, i32)) -> (i32, i32) {
        match self {
            Self::V2 | Self::V3 => panel,
            Self::V4 => {
                let x = panel.0 as f64 * V4_PANEL_SCALE;
                let y = panel.1 as f64 * V4_PANEL_SCALE;
                // sin and cos of 45 degrees are the same constant, which keeps
                // points on the diagonal exactly on it.
                let rx = (x - y) * FRAC_1_SQRT_2;
                let ry = (x + y) * FRAC_1_SQRT_2;
                (rx.floor() as i32, ry.floor() as i32)
            }
        }
    }
}

/// What a board says about itself when it starts streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardInfo {
    /// Hardware version, see [`BoardModel::from_version`].
    pub version: u8,
    /// Position of the board in its daisy chain.
    pub chain: u8,
    /// Number of sensors the firmware reports.
    pub sensors: u8,
}

impl BoardInfo {
    /// Reads a board-info packet. Returns `None` for ordinary samples.
    pub fn from_packet(packet: &SensorPacket) -> Option<Self> {
        let [sensor, version] = packet.address.to_be_bytes();
        if sensor != BOARD_INFO_SENSOR {
            return None;
        }
        let [chain, sensors] = packet.value.to_be_bytes();
        Some(Self {
            version,
            chain,
            sensors,
        })
    }

    /// The packet a board would send to announce this info.
    pub fn to_packet(&self) -> SensorPacket {
        SensorPacket::packed(
            BOARD_INFO_SENSOR,
            self.version,
            u16::from_be_bytes([self.chain, self.sensors]),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const MODELS: [BoardModel; 3] = [BoardModel::V2, BoardModel::V3, BoardModel::V4];

    #[test]
    fn tables_fit_their_grids() {
        for model in MODELS {
            let table = model.coordinate_table();
            assert!(table
                .iter()
                .all(|&(x, y)| (x as usize) < model.grid_width()
                    && (y as usize) < model.grid_height()));

            // no two sensors share a cell
            let cells: HashSet<_> = table.iter().collect();
            assert_eq!(cells.len(), table.len(), "{:?}", model);
        }
    }

    #[test]
    fn sensor_counts() {
        assert_eq!(BoardModel::V2.sensor_count(), 36);
        assert_eq!(BoardModel::V3.sensor_count(), 60);
        assert_eq!(BoardModel::V4.sensor_count(), 18);
        assert_eq!(BoardModel::V3.coordinate_table()[11], (1, 1));
    }

    #[test]
    fn versions() {
        for model in MODELS {
            assert_eq!(BoardModel::from_version(model.version()).unwrap(), model);
        }
        assert!(matches!(
            BoardModel::from_version(7),
            Err(FloorError::UnknownModel(7))
        ));
    }

    #[test]
    fn interleaved_frames_are_doubled() {
        assert_eq!(BoardModel::V4.frame_size(5), (12, 10));
        assert_eq!(BoardModel::V4.frame_size(1), (6, 5));
        assert_eq!(BoardModel::V3.frame_size(4), (10, 6));
    }

    #[test]
    fn addresses() {
        assert_eq!(BoardModel::V3.split_address(0x2A03), (42, 3));
        assert_eq!(BoardModel::V4.split_address(0), (0, 0));
        assert_eq!(BoardModel::V4.split_address(17), (17, 0));
        assert_eq!(BoardModel::V4.split_address(18), (0, 1));
        assert_eq!(BoardModel::V4.split_address(89), (17, 4));

        for model in MODELS {
            for mode in 0..5 {
                for sensor in 0..model.sensor_count() {
                    let address = model.join_address(sensor, mode);
                    assert_eq!(model.split_address(address), (sensor, mode));
                }
            }
        }
    }

    #[test]
    fn old_boards_are_not_moved() {
        assert_eq!(BoardModel::V2.place((18, -36)), (18, -36));
        assert_eq!(BoardModel::V3.place((0, 0)), (0, 0));
    }

    #[test]
    fn new_boards_are_scaled_and_rotated() {
        assert_eq!(BoardModel::V4.place((0, 0)), (0, 0));
        // 18 LEDs -> 12 pixels, rotated onto the diagonal
        assert_eq!(BoardModel::V4.place((18, 0)), (8, 8));
        assert_eq!(BoardModel::V4.place((0, 18)), (-9, 8));
        assert_eq!(BoardModel::V4.place((18, 18)), (0, 16));
    }

    #[test]
    fn board_info() {
        let info = BoardInfo {
            version: 4,
            chain: 2,
            sensors: 18,
        };
        let packet = info.to_packet();
        assert_eq!(packet.address, 0xFF04);
        assert_eq!(BoardInfo::from_packet(&packet), Some(info));
        assert_eq!(
            BoardInfo::from_packet(&SensorPacket::packed(3, 4, 0x0212)),
            None
        );
    }
}
