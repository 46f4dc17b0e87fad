//! Collects a board's packet stream into complete per-mode buffers.
//!
//! Boards stream one packet per sensor per mode, sweeping every sensor of
//! every mode in turn. The [`PacketAssembler`] stages samples as they arrive
//! and hands out a full frame each time the last sensor of the last mode is
//! seen, so the [`BoardFrame`](crate::board_frame::BoardFrame) only ever
//! sees whole buffers.

use crate::board_model::{BoardInfo, BoardModel};
use crate::frame_codec::SensorPacket;
use log::{debug, info};

/// One complete sweep of a board: a buffer per mode, each with one sample
/// per sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardUpdate {
    /// The board the sweep came from.
    pub board_id: u16,
    /// `modes[mode][sensor]`.
    pub modes: Vec<Vec<u16>>,
}

/// What the assembler made of a packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembled {
    /// The packet completed a sweep.
    Sweep(BoardUpdate),
    /// The packet was the board announcing itself.
    Info(BoardInfo),
}

/// Stages one board's packets until a sweep is complete.
#[derive(Debug, Clone)]
pub struct PacketAssembler {
    board_id: u16,
    model: BoardModel,
    mode_count: usize,
    staged: Vec<Vec<u16>>,
    info: Option<BoardInfo>,
    dropped: u64,
}

impl PacketAssembler {
    /// Instantiates an assembler for a registered board.
    pub fn new(board_id: u16, model: BoardModel, mode_count: u8) -> Self {
        Self {
            board_id,
            model,
            mode_count: mode_count as usize,
            staged: vec![vec![0; model.sensor_count()]; mode_count as usize],
            info: None,
            dropped: 0,
        }
    }

    /// The board this assembler belongs to.
    pub fn board_id(&self) -> u16 {
        self.board_id
    }

    /// The last info packet the board sent, if any.
    pub fn info(&self) -> Option<BoardInfo> {
        self.info
    }

    /// Packets that addressed a sensor or mode the board does not have.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Stages one packet.
    pub fn push(&mut self, packet: &SensorPacket) -> Option<Assembled> {
        if let Some(info) = BoardInfo::from_packet(packet) {
            if self.info != Some(info) {
                info!(
                    "board {}: version {}, chain {}, {} sensors",
                    self.board_id, info.version, info.chain, info.sensors
                );
                if info.version != self.model.version() {
                    debug!(
                        "board {}: registered as version {}",
                        self.board_id,
                        self.model.version()
                    );
                }
            }
            self.info = Some(info);
            return Some(Assembled::Info(info));
        }

        let sensors = self.model.sensor_count();
        let (sensor, mode) = self.model.split_address(packet.address);
        if sensor >= sensors || mode >= self.mode_count {
            self.dropped += 1;
            debug!(
                "board {}: dropping packet for sensor {} mode {}",
                self.board_id, sensor, mode
            );
            return None;
        }

        self.staged[mode][sensor] = packet.value;

        if sensor == sensors - 1 && mode == self.mode_count - 1 {
            Some(Assembled::Sweep(BoardUpdate {
                board_id: self.board_id,
                modes: self.staged.clone(),
            }))
        } else {
            None
        }
    }

    /// Stages a batch of packets, returning the completed sweeps in order.
    pub fn push_all(&mut self, packets: &[SensorPacket]) -> Vec<BoardUpdate> {
        packets
            .iter()
            .filter_map(|p| match self.push(p) {
                Some(Assembled::Sweep(update)) => Some(update),
                _ => None,
            })
            .collect()
    }
}

/// The packets a board would send for one full sweep, in sweep order.
pub fn sweep_packets(model: BoardModel, modes: &[Vec<u16>]) -> Vec<SensorPacket> {
    modes
        .iter()
        .enumerate()
        .flat_map(|(mode, samples)| {
            samples
                .iter()
                .enumerate()
                .map(move |(sensor, &value)| SensorPacket {
                    address: model.join_address(sensor, mode),
                    value,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sweep(model: BoardModel, mode_count: usize, base: u16) -> Vec<Vec<u16>> {
        (0..mode_count)
            .map(|m| {
                (0..model.sensor_count())
                    .map(|s| base + (m * 100 + s) as u16)
                    .collect()
            })
            .collect()
    }

    #[test]
    fn emits_on_last_sensor_of_last_mode() {
        let model = BoardModel::V4;
        let mut asm = PacketAssembler::new(3, model, 5);
        let modes = sweep(model, 5, 1000);
        let packets = sweep_packets(model, &modes);
        assert_eq!(packets.len(), 90);

        let (last, rest) = packets.split_last().unwrap();
        assert!(asm.push_all(rest).is_empty());
        assert_eq!(
            asm.push(last),
            Some(Assembled::Sweep(BoardUpdate { board_id: 3, modes }))
        );
    }

    #[test]
    fn packed_addresses() {
        let model = BoardModel::V3;
        let mut asm = PacketAssembler::new(0, model, 2);
        let modes = sweep(model, 2, 0);
        let updates = asm.push_all(&sweep_packets(model, &modes));
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].modes, modes);
    }

    #[test]
    fn stale_samples_carry_over() {
        let model = BoardModel::V2;
        let mut asm = PacketAssembler::new(0, model, 1);
        let first = sweep(model, 1, 0);
        asm.push_all(&sweep_packets(model, &first));

        // only the last sensor arrives for the next sweep
        let update = asm.push(&SensorPacket::packed(35, 0, 7));
        let mut expected = first.clone();
        expected[0][35] = 7;
        assert_eq!(
            update,
            Some(Assembled::Sweep(BoardUpdate {
                board_id: 0,
                modes: expected
            }))
        );
    }

    #[test]
    fn out_of_range_packets_are_dropped() {
        let model = BoardModel::V2;
        let mut asm = PacketAssembler::new(0, model, 1);
        assert_eq!(asm.push(&SensorPacket::packed(36, 0, 1)), None);
        assert_eq!(asm.push(&SensorPacket::packed(0, 1, 1)), None);
        assert_eq!(asm.dropped(), 2);
    }

    #[test]
    fn info_packets() {
        let mut asm = PacketAssembler::new(0, BoardModel::V4, 5);
        let info = BoardInfo {
            version: 4,
            chain: 1,
            sensors: 18,
        };
        assert_eq!(asm.push(&info.to_packet()), Some(Assembled::Info(info)));
        assert_eq!(asm.info(), Some(info));
        assert_eq!(asm.dropped(), 0);
    }
}
