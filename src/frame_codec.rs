//! The link layer between the sensing boards and the host.
//!
//! Boards stream fixed-size [`SensorPacket`]s framed with a SLIP-style
//! escaping rule: every frame is terminated by [`FRAME_END`], and payload
//! bytes that collide with [`FRAME_END`] or [`ESC`] are replaced by a
//! two-byte escape pair. The same rule is used in the other direction for
//! colour data sent back to the boards, see [`encode`].
//!
//! A [`SlipDecoder`] keeps its state between calls, so a chunk read from the
//! transport may end in the middle of a frame.

use log::{debug, trace};
use nom::{
    combinator::{all_consuming, map},
    number::complete::be_u16,
    sequence::tuple,
    Finish, IResult,
};

/// Terminates every frame.
pub const FRAME_END: u8 = 0xC0;
/// Starts an escape pair.
pub const ESC: u8 = 0xDB;
/// Second byte of the escape pair standing for a literal [`FRAME_END`].
pub const ESC_FRAME_END: u8 = 0xDC;
/// Second byte of the escape pair standing for a literal [`ESC`].
pub const ESC_ESC: u8 = 0xDD;

/// Size of one decoded payload on the wire.
pub const PACKET_LEN: usize = 4;

/// One sample from one sensor, as it arrives from a board.
///
/// Whether `address` is a packed `(sensor, mode)` pair or a flat data index
/// depends on the hardware generation, see
/// [`BoardModel::split_address`](crate::board_model::BoardModel::split_address).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SensorPacket {
    /// Packed sensor/mode pair or flat data index.
    pub address: u16,
    /// The 16 bit sample.
    pub value: u16,
}

impl SensorPacket {
    /// Builds a packet from a packed `(sensor, mode)` address.
    pub fn packed(sensor: u8, mode: u8, value: u16) -> Self {
        Self {
            address: (sensor as u16) << 8 | mode as u16,
            value,
        }
    }

    /// The big-endian wire representation of this packet, before escaping.
    pub fn to_bytes(&self) -> [u8; PACKET_LEN] {
        let [a0, a1] = self.address.to_be_bytes();
        let [v0, v1] = self.value.to_be_bytes();
        [a0, a1, v0, v1]
    }
}

fn parse_packet(input: &[u8]) -> IResult<&[u8], SensorPacket> {
    map(tuple((be_u16, be_u16)), |(address, value)| SensorPacket {
        address,
        value,
    })(input)
}

/// Running totals kept by a [`SlipDecoder`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Frames that decoded into a packet.
    pub packets: u64,
    /// Non-empty frames that were dropped because of their length.
    pub malformed: u64,
}

/// Incremental decoder for the framed sensor stream.
///
/// Bytes that arrive before the first [`FRAME_END`] are discarded, since
/// there is no way to know where in a frame the stream was joined.
///
/// An escape that is not followed by [`ESC_FRAME_END`] or [`ESC_ESC`] is
/// abandoned: the escape flag is cleared and the byte is taken as ordinary
/// payload, so a single corrupted byte cannot leave the decoder escaping
/// every byte that follows.
#[derive(Debug, Default)]
pub struct SlipDecoder {
    pending: Vec<u8>,
    in_frame: bool,
    escaped: bool,
    stats: DecodeStats,
}

impl SlipDecoder {
    /// A decoder that has not yet seen a frame boundary.
    pub fn new() -> Self {
        Self {
            pending: Vec::with_capacity(PACKET_LEN + 1),
            ..Default::default()
        }
    }

    /// Feeds a chunk of raw bytes through the decoder, returning every packet
    /// completed by this chunk in arrival order.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<SensorPacket> {
        chunk.iter().filter_map(|&byte| self.push(byte)).collect()
    }

    /// Feeds a single byte through the decoder.
    pub fn push(&mut self, byte: u8) -> Option<SensorPacket> {
        match byte {
            FRAME_END => {
                self.in_frame = true;
                self.escaped = false;
                return self.finish_frame();
            }
            ESC => {
                if self.in_frame || self.escaped {
                    self.escaped = true;
                }
            }
            ESC_FRAME_END if self.escaped => {
                self.escaped = false;
                self.append(FRAME_END);
            }
            ESC_ESC if self.escaped => {
                self.escaped = false;
                self.append(ESC);
            }
            other => {
                if self.escaped {
                    trace!("abandoning escape before {:#04x}", other);
                    self.escaped = false;
                }
                self.append(other);
            }
        }
        None
    }

    /// Whether the decoder has synchronised on a frame boundary yet.
    pub fn in_frame(&self) -> bool {
        self.in_frame
    }

    /// Whether the last byte seen opened an escape pair.
    pub fn escape_pending(&self) -> bool {
        self.escaped
    }

    /// Counters for decoded and dropped frames.
    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    fn append(&mut self, byte: u8) {
        // One byte past a full payload is enough to know the frame is bad.
        if self.in_frame && self.pending.len() <= PACKET_LEN {
            self.pending.push(byte);
        }
    }

    fn finish_frame(&mut self) -> Option<SensorPacket> {
        let packet = if self.pending.len() == PACKET_LEN {
            all_consuming(parse_packet)(&self.pending[..])
                .finish()
                .ok()
                .map(|(_, packet)| packet)
        } else {
            if !self.pending.is_empty() {
                self.stats.malformed += 1;
                debug!(
                    "dropping malformed frame of {}{} bytes",
                    if self.pending.len() > PACKET_LEN { "at least " } else { "" },
                    self.pending.len()
                );
            }
            None
        };

        if packet.is_some() {
            self.stats.packets += 1;
        }
        self.pending.clear();
        packet
    }
}

/// Escapes `payload` and terminates it with a single [`FRAME_END`].
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + payload.len() / 8 + 1);
    for &byte in payload {
        match byte {
            FRAME_END => out.extend_from_slice(&[ESC, ESC_FRAME_END]),
            ESC => out.extend_from_slice(&[ESC, ESC_ESC]),
            other => out.push(other),
        }
    }
    out.push(FRAME_END);
    out
}

/// Encodes one packet as a complete frame.
pub fn encode_packet(packet: &SensorPacket) -> Vec<u8> {
    encode(&packet.to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    /// A decoder that has already seen a boundary, as it would be after the
    /// first frame on a live link.
    fn synced() -> SlipDecoder {
        let mut dec = SlipDecoder::new();
        assert!(dec.decode(&[FRAME_END]).is_empty());
        dec
    }

    #[test]
    fn plain_packet() {
        let mut dec = synced();
        let packets = dec.decode(&[0x01, 0x02, 0x03, 0x04, FRAME_END]);
        assert_eq!(
            packets,
            vec![SensorPacket {
                address: 0x0102,
                value: 0x0304
            }]
        );
        assert_eq!(dec.stats().packets, 1);
    }

    #[test]
    fn escaped_bytes_round_trip() {
        let packet = SensorPacket {
            address: u16::from_be_bytes([FRAME_END, ESC]),
            value: u16::from_be_bytes([ESC, FRAME_END]),
        };
        let wire = encode_packet(&packet);

        // No literal delimiter or escape except the pairs and the terminator
        assert_eq!(wire.iter().filter(|&&b| b == FRAME_END).count(), 1);
        assert_eq!(*wire.last().unwrap(), FRAME_END);
        assert_eq!(
            wire,
            vec![
                ESC,
                ESC_FRAME_END,
                ESC,
                ESC_ESC,
                ESC,
                ESC_ESC,
                ESC,
                ESC_FRAME_END,
                FRAME_END
            ]
        );

        let mut dec = synced();
        assert_eq!(dec.decode(&wire), vec![packet]);
    }

    #[test]
    fn random_packets_round_trip() {
        let mut rng = rand::thread_rng();
        let mut dec = synced();
        for _ in 0..1000 {
            let packet = SensorPacket {
                address: rng.gen(),
                value: rng.gen(),
            };
            let wire = encode_packet(&packet);
            assert!(!wire[..wire.len() - 1].contains(&FRAME_END));
            assert_eq!(dec.decode(&wire), vec![packet]);
        }
        assert_eq!(dec.stats().malformed, 0);
    }

    #[test]
    fn split_at_every_boundary() {
        let packet = SensorPacket {
            address: 0xC0DB,
            value: 0x12C0,
        };
        let mut wire = vec![FRAME_END];
        wire.extend(encode_packet(&packet));

        for split in 0..=wire.len() {
            let mut dec = SlipDecoder::new();
            let (head, tail) = wire.split_at(split);
            let mut packets = dec.decode(head);
            packets.extend(dec.decode(tail));
            assert_eq!(packets, vec![packet], "split at {}", split);
        }
    }

    #[test]
    fn bytes_before_first_boundary_are_discarded() {
        let mut dec = SlipDecoder::new();
        assert!(dec.decode(&[0x01, 0x02, 0x03, 0x04]).is_empty());
        assert!(!dec.in_frame());
        // The first boundary only synchronises
        assert!(dec.decode(&[FRAME_END]).is_empty());
        assert!(dec.in_frame());
        assert_eq!(dec.stats(), DecodeStats::default());
    }

    #[test]
    fn wrong_length_frames_are_dropped() {
        let mut dec = synced();
        assert!(dec.decode(&[0x01, 0x02, 0x03, FRAME_END]).is_empty());
        assert!(dec
            .decode(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, FRAME_END])
            .is_empty());
        // An empty frame is just a resync, not an error
        assert!(dec.decode(&[FRAME_END]).is_empty());
        assert_eq!(dec.stats().malformed, 2);

        // and the decoder carries on
        assert_eq!(
            dec.decode(&[0x00, 0x07, 0x00, 0x2A, FRAME_END]),
            vec![SensorPacket {
                address: 7,
                value: 42
            }]
        );
    }

    #[test]
    fn long_garbage_stays_bounded() {
        let mut dec = synced();
        let garbage = vec![0x11; 10_000];
        assert!(dec.decode(&garbage).is_empty());
        assert!(dec.pending.len() <= PACKET_LEN + 1);
        assert!(dec.decode(&[FRAME_END]).is_empty());
        assert_eq!(dec.stats().malformed, 1);
    }

    #[test]
    fn broken_escape_does_not_stick() {
        let mut dec = synced();
        // ESC followed by an ordinary byte is not a valid pair
        assert!(dec.decode(&[ESC, 0x01]).is_empty());
        assert!(!dec.escape_pending());
        // so a later 0xDD is taken literally
        let packets = dec.decode(&[0x02, ESC_ESC, 0x04, FRAME_END]);
        assert_eq!(
            packets,
            vec![SensorPacket {
                address: 0x0102,
                value: 0xDD04
            }]
        );
    }

    #[test]
    fn unescaped_continuation_bytes_are_literal() {
        let mut dec = synced();
        let packets = dec.decode(&[ESC_FRAME_END, ESC_ESC, 0x00, 0x01, FRAME_END]);
        assert_eq!(
            packets,
            vec![SensorPacket {
                address: 0xDCDD,
                value: 0x0001
            }]
        );
    }

    #[test]
    fn encode_arbitrary_payload() {
        let payload = [0x00, FRAME_END, 0x7F, ESC, 0xFF];
        assert_eq!(
            encode(&payload),
            vec![0x00, ESC, ESC_FRAME_END, 0x7F, ESC, ESC_ESC, 0xFF, FRAME_END]
        );
        assert_eq!(encode(&[]), vec![FRAME_END]);
    }

    #[test]
    fn packed_address() {
        let packet = SensorPacket::packed(17, 4, 900);
        assert_eq!(packet.address, 0x1104);
        assert_eq!(packet.to_bytes(), [0x11, 0x04, 0x03, 0x84]);
    }
}
