//! Byte transports between the host and the boards.
//!
//! Everything a board sends is a stream of SLIP-framed packets, whether it
//! arrives over a serial line or a TCP socket, so the pipeline only needs a
//! way to pull raw chunks ([`ByteSource`]) and, for outbound traffic such as
//! LED commands, a way to push framed payloads ([`ByteSink`]).

use crate::board_model::BoardModel;
use crate::config::{BoardConfig, TransportConfig};
use crate::dummy_floor::DummyFloor;
use crate::error::FloorError;
use crate::frame_codec::encode;
use log::info;
use serial2::SerialPort;
use std::{
    collections::VecDeque,
    io::{self, Read, Write},
    net::TcpStream,
    path::{Path, PathBuf},
    time::Duration,
};

/// How long a read may block before handing control back to the worker, so
/// that it can notice a stop request.
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// `ByteSource`
///
/// Something raw bytes can be pulled from.
pub trait ByteSource {
    /// Reads whatever is available into `buf`. Returns `Ok(0)` when nothing
    /// arrived before the read timed out; a closed stream is an error.
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, FloorError>;
}

/// `ByteSink`
///
/// Something framed payloads can be pushed to.
pub trait ByteSink {
    /// Writes already-framed bytes.
    fn write_raw(&mut self, bytes: &[u8]) -> Result<(), FloorError>;

    /// Frames `payload` and writes it.
    fn transfer(&mut self, payload: &[u8]) -> Result<(), FloorError> {
        self.write_raw(&encode(payload))
    }
}

impl ByteSink for Vec<u8> {
    fn write_raw(&mut self, bytes: &[u8]) -> Result<(), FloorError> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

/// Maps a read result onto the [`ByteSource`] contract.
fn timed_read(res: io::Result<usize>) -> Result<usize, FloorError> {
    match res {
        Ok(0) => Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
        Ok(n) => Ok(n),
        Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
            Ok(0)
        }
        Err(e) => Err(e.into()),
    }
}

/// Lists the serial devices on this machine.
pub fn available_ports() -> Result<Vec<PathBuf>, FloorError> {
    Ok(SerialPort::available_ports()?)
}

/// A board on a serial line.
pub struct SerialTransport {
    port: SerialPort,
}

impl SerialTransport {
    /// Opens `path` at `baud_rate`.
    pub fn open(path: impl AsRef<Path>, baud_rate: u32) -> Result<Self, FloorError> {
        let mut port = SerialPort::open(path.as_ref(), baud_rate)?;
        port.set_read_timeout(READ_TIMEOUT)?;
        info!("opened {} at {} baud", path.as_ref().display(), baud_rate);
        Ok(Self { port })
    }
}

impl ByteSource for SerialTransport {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, FloorError> {
        timed_read(self.port.read(buf))
    }
}

impl ByteSink for SerialTransport {
    fn write_raw(&mut self, bytes: &[u8]) -> Result<(), FloorError> {
        Ok(self.port.write_all(bytes)?)
    }
}

/// A board reached over TCP.
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Connects to `address`.
    pub fn connect(address: &str) -> Result<Self, FloorError> {
        let stream = TcpStream::connect(address)?;
        stream.set_read_timeout(Some(READ_TIMEOUT))?;
        stream.set_nodelay(true)?;
        info!("connected to {}", address);
        Ok(Self { stream })
    }
}

impl ByteSource for TcpTransport {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, FloorError> {
        timed_read(self.stream.read(buf))
    }
}

impl ByteSink for TcpTransport {
    fn write_raw(&mut self, bytes: &[u8]) -> Result<(), FloorError> {
        Ok(self.stream.write_all(bytes)?)
    }
}

/// Plays back recorded chunks, then reports the end of the stream.
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    chunks: VecDeque<Vec<u8>>,
}

impl ReplaySource {
    /// Instantiates a source that yields `chunks` in order.
    pub fn new(chunks: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into_iter().collect(),
        }
    }

    /// Bytes not yet read.
    pub fn remaining(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }
}

impl ByteSource for ReplaySource {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, FloorError> {
        let Some(mut chunk) = self.chunks.pop_front() else {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            self.chunks.push_front(chunk.split_off(n));
        }
        Ok(n)
    }
}

/// Opens the byte source a board is configured with.
pub fn open(config: &BoardConfig) -> Result<Box<dyn ByteSource + Send>, FloorError> {
    Ok(match &config.transport {
        TransportConfig::Serial { path, baud_rate } => {
            Box::new(SerialTransport::open(path, *baud_rate)?)
        }
        TransportConfig::Tcp { address } => Box::new(TcpTransport::connect(address)?),
        TransportConfig::Synthetic { touches, noise } => {
            let model = BoardModel::from_version(config.board.model_version)?;
            Box::new(
                DummyFloor::builder(model, config.board.mode_count)
                    .touches(*touches)
                    .noise(*noise)
                    .build(),
            )
        }
    })
}
