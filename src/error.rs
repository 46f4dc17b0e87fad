//! The error type shared by the fallible parts of the floor pipeline.
//!
//! Most of the core never fails: malformed frames, short buffers and
//! out-of-range writes are dropped and counted. [`FloorError`] is what comes
//! back from the operations that can genuinely be refused, such as opening a
//! transport, reading a configuration file, or registering a board twice.

use std::{borrow::Cow, fmt, sync::mpsc};

/// A nice little error that we can return if things go wrong anywhere between
/// the transport and the tracker.
#[derive(Debug)]
pub enum FloorError {
    /// Returned when io fails while reading a transport or a file.
    IoError(std::io::Error),

    /// Returned when serialization of a configuration fails.
    RonError(ron::Error),

    /// Returned when deserialization of a configuration fails.
    RonSpannedError(ron::de::SpannedError),

    /// Returned when a board reports a hardware generation we have no
    /// coordinate table for.
    UnknownModel(u8),

    /// Returned when the same board id is registered more than once.
    DuplicateBoard(u16),

    /// Returned when data arrives for a board id that was never registered.
    UnknownBoard(u16),

    /// Returned when a sample buffer does not hold one sample per sensor.
    SampleCount {
        /// Number of samples the board model requires.
        expected: usize,
        /// Number of samples that were supplied.
        actual: usize,
    },

    /// Returned when a sample buffer is addressed to a mode the board does
    /// not have.
    ModeOutOfRange {
        /// The offending mode.
        mode: u8,
        /// The number of modes the board was registered with.
        mode_count: u8,
    },

    /// Returned when a worker's peer hung up its end of a channel.
    ChannelClosed,
}

impl fmt::Display for FloorError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use FloorError as FE;
        let msg = match self {
            FE::IoError(error) => Cow::from(format!("io error: {}", error)),
            FE::RonError(error) => Cow::from(format!("ron error: {}", error)),
            FE::RonSpannedError(error) => Cow::from(format!("ron spanning error: {}", error)),
            FE::UnknownModel(version) => {
                Cow::from(format!("no board model for hardware version {}", version))
            }
            FE::DuplicateBoard(id) => Cow::from(format!("board {} is already registered", id)),
            FE::UnknownBoard(id) => Cow::from(format!("board {} is not registered", id)),
            FE::SampleCount { expected, actual } => Cow::from(format!(
                "expected {} samples but received {}",
                expected, actual
            )),
            FE::ModeOutOfRange { mode, mode_count } => Cow::from(format!(
                "mode {} is out of range for a board with {} modes",
                mode, mode_count
            )),
            FE::ChannelClosed => Cow::from("channel closed"),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for FloorError {}

impl From<std::io::Error> for FloorError {
    fn from(value: std::io::Error) -> Self {
        Self::IoError(value)
    }
}

impl From<ron::Error> for FloorError {
    fn from(value: ron::Error) -> Self {
        Self::RonError(value)
    }
}

impl From<ron::de::SpannedError> for FloorError {
    fn from(value: ron::de::SpannedError) -> Self {
        Self::RonSpannedError(value)
    }
}

impl<T> From<mpsc::SendError<T>> for FloorError {
    fn from(_: mpsc::SendError<T>) -> Self {
        Self::ChannelClosed
    }
}

impl From<mpsc::RecvError> for FloorError {
    fn from(_: mpsc::RecvError) -> Self {
        Self::ChannelClosed
    }
}
