use crate::error::FloorError;
use std::{error::Error, fmt::Display, sync::mpsc};

/// Everything that can go wrong while driving the terminal.
#[derive(Debug)]
pub enum MonitorError {
    /// The terminal could not be written to or read from.
    IOError(std::io::Error),
    /// The pipeline behind the terminal failed.
    FloorError(FloorError),
    /// The processing worker stopped listening for commands.
    MPSCSendError,
    /// A worker thread panicked.
    JoinError,
}

impl Display for MonitorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#?}", self)
    }
}

impl Error for MonitorError {}

impl From<std::io::Error> for MonitorError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}

impl From<FloorError> for MonitorError {
    fn from(value: FloorError) -> Self {
        Self::FloorError(value)
    }
}

impl<T> From<mpsc::SendError<T>> for MonitorError {
    fn from(_: mpsc::SendError<T>) -> Self {
        Self::MPSCSendError
    }
}

impl<T> From<mpsc::TrySendError<T>> for MonitorError {
    fn from(_: mpsc::TrySendError<T>) -> Self {
        Self::MPSCSendError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        let (tx, rx) = mpsc::sync_channel::<u8>(1);
        drop(rx);
        assert!(matches!(
            MonitorError::from(tx.try_send(1).unwrap_err()),
            MonitorError::MPSCSendError
        ));
        assert!(matches!(
            MonitorError::from(FloorError::UnknownBoard(3)),
            MonitorError::FloorError(FloorError::UnknownBoard(3))
        ));
    }
}
