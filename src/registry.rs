//! The seam to the service that knows which boards are connected and where
//! they sit.
//!
//! The real registry is a separate process with its own storage. The
//! pipeline only needs the two calls in [`BoardRegistry`], and
//! [`StaticRegistry`] answers them from the configuration file.

use crate::board_frame::BoardFrame;
use crate::board_model::BoardModel;
use crate::error::FloorError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything the pipeline needs to know to build a board's frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct BoardRegistration {
    /// Stable id assigned by the registry.
    pub board_id: u16,
    /// Hardware generation, see [`BoardModel::from_version`].
    pub model_version: u8,
    /// Number of sensing modes the board runs.
    pub mode_count: u8,
    /// Stored panel layout coordinate, in LED units.
    pub panel_layout: (i32, i32),
}

impl BoardRegistration {
    /// The board's offset on the global surface.
    pub fn layout_offset(&self) -> Result<(i32, i32), FloorError> {
        Ok(BoardModel::from_version(self.model_version)?.place(self.panel_layout))
    }

    /// Builds a zeroed frame for this board.
    pub fn to_frame(&self) -> Result<BoardFrame, FloorError> {
        let model = BoardModel::from_version(self.model_version)?;
        Ok(BoardFrame::new(
            self.board_id,
            model,
            self.mode_count,
            model.place(self.panel_layout),
        ))
    }
}

/// `BoardRegistry`
///
/// Looks up the connected boards and remembers where they were laid out.
pub trait BoardRegistry {
    /// Every board currently connected.
    fn connected_boards(&self) -> Result<Vec<BoardRegistration>, FloorError>;

    /// Stores a new panel layout coordinate for a board.
    fn store_layout(&mut self, board_id: u16, panel_layout: (i32, i32)) -> Result<(), FloorError>;
}

/// A [`BoardRegistry`] that keeps its boards in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    boards: BTreeMap<u16, BoardRegistration>,
}

impl StaticRegistry {
    /// Instantiates a registry holding `boards`. Later duplicates of a board
    /// id are refused.
    pub fn new(boards: &[BoardRegistration]) -> Result<Self, FloorError> {
        let mut registry = Self::default();
        for &board in boards {
            if registry.boards.insert(board.board_id, board).is_some() {
                return Err(FloorError::DuplicateBoard(board.board_id));
            }
        }
        Ok(registry)
    }
}

impl BoardRegistry for StaticRegistry {
    fn connected_boards(&self) -> Result<Vec<BoardRegistration>, FloorError> {
        Ok(self.boards.values().copied().collect())
    }

    fn store_layout(&mut self, board_id: u16, panel_layout: (i32, i32)) -> Result<(), FloorError> {
        self.boards
            .get_mut(&board_id)
            .map(|board| board.panel_layout = panel_layout)
            .ok_or(FloorError::UnknownBoard(board_id))
    }
}
