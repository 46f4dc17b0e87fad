//! Composites every board onto one global sensing surface.
//!
//! Each board is copied into the surface at its layout offset. The surface
//! is rebuilt from scratch on every [`SurfaceMapper::update`]; it is a view
//! of the boards, never a store.

use crate::assembler::BoardUpdate;
use crate::board_frame::BoardFrame;
use crate::error::FloorError;
use crate::grid::Grid;
use crate::registry::BoardRegistration;
use log::{debug, info, warn};

/// The extent of all placed boards, in surface coordinates. `max` is
/// exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bounds {
    /// Smallest covered coordinate; becomes the surface origin.
    pub min: (i32, i32),
    /// One past the largest covered coordinate.
    pub max: (i32, i32),
}

impl Bounds {
    /// `(width, height)` of the bounded area.
    pub fn size(&self) -> (usize, usize) {
        (
            (self.max.0 - self.min.0).max(0) as usize,
            (self.max.1 - self.min.1).max(0) as usize,
        )
    }

    /// Whether the rectangle at `offset` of `size` lies entirely inside.
    pub fn contains(&self, offset: (i32, i32), size: (usize, usize)) -> bool {
        offset.0 >= self.min.0
            && offset.1 >= self.min.1
            && offset.0 + size.0 as i32 <= self.max.0
            && offset.1 + size.1 as i32 <= self.max.1
    }
}

/// Calibration steps that apply to every board at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationStep {
    /// Capture the idle baseline.
    CaptureLower,
    /// Capture the full-press ceiling.
    CaptureUpper,
    /// Derive gains from the captured pair.
    RecomputeGain,
}

/// Owns the registered boards and the composited surface.
#[derive(Debug, Clone, Default)]
pub struct SurfaceMapper {
    boards: Vec<BoardFrame>,
    bounds: Bounds,
    surface: Grid,
    skipped: u64,
}

impl SurfaceMapper {
    /// A mapper with no boards and an empty surface.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the board set with frames built from `registrations`.
    ///
    /// Registrations with an unknown hardware version or a board id that was
    /// already seen are logged and skipped. Returns the number of boards
    /// that were accepted.
    pub fn set_boards(&mut self, registrations: &[BoardRegistration]) -> usize {
        self.boards.clear();
        for registration in registrations {
            let res = registration
                .to_frame()
                .and_then(|frame| self.insert(frame));
            if let Err(e) = res {
                warn!("skipping board {}: {}", registration.board_id, e);
            }
        }
        self.compute_bounds();
        self.boards.len()
    }

    /// Adds one board to the set and recomputes the bounds.
    pub fn add_board(&mut self, frame: BoardFrame) -> Result<(), FloorError> {
        self.insert(frame)?;
        self.compute_bounds();
        Ok(())
    }

    fn insert(&mut self, frame: BoardFrame) -> Result<(), FloorError> {
        if self.board(frame.board_id()).is_some() {
            return Err(FloorError::DuplicateBoard(frame.board_id()));
        }
        self.boards.push(frame);
        Ok(())
    }

    /// The registered boards, in registration order.
    pub fn boards(&self) -> &[BoardFrame] {
        &self.boards
    }

    /// Looks up a board by id.
    pub fn board(&self, board_id: u16) -> Option<&BoardFrame> {
        self.boards.iter().find(|b| b.board_id() == board_id)
    }

    /// Mutable access to a board, for the worker that feeds it.
    pub fn board_mut(&mut self, board_id: u16) -> Option<&mut BoardFrame> {
        self.boards.iter_mut().find(|b| b.board_id() == board_id)
    }

    /// Hands a completed sweep to its board.
    pub fn apply(&mut self, update: &BoardUpdate) -> Result<(), FloorError> {
        let board = self
            .board_mut(update.board_id)
            .ok_or(FloorError::UnknownBoard(update.board_id))?;
        for (mode, samples) in update.modes.iter().enumerate() {
            board.update(mode as u8, samples)?;
        }
        Ok(())
    }

    /// Runs a calibration step on every board.
    pub fn calibrate(&mut self, step: CalibrationStep) {
        info!("calibration: {:?} on {} boards", step, self.boards.len());
        for board in &mut self.boards {
            match step {
                CalibrationStep::CaptureLower => board.capture_lower(),
                CalibrationStep::CaptureUpper => board.capture_upper(),
                CalibrationStep::RecomputeGain => board.recompute_gain(),
            }
        }
    }

    /// Recomputes the area covered by all boards and resizes the surface to
    /// match. Needed whenever the board set changes.
    pub fn compute_bounds(&mut self) -> Bounds {
        let bounds = self
            .boards
            .iter()
            .map(|b| {
                let (x, y) = b.layout_offset();
                let (w, h) = b.frame_size();
                Bounds {
                    min: (x, y),
                    max: (x + w as i32, y + h as i32),
                }
            })
            .reduce(|l, r| Bounds {
                min: (l.min.0.min(r.min.0), l.min.1.min(r.min.1)),
                max: (l.max.0.max(r.max.0), l.max.1.max(r.max.1)),
            })
            .unwrap_or_default();

        let (width, height) = bounds.size();
        debug!(
            "surface bounds {:?}..{:?} ({} x {})",
            bounds.min, bounds.max, width, height
        );
        self.bounds = bounds;
        self.surface = Grid::new(width, height);
        bounds
    }

    /// The bounds from the last [`SurfaceMapper::compute_bounds`].
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Rebuilds the surface from every board's calibrated grid. Where boards
    /// overlap, the later board in registration order wins.
    pub fn update(&mut self) -> &Grid {
        self.surface.clear();
        let origin = self.bounds.min;
        for board in &self.boards {
            let grid = board.calibrated_grid();
            let (ox, oy) = board.layout_offset();
            let skipped = place(&mut self.surface, (ox - origin.0, oy - origin.1), &grid);
            if skipped > 0 {
                debug!(
                    "board {}: {} pixels fell outside the surface",
                    board.board_id(),
                    skipped
                );
                self.skipped += skipped;
            }
        }
        &self.surface
    }

    /// The surface as of the last [`SurfaceMapper::update`].
    pub fn surface(&self) -> &Grid {
        &self.surface
    }

    /// Total pixels that could not be placed on the surface.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

/// Copies `src` into `dst` with its top-left corner at `at`, overwriting.
/// Pixels that land outside `dst` are skipped and counted.
fn place(dst: &mut Grid, at: (i32, i32), src: &Grid) -> u64 {
    let mut skipped = 0;
    for (x, y, value) in src.cells() {
        let gx = at.0 + x as i32;
        let gy = at.1 + y as i32;
        if gx < 0 || gy < 0 || !dst.set(gx as usize, gy as usize, value) {
            skipped += 1;
        }
    }
    skipped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board_model::BoardModel;
    use rand::Rng;

    fn reg(board_id: u16, model_version: u8, mode_count: u8, panel_layout: (i32, i32)) -> BoardRegistration {
        BoardRegistration {
            board_id,
            model_version,
            mode_count,
            panel_layout,
        }
    }

    /// Calibrates a board with a span of one count, so any non-zero `value`
    /// saturates.
    fn lit(mapper: &mut SurfaceMapper, board_id: u16, value: u16) {
        let board = mapper.board_mut(board_id).unwrap();
        let sensors = board.model().sensor_count();
        let modes = board.mode_count();
        for mode in 0..modes {
            board.update(mode, &vec![0; sensors]).unwrap();
        }
        board.capture_lower();
        for mode in 0..modes {
            board.update(mode, &vec![1; sensors]).unwrap();
        }
        board.capture_upper();
        board.recompute_gain();
        for mode in 0..modes {
            board.update(mode, &vec![value; sensors]).unwrap();
        }
    }

    #[test]
    fn empty_mapper() {
        let mut mapper = SurfaceMapper::new();
        assert_eq!(mapper.set_boards(&[]), 0);
        assert_eq!(mapper.bounds().size(), (0, 0));
        assert_eq!(mapper.update().data().len(), 0);
    }

    #[test]
    fn side_by_side_boards() {
        let mut mapper = SurfaceMapper::new();
        mapper.set_boards(&[reg(0, 2, 1, (0, 0)), reg(1, 2, 1, (6, 0))]);
        assert_eq!(mapper.bounds(), Bounds { min: (0, 0), max: (12, 6) });

        lit(&mut mapper, 1, 1000);
        let surface = mapper.update();
        assert_eq!((surface.width(), surface.height()), (12, 6));
        assert_eq!(surface.get(5, 5), Some(0));
        assert_eq!(surface.get(6, 0), Some(u16::MAX));
        assert_eq!(surface.get(11, 5), Some(u16::MAX));
        assert_eq!(mapper.skipped(), 0);
    }

    #[test]
    fn negative_offsets_move_the_origin() {
        let mut mapper = SurfaceMapper::new();
        // the rotated placement of (0, 18) is (-9, 8)
        mapper.set_boards(&[reg(0, 4, 5, (0, 0)), reg(1, 4, 5, (0, 18))]);
        let bounds = mapper.bounds();
        assert_eq!(bounds, Bounds { min: (-9, 0), max: (12, 18) });

        lit(&mut mapper, 1, 1000);
        let surface = mapper.update().clone();
        // board 1's sensor 0 is at (3, 0), doubled (6, 0), placed at (-9, 8)
        assert_eq!(surface.get((-9 + 6 + 9) as usize, 8), Some(u16::MAX));
        assert_eq!(surface.get(0, 0), Some(0));
    }

    #[test]
    fn overlap_overwrites() {
        let mut mapper = SurfaceMapper::new();
        mapper.set_boards(&[reg(0, 2, 1, (0, 0)), reg(1, 2, 1, (3, 0))]);
        lit(&mut mapper, 0, 1000);
        // board 1 is dark and later in the order
        let surface = mapper.update();
        assert_eq!(surface.get(2, 0), Some(u16::MAX));
        assert_eq!(surface.get(3, 0), Some(0));
        assert_eq!(surface.get(8, 0), Some(0));
    }

    #[test]
    fn rejected_registrations() {
        let mut mapper = SurfaceMapper::new();
        let accepted = mapper.set_boards(&[
            reg(0, 2, 1, (0, 0)),
            reg(0, 3, 1, (6, 0)),
            reg(1, 8, 1, (6, 0)),
        ]);
        assert_eq!(accepted, 1);
        assert_eq!(mapper.boards()[0].model(), BoardModel::V2);

        let dup = mapper.add_board(BoardFrame::new(0, BoardModel::V3, 1, (0, 0)));
        assert!(matches!(dup, Err(FloorError::DuplicateBoard(0))));
    }

    #[test]
    fn updates_reach_their_board() {
        let mut mapper = SurfaceMapper::new();
        mapper.set_boards(&[reg(4, 2, 2, (0, 0))]);
        let update = BoardUpdate {
            board_id: 4,
            modes: vec![vec![1; 36], vec![2; 36]],
        };
        mapper.apply(&update).unwrap();
        assert_eq!(mapper.board(4).unwrap().raw(1).unwrap()[0], 2);

        let stray = BoardUpdate {
            board_id: 5,
            ..update.clone()
        };
        assert!(matches!(mapper.apply(&stray), Err(FloorError::UnknownBoard(5))));

        let short = BoardUpdate {
            board_id: 4,
            modes: vec![vec![1; 3]],
        };
        assert!(mapper.apply(&short).is_err());
    }

    #[test]
    fn bounds_contain_every_board() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let n = rng.gen_range(1..6);
            let regs: Vec<_> = (0..n)
                .map(|i| {
                    reg(
                        i,
                        rng.gen_range(2..=4),
                        if rng.gen_bool(0.5) { 5 } else { 1 },
                        (rng.gen_range(-100..100), rng.gen_range(-100..100)),
                    )
                })
                .collect();

            let mut mapper = SurfaceMapper::new();
            mapper.set_boards(&regs);
            let bounds = mapper.bounds();
            for board in mapper.boards() {
                assert!(bounds.contains(board.layout_offset(), board.frame_size()));
            }
            for id in 0..n {
                lit(&mut mapper, id, 500);
            }
            mapper.update();
            assert_eq!(mapper.skipped(), 0);
        }
    }

    #[test]
    fn stray_writes_are_skipped() {
        let mut dst = Grid::new(4, 4);
        let src = Grid::from_data(2, 2, vec![1, 2, 3, 4]).unwrap();
        assert_eq!(place(&mut dst, (3, 3), &src), 3);
        assert_eq!(place(&mut dst, (-1, 0), &src), 2);
        assert_eq!(dst.get(3, 3), Some(1));
        assert_eq!(dst.get(0, 0), Some(2));
    }
}
