//! A plain row-major grid of 16 bit intensities.

/// Row-major `u16` intensity grid, indexed `(x, y)` with `x` the column.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Grid {
    width: usize,
    height: usize,
    data: Vec<u16>,
}

impl Grid {
    /// An all-zero grid.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    /// Wraps existing row-major data. Returns `None` if the length does not
    /// match the dimensions.
    pub fn from_data(width: usize, height: usize, data: Vec<u16>) -> Option<Self> {
        (data.len() == width * height).then_some(Self {
            width,
            height,
            data,
        })
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.height
    }

    /// The raw row-major values.
    pub fn data(&self) -> &[u16] {
        &self.data
    }

    /// Mutable access to the raw row-major values.
    pub fn data_mut(&mut self) -> &mut [u16] {
        &mut self.data
    }

    /// The value at `(x, y)`, or `None` outside the grid.
    pub fn get(&self, x: usize, y: usize) -> Option<u16> {
        (x < self.width && y < self.height).then(|| self.data[y * self.width + x])
    }

    /// Writes `value` at `(x, y)`. Returns `false` and leaves the grid alone
    /// if the coordinate is outside.
    pub fn set(&mut self, x: usize, y: usize, value: u16) -> bool {
        if x < self.width && y < self.height {
            self.data[y * self.width + x] = value;
            true
        } else {
            false
        }
    }

    /// Sets every value back to zero, keeping the dimensions.
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Iterates `(x, y, value)` over every cell.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, u16)> + '_ {
        self.data
            .iter()
            .enumerate()
            .map(move |(i, &v)| (i % self.width, i / self.width, v))
    }

    /// The largest value in the grid, 0 if empty.
    pub fn max(&self) -> u16 {
        self.data.iter().copied().max().unwrap_or(0)
    }
}
