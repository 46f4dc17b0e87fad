//! Finds touched regions on the composited surface.
//!
//! The tracker only needs one point per touch, so an extractor boils the
//! surface down to a list of centroids. [`ThresholdBlobs`] is a plain
//! threshold and flood-fill pass; anything smarter can be plugged in through
//! [`BlobExtractor`].

use crate::grid::Grid;
use crate::Point;
use log::trace;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// `BlobExtractor`
///
/// Turns a surface into the centroids of the touches on it.
pub trait BlobExtractor {
    /// One centroid per detected touch.
    fn extract(&mut self, surface: &Grid) -> Vec<Point>;
}

/// Groups 4-connected pixels at or above `threshold` into blobs and reports
/// each blob's intensity-weighted centroid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ThresholdBlobs {
    /// Smallest calibrated value that counts as touched.
    pub threshold: u16,
    /// Blobs with fewer pixels than this are ignored as noise.
    pub min_pixels: usize,
}

impl Default for ThresholdBlobs {
    fn default() -> Self {
        Self {
            threshold: u16::MAX / 4,
            min_pixels: 1,
        }
    }
}

impl BlobExtractor for ThresholdBlobs {
    fn extract(&mut self, surface: &Grid) -> Vec<Point> {
        let (width, height) = (surface.width(), surface.height());
        let data = surface.data();
        let mut seen = vec![false; data.len()];
        let mut queue = VecDeque::new();
        let mut centroids = Vec::new();

        for start in 0..data.len() {
            if seen[start] || data[start] < self.threshold {
                continue;
            }

            seen[start] = true;
            queue.push_back(start);
            let (mut pixels, mut mass, mut sum_x, mut sum_y) = (0usize, 0f64, 0f64, 0f64);

            while let Some(i) = queue.pop_front() {
                let (x, y) = (i % width, i / width);
                let w = data[i] as f64;
                pixels += 1;
                mass += w;
                sum_x += w * x as f64;
                sum_y += w * y as f64;

                let neighbours = [
                    (x > 0).then(|| i - 1),
                    (x + 1 < width).then(|| i + 1),
                    (y > 0).then(|| i - width),
                    (y + 1 < height).then(|| i + width),
                ];
                for n in neighbours.into_iter().flatten() {
                    if !seen[n] && data[n] >= self.threshold {
                        seen[n] = true;
                        queue.push_back(n);
                    }
                }
            }

            // a zero threshold can admit blobs with no mass at all
            if pixels < self.min_pixels || mass == 0.0 {
                trace!("ignoring blob of {} pixels", pixels);
                continue;
            }

            centroids.push(Point {
                x: (sum_x / mass) as f32,
                y: (sum_y / mass) as f32,
            });
        }

        centroids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs(threshold: u16, min_pixels: usize) -> ThresholdBlobs {
        ThresholdBlobs {
            threshold,
            min_pixels,
        }
    }

    #[test]
    fn empty_surface() {
        assert!(blobs(1, 1).extract(&Grid::default()).is_empty());
        assert!(blobs(1, 1).extract(&Grid::new(8, 8)).is_empty());
    }

    #[test]
    fn weighted_centroid() {
        let mut grid = Grid::new(6, 4);
        grid.set(1, 1, 100);
        grid.set(2, 1, 300);
        let points = blobs(50, 1).extract(&grid);
        assert_eq!(points, vec![Point { x: 1.75, y: 1.0 }]);
    }

    #[test]
    fn diagonal_pixels_are_separate() {
        let mut grid = Grid::new(4, 4);
        grid.set(0, 0, 10);
        grid.set(1, 1, 10);
        grid.set(3, 3, 10);
        grid.set(3, 2, 10);
        let points = blobs(5, 1).extract(&grid);
        assert_eq!(
            points,
            vec![
                Point { x: 0.0, y: 0.0 },
                Point { x: 1.0, y: 1.0 },
                Point { x: 3.0, y: 2.5 },
            ]
        );
    }

    #[test]
    fn small_and_faint_blobs_are_ignored() {
        let mut grid = Grid::new(5, 5);
        grid.set(0, 0, 1000);
        grid.set(4, 4, 1000);
        grid.set(4, 3, 1000);
        grid.set(2, 2, 10);
        let points = blobs(100, 2).extract(&grid);
        assert_eq!(points, vec![Point { x: 4.0, y: 3.5 }]);
    }

    #[test]
    fn blob_wraps_around_a_hole() {
        let mut grid = Grid::new(3, 3);
        for (x, y, _) in Grid::new(3, 3).cells() {
            if (x, y) != (1, 1) {
                grid.set(x, y, 50);
            }
        }
        let points = blobs(50, 1).extract(&grid);
        assert_eq!(points, vec![Point { x: 1.0, y: 1.0 }]);
    }
}
