use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection, DetectionBatch};

/// Cells per axis for the luma grid.
const GRID: u32 = 16;
/// Mean-luma delta (0-255) above which a cell counts as changed.
const CELL_DELTA: u8 = 12;

/// CPU backend: coarse motion localization via luma grid differencing.
///
/// Each frame is reduced to a `GRID`x`GRID` grid of mean luma values; cells
/// whose value moved by more than `CELL_DELTA` against the previous frame are
/// collected into one bounding box labeled "motion". No classification, so
/// this backend never produces a person detection on its own.
#[derive(Default)]
pub struct CpuBackend {
    last_grid: Option<Vec<u8>>,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn luma_grid(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }

        let mut sums = vec![0u64; (GRID * GRID) as usize];
        let mut counts = vec![0u64; (GRID * GRID) as usize];

        for y in 0..height {
            let cell_y = y * GRID / height;
            for x in 0..width {
                let cell_x = x * GRID / width;
                let idx = ((y * width + x) * 3) as usize;
                // Integer BT.601 luma approximation.
                let luma = (2 * pixels[idx] as u32 + 5 * pixels[idx + 1] as u32
                    + pixels[idx + 2] as u32)
                    / 8;
                let cell = (cell_y * GRID + cell_x) as usize;
                sums[cell] += luma as u64;
                counts[cell] += 1;
            }
        }

        Ok(sums
            .iter()
            .zip(&counts)
            .map(|(sum, count)| if *count == 0 { 0 } else { (sum / count) as u8 })
            .collect())
    }
}

impl DetectorBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<DetectionBatch> {
        let grid = Self::luma_grid(pixels, width, height)?;
        let previous = self.last_grid.replace(grid.clone());

        let Some(previous) = previous else {
            return Ok(DetectionBatch::default());
        };

        let mut min_x = GRID;
        let mut min_y = GRID;
        let mut max_x = 0u32;
        let mut max_y = 0u32;
        let mut changed = 0u32;

        for cell_y in 0..GRID {
            for cell_x in 0..GRID {
                let cell = (cell_y * GRID + cell_x) as usize;
                if grid[cell].abs_diff(previous[cell]) > CELL_DELTA {
                    changed += 1;
                    min_x = min_x.min(cell_x);
                    min_y = min_y.min(cell_y);
                    max_x = max_x.max(cell_x);
                    max_y = max_y.max(cell_y);
                }
            }
        }

        if changed == 0 {
            return Ok(DetectionBatch::default());
        }

        let cell_w = width as f32 / GRID as f32;
        let cell_h = height as f32 / GRID as f32;
        let bbox = BoundingBox::new(
            min_x as f32 * cell_w,
            min_y as f32 * cell_h,
            (max_x - min_x + 1) as f32 * cell_w,
            (max_y - min_y + 1) as f32 * cell_h,
        );
        let confidence = (0.5 + changed as f32 / (GRID * GRID) as f32).min(0.99);

        Ok(DetectionBatch::new(vec![Detection::new(
            "motion", confidence, bbox,
        )]))
    }
}
