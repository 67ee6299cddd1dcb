use itertools::iproduct;
use nalgebra::Vector3;

use crate::bounds::Aabb;
use crate::voxel::{DownsampledCloud, GridShape};

/// Slot count of the neighbour layout `9(dx+1) + 3(dy+1) + (dz+1)`.
pub const NEIGHBOUR_SLOTS: usize = 27;

/// Slot of the cell itself; always empty.
pub const CENTER_SLOT: usize = 13;

/// Neighbour slot of a `(dx, dy, dz)` offset, each component in `-1..=1`.
pub fn neighbour_slot(dx: i64, dy: i64, dz: i64) -> usize {
    (9 * (dx + 1) + 3 * (dy + 1) + (dz + 1)) as usize
}

/// Consensus cloud merged from every sensor, with the 26-neighbour
/// adjacency of its cells.
///
/// A `None` slot means no neighbour in that direction; compacted index 0
/// stays a valid neighbour reference.
#[derive(Clone, Debug, Default)]
pub struct MergedCloud {
    pub positions: Vec<Vector3<f32>>,
    pub colors: Vec<[u8; 3]>,
    pub neighbours: Vec<[Option<u32>; NEIGHBOUR_SLOTS]>,
}

impl MergedCloud {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn clear(&mut self) {
        self.positions.clear();
        self.colors.clear();
        self.neighbours.clear();
    }
}

/// Merge grid folding every sensor's downsampled output into one
/// confidence-weighted cloud.
///
/// Each point's deviation value multiplies its position and color before
/// summing, and the cell output divides by the summed deviations. This is
/// the legacy merge arithmetic, kept verbatim: points with a larger
/// deviation value pull their cell harder.
pub struct FusionGrid {
    shape: GridShape,
    positions: Vec<Vector3<f32>>,
    colors: Vec<Vector3<f32>>,
    weights: Vec<f32>,
    compacted: Vec<u32>,
    touched: Vec<usize>,
}

impl FusionGrid {
    /// The merge grid spans one more logical bin per axis than the
    /// per-sensor grids.
    pub fn new(bounds: &Aabb, cube_size: f32) -> Self {
        let shape = GridShape::new(bounds, cube_size, 1);
        let capacity = shape.capacity();
        Self {
            shape,
            positions: vec![Vector3::zeros(); capacity],
            colors: vec![Vector3::zeros(); capacity],
            weights: vec![0.0; capacity],
            compacted: vec![0; capacity],
            touched: Vec::new(),
        }
    }

    pub fn shape(&self) -> &GridShape {
        &self.shape
    }

    /// Fold one sensor's downsampled output into the grid.
    pub fn accumulate(&mut self, cloud: &DownsampledCloud) {
        for ((position, color), weight) in cloud
            .positions
            .iter()
            .zip(&cloud.colors)
            .zip(&cloud.deviations)
        {
            let index = self.shape.cell_index(position);
            self.positions[index] += position * *weight;
            self.colors[index] +=
                Vector3::new(f32::from(color[0]), f32::from(color[1]), f32::from(color[2]))
                    * *weight;
            self.weights[index] += weight;
        }
    }

    /// Compact the populated cells into `out` in ascending flat index
    /// order and resolve the 26-neighbour adjacency, then reset every
    /// touched cell.
    ///
    /// Neighbour slots are recorded as raw grid indices first and remapped
    /// once the compaction table is complete: a neighbour may compact to an
    /// index not yet assigned while its referrer is visited. Output order,
    /// and therefore neighbour indices, are deterministic for identical
    /// inputs.
    pub fn finish(&mut self, out: &mut MergedCloud) {
        out.clear();
        self.touched.clear();

        for index in 0..self.shape.capacity() {
            let weight = self.weights[index];
            if weight <= 0.0 {
                continue;
            }
            let output_index = out.positions.len() as u32;
            out.positions.push(self.positions[index] / weight);
            let color = self.colors[index] / weight;
            out.colors.push([color.x as u8, color.y as u8, color.z as u8]);

            let mut slots = [None; NEIGHBOUR_SLOTS];
            for (dx, dy, dz) in iproduct!(-1i64..=1, -1i64..=1, -1i64..=1) {
                if dx == 0 && dy == 0 && dz == 0 {
                    continue;
                }
                if let Some(neighbour) = self.shape.offset_index(index, dx, dy, dz) {
                    if self.weights[neighbour] > 0.0 {
                        slots[neighbour_slot(dx, dy, dz)] = Some(neighbour as u32);
                    }
                }
            }
            out.neighbours.push(slots);

            self.compacted[index] = output_index;
            self.touched.push(index);
        }

        // Remap raw grid indices to compacted output indices; every
        // recorded neighbour is populated, so its table entry is final by
        // now.
        for slots in out.neighbours.iter_mut() {
            for slot in slots.iter_mut() {
                if let Some(raw) = *slot {
                    *slot = Some(self.compacted[raw as usize]);
                }
            }
        }

        for &index in &self.touched {
            self.positions[index] = Vector3::zeros();
            self.colors[index] = Vector3::zeros();
            self.weights[index] = 0.0;
        }
    }

    /// Merge a batch of sensor outputs in one call.
    pub fn merge<'a, I>(&mut self, clouds: I, out: &mut MergedCloud)
    where
        I: IntoIterator<Item = &'a DownsampledCloud>,
    {
        for cloud in clouds {
            self.accumulate(cloud);
        }
        self.finish(out);
    }
}
