use nalgebra::Vector3;

use crate::bounds::Aabb;

/// Padding cells added per axis beyond the logical bin count. The flat
/// index uses the unpadded strides, so the padding absorbs the boundary
/// rounding of the floor binning without ever indexing out of the
/// allocated cells.
const GRID_PADDING: usize = 10;

/// Shape of a uniform aggregation grid over an axis-aligned box.
#[derive(Clone, Debug)]
pub struct GridShape {
    min: Vector3<f32>,
    cube_size: f32,
    nx: usize,
    ny: usize,
    nz: usize,
    capacity: usize,
}

impl GridShape {
    /// Grid over `bounds` with cubic cells of `cube_size` meters. `extra`
    /// widens the logical bin count per axis; the merge grid spans one
    /// more bin than the per-sensor grids.
    pub fn new(bounds: &Aabb, cube_size: f32, extra: usize) -> Self {
        let extent = bounds.extent();
        let nx = (extent.x / cube_size).ceil() as usize + extra;
        let ny = (extent.y / cube_size).ceil() as usize + extra;
        let nz = (extent.z / cube_size).ceil() as usize + extra;
        let capacity = (nx + GRID_PADDING) * (ny + GRID_PADDING) * (nz + GRID_PADDING);
        Self {
            min: bounds.min(),
            cube_size,
            nx,
            ny,
            nz,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        (self.nx, self.ny, self.nz)
    }

    /// Flat cell index of a point inside the bounds: `x + nx*y + nx*ny*z`.
    /// A coordinate landing exactly on the upper bin count is clamped to
    /// the last bin.
    pub fn cell_index(&self, point: &Vector3<f32>) -> usize {
        let mut x = ((point.x - self.min.x) / self.cube_size).floor() as usize;
        let mut y = ((point.y - self.min.y) / self.cube_size).floor() as usize;
        let mut z = ((point.z - self.min.z) / self.cube_size).floor() as usize;
        if x == self.nx {
            x -= 1;
        }
        if y == self.ny {
            y -= 1;
        }
        if z == self.nz {
            z -= 1;
        }
        x + self.nx * y + self.nx * self.ny * z
    }

    /// Flat index of the cell one `(dx, dy, dz)` step away from `index`,
    /// or `None` when the step leaves the allocated cells.
    pub fn offset_index(&self, index: usize, dx: i64, dy: i64, dz: i64) -> Option<usize> {
        let offset = dx + self.nx as i64 * dy + (self.nx * self.ny) as i64 * dz;
        let neighbour = index as i64 + offset;
        if neighbour >= 0 && (neighbour as usize) < self.capacity {
            Some(neighbour as usize)
        } else {
            None
        }
    }
}

/// Compacted output of one sensor's downsampling pass: one entry per
/// populated cell. `deviations` is parallel to `positions` and carries the
/// cell's mean noise value (larger = noisier measurement).
#[derive(Clone, Debug, Default)]
pub struct DownsampledCloud {
    pub positions: Vec<Vector3<f32>>,
    pub colors: Vec<[u8; 3]>,
    pub deviations: Vec<f32>,
}

impl DownsampledCloud {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn clear(&mut self) {
        self.positions.clear();
        self.colors.clear();
        self.deviations.clear();
    }
}

/// Accumulation cells of the per-sensor downsampling grid.
///
/// Storage is allocated once; draining resets exactly the cells that were
/// written, keeping the per-frame allocation cost bounded.
pub struct VoxelGrid {
    shape: GridShape,
    positions: Vec<Vector3<f32>>,
    colors: Vec<[u32; 3]>,
    deviations: Vec<f32>,
    counts: Vec<u32>,
}

impl VoxelGrid {
    pub fn new(shape: GridShape) -> Self {
        let capacity = shape.capacity();
        Self {
            shape,
            positions: vec![Vector3::zeros(); capacity],
            colors: vec![[0; 3]; capacity],
            deviations: vec![0.0; capacity],
            counts: vec![0; capacity],
        }
    }

    pub fn shape(&self) -> &GridShape {
        &self.shape
    }

    pub fn insert(&mut self, position: &Vector3<f32>, color: [u8; 3], deviation: f32) {
        let index = self.shape.cell_index(position);
        self.positions[index] += position;
        for (sum, channel) in self.colors[index].iter_mut().zip(color) {
            *sum += u32::from(channel);
        }
        self.deviations[index] += deviation;
        self.counts[index] += 1;
    }

    /// Compact every populated cell into `out` in ascending index order:
    /// mean position, integer-truncated mean color and mean deviation per
    /// cell. Touched cells are reset to zero on the way out.
    pub fn drain_into(&mut self, out: &mut DownsampledCloud) {
        out.clear();
        for index in 0..self.shape.capacity() {
            let count = self.counts[index];
            if count == 0 {
                continue;
            }
            out.positions.push(self.positions[index] / count as f32);
            out.colors.push([
                (self.colors[index][0] / count) as u8,
                (self.colors[index][1] / count) as u8,
                (self.colors[index][2] / count) as u8,
            ]);
            out.deviations.push(self.deviations[index] / count as f32);

            self.positions[index] = Vector3::zeros();
            self.colors[index] = [0; 3];
            self.deviations[index] = 0.0;
            self.counts[index] = 0;
        }
    }
}
