use itertools::iproduct;

use crate::fusion::{neighbour_slot, MergedCloud};

/// Upper bound of triangles one point can emit; sizes the index buffer.
const TRIANGLES_PER_POINT: usize = 325;

/// Derives a triangle list from a merged cloud's neighbour graph, to
/// approximate the sampled surface.
///
/// One triangle `(i, p, q)` is emitted per ordered pair of populated
/// neighbour slots of `i` whose directions are at most one 3x3x3 step
/// apart. Duplicate and degenerate triangles are kept: the consumer needs
/// an approximate visual surface, not a manifold mesh.
pub struct MeshBuilder {
    indices: Vec<u32>,
}

impl MeshBuilder {
    /// Pre-sizes the triangle buffer for `max_expected_points` merged
    /// points, so building does not reallocate below that bound.
    pub fn new(max_expected_points: usize) -> Self {
        Self {
            indices: Vec::with_capacity(3 * TRIANGLES_PER_POINT * max_expected_points),
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Build the triangle index list for `cloud`. The returned slice holds
    /// three indices per triangle and stays valid until the next build.
    pub fn build(&mut self, cloud: &MergedCloud) -> &[u32] {
        self.indices.clear();
        for (index, slots) in cloud.neighbours.iter().enumerate() {
            for (dx, dy, dz) in iproduct!(-1i64..=1, -1i64..=1, -1i64..=1) {
                if dx == 0 && dy == 0 && dz == 0 {
                    continue;
                }
                let first = match slots[neighbour_slot(dx, dy, dz)] {
                    Some(first) => first,
                    None => continue,
                };
                let window = |c: i64| (c - 1).max(-1)..=(c + 1).min(1);
                for (ex, ey, ez) in iproduct!(window(dx), window(dy), window(dz)) {
                    if ex == dx && ey == dy && ez == dz {
                        continue;
                    }
                    if let Some(second) = slots[neighbour_slot(ex, ey, ez)] {
                        self.indices.push(index as u32);
                        self.indices.push(first);
                        self.indices.push(second);
                    }
                }
            }
        }
        &self.indices
    }
}

#[cfg(test)]
mod tests {
    use super::MeshBuilder;
    use crate::bounds::Aabb;
    use crate::fusion::{FusionGrid, MergedCloud};
    use crate::voxel::DownsampledCloud;
    use nalgebra::Vector3;
    use rstest::*;

    fn merged_from(points: &[Vector3<f32>]) -> MergedCloud {
        let mut input = DownsampledCloud::default();
        for point in points {
            input.positions.push(*point);
            input.colors.push([10, 10, 10]);
            input.deviations.push(1.0);
        }
        let mut grid = FusionGrid::new(&Aabb::new(0.0, 2.0, 0.0, 2.0, 0.0, 2.0), 0.5);
        let mut merged = MergedCloud::default();
        grid.merge([&input], &mut merged);
        merged
    }

    #[fixture]
    fn block() -> MergedCloud {
        let mut points = Vec::new();
        for x in 0..3 {
            for y in 0..3 {
                for z in 0..3 {
                    points.push(Vector3::new(
                        0.25 + 0.5 * x as f32,
                        0.25 + 0.5 * y as f32,
                        0.25 + 0.5 * z as f32,
                    ));
                }
            }
        }
        merged_from(&points)
    }

    #[test]
    fn lone_point_emits_nothing() {
        let merged = merged_from(&[Vector3::new(0.25, 0.25, 0.25)]);
        let mut mesh = MeshBuilder::new(8);
        assert!(mesh.build(&merged).is_empty());
        assert_eq!(mesh.triangle_count(), 0);
    }

    #[test]
    fn isolated_pair_emits_nothing() {
        // Two adjacent cells: each sees the other in a single slot, so no
        // distinct second neighbour exists and no triangle is emitted.
        let merged = merged_from(&[
            Vector3::new(0.25, 0.25, 0.25),
            Vector3::new(0.75, 0.25, 0.25),
        ]);
        let mut mesh = MeshBuilder::new(8);
        assert!(mesh.build(&merged).is_empty());
    }

    #[test]
    fn row_of_three_triangulates_around_the_middle() {
        let merged = merged_from(&[
            Vector3::new(0.25, 0.25, 0.25),
            Vector3::new(0.75, 0.25, 0.25),
            Vector3::new(0.75, 0.75, 0.25),
        ]);
        let mut mesh = MeshBuilder::new(8);
        let indices = mesh.build(&merged);
        assert!(!indices.is_empty());
        assert_eq!(indices.len() % 3, 0);
        for triangle in indices.chunks_exact(3) {
            assert!(triangle.iter().all(|i| (*i as usize) < merged.len()));
        }
    }

    #[rstest]
    fn dense_block_covers_the_center(block: MergedCloud) {
        let center = block
            .positions
            .iter()
            .position(|p| *p == Vector3::new(0.75, 0.75, 0.75))
            .unwrap() as u32;

        let mut mesh = MeshBuilder::new(32);
        let indices = mesh.build(&block).to_vec();
        assert!(mesh.triangle_count() > 0);

        let mut center_triangle = None;
        for triangle in indices.chunks_exact(3) {
            if triangle[0] == center && triangle[1] != triangle[2] {
                center_triangle = Some((triangle[1], triangle[2]));
                break;
            }
        }
        // At least one triangle fans out from the center cell to two
        // distinct neighbours.
        assert!(center_triangle.is_some());
    }

    #[rstest]
    fn rebuild_reuses_the_buffer(block: MergedCloud) {
        let mut mesh = MeshBuilder::new(32);
        let first = mesh.build(&block).len();
        let second = mesh.build(&block).len();
        assert_eq!(first, second);
    }
}
