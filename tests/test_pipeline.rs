use approx::assert_relative_eq;
use nalgebra::Vector3;

use fuse3d::bounds::Aabb;
use fuse3d::camera::Calibration;
use fuse3d::fusion::{FusionGrid, MergedCloud};
use fuse3d::mesh::MeshBuilder;
use fuse3d::raster::{ColorRaster, DepthRaster};
use fuse3d::sensor::{Resolution, SensorConfig, SensorFrame, SensorId};
use fuse3d::transform::Pose;
use fuse3d::voxel::DownsampledCloud;
use fuse3d::wire::FramePacket;

fn one_point_cloud(color: [u8; 3]) -> DownsampledCloud {
    let mut cloud = DownsampledCloud::default();
    cloud.positions.push(Vector3::zeros());
    cloud.colors.push(color);
    cloud.deviations.push(1.0);
    cloud
}

#[test]
fn two_sensors_blend_into_one_cell() {
    // Two sensors with a no-op transform report one point each at the
    // origin, weight 1; the cube is large enough for a single shared cell.
    let bounds = Aabb::new(-0.25, 0.25, -0.25, 0.25, -0.25, 0.25);
    let first = one_point_cloud([10, 20, 30]);
    let second = one_point_cloud([30, 20, 10]);

    let mut grid = FusionGrid::new(&bounds, 0.5);
    let mut merged = MergedCloud::default();
    grid.merge([&first, &second], &mut merged);

    assert_eq!(merged.len(), 1);
    assert_eq!(merged.positions[0], Vector3::zeros());
    assert_eq!(merged.colors[0], [20, 20, 20]);
    assert!(merged.neighbours[0].iter().all(|slot| slot.is_none()));
}

#[test]
fn dense_block_triangulates_around_the_center() {
    // One sensor fills a 3x3x3 block of adjacent cells.
    let bounds = Aabb::new(0.0, 2.0, 0.0, 2.0, 0.0, 2.0);
    let mut input = DownsampledCloud::default();
    for x in 0..3 {
        for y in 0..3 {
            for z in 0..3 {
                input.positions.push(Vector3::new(
                    0.25 + 0.5 * x as f32,
                    0.25 + 0.5 * y as f32,
                    0.25 + 0.5 * z as f32,
                ));
                input.colors.push([10, 10, 10]);
                input.deviations.push(1.0);
            }
        }
    }

    let mut grid = FusionGrid::new(&bounds, 0.5);
    let mut merged = MergedCloud::default();
    grid.merge([&input], &mut merged);
    assert_eq!(merged.len(), 27);

    let center = merged
        .positions
        .iter()
        .position(|p| *p == Vector3::new(0.75, 0.75, 0.75))
        .unwrap() as u32;
    let center_neighbours: Vec<u32> = merged.neighbours[center as usize]
        .iter()
        .flatten()
        .copied()
        .collect();
    assert_eq!(center_neighbours.len(), 26);

    let mut mesh = MeshBuilder::new(64);
    let indices = mesh.build(&merged).to_vec();
    assert!(mesh.triangle_count() > 0);

    // At least one triangle fans out from the center cell to two of its
    // distinct neighbours.
    let found = indices.chunks_exact(3).any(|triangle| {
        triangle[0] == center
            && triangle[1] != triangle[2]
            && center_neighbours.contains(&triangle[1])
            && center_neighbours.contains(&triangle[2])
    });
    assert!(found);
}

fn wall_sensor(id: u32, shade: u8, bounds: Aabb, cube_size: f32) -> SensorFrame {
    let resolution = Resolution::new(4, 4);
    let mut frame = SensorFrame::new(
        SensorConfig {
            id: SensorId(id),
            pose: Pose::default(),
            resolution,
            calibration: Calibration::new(4.0, 4.0, 8.0, 8.0),
        },
        bounds,
        cube_size,
    )
    .unwrap();
    frame
        .update_color(
            ColorRaster::from_bgra(
                2 * resolution.width,
                2 * resolution.height,
                vec![shade; 2 * resolution.width * 2 * resolution.height * 4],
            )
            .unwrap(),
        )
        .unwrap();
    frame
        .update_depth(
            DepthRaster::from_millimeters(
                resolution.width,
                resolution.height,
                vec![1000; resolution.width * resolution.height],
            )
            .unwrap(),
        )
        .unwrap();
    frame
}

#[test]
fn rasters_to_wire_end_to_end() {
    // Two co-located sensors observe the same flat wall one meter out,
    // with different shades; every pixel lands in its own cell.
    let bounds = Aabb::new(0.5, 1.5, -1.0, 1.0, -1.0, 1.0);
    let cube_size = 0.25;
    let mut first = wall_sensor(0, 100, bounds, cube_size);
    let mut second = wall_sensor(1, 200, bounds, cube_size);

    let first_cloud = first.process().unwrap().clone();
    assert_eq!(first_cloud.len(), 16);
    let second_cloud = second.process().unwrap().clone();

    let mut grid = FusionGrid::new(&bounds, cube_size);
    let mut merged = MergedCloud::default();
    grid.merge([&first_cloud, &second_cloud], &mut merged);

    // The on-axis pixel carries a zero deviation value and vanishes in the
    // weighted merge; the other fifteen cells survive.
    assert_eq!(merged.len(), 15);
    for (position, color) in merged.positions.iter().zip(&merged.colors) {
        assert_relative_eq!(position.x, 1.0, epsilon = 1e-4);
        // Equal per-pixel weights blend the shades evenly.
        for channel in color {
            assert!((*channel as i32 - 150).abs() <= 1);
        }
    }
    for slots in &merged.neighbours {
        for slot in slots.iter().flatten() {
            assert!((*slot as usize) < merged.len());
        }
    }

    let mut mesh = MeshBuilder::new(64);
    mesh.build(&merged);
    assert!(mesh.triangle_count() > 0);

    let packet = FramePacket::from_merged(2, &merged);
    assert_eq!(packet.nb_points, 15);
    let decoded = FramePacket::from_json(&packet.to_json().unwrap()).unwrap();
    assert_eq!(decoded, packet);
}
