use serde_derive::{Deserialize, Serialize};

use crate::error::FusionError;
use crate::fusion::{MergedCloud, NEIGHBOUR_SLOTS};
use crate::voxel::DownsampledCloud;

/// One point of a wire frame.
///
/// The neighbour array is present only on merged frames. A zero entry
/// means "no neighbour in that direction"; on the wire an empty slot and
/// a reference to compacted index 0 are indistinguishable, a quirk of the
/// schema the remote viewer expects. Slot 13 (the center) is always zero.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WirePoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub r: u8,
    pub g: u8,
    pub b: u8,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub neighbours: Option<[u32; NEIGHBOUR_SLOTS]>,
}

/// Frame record streamed to the remote viewer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FramePacket {
    #[serde(rename = "Id")]
    pub id: i32,
    #[serde(rename = "NbPoints")]
    pub nb_points: i32,
    #[serde(rename = "PointCloud")]
    pub points: Vec<WirePoint>,
}

impl FramePacket {
    /// Encode a merged cloud with its neighbour arrays.
    pub fn from_merged(id: i32, cloud: &MergedCloud) -> Self {
        let points = cloud
            .positions
            .iter()
            .zip(&cloud.colors)
            .zip(&cloud.neighbours)
            .map(|((position, color), slots)| {
                let mut neighbours = [0u32; NEIGHBOUR_SLOTS];
                for (wire, slot) in neighbours.iter_mut().zip(slots.iter()) {
                    *wire = slot.unwrap_or(0);
                }
                WirePoint {
                    x: position.x,
                    y: position.y,
                    z: position.z,
                    r: color[0],
                    g: color[1],
                    b: color[2],
                    neighbours: Some(neighbours),
                }
            })
            .collect::<Vec<_>>();
        Self {
            id,
            nb_points: points.len() as i32,
            points,
        }
    }

    /// Encode one sensor's downsampled cloud; unfused frames carry no
    /// adjacency.
    pub fn from_downsampled(id: i32, cloud: &DownsampledCloud) -> Self {
        let points = cloud
            .positions
            .iter()
            .zip(&cloud.colors)
            .map(|(position, color)| WirePoint {
                x: position.x,
                y: position.y,
                z: position.z,
                r: color[0],
                g: color[1],
                b: color[2],
                neighbours: None,
            })
            .collect::<Vec<_>>();
        Self {
            id,
            nb_points: points.len() as i32,
            points,
        }
    }

    pub fn to_json(&self) -> Result<String, FusionError> {
        serde_json::to_string(self).map_err(FusionError::from)
    }

    pub fn from_json(data: &str) -> Result<Self, FusionError> {
        serde_json::from_str(data).map_err(FusionError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::FramePacket;
    use crate::bounds::Aabb;
    use crate::fusion::{FusionGrid, MergedCloud, CENTER_SLOT};
    use crate::voxel::DownsampledCloud;
    use nalgebra::Vector3;
    use rstest::*;

    #[fixture]
    fn merged() -> MergedCloud {
        let mut input = DownsampledCloud::default();
        for x in [0.25, 0.75] {
            input.positions.push(Vector3::new(x, 0.25, 0.25));
            input.colors.push([10, 20, 30]);
            input.deviations.push(1.0);
        }
        let mut grid = FusionGrid::new(&Aabb::new(0.0, 2.0, 0.0, 2.0, 0.0, 2.0), 0.5);
        let mut merged = MergedCloud::default();
        grid.merge([&input], &mut merged);
        merged
    }

    #[rstest]
    fn merged_frames_carry_neighbours(merged: MergedCloud) {
        let packet = FramePacket::from_merged(2, &merged);
        assert_eq!(packet.id, 2);
        assert_eq!(packet.nb_points, 2);
        let neighbours = packet.points[0].neighbours.unwrap();
        assert_eq!(neighbours[CENTER_SLOT], 0);
        // Point 0's +X slot references point 1.
        assert_eq!(neighbours[22], 1);
    }

    #[rstest]
    fn json_uses_the_legacy_field_names(merged: MergedCloud) {
        let json = FramePacket::from_merged(1, &merged).to_json().unwrap();
        assert!(json.contains("\"Id\":1"));
        assert!(json.contains("\"NbPoints\":2"));
        assert!(json.contains("\"PointCloud\":["));
        assert!(json.contains("\"neighbours\":["));
    }

    #[test]
    fn unfused_frames_omit_neighbours() {
        let mut cloud = DownsampledCloud::default();
        cloud.positions.push(Vector3::new(1.0, 2.0, 3.0));
        cloud.colors.push([1, 2, 3]);
        cloud.deviations.push(0.5);

        let packet = FramePacket::from_downsampled(0, &cloud);
        let json = packet.to_json().unwrap();
        assert!(!json.contains("neighbours"));
        assert_eq!(packet.points[0].r, 1);
    }

    #[rstest]
    fn json_round_trips(merged: MergedCloud) {
        let packet = FramePacket::from_merged(3, &merged);
        let decoded = FramePacket::from_json(&packet.to_json().unwrap()).unwrap();
        assert_eq!(decoded, packet);
    }
}
