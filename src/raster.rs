use ndarray::{Array2, Array3};

use crate::error::FusionError;

/// Latest color frame of one sensor.
///
/// The color stream runs at twice the depth resolution with four bytes per
/// pixel in B, G, R, A order, as delivered by the driver.
#[derive(Clone, Debug)]
pub struct ColorRaster {
    pub pixels: Array3<u8>,
}

impl ColorRaster {
    /// Wrap a raw BGRA buffer of `width` x `height` pixels.
    pub fn from_bgra(width: usize, height: usize, bytes: Vec<u8>) -> Result<Self, FusionError> {
        let pixels = Array3::from_shape_vec((height, width, 4), bytes)
            .map_err(|err| FusionError::invalid_parameter(format!("color buffer: {}", err)))?;
        Ok(Self { pixels })
    }

    pub fn width(&self) -> usize {
        self.pixels.shape()[1]
    }

    pub fn height(&self) -> usize {
        self.pixels.shape()[0]
    }

    /// RGB color of the depth pixel at (`col`, `row`). The color raster is
    /// sampled at twice the depth coordinates, with the channels reordered
    /// from the stored B, G, R.
    pub fn rgb_at(&self, col: usize, row: usize) -> [u8; 3] {
        let (row, col) = (2 * row, 2 * col);
        [
            self.pixels[[row, col, 2]],
            self.pixels[[row, col, 1]],
            self.pixels[[row, col, 0]],
        ]
    }
}

impl From<Array3<u8>> for ColorRaster {
    fn from(pixels: Array3<u8>) -> Self {
        Self { pixels }
    }
}

/// Latest depth frame of one sensor, millimeters per pixel. A zero depth
/// is a pixel with no return.
#[derive(Clone, Debug)]
pub struct DepthRaster {
    pub depth: Array2<u16>,
}

impl DepthRaster {
    /// Wrap a raw millimeter buffer of `width` x `height` pixels.
    pub fn from_millimeters(
        width: usize,
        height: usize,
        values: Vec<u16>,
    ) -> Result<Self, FusionError> {
        let depth = Array2::from_shape_vec((height, width), values)
            .map_err(|err| FusionError::invalid_parameter(format!("depth buffer: {}", err)))?;
        Ok(Self { depth })
    }

    pub fn width(&self) -> usize {
        self.depth.shape()[1]
    }

    pub fn height(&self) -> usize {
        self.depth.shape()[0]
    }

    pub fn meters_at(&self, col: usize, row: usize) -> f32 {
        f32::from(self.depth[[row, col]]) / 1000.0
    }
}

impl From<Array2<u16>> for DepthRaster {
    fn from(depth: Array2<u16>) -> Self {
        Self { depth }
    }
}

#[cfg(test)]
mod tests {
    use super::{ColorRaster, DepthRaster};

    #[test]
    fn color_sampling_doubles_and_reorders() {
        let mut bytes = vec![0u8; 4 * 4 * 4];
        // Depth pixel (1, 1) samples color pixel (2, 2): B=5, G=6, R=7.
        let offset = 4 * (2 + 2 * 4);
        bytes[offset] = 5;
        bytes[offset + 1] = 6;
        bytes[offset + 2] = 7;
        let raster = ColorRaster::from_bgra(4, 4, bytes).unwrap();
        assert_eq!(raster.rgb_at(1, 1), [7, 6, 5]);
    }

    #[test]
    fn depth_converts_to_meters() {
        let raster = DepthRaster::from_millimeters(2, 1, vec![0, 1500]).unwrap();
        assert_eq!(raster.meters_at(0, 0), 0.0);
        assert_eq!(raster.meters_at(1, 0), 1.5);
    }

    #[test]
    fn wrong_buffer_length_is_rejected() {
        assert!(ColorRaster::from_bgra(4, 4, vec![0u8; 3]).is_err());
        assert!(DepthRaster::from_millimeters(4, 4, vec![0u16; 15]).is_err());
    }
}
