use crate::types::FaceRegion;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;

/// Memory layout of the backbone input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    /// `[1, H, W, 3]`, as exported by Keras.
    Nhwc,
    /// `[1, 3, H, W]`
    Nchw,
}

impl std::str::FromStr for TensorLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nhwc" => Ok(TensorLayout::Nhwc),
            "nchw" => Ok(TensorLayout::Nchw),
            other => Err(format!("unknown tensor layout '{other}' (expected nhwc or nchw)")),
        }
    }
}

/// Fixed-size RGB face crop with channel values in [0, 1].
#[derive(Debug, Clone)]
pub struct FaceCrop {
    size: u32,
    /// Row-major RGB triples, `size * size * 3` values.
    pixels: Vec<f32>,
}

impl FaceCrop {
    /// Cut `region` out of `image` and resize it to `size` × `size`.
    pub fn extract(image: &RgbImage, region: &FaceRegion, size: u32) -> Self {
        let face = imageops::crop_imm(image, region.x, region.y, region.width, region.height).to_image();
        let resized = imageops::resize(&face, size, size, FilterType::Triangle);
        let pixels = resized
            .pixels()
            .flat_map(|p| p.0)
            .map(|v| v as f32 / 255.0)
            .collect();
        Self { size, pixels }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// RGB value at (x, y).
    pub fn pixel(&self, x: u32, y: u32) -> [f32; 3] {
        let i = ((y * self.size + x) * 3) as usize;
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2]]
    }

    /// Batch-of-one input tensor in the requested layout.
    pub fn to_tensor(&self, layout: TensorLayout) -> Array4<f32> {
        let s = self.size as usize;
        match layout {
            TensorLayout::Nhwc => {
                let mut tensor = Array4::<f32>::zeros((1, s, s, 3));
                for (i, v) in self.pixels.iter().enumerate() {
                    tensor[[0, i / 3 / s, (i / 3) % s, i % 3]] = *v;
                }
                tensor
            }
            TensorLayout::Nchw => {
                let mut tensor = Array4::<f32>::zeros((1, 3, s, s));
                for (i, v) in self.pixels.iter().enumerate() {
                    tensor[[0, i % 3, i / 3 / s, (i / 3) % s]] = *v;
                }
                tensor
            }
        }
    }
}
