// file: preprocess.rs
// desc: turn an uploaded image into the batched tensor the classifier expects

use burn::tensor::{Tensor, TensorData, backend::Backend};
use image::{DynamicImage, imageops::FilterType};
use serde::{Deserialize, Serialize};

use crate::error::ClassifierError;

pub const DEFAULT_INPUT_SIZE: u32 = 224;
/// Largest side length a manifest may ask for.
pub const MAX_INPUT_SIZE: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// Pixel / 255, values in [0, 1].
    #[default]
    UnitRange,
    /// Pixel / 127.5 - 1, values in [-1, 1]. MobileNet-style models use this.
    Symmetric,
}

impl Normalization {
    pub fn apply(self, value: u8) -> f32 {
        let value = value as f32;
        match self {
            Normalization::UnitRange => value / 255.0,
            Normalization::Symmetric => value / 127.5 - 1.0,
        }
    }
}

/// Input shape and scaling a model was trained with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSpec {
    #[serde(default = "default_input_size")]
    pub size: u32,
    #[serde(default)]
    pub normalization: Normalization,
}

fn default_input_size() -> u32 {
    DEFAULT_INPUT_SIZE
}

impl Default for InputSpec {
    fn default() -> Self {
        Self {
            size: DEFAULT_INPUT_SIZE,
            normalization: Normalization::default(),
        }
    }
}

/// Decodes an uploaded file, guessing the format from its content.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, ClassifierError> {
    if bytes.is_empty() {
        return Err(ClassifierError::Prediction("empty image file".to_string()));
    }
    Ok(image::load_from_memory(bytes)?)
}

impl InputSpec {
    /// Resized, normalized RGB values in channel-major (C, H, W) order.
    /// Alpha is dropped.
    pub fn pixels(&self, image: &DynamicImage) -> Vec<f32> {
        let rgb = image
            .resize_exact(self.size, self.size, FilterType::Nearest)
            .to_rgb8();
        let (width, height) = rgb.dimensions();

        let mut data = Vec::with_capacity(3 * width as usize * height as usize);
        for channel in 0..3 {
            for y in 0..height {
                for x in 0..width {
                    let pixel = rgb.get_pixel(x, y);
                    data.push(self.normalization.apply(pixel[channel]));
                }
            }
        }
        data
    }

    /// [1, 3, size, size] tensor, batch dimension included.
    pub fn to_tensor<B: Backend>(&self, image: &DynamicImage, device: &B::Device) -> Tensor<B, 4> {
        let size = self.size as usize;
        let data = TensorData::new(self.pixels(image), [1, 3, size, size]);
        Tensor::from_data(data, device)
    }
}
