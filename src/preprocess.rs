use image::{imageops::FilterType, DynamicImage};

/// A single NHWC image batch, `[1, size, size, 3]`, values in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    pub shape: [u64; 4],
    pub data: Vec<f32>,
}

impl InputTensor {
    pub fn height(&self) -> u64 {
        self.shape[1]
    }

    pub fn width(&self) -> u64 {
        self.shape[2]
    }
}

pub fn preprocess(image: &DynamicImage, size: u32) -> InputTensor {
    let resized = image.resize_exact(size, size, FilterType::CatmullRom);
    let rgb = resized.to_rgb8();

    let mut data = Vec::with_capacity((size as usize) * (size as usize) * 3);
    for pixel in rgb.pixels() {
        data.push(pixel[0] as f32 / 255.0);
        data.push(pixel[1] as f32 / 255.0);
        data.push(pixel[2] as f32 / 255.0);
    }

    InputTensor {
        shape: [1, size as u64, size as u64, 3],
        data,
    }
}
