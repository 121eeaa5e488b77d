//! Image transform pipeline
//!
//! Every split uses the same deterministic pipeline:
//! 1. resize so the shorter side equals `resize_size` (aspect ratio kept)
//! 2. center-crop a `crop_size` x `crop_size` square
//! 3. convert to a CHW float tensor in `[0, 1]`
//! 4. normalize each channel with `(x - mean) / std`

use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, ImageReader, RgbImage};
use serde::{Deserialize, Serialize};

use crate::utils::error::{CaltechError, Result};
use crate::{IMAGE_SIZE, RESIZE_SIZE};

/// ImageNet channel statistics, used with pretrained weights
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Channel normalization applied as the last transform step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Normalization {
    /// ImageNet mean / std
    ImageNet,
    /// Maps `[0, 1]` to `[-1, 1]`
    Centered,
}

impl Normalization {
    /// ImageNet statistics for pretrained weights, centered otherwise
    pub fn for_pretrained(pretrained: bool) -> Self {
        if pretrained {
            Normalization::ImageNet
        } else {
            Normalization::Centered
        }
    }

    pub fn mean(&self) -> [f32; 3] {
        match self {
            Normalization::ImageNet => IMAGENET_MEAN,
            Normalization::Centered => [0.5; 3],
        }
    }

    pub fn std(&self) -> [f32; 3] {
        match self {
            Normalization::ImageNet => IMAGENET_STD,
            Normalization::Centered => [0.5; 3],
        }
    }
}

/// Deterministic resize / crop / normalize pipeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub resize_size: u32,
    pub crop_size: u32,
    pub normalization: Normalization,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            resize_size: RESIZE_SIZE as u32,
            crop_size: IMAGE_SIZE as u32,
            normalization: Normalization::ImageNet,
        }
    }
}

impl Transform {
    pub fn new(resize_size: u32, crop_size: u32, normalization: Normalization) -> Result<Self> {
        if crop_size == 0 || resize_size < crop_size {
            return Err(CaltechError::Config(format!(
                "crop size {} must be positive and not exceed resize size {}",
                crop_size, resize_size
            )));
        }
        Ok(Self {
            resize_size,
            crop_size,
            normalization,
        })
    }

    /// Decode the image at `path` and run the full pipeline
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Vec<f32>> {
        let path = path.as_ref();
        let img = ImageReader::open(path)
            .map_err(|e| CaltechError::ImageLoad(path.to_path_buf(), e.to_string()))?
            .with_guessed_format()
            .map_err(|e| CaltechError::ImageLoad(path.to_path_buf(), e.to_string()))?
            .decode()
            .map_err(|e| CaltechError::ImageLoad(path.to_path_buf(), e.to_string()))?;

        Ok(self.apply(&img))
    }

    /// Run the pipeline on an already decoded image
    pub fn apply(&self, img: &DynamicImage) -> Vec<f32> {
        let rgb = img.to_rgb8();
        let resized = resize_shorter_side(&rgb, self.resize_size);
        let cropped = center_crop(&resized, self.crop_size);
        self.to_normalized_chw(&cropped)
    }

    fn to_normalized_chw(&self, img: &RgbImage) -> Vec<f32> {
        let (width, height) = (img.width() as usize, img.height() as usize);
        let plane = width * height;
        let mean = self.normalization.mean();
        let std = self.normalization.std();
        let mut tensor = vec![0.0f32; 3 * plane];

        for (x, y, pixel) in img.enumerate_pixels() {
            let offset = y as usize * width + x as usize;
            for c in 0..3 {
                let value = pixel[c] as f32 / 255.0;
                tensor[c * plane + offset] = (value - mean[c]) / std[c];
            }
        }

        tensor
    }
}

/// Resize so that the shorter side equals `size`
///
/// The longer side is `size * long / short`, truncated. Images whose shorter side
/// already equals `size` are returned unchanged.
pub fn resize_shorter_side(img: &RgbImage, size: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    if (w <= h && w == size) || (h <= w && h == size) {
        return img.clone();
    }

    let (new_w, new_h) = if w < h {
        (size, (size as u64 * h as u64 / w as u64) as u32)
    } else {
        ((size as u64 * w as u64 / h as u64) as u32, size)
    };

    image::imageops::resize(img, new_w, new_h, FilterType::Triangle)
}

/// Crop a centered `size` x `size` square
///
/// Offsets are `(dim - size) / 2` rounded half to even. Callers resize first so both
/// sides are at least `size`.
pub fn center_crop(img: &RgbImage, size: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    let crop_w = size.min(w);
    let crop_h = size.min(h);
    let left = half_offset(w - crop_w);
    let top = half_offset(h - crop_h);

    image::imageops::crop_imm(img, left, top, crop_w, crop_h).to_image()
}

fn half_offset(diff: u32) -> u32 {
    let half = diff / 2;
    // .5 ties go to the even neighbour
    if diff % 2 == 1 && half % 2 == 1 {
        half + 1
    } else {
        half
    }
}
