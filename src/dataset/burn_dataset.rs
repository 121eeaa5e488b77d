//! Burn Dataset Integration for Caltech-101
//!
//! Wraps an ordered sample list behind a fallible accessor used by the batch provider,
//! and a Burn `Batcher` stacking transformed items into tensors.

use std::sync::Arc;

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use super::loader::{CaltechDataset, Sample};
use super::transform::Transform;
use crate::utils::error::{CaltechError, Result};

/// A single transformed item ready for Burn
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CaltechItem {
    /// Image data as flattened, normalized CHW float array [3 * H * W]
    pub image: Vec<f32>,
    /// Class label
    pub label: usize,
    /// Image path (for logging)
    pub path: String,
}

impl CaltechItem {
    /// Load a sample from disk and run the transform pipeline on it
    pub fn from_sample(sample: &Sample, transform: &Transform) -> Result<Self> {
        let image = transform.load(&sample.path)?;
        Ok(Self {
            image,
            label: sample.label,
            path: sample.path.to_string_lossy().to_string(),
        })
    }

    /// Create from pre-transformed image data
    pub fn from_data(image: Vec<f32>, label: usize, path: String) -> Self {
        Self { image, label, path }
    }
}

/// Indexable view of `(sample, transform)` pairs
///
/// Cloning is cheap: the sample list is shared.
#[derive(Debug, Clone)]
pub struct CaltechBurnDataset {
    samples: Arc<Vec<Sample>>,
    transform: Transform,
}

impl CaltechBurnDataset {
    pub fn new(samples: Vec<Sample>, transform: Transform) -> Self {
        Self {
            samples: Arc::new(samples),
            transform,
        }
    }

    /// Adapt a manifest split
    pub fn from_dataset(dataset: &CaltechDataset, transform: Transform) -> Self {
        Self::new(dataset.samples.clone(), transform)
    }

    /// View restricted to `indices`, in the given order
    pub fn subset(&self, indices: &[usize]) -> Result<Self> {
        let samples = indices
            .iter()
            .map(|&index| {
                self.samples
                    .get(index)
                    .cloned()
                    .ok_or(CaltechError::IndexOutOfRange {
                        index,
                        len: self.samples.len(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(samples, self.transform))
    }

    /// Load and transform the item at `index`
    pub fn get_item(&self, index: usize) -> Result<CaltechItem> {
        let sample = self.samples.get(index).ok_or(CaltechError::IndexOutOfRange {
            index,
            len: self.samples.len(),
        })?;
        CaltechItem::from_sample(sample, &self.transform)
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }
}

/// A batch of Caltech images
#[derive(Clone, Debug)]
pub struct CaltechBatch<B: Backend> {
    /// Batch of images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Batch of labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> CaltechBatch<B> {
    pub fn len(&self) -> usize {
        self.targets.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stacks transformed items into image and label tensors
///
/// Items are already normalized by the transform pipeline.
#[derive(Clone, Debug)]
pub struct CaltechBatcher {
    image_size: usize,
}

impl CaltechBatcher {
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }
}

impl<B: Backend> Batcher<B, CaltechItem, CaltechBatch<B>> for CaltechBatcher {
    fn batch(&self, items: Vec<CaltechItem>, device: &B::Device) -> CaltechBatch<B> {
        let batch_size = items.len();
        let (height, width) = (self.image_size, self.image_size);

        let images_data: Vec<f32> = items
            .iter()
            .flat_map(|item| item.image.iter().copied())
            .collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 3, height, width]),
            device,
        );

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        CaltechBatch { images, targets }
    }
}
