//! VGG-16
//!
//! Thirteen 3x3 convolutions in five blocks, each block closed by a 2x2 max pool, then
//! a 7x7 adaptive average pool.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

/// Output channels of each convolution, per block
const VGG16_BLOCKS: [&[usize]; 5] = [
    &[64, 64],
    &[128, 128],
    &[256, 256, 256],
    &[512, 512, 512],
    &[512, 512, 512],
];

/// Flattened size of the VGG feature map (512 x 7 x 7)
pub const VGG_FEATURES: usize = 512 * 7 * 7;

#[derive(Module, Debug)]
pub struct VggBlock<B: Backend> {
    convs: Vec<Conv2d<B>>,
    pool: MaxPool2d,
    activation: Relu,
}

impl<B: Backend> VggBlock<B> {
    fn new(in_channels: usize, widths: &[usize], device: &B::Device) -> Self {
        let mut convs = Vec::with_capacity(widths.len());
        let mut channels = in_channels;
        for &width in widths {
            convs.push(
                Conv2dConfig::new([channels, width], [3, 3])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .init(device),
            );
            channels = width;
        }

        Self {
            convs,
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            activation: Relu::new(),
        }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self
            .convs
            .iter()
            .fold(input, |x, conv| self.activation.forward(conv.forward(x)));
        self.pool.forward(x)
    }
}

/// Convolutional part of VGG-16
#[derive(Module, Debug)]
pub struct VggFeatures<B: Backend> {
    blocks: Vec<VggBlock<B>>,
    avgpool: AdaptiveAvgPool2d,
}

impl<B: Backend> VggFeatures<B> {
    pub fn new(device: &B::Device) -> Self {
        let mut blocks = Vec::with_capacity(VGG16_BLOCKS.len());
        let mut channels = 3;
        for widths in VGG16_BLOCKS {
            blocks.push(VggBlock::new(channels, widths, device));
            channels = widths[widths.len() - 1];
        }

        Self {
            blocks,
            avgpool: AdaptiveAvgPool2dConfig::new([7, 7]).init(),
        }
    }

    /// `[batch, 3, H, W]` -> `[batch, 25088]`
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.blocks.iter().fold(input, |x, block| block.forward(x));
        let x = self.avgpool.forward(x);
        let [batch, channels, height, width] = x.dims();
        x.reshape([batch, channels * height * width])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_vgg16_layout() {
        let device = Default::default();
        let features = VggFeatures::<TestBackend>::new(&device);
        let convs: usize = features.blocks.iter().map(|b| b.convs.len()).sum();
        assert_eq!(convs, 13);
    }

    #[test]
    fn test_features_shape_small_input() {
        let device = Default::default();
        let features = VggFeatures::<TestBackend>::new(&device);
        // Five 2x2 pools reduce 32 to 1; the adaptive pool restores 7x7
        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 32, 32], &device);
        assert_eq!(features.forward(input).dims(), [1, VGG_FEATURES]);
    }
}
