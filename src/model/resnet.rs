//! ResNet-18 and ResNet-50
//!
//! Stem (7x7 conv, batch norm, 3x3 max pool), four residual stages, global average pool.
//! ResNet-18 stacks basic blocks (two 3x3 convs); ResNet-50 stacks bottleneck blocks
//! (1x1 reduce, 3x3 with the stage stride, 1x1 expand by 4).

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

/// Block layout of a residual network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResNetDepth {
    /// Basic blocks, `[2, 2, 2, 2]`
    Layers18,
    /// Bottleneck blocks, `[3, 4, 6, 3]`
    Layers50,
}

impl ResNetDepth {
    fn blocks_per_stage(&self) -> [usize; 4] {
        match self {
            ResNetDepth::Layers18 => [2, 2, 2, 2],
            ResNetDepth::Layers50 => [3, 4, 6, 3],
        }
    }

    fn expansion(&self) -> usize {
        match self {
            ResNetDepth::Layers18 => 1,
            ResNetDepth::Layers50 => 4,
        }
    }

    /// Channels of the pooled feature vector
    pub fn out_features(&self) -> usize {
        512 * self.expansion()
    }
}

/// Bias-free convolution
fn conv(channels: [usize; 2], kernel: usize, stride: usize, padding: usize) -> Conv2dConfig {
    Conv2dConfig::new(channels, [kernel, kernel])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(padding, padding))
        .with_bias(false)
}

/// 1x1 projection on the identity path when shape changes
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B>,
}

impl<B: Backend> Downsample<B> {
    fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        Self {
            conv: conv([in_channels, out_channels], 1, stride, 0).init(device),
            bn: BatchNormConfig::new(out_channels).init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }
}

#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B>,
    downsample: Option<Downsample<B>>,
    activation: Relu,
}

impl<B: Backend> BasicBlock<B> {
    fn new(in_channels: usize, planes: usize, stride: usize, device: &B::Device) -> Self {
        let downsample = (stride != 1 || in_channels != planes)
            .then(|| Downsample::new(in_channels, planes, stride, device));

        Self {
            conv1: conv([in_channels, planes], 3, stride, 1).init(device),
            bn1: BatchNormConfig::new(planes).init(device),
            conv2: conv([planes, planes], 3, 1, 1).init(device),
            bn2: BatchNormConfig::new(planes).init(device),
            downsample,
            activation: Relu::new(),
        }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.activation.forward(self.bn1.forward(self.conv1.forward(input)));
        let x = self.bn2.forward(self.conv2.forward(x));
        self.activation.forward(x + identity)
    }
}

#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B>,
    conv3: Conv2d<B>,
    bn3: BatchNorm<B>,
    downsample: Option<Downsample<B>>,
    activation: Relu,
}

impl<B: Backend> Bottleneck<B> {
    const EXPANSION: usize = 4;

    fn new(in_channels: usize, planes: usize, stride: usize, device: &B::Device) -> Self {
        let out_channels = planes * Self::EXPANSION;
        let downsample = (stride != 1 || in_channels != out_channels)
            .then(|| Downsample::new(in_channels, out_channels, stride, device));

        Self {
            conv1: conv([in_channels, planes], 1, 1, 0).init(device),
            bn1: BatchNormConfig::new(planes).init(device),
            conv2: conv([planes, planes], 3, stride, 1).init(device),
            bn2: BatchNormConfig::new(planes).init(device),
            conv3: conv([planes, out_channels], 1, 1, 0).init(device),
            bn3: BatchNormConfig::new(out_channels).init(device),
            downsample,
            activation: Relu::new(),
        }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.activation.forward(self.bn1.forward(self.conv1.forward(input)));
        let x = self.activation.forward(self.bn2.forward(self.conv2.forward(x)));
        let x = self.bn3.forward(self.conv3.forward(x));
        self.activation.forward(x + identity)
    }
}

#[derive(Module, Debug)]
pub enum ResidualBlock<B: Backend> {
    Basic(BasicBlock<B>),
    Bottleneck(Bottleneck<B>),
}

impl<B: Backend> ResidualBlock<B> {
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            ResidualBlock::Basic(block) => block.forward(x),
            ResidualBlock::Bottleneck(block) => block.forward(x),
        }
    }
}

/// Convolutional part of a ResNet (everything before `fc`)
#[derive(Module, Debug)]
pub struct ResNetFeatures<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B>,
    maxpool: MaxPool2d,
    blocks: Vec<ResidualBlock<B>>,
    avgpool: AdaptiveAvgPool2d,
    activation: Relu,
}

impl<B: Backend> ResNetFeatures<B> {
    pub fn new(depth: ResNetDepth, device: &B::Device) -> Self {
        let mut blocks = Vec::new();
        let mut in_channels = 64;

        for (stage, &count) in depth.blocks_per_stage().iter().enumerate() {
            let planes = 64 << stage;
            for i in 0..count {
                let stride = if stage > 0 && i == 0 { 2 } else { 1 };
                let block = match depth {
                    ResNetDepth::Layers18 => {
                        ResidualBlock::Basic(BasicBlock::new(in_channels, planes, stride, device))
                    }
                    ResNetDepth::Layers50 => ResidualBlock::Bottleneck(Bottleneck::new(
                        in_channels,
                        planes,
                        stride,
                        device,
                    )),
                };
                blocks.push(block);
                in_channels = planes * depth.expansion();
            }
        }

        Self {
            conv1: conv([3, 64], 7, 2, 3).init(device),
            bn1: BatchNormConfig::new(64).init(device),
            maxpool: MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),
            blocks,
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            activation: Relu::new(),
        }
    }

    /// `[batch, 3, H, W]` -> `[batch, 512 * expansion]`
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.activation.forward(self.bn1.forward(self.conv1.forward(input)));
        let x = self.maxpool.forward(x);
        let x = self.blocks.iter().fold(x, |x, block| block.forward(x));

        let x = self.avgpool.forward(x);
        let [batch, channels, _, _] = x.dims();
        x.reshape([batch, channels])
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_resnet18_shape() {
        let device = Default::default();
        let features = ResNetFeatures::<TestBackend>::new(ResNetDepth::Layers18, &device);
        assert_eq!(features.num_blocks(), 8);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 64, 64], &device);
        assert_eq!(features.forward(input).dims(), [2, 512]);
    }

    #[test]
    fn test_resnet50_shape() {
        let device = Default::default();
        let features = ResNetFeatures::<TestBackend>::new(ResNetDepth::Layers50, &device);
        assert_eq!(features.num_blocks(), 16);

        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 64, 64], &device);
        assert_eq!(features.forward(input).dims(), [1, 2048]);
        assert_eq!(ResNetDepth::Layers50.out_features(), 2048);
    }
}
