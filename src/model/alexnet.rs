//! AlexNet
//!
//! Five convolutions with interleaved max pooling, followed by a 6x6 adaptive average
//! pool. The three-layer fully connected head ([`MlpHead`]) is shared with VGG.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

/// Flattened size of the AlexNet feature map (256 x 6 x 6)
pub const ALEXNET_FEATURES: usize = 256 * 6 * 6;

/// Width of the hidden fully connected layers
pub const HIDDEN_UNITS: usize = 4096;

/// Convolutional part of AlexNet
#[derive(Module, Debug)]
pub struct AlexNetFeatures<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    conv3: Conv2d<B>,
    conv4: Conv2d<B>,
    conv5: Conv2d<B>,
    pool: MaxPool2d,
    avgpool: AdaptiveAvgPool2d,
    activation: Relu,
}

impl<B: Backend> AlexNetFeatures<B> {
    pub fn new(device: &B::Device) -> Self {
        let conv = |channels: [usize; 2], kernel: usize, stride: usize, padding: usize| {
            Conv2dConfig::new(channels, [kernel, kernel])
                .with_stride([stride, stride])
                .with_padding(PaddingConfig2d::Explicit(padding, padding))
                .init(device)
        };

        Self {
            conv1: conv([3, 64], 11, 4, 2),
            conv2: conv([64, 192], 5, 1, 2),
            conv3: conv([192, 384], 3, 1, 1),
            conv4: conv([384, 256], 3, 1, 1),
            conv5: conv([256, 256], 3, 1, 1),
            pool: MaxPool2dConfig::new([3, 3]).with_strides([2, 2]).init(),
            avgpool: AdaptiveAvgPool2dConfig::new([6, 6]).init(),
            activation: Relu::new(),
        }
    }

    /// `[batch, 3, H, W]` -> `[batch, 9216]`
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.activation.forward(self.conv1.forward(input));
        let x = self.pool.forward(x);
        let x = self.activation.forward(self.conv2.forward(x));
        let x = self.pool.forward(x);
        let x = self.activation.forward(self.conv3.forward(x));
        let x = self.activation.forward(self.conv4.forward(x));
        let x = self.activation.forward(self.conv5.forward(x));
        let x = self.pool.forward(x);

        let x = self.avgpool.forward(x);
        let [batch, channels, height, width] = x.dims();
        x.reshape([batch, channels * height * width])
    }
}

/// Three-layer fully connected classifier
///
/// AlexNet applies dropout before each hidden layer, VGG after each hidden activation.
#[derive(Module, Debug)]
pub struct MlpHead<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    fc3: Linear<B>,
    dropout: Dropout,
    activation: Relu,
    dropout_first: bool,
}

impl<B: Backend> MlpHead<B> {
    pub fn new(
        in_features: usize,
        num_classes: usize,
        dropout: f64,
        dropout_first: bool,
        device: &B::Device,
    ) -> Self {
        Self {
            fc1: LinearConfig::new(in_features, HIDDEN_UNITS).init(device),
            fc2: LinearConfig::new(HIDDEN_UNITS, HIDDEN_UNITS).init(device),
            fc3: LinearConfig::new(HIDDEN_UNITS, num_classes).init(device),
            dropout: DropoutConfig::new(dropout).init(),
            activation: Relu::new(),
            dropout_first,
        }
    }

    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        if self.dropout_first {
            let x = self.activation.forward(self.fc1.forward(self.dropout.forward(x)));
            let x = self.activation.forward(self.fc2.forward(self.dropout.forward(x)));
            self.fc3.forward(x)
        } else {
            let x = self.dropout.forward(self.activation.forward(self.fc1.forward(x)));
            let x = self.dropout.forward(self.activation.forward(self.fc2.forward(x)));
            self.fc3.forward(x)
        }
    }

    /// Replace the output layer with a fresh one of `num_classes` outputs
    pub fn with_output(mut self, num_classes: usize, device: &B::Device) -> Self {
        self.fc3 = LinearConfig::new(HIDDEN_UNITS, num_classes).init(device);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_features_shape() {
        let device = Default::default();
        let features = AlexNetFeatures::<TestBackend>::new(&device);
        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 224, 224], &device);
        assert_eq!(features.forward(input).dims(), [1, ALEXNET_FEATURES]);
    }

    #[test]
    fn test_head_replacement() {
        let device = Default::default();
        let head = MlpHead::<TestBackend>::new(16, 1000, 0.5, true, &device);
        assert_eq!(head.fc3.weight.val().dims()[1], 1000);

        let head = head.with_output(7, &device);
        let out = head.forward(Tensor::zeros([2, 16], &device));
        assert_eq!(out.dims(), [2, 7]);
    }
}
