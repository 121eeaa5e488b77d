//! Network wrapper
//!
//! Every architecture is split into a convolutional `features` part and a fully
//! connected `classifier` part. The split is what the freeze policy acts on: the
//! optimizer only receives gradients of the partition that is allowed to train.

use std::path::Path;

use burn::{
    module::Module,
    nn::{Linear, LinearConfig},
    optim::GradientsParams,
    record::CompactRecorder,
    tensor::{
        backend::{AutodiffBackend, Backend},
        Tensor,
    },
};
use tracing::info;

use super::alexnet::{AlexNetFeatures, MlpHead, ALEXNET_FEATURES};
use super::config::{FreezePolicy, NetworkType, IMAGENET_CLASSES};
use super::resnet::{ResNetDepth, ResNetFeatures};
use super::vgg::{VggFeatures, VGG_FEATURES};
use crate::utils::error::{CaltechError, Result};

/// Convolutional feature extractor, output flattened to `[batch, features]`
#[derive(Module, Debug)]
pub enum Features<B: Backend> {
    AlexNet(AlexNetFeatures<B>),
    Vgg(VggFeatures<B>),
    ResNet(ResNetFeatures<B>),
}

impl<B: Backend> Features<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        match self {
            Features::AlexNet(features) => features.forward(input),
            Features::Vgg(features) => features.forward(input),
            Features::ResNet(features) => features.forward(input),
        }
    }
}

/// Fully connected classifier
#[derive(Module, Debug)]
pub enum Classifier<B: Backend> {
    /// Three-layer head of AlexNet / VGG
    Mlp(MlpHead<B>),
    /// Single `fc` layer of ResNet
    Linear(Linear<B>),
}

impl<B: Backend> Classifier<B> {
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        match self {
            Classifier::Mlp(head) => head.forward(x),
            Classifier::Linear(fc) => fc.forward(x),
        }
    }

    fn with_output(self, num_classes: usize, device: &B::Device) -> Self {
        match self {
            Classifier::Mlp(head) => Classifier::Mlp(head.with_output(num_classes, device)),
            Classifier::Linear(fc) => {
                let [in_features, _] = fc.weight.val().dims();
                Classifier::Linear(LinearConfig::new(in_features, num_classes).init(device))
            }
        }
    }
}

/// Image classifier with a features / classifier partition
#[derive(Module, Debug)]
pub struct Network<B: Backend> {
    pub features: Features<B>,
    pub classifier: Classifier<B>,
    num_classes: usize,
}

impl<B: Backend> Network<B> {
    /// Randomly initialised network
    pub fn new(network: NetworkType, num_classes: usize, dropout: f64, device: &B::Device) -> Self {
        let (features, classifier) = match network {
            NetworkType::AlexNet => (
                Features::AlexNet(AlexNetFeatures::new(device)),
                Classifier::Mlp(MlpHead::new(ALEXNET_FEATURES, num_classes, dropout, true, device)),
            ),
            NetworkType::Vgg16 => (
                Features::Vgg(VggFeatures::new(device)),
                Classifier::Mlp(MlpHead::new(VGG_FEATURES, num_classes, dropout, false, device)),
            ),
            NetworkType::ResNet18 | NetworkType::ResNet50 => {
                let depth = if network == NetworkType::ResNet18 {
                    ResNetDepth::Layers18
                } else {
                    ResNetDepth::Layers50
                };
                (
                    Features::ResNet(ResNetFeatures::new(depth, device)),
                    Classifier::Linear(
                        LinearConfig::new(depth.out_features(), num_classes).init(device),
                    ),
                )
            }
        };

        Self {
            features,
            classifier,
            num_classes,
        }
    }

    /// Network initialised from an ImageNet record at `path` (without extension), with
    /// its 1000-way output layer replaced by a fresh `num_classes`-way layer
    pub fn pretrained<P: AsRef<Path>>(
        network: NetworkType,
        num_classes: usize,
        dropout: f64,
        path: P,
        device: &B::Device,
    ) -> Result<Self> {
        let path = path.as_ref();
        let file = path.with_extension("mpk");
        if !file.exists() {
            return Err(CaltechError::Model(format!(
                "Pretrained weights for {} not found at {:?}",
                network, file
            )));
        }

        info!("Loading ImageNet weights from {:?}", file);
        let imagenet = Self::new(network, IMAGENET_CLASSES, dropout, device)
            .load_file(path, &CompactRecorder::new(), device)
            .map_err(|e| CaltechError::Model(format!("Failed to load {:?}: {:?}", file, e)))?;

        Ok(imagenet.with_num_classes(num_classes, device))
    }

    /// Replace the final linear layer
    pub fn with_num_classes(self, num_classes: usize, device: &B::Device) -> Self {
        Self {
            features: self.features,
            classifier: self.classifier.with_output(num_classes, device),
            num_classes,
        }
    }

    /// Load a checkpoint written by [`Network::save`]
    pub fn load<P: AsRef<Path>>(
        network: NetworkType,
        num_classes: usize,
        path: P,
        device: &B::Device,
    ) -> Result<Self> {
        let path = path.as_ref();
        Self::new(network, num_classes, 0.5, device)
            .load_file(path, &CompactRecorder::new(), device)
            .map_err(|e| CaltechError::Model(format!("Failed to load {:?}: {:?}", path, e)))
    }

    /// Save to `path` (the recorder adds `.mpk`)
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.clone()
            .save_file(path, &CompactRecorder::new())
            .map_err(|e| CaltechError::Model(format!("Failed to save {:?}: {:?}", path, e)))
    }

    /// `[batch, 3, H, W]` -> logits `[batch, num_classes]`
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        self.classifier.forward(self.features.forward(input))
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Number of scalar parameters the optimizer updates under `policy`
    pub fn trainable_params(&self, policy: FreezePolicy) -> usize {
        let mut count = 0;
        if policy.trains_features() {
            count += self.features.num_params();
        }
        if policy.trains_classifier() {
            count += self.classifier.num_params();
        }
        count
    }
}

impl<B: AutodiffBackend> Network<B> {
    /// Gradients restricted to the partition `policy` leaves trainable
    pub fn trainable_gradients(&self, mut grads: B::Gradients, policy: FreezePolicy) -> GradientsParams {
        match policy {
            FreezePolicy::NoFreezing => GradientsParams::from_grads(grads, self),
            FreezePolicy::ConvLayers => GradientsParams::from_module(&mut grads, &self.classifier),
            FreezePolicy::FcLayers => GradientsParams::from_module(&mut grads, &self.features),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn::nn::loss::CrossEntropyLossConfig;
    use burn::tensor::{Int, TensorData};
    use burn_ndarray::NdArray;
    use tempfile::tempdir;

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<TestBackend>;

    #[test]
    fn test_alexnet_forward_shape() {
        let device = Default::default();
        let network = Network::<TestBackend>::new(NetworkType::AlexNet, 5, 0.5, &device);
        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 224, 224], &device);
        assert_eq!(network.forward(input).dims(), [2, 5]);
        assert_eq!(network.num_classes(), 5);
    }

    #[test]
    fn test_with_num_classes_keeps_features() {
        let device = Default::default();
        let network = Network::<TestBackend>::new(NetworkType::ResNet18, 1000, 0.5, &device);
        let features_before = network.features.num_params();

        let network = network.with_num_classes(3, &device);
        assert_eq!(network.num_classes(), 3);
        assert_eq!(network.features.num_params(), features_before);
        assert_eq!(network.classifier.num_params(), 512 * 3 + 3);
    }

    #[test]
    fn test_trainable_params_by_policy() {
        let device = Default::default();
        let network = Network::<TestBackend>::new(NetworkType::ResNet18, 4, 0.5, &device);
        let total = network.num_params();

        assert_eq!(network.trainable_params(FreezePolicy::NoFreezing), total);
        assert_eq!(network.trainable_params(FreezePolicy::ConvLayers), 512 * 4 + 4);
        assert_eq!(
            network.trainable_params(FreezePolicy::FcLayers),
            total - (512 * 4 + 4)
        );
    }

    #[test]
    fn test_trainable_gradients_follow_partition() {
        let device = Default::default();
        let network = Network::<TestAutodiffBackend>::new(NetworkType::ResNet18, 2, 0.5, &device);
        let criterion = CrossEntropyLossConfig::new().init(&device);

        let grads_for = |policy: FreezePolicy| {
            let input = Tensor::<TestAutodiffBackend, 4>::ones([2, 3, 32, 32], &device);
            let targets = Tensor::<TestAutodiffBackend, 1, Int>::from_data(
                TensorData::new(vec![0i64, 1], [2]),
                &device,
            );
            let loss = criterion.forward(network.forward(input), targets);
            network.trainable_gradients(loss.backward(), policy)
        };

        let all = grads_for(FreezePolicy::NoFreezing).len();
        // fc weight and bias only
        assert_eq!(grads_for(FreezePolicy::ConvLayers).len(), 2);
        assert_eq!(grads_for(FreezePolicy::FcLayers).len(), all - 2);
    }

    #[test]
    fn test_pretrained_replaces_head() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let path = dir.path().join(NetworkType::ResNet18.weights_file_stem());

        Network::<TestBackend>::new(NetworkType::ResNet18, IMAGENET_CLASSES, 0.5, &device)
            .save(&path)
            .unwrap();

        let network =
            Network::<TestBackend>::pretrained(NetworkType::ResNet18, 7, 0.5, &path, &device)
                .unwrap();
        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 32, 32], &device);
        assert_eq!(network.forward(input).dims(), [1, 7]);
    }

    #[test]
    fn test_pretrained_missing_file() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let err = Network::<TestBackend>::pretrained(
            NetworkType::AlexNet,
            7,
            0.5,
            dir.path().join("alexnet_imagenet"),
            &device,
        )
        .unwrap_err();
        assert!(matches!(err, CaltechError::Model(_)));
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let path = dir.path().join("model");
        let network = Network::<TestBackend>::new(NetworkType::ResNet18, 3, 0.5, &device);
        network.save(&path).unwrap();

        let loaded = Network::<TestBackend>::load(NetworkType::ResNet18, 3, &path, &device).unwrap();
        assert_eq!(loaded.num_params(), network.num_params());
        assert_eq!(loaded.num_classes(), 3);
    }
}
