//! Model module: network architectures
//!
//! AlexNet, VGG-16, ResNet-18 and ResNet-50, each exposed as a [`Network`] with a
//! convolutional `features` part and a fully connected `classifier` part.

pub mod alexnet;
pub mod config;
pub mod network;
pub mod resnet;
pub mod vgg;

pub use config::{FreezePolicy, NetworkType, IMAGENET_CLASSES};
pub use network::{Classifier, Features, Network};
