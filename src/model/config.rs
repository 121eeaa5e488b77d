//! Model Configuration Module
//!
//! Architecture selection and the freeze policy choosing which parameter partition the
//! optimizer updates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::utils::error::CaltechError;

/// Number of ImageNet classes the pretrained records were trained on
pub const IMAGENET_CLASSES: usize = 1000;

/// Supported architectures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkType {
    AlexNet,
    /// VGG-16
    Vgg16,
    ResNet18,
    /// ResNet-50, selected by `resnet`
    ResNet50,
}

impl NetworkType {
    /// Default batch size, sized for the memory footprint of each network
    pub fn default_batch_size(&self) -> usize {
        match self {
            NetworkType::AlexNet => 256,
            NetworkType::Vgg16 | NetworkType::ResNet18 | NetworkType::ResNet50 => 16,
        }
    }

    /// File stem of the ImageNet record (the recorder adds the extension)
    pub fn weights_file_stem(&self) -> String {
        format!("{}_imagenet", self)
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NetworkType::AlexNet => "alexnet",
            NetworkType::Vgg16 => "vgg16",
            NetworkType::ResNet18 => "resnet18",
            NetworkType::ResNet50 => "resnet50",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for NetworkType {
    type Err = CaltechError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "alexnet" => Ok(NetworkType::AlexNet),
            "vgg" | "vgg16" => Ok(NetworkType::Vgg16),
            "resnet" | "resnet50" => Ok(NetworkType::ResNet50),
            "resnet18" => Ok(NetworkType::ResNet18),
            other => Err(CaltechError::Config(format!(
                "Unknown network '{}'. Possible values are: 'alexnet', 'vgg', 'resnet', 'resnet18'",
                other
            ))),
        }
    }
}

/// Which parameters the optimizer may update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FreezePolicy {
    /// Every parameter is trainable
    NoFreezing,
    /// Convolutional part frozen, classifier trainable
    ConvLayers,
    /// Classifier frozen, convolutional part trainable
    FcLayers,
}

impl FreezePolicy {
    /// Whether the convolutional feature extractor is updated
    pub fn trains_features(&self) -> bool {
        !matches!(self, FreezePolicy::ConvLayers)
    }

    /// Whether the fully connected classifier is updated
    pub fn trains_classifier(&self) -> bool {
        !matches!(self, FreezePolicy::FcLayers)
    }
}

impl fmt::Display for FreezePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FreezePolicy::NoFreezing => "no_freezing",
            FreezePolicy::ConvLayers => "conv_layers",
            FreezePolicy::FcLayers => "fc_layers",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for FreezePolicy {
    type Err = CaltechError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no_freezing" => Ok(FreezePolicy::NoFreezing),
            "conv_layers" => Ok(FreezePolicy::ConvLayers),
            "fc_layers" => Ok(FreezePolicy::FcLayers),
            other => Err(CaltechError::Config(format!(
                "Unknown freeze policy '{}'. Possible values are: 'no_freezing', 'conv_layers', 'fc_layers'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_parse() {
        assert_eq!("alexnet".parse::<NetworkType>().unwrap(), NetworkType::AlexNet);
        assert_eq!("VGG".parse::<NetworkType>().unwrap(), NetworkType::Vgg16);
        assert_eq!("resnet".parse::<NetworkType>().unwrap(), NetworkType::ResNet50);
        assert_eq!("resnet18".parse::<NetworkType>().unwrap(), NetworkType::ResNet18);
        assert!("lenet".parse::<NetworkType>().unwrap_err().is_config());
    }

    #[test]
    fn test_default_batch_sizes() {
        assert_eq!(NetworkType::AlexNet.default_batch_size(), 256);
        assert_eq!(NetworkType::Vgg16.default_batch_size(), 16);
        assert_eq!(NetworkType::ResNet50.default_batch_size(), 16);
    }

    #[test]
    fn test_freeze_policy_parse() {
        assert_eq!("no_freezing".parse::<FreezePolicy>().unwrap(), FreezePolicy::NoFreezing);
        assert_eq!("conv_layers".parse::<FreezePolicy>().unwrap(), FreezePolicy::ConvLayers);
        assert_eq!("fc_layers".parse::<FreezePolicy>().unwrap(), FreezePolicy::FcLayers);

        let err = "all".parse::<FreezePolicy>().unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("no_freezing"));
    }

    #[test]
    fn test_freeze_partitions() {
        assert!(FreezePolicy::NoFreezing.trains_features());
        assert!(FreezePolicy::NoFreezing.trains_classifier());
        assert!(!FreezePolicy::ConvLayers.trains_features());
        assert!(FreezePolicy::ConvLayers.trains_classifier());
        assert!(FreezePolicy::FcLayers.trains_features());
        assert!(!FreezePolicy::FcLayers.trains_classifier());
    }

    #[test]
    fn test_display_round_trips_parse() {
        for policy in [FreezePolicy::NoFreezing, FreezePolicy::ConvLayers, FreezePolicy::FcLayers] {
            assert_eq!(policy.to_string().parse::<FreezePolicy>().unwrap(), policy);
        }
        assert_eq!(NetworkType::ResNet18.weights_file_stem(), "resnet18_imagenet");
    }
}
