use burn::config::Config;
use burn::module::{Ignored, Module};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::PaddingConfig2d;
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::FeatureExtractor;

struct LayerSpec {
    name: &'static str,
    channels: [usize; 2],
    /// Max pooling follows this layer.
    pool_after: bool,
}

const fn layer(name: &'static str, d_in: usize, d_out: usize, pool_after: bool) -> LayerSpec {
    LayerSpec {
        name,
        channels: [d_in, d_out],
        pool_after,
    }
}

/// The 13 convolution layers of VGG16, in forward order.
const LAYERS: [LayerSpec; 13] = [
    // Block 1: 3 -> 64
    layer("conv1_1", 3, 64, false),
    layer("conv1_2", 64, 64, true),
    // Block 2: 64 -> 128
    layer("conv2_1", 64, 128, false),
    layer("conv2_2", 128, 128, true),
    // Block 3: 128 -> 256
    layer("conv3_1", 128, 256, false),
    layer("conv3_2", 256, 256, false),
    layer("conv3_3", 256, 256, true),
    // Block 4: 256 -> 512
    layer("conv4_1", 256, 512, false),
    layer("conv4_2", 512, 512, false),
    layer("conv4_3", 512, 512, true),
    // Block 5: 512 -> 512
    layer("conv5_1", 512, 512, false),
    layer("conv5_2", 512, 512, false),
    layer("conv5_3", 512, 512, false),
];

/// Configuration to create a [VGG16](Vgg16) feature extractor.
///
/// The defaults reproduce the input normalization torchvision's VGG16 was trained with:
/// `(x * scale - mean) / std` on `[0, 255]` pixels.
#[derive(Config, Debug)]
pub struct Vgg16Config {
    /// Multiplier bringing `[0, 255]` pixels to the range the weights expect.
    #[config(default = "1.0 / 255.0")]
    pub scale: f32,
    /// Per channel RGB mean, subtracted after scaling.
    #[config(default = "[0.485, 0.456, 0.406]")]
    pub mean: [f32; 3],
    /// Per channel RGB standard deviation, dividing the centered input.
    #[config(default = "[0.229, 0.224, 0.225]")]
    pub std: [f32; 3],
}

impl Vgg16Config {
    /// Initialize a new [VGG16](Vgg16) module with random weights.
    ///
    /// Use [WeightsSource](super::WeightsSource) to load pretrained weights.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Vgg16<B> {
        let convs = LAYERS
            .iter()
            .map(|layer| {
                Conv2dConfig::new(layer.channels, [3, 3])
                    .with_padding(PaddingConfig2d::Same)
                    .with_bias(true)
                    .init(device)
            })
            .collect();

        Vgg16 {
            convs,
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            scale: Ignored(self.scale),
            mean: Ignored(self.mean),
            std: Ignored(self.std),
        }
    }
}

/// VGG16 convolutional stack, without the classifier.
///
/// Each convolution is followed by a ReLU; the activation of a layer identifier is the
/// rectified output of the matching convolution (`0` is `conv1_1`, `12` is `conv5_3`).
#[derive(Module, Debug)]
pub struct Vgg16<B: Backend> {
    convs: Vec<Conv2d<B>>,
    pool: MaxPool2d,
    scale: Ignored<f32>,
    mean: Ignored<[f32; 3]>,
    std: Ignored<[f32; 3]>,
}

impl<B: Backend> Vgg16<B> {
    /// Bring `[batch, 3, H, W]` input in `[0, 255]` to the normalized range of the weights.
    fn normalize(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch, channels, height, width] = x.dims();
        let device = x.device();

        let mean = Tensor::<B, 1>::from_floats(self.mean.0, &device)
            .reshape([1, 3, 1, 1])
            .expand([batch, channels, height, width]);
        let std = Tensor::<B, 1>::from_floats(self.std.0, &device)
            .reshape([1, 3, 1, 1])
            .expand([batch, channels, height, width]);

        x.mul_scalar(self.scale.0).sub(mean).div(std)
    }
}

impl<B: Backend> FeatureExtractor<B> for Vgg16<B> {
    fn layer_count(&self) -> usize {
        self.convs.len()
    }

    fn layer_name(&self, layer_id: usize) -> Option<&'static str> {
        LAYERS.get(layer_id).map(|layer| layer.name)
    }

    fn downsampling(&self, layer_id: usize) -> usize {
        let pools = LAYERS
            .iter()
            .take(layer_id)
            .filter(|layer| layer.pool_after)
            .count();

        1 << pools
    }

    fn activations(&self, image: Tensor<B, 4>, layer_ids: &[usize]) -> Vec<Tensor<B, 4>> {
        let Some(deepest) = layer_ids.iter().copied().max() else {
            return Vec::new();
        };
        assert!(
            deepest < self.convs.len(),
            "Layer {deepest} is out of range, VGG16 has {} layers",
            self.convs.len()
        );

        let mut captured: Vec<Option<Tensor<B, 4>>> = vec![None; deepest + 1];
        let mut x = self.normalize(image);

        // Stop at the deepest requested layer, later layers don't contribute.
        for (id, conv) in self.convs.iter().enumerate().take(deepest + 1) {
            x = relu(conv.forward(x));

            if layer_ids.contains(&id) {
                captured[id] = Some(x.clone());
            }
            if LAYERS[id].pool_after && id < deepest {
                x = self.pool.forward(x);
            }
        }

        layer_ids
            .iter()
            .map(|id| {
                captured[*id]
                    .clone()
                    .expect("Every requested layer is visited by the forward pass")
            })
            .collect()
    }
}
