use burn::nn::loss::{MseLoss, Reduction};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::model::FeatureExtractor;

/// Gram matrix of an activation: channel by channel inner products over all positions.
///
/// Not normalized by the number of positions.
///
/// # Shapes
///
/// - activation: `[batch, channels, height, width]`
/// - output: `[batch, channels, channels]`
pub fn gram_matrix<B: Backend>(activation: Tensor<B, 4>) -> Tensor<B, 3> {
    let [batch, channels, height, width] = activation.dims();
    let features = activation.reshape([batch, channels, height * width]);

    features.clone().matmul(features.swap_dims(1, 2))
}

/// Mean over layers of the mean squared error between live and target activations.
///
/// Layers are paired positionally.
pub fn content_loss<B: Backend>(live: &[Tensor<B, 4>], targets: &[Tensor<B, 4>]) -> Tensor<B, 1> {
    mean_of_layers(
        live.iter()
            .zip(targets)
            .map(|(live, target)| mse(live.clone(), target.clone()))
            .collect(),
    )
}

/// Mean over layers of the mean squared error between the Gram matrix of the live activation
/// and the target Gram matrix.
pub fn style_loss<B: Backend>(live: &[Tensor<B, 4>], target_grams: &[Tensor<B, 3>]) -> Tensor<B, 1> {
    mean_of_layers(
        live.iter()
            .zip(target_grams)
            .map(|(live, target)| mse(gram_matrix(live.clone()), target.clone()))
            .collect(),
    )
}

/// Anisotropic total variation: sum of absolute differences between vertically adjacent
/// samples plus the same for horizontally adjacent samples.
///
/// # Shapes
///
/// - image: `[batch, channels, height, width]`
/// - output: `[1]`
pub fn denoise_loss<B: Backend>(image: Tensor<B, 4>) -> Tensor<B, 1> {
    let [batch, channels, height, width] = image.dims();
    let mut loss = Tensor::zeros([1], &image.device());

    if height > 1 {
        let below = image.clone().slice([0..batch, 0..channels, 1..height, 0..width]);
        let above = image.clone().slice([0..batch, 0..channels, 0..height - 1, 0..width]);
        loss = loss + below.sub(above).abs().sum();
    }
    if width > 1 {
        let right = image.clone().slice([0..batch, 0..channels, 0..height, 1..width]);
        let left = image.slice([0..batch, 0..channels, 0..height, 0..width - 1]);
        loss = loss + right.sub(left).abs().sum();
    }

    loss
}

fn mse<B: Backend, const D: usize>(live: Tensor<B, D>, target: Tensor<B, D>) -> Tensor<B, 1> {
    MseLoss::new().forward(live, target, Reduction::Mean)
}

fn mean_of_layers<B: Backend>(losses: Vec<Tensor<B, 1>>) -> Tensor<B, 1> {
    Tensor::cat(losses, 0).mean()
}

/// Content activations of a fixed image, detached from any autodiff graph.
#[derive(Debug, Clone)]
pub struct ContentTargets<B: Backend> {
    layer_ids: Vec<usize>,
    activations: Vec<Tensor<B, 4>>,
}

impl<B: Backend> ContentTargets<B> {
    /// Extract the activations of `image` at `layer_ids`.
    pub fn new<M: FeatureExtractor<B>>(model: &M, image: Tensor<B, 4>, layer_ids: &[usize]) -> Self {
        let activations = model
            .activations(image, layer_ids)
            .into_iter()
            .map(|activation| activation.detach())
            .collect();

        Self {
            layer_ids: layer_ids.to_vec(),
            activations,
        }
    }

    /// Layers the targets were extracted from.
    pub fn layer_ids(&self) -> &[usize] {
        &self.layer_ids
    }

    /// [Content loss](content_loss) of live activations taken at the same layers.
    pub fn loss(&self, live: &[Tensor<B, 4>]) -> Tensor<B, 1> {
        content_loss(live, &self.activations)
    }
}

/// Gram matrices of a fixed style image, detached from any autodiff graph.
#[derive(Debug, Clone)]
pub struct StyleTargets<B: Backend> {
    layer_ids: Vec<usize>,
    grams: Vec<Tensor<B, 3>>,
}

impl<B: Backend> StyleTargets<B> {
    /// Extract the Gram matrices of `image` at `layer_ids`.
    pub fn new<M: FeatureExtractor<B>>(model: &M, image: Tensor<B, 4>, layer_ids: &[usize]) -> Self {
        let grams = model
            .activations(image, layer_ids)
            .into_iter()
            .map(|activation| gram_matrix(activation).detach())
            .collect();

        Self {
            layer_ids: layer_ids.to_vec(),
            grams,
        }
    }

    /// Layers the targets were extracted from.
    pub fn layer_ids(&self) -> &[usize] {
        &self.layer_ids
    }

    /// [Style loss](style_loss) of live activations taken at the same layers.
    pub fn loss(&self, live: &[Tensor<B, 4>]) -> Tensor<B, 1> {
        style_loss(live, &self.grams)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Vgg16Config;
    use crate::{TestAutodiffBackend, TestBackend};
    use burn::tensor::{Distribution, TensorData, Tolerance};

    type TestTensor<const D: usize> = Tensor<TestBackend, D>;

    fn random<const D: usize>(shape: [usize; D]) -> TestTensor<D> {
        TestTensor::random(shape, Distribution::Uniform(-1.0, 1.0), &Default::default())
    }

    #[test]
    fn gram_matrix_values() {
        let device = Default::default();
        // Two channels over a 1x2 grid: [1, 2] and [3, 4].
        let activation = TestTensor::<4>::from_floats([[[[1.0, 2.0]], [[3.0, 4.0]]]], &device);

        let gram = gram_matrix(activation);

        let expected = TensorData::from([[[5.0, 11.0], [11.0, 25.0]]]);
        gram.into_data()
            .assert_approx_eq::<f32>(&expected, Tolerance::default());
    }

    #[test]
    fn gram_matrix_is_symmetric() {
        let gram = gram_matrix(random([1, 8, 5, 7]));

        assert_eq!(gram.dims(), [1, 8, 8]);
        gram.clone()
            .swap_dims(1, 2)
            .into_data()
            .assert_approx_eq::<f32>(&gram.into_data(), Tolerance::default());
    }

    #[test]
    fn gram_matrix_is_positive_semi_definite() {
        let gram = gram_matrix(random([1, 4, 3, 3]));
        let vector = random([1, 4, 1]);

        let quadratic = vector
            .clone()
            .swap_dims(1, 2)
            .matmul(gram)
            .matmul(vector)
            .into_scalar();

        assert!(quadratic >= -1e-4, "vᵀGv should be >= 0, got {quadratic}");
    }

    #[test]
    fn content_loss_is_mean_of_layer_mse() {
        let device = Default::default();
        let live = [
            TestTensor::<4>::full([1, 1, 2, 2], 1.0, &device),
            TestTensor::<4>::full([1, 2, 1, 1], 3.0, &device),
        ];
        let targets = [
            TestTensor::<4>::zeros([1, 1, 2, 2], &device),
            TestTensor::<4>::zeros([1, 2, 1, 1], &device),
        ];

        let loss = content_loss(&live, &targets);

        // (1 + 9) / 2
        loss.into_data()
            .assert_approx_eq::<f32>(&TensorData::from([5.0]), Tolerance::default());
    }

    #[test]
    fn style_loss_compares_grams() {
        let device = Default::default();
        let live = [TestTensor::<4>::from_floats([[[[1.0, 2.0]], [[3.0, 4.0]]]], &device)];
        let target = [TestTensor::<3>::from_floats([[[5.0, 11.0], [11.0, 21.0]]], &device)];

        let loss = style_loss(&live, &target);

        // Only the last entry differs, by 4: 16 / 4 entries.
        loss.into_data()
            .assert_approx_eq::<f32>(&TensorData::from([4.0]), Tolerance::default());
    }

    #[test]
    fn denoise_loss_values() {
        let device = Default::default();
        let image = TestTensor::<4>::from_floats([[[[0.0, 1.0], [3.0, 5.0]]]], &device);

        let loss = denoise_loss(image);

        // Vertical: |3 - 0| + |5 - 1|, horizontal: |1 - 0| + |5 - 3|.
        loss.into_data()
            .assert_approx_eq::<f32>(&TensorData::from([10.0]), Tolerance::default());
    }

    #[test]
    fn denoise_loss_of_flat_or_single_pixel_image_is_zero() {
        let device = Default::default();

        let flat = denoise_loss(TestTensor::<4>::full([1, 3, 4, 5], 128.0, &device));
        let single = denoise_loss(TestTensor::<4>::full([1, 3, 1, 1], 7.0, &device));

        assert_eq!(flat.into_scalar(), 0.0);
        assert_eq!(single.into_scalar(), 0.0);
    }

    #[test]
    fn losses_are_non_negative() {
        let live = [random([1, 3, 4, 4])];
        let targets = [random([1, 3, 4, 4])];
        let grams = [gram_matrix(random([1, 3, 4, 4]))];

        assert!(content_loss(&live, &targets).into_scalar() >= 0.0);
        assert!(style_loss(&live, &grams).into_scalar() >= 0.0);
        assert!(denoise_loss(random([1, 3, 4, 4])).into_scalar() >= 0.0);
    }

    #[test]
    fn targets_of_the_same_image_give_zero_loss() {
        let device = Default::default();
        let model = Vgg16Config::new().init::<TestBackend>(&device);
        let image = TestTensor::<4>::random([1, 3, 16, 16], Distribution::Uniform(0.0, 255.0), &device);
        let layers = [0, 3];

        let content = ContentTargets::new(&model, image.clone(), &layers);
        let style = StyleTargets::new(&model, image.clone(), &layers);
        let live = model.activations(image, &layers);

        assert_eq!(content.layer_ids(), &layers);
        assert_eq!(style.layer_ids(), &layers);
        assert_eq!(content.loss(&live).into_scalar(), 0.0);
        assert_eq!(style.loss(&live).into_scalar(), 0.0);
    }

    #[test]
    fn denoise_loss_gradient_reaches_the_image() {
        let device = Default::default();
        let image = Tensor::<TestAutodiffBackend, 4>::from_floats([[[[0.0, 1.0], [3.0, 5.0]]]], &device)
            .require_grad();

        let grads = denoise_loss(image.clone()).backward();
        let grad = image.grad(&grads).unwrap();

        // Each sample is pulled towards its neighbours: d/dx of the four absolute differences.
        let expected = TensorData::from([[[[-2.0, 0.0], [0.0, 2.0]]]]);
        grad.into_data()
            .assert_approx_eq::<f32>(&expected, Tolerance::default());
    }
}
