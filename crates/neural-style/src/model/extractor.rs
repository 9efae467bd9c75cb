use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// A fixed network exposing intermediate activations by layer identifier.
///
/// Layer identifiers are the integers `0..layer_count()`, ordered from the input towards the
/// output. When `B` is an autodiff backend, the returned activations are differentiable with
/// respect to the input image.
pub trait FeatureExtractor<B: Backend> {
    /// Number of layers that can be requested.
    fn layer_count(&self) -> usize;

    /// Human readable name of a layer, `None` when the identifier is out of range.
    fn layer_name(&self, layer_id: usize) -> Option<&'static str>;

    /// Factor by which the spatial size is divided at the given layer.
    ///
    /// Inputs smaller than this factor in either dimension produce empty activations.
    fn downsampling(&self, layer_id: usize) -> usize;

    /// Run the network on `image` and return one activation per requested layer.
    ///
    /// # Shapes
    ///
    /// - image: `[batch, 3, H, W]` with values in `[0, 255]`
    /// - output: `[batch, C_l, H_l, W_l]` per requested layer, in request order
    ///
    /// # Panics
    ///
    /// If a requested layer is out of range.
    fn activations(&self, image: Tensor<B, 4>, layer_ids: &[usize]) -> Vec<Tensor<B, 4>>;

    /// Names of the given layers, in order. Unknown layers are reported as `"?"`.
    fn layer_names(&self, layer_ids: &[usize]) -> Vec<&'static str> {
        layer_ids
            .iter()
            .map(|id| self.layer_name(*id).unwrap_or("?"))
            .collect()
    }
}
