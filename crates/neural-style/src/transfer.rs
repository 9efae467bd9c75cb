use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use burn::module::Module;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::StyleTransferConfig;
use crate::error::{Result, StyleTransferError};
use crate::images::{Image, CHANNELS};
use crate::loss::{denoise_loss, ContentTargets, StyleTargets};
use crate::model::{FeatureExtractor, Vgg16};
use crate::weighting::{AdjustmentWeights, LossValues};

/// Added to the gradient's standard deviation before dividing the step size by it.
const STD_EPSILON: f64 = 1e-8;

/// Mixed image noise is uniform in `[MIXED_BASE, MIXED_BASE + 1)`.
const MIXED_BASE: f32 = 128.0;

/// Cooperative cancellation of a [style transfer](StyleTransfer), checked before each
/// iteration.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the run to stop before its next iteration.
    pub fn cancel(&self) {
        self.state.store(true, Ordering::Relaxed);
    }

    /// True if [cancel](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Relaxed)
    }
}

/// What happened during one iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationReport {
    /// Zero-based iteration index.
    pub iteration: usize,
    /// Losses of the mixed image before the update.
    pub losses: LossValues,
    /// Adjustment weights that scaled this iteration's combined loss.
    pub applied: AdjustmentWeights,
    /// Adjustment weights derived from this iteration's losses, applied at the next one.
    pub adjustments: AdjustmentWeights,
    /// Multiplier applied to the gradient.
    pub step: f64,
}

/// Optimizes a mixed image so that it has the content of one image and the style of another.
///
/// The feature model is owned for the duration of the run and dropped with it, whether the
/// run completes or fails.
pub struct StyleTransfer<B: AutodiffBackend, M = Vgg16<B>> {
    model: M,
    config: StyleTransferConfig,
    content: ContentTargets<B>,
    style: StyleTargets<B>,
    /// Content layers followed by style layers, requested in a single forward pass.
    layer_ids: Vec<usize>,
    mixed: Tensor<B::InnerBackend, 4>,
    adjustments: AdjustmentWeights,
    iteration: usize,
    cancellation: CancellationToken,
}

impl<B, M> StyleTransfer<B, M>
where
    B: AutodiffBackend,
    M: FeatureExtractor<B> + Module<B>,
{
    /// Validate the configuration, extract the fixed targets and create the mixed image.
    ///
    /// The mixed image has the content image's shape; the style image may have any shape.
    pub fn new(
        model: M,
        content: &Image,
        style: &Image,
        config: StyleTransferConfig,
        device: &B::Device,
    ) -> Result<Self> {
        config.validate(model.layer_count())?;

        let all_layers = [
            config.content_layer_ids.as_slice(),
            config.style_layer_ids.as_slice(),
        ]
        .concat();
        check_size(&model, "content", content, &all_layers)?;
        check_size(&model, "style", style, &config.style_layer_ids)?;

        let model = model.no_grad();

        log::info!(
            "Content layers: {:?}",
            model.layer_names(&config.content_layer_ids)
        );
        log::info!("Style layers: {:?}", model.layer_names(&config.style_layer_ids));

        let content_targets =
            ContentTargets::new(&model, content.to_tensor(device), &config.content_layer_ids);
        let style_targets = StyleTargets::new(&model, style.to_tensor(device), &config.style_layer_ids);

        let mixed = initial_noise(content.height(), content.width(), config.seed)?
            .to_tensor::<B::InnerBackend>(device);

        Ok(Self {
            model,
            config,
            content: content_targets,
            style: style_targets,
            layer_ids: all_layers,
            mixed,
            adjustments: AdjustmentWeights::INITIAL,
            iteration: 0,
            cancellation: CancellationToken::new(),
        })
    }

    /// Use `token` to cancel the run from elsewhere.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Token cancelling this run.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Number of completed iterations.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// True once every configured iteration has run.
    pub fn is_finished(&self) -> bool {
        self.iteration >= self.config.num_iterations
    }

    /// Snapshot of the current mixed image.
    pub fn mixed_image(&self) -> Result<Image> {
        Image::from_tensor(self.mixed.clone())
    }

    /// Run every iteration and return the mixed image.
    pub fn run(self) -> Result<Image> {
        self.run_with(|_| {})
    }

    /// Run every iteration, reporting each one to `observer`, and return the mixed image.
    ///
    /// Nothing is returned on failure: the mixed image is dropped with the run.
    pub fn run_with<F>(mut self, mut observer: F) -> Result<Image>
    where
        F: FnMut(&IterationReport),
    {
        log::info!(
            "Optimizing a {}x{} image for {} iterations",
            self.mixed.dims()[3],
            self.mixed.dims()[2],
            self.config.num_iterations
        );

        while !self.is_finished() {
            let report = self.step()?;
            observer(&report);
        }

        log::info!("Style transfer done after {} iterations", self.iteration);
        Image::from_tensor(self.mixed)
    }

    /// One gradient step on the mixed image.
    fn step(&mut self) -> Result<IterationReport> {
        let iteration = self.iteration;
        if self.cancellation.is_cancelled() {
            return Err(StyleTransferError::Cancelled { iteration });
        }

        let input = Tensor::<B, 4>::from_inner(self.mixed.clone()).require_grad();

        let mut content_features = self.model.activations(input.clone(), &self.layer_ids);
        let style_features = content_features.split_off(self.content.layer_ids().len());

        let content = self.content.loss(&content_features);
        let style = self.style.loss(&style_features);
        let denoise = denoise_loss(input.clone());

        let losses = LossValues {
            content: scalar(&content),
            style: scalar(&style),
            denoise: scalar(&denoise),
        };
        if let Some((quantity, value)) = losses.first_non_finite() {
            return Err(StyleTransferError::NumericInstability {
                iteration,
                quantity,
                value,
            });
        }

        // Weights measured at the previous iteration; no gradient flows through them.
        let applied = self.adjustments;
        let combined = content.mul_scalar(self.config.weight_content * applied.content)
            + style.mul_scalar(self.config.weight_style * applied.style)
            + denoise.mul_scalar(self.config.weight_denoise * applied.denoise);

        let grads = combined.backward();
        let gradient = input.grad(&grads).ok_or_else(|| {
            StyleTransferError::Resource("the mixed image received no gradient".to_string())
        })?;

        // A non-finite gradient sample makes the deviation non-finite as well.
        let std = scalar(&gradient.clone().flatten::<1>(0, 3).var_bias(0).sqrt());
        if !std.is_finite() {
            return Err(StyleTransferError::NumericInstability {
                iteration,
                quantity: "gradient standard deviation",
                value: std,
            });
        }
        let step = self.config.step_size / (std + STD_EPSILON);

        self.mixed = self
            .mixed
            .clone()
            .sub(gradient.mul_scalar(step))
            .clamp(0.0, 255.0);
        let adjustments = AdjustmentWeights::from_losses(&losses);
        self.adjustments = adjustments;
        self.iteration += 1;

        log::trace!(
            "Iteration {iteration}: content {:.4e}, style {:.4e}, denoise {:.4e}, step {:.4e}",
            losses.content,
            losses.style,
            losses.denoise,
            step
        );

        Ok(IterationReport {
            iteration,
            losses,
            applied,
            adjustments,
            step,
        })
    }
}

/// Reject images too small to reach the deepest requested layer.
fn check_size<B: Backend, M: FeatureExtractor<B>>(
    model: &M,
    name: &str,
    image: &Image,
    layer_ids: &[usize],
) -> Result<()> {
    let Some(deepest) = layer_ids.iter().copied().max() else {
        return Ok(());
    };
    let factor = model.downsampling(deepest);

    if image.height() < factor || image.width() < factor {
        return Err(StyleTransferError::Config(format!(
            "the {name} image ({}x{}) is too small for layer {deepest}, which needs at least {factor}x{factor}",
            image.width(),
            image.height()
        )));
    }

    Ok(())
}

/// Uniform noise just above mid-gray.
fn initial_noise(height: usize, width: usize, seed: Option<u64>) -> Result<Image> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let data = (0..height * width * CHANNELS)
        .map(|_| MIXED_BASE + rng.random::<f32>())
        .collect();

    Image::new(height, width, data)
}

fn scalar<B: Backend, const D: usize>(tensor: &Tensor<B, D>) -> f64 {
    tensor.clone().into_scalar().elem::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Vgg16Config;
    use crate::TestAutodiffBackend;

    type B = TestAutodiffBackend;

    fn transfer(content: &Image, style: &Image, config: StyleTransferConfig) -> StyleTransfer<B> {
        let device = Default::default();
        let model = Vgg16Config::new().init::<B>(&device);

        StyleTransfer::new(model, content, style, config, &device).unwrap()
    }

    fn config() -> StyleTransferConfig {
        StyleTransferConfig::new(vec![0], vec![0, 1])
            .with_num_iterations(3)
            .with_seed(Some(1))
    }

    #[test]
    fn initial_noise_is_just_above_mid_gray() {
        let noise = initial_noise(6, 5, Some(3)).unwrap();

        assert_eq!(noise.dims(), [6, 5, 3]);
        assert!(noise.samples().iter().all(|v| (128.0..129.0).contains(v)));
        assert_eq!(noise, initial_noise(6, 5, Some(3)).unwrap());
        assert_ne!(noise, initial_noise(6, 5, Some(4)).unwrap());
    }

    #[test]
    fn mixed_image_has_the_content_shape() {
        let content = Image::filled(12, 20, 100.0);
        let style = Image::filled(30, 7, 200.0);

        let transfer = transfer(&content, &style, config());

        assert_eq!(transfer.mixed_image().unwrap().dims(), [12, 20, 3]);
    }

    #[test]
    fn pixels_stay_in_range_after_every_iteration() {
        let content = Image::filled(8, 8, 0.0);
        let style = Image::filled(8, 8, 255.0);
        let mut transfer = transfer(&content, &style, config().with_step_size(1000.0));

        while !transfer.is_finished() {
            let report = transfer.step().unwrap();

            assert!(report.step.is_finite() && report.step > 0.0);
            let mixed = transfer.mixed_image().unwrap();
            assert!(mixed.samples().iter().all(|v| (0.0..=255.0).contains(v)));
        }
        assert_eq!(transfer.iteration(), 3);
    }

    #[test]
    fn reports_carry_matching_adjustments() {
        let content = Image::filled(8, 8, 60.0);
        let style = Image::filled(8, 8, 190.0);
        let mut reports = Vec::new();

        transfer(&content, &style, config())
            .run_with(|report| reports.push(report.clone()))
            .unwrap();

        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].applied, AdjustmentWeights::INITIAL);
        for (index, report) in reports.iter().enumerate() {
            assert_eq!(report.iteration, index);
            assert_eq!(report.adjustments, AdjustmentWeights::from_losses(&report.losses));
            if index > 0 {
                assert_eq!(report.applied, reports[index - 1].adjustments);
            }
            assert!(report.losses.content >= 0.0);
            assert!(report.losses.style >= 0.0);
            assert!(report.losses.denoise >= 0.0);
        }
    }

    #[test]
    fn cancelled_run_produces_nothing() {
        let content = Image::filled(8, 8, 60.0);
        let style = Image::filled(8, 8, 190.0);
        let token = CancellationToken::new();

        let transfer = transfer(&content, &style, config()).with_cancellation(token.clone());
        token.cancel();

        match transfer.run() {
            Err(StyleTransferError::Cancelled { iteration }) => assert_eq!(iteration, 0),
            other => panic!("Expected cancellation, got {other:?}"),
        }
    }

    #[test]
    fn overflowing_loss_aborts_the_run() {
        let content = Image::filled(8, 8, 60.0);
        let style = Image::filled(8, 8, 190.0);
        let mut reports = 0;

        let result = transfer(&content, &style, config().with_weight_style(1e308))
            .run_with(|_| reports += 1);

        match result {
            Err(StyleTransferError::NumericInstability { iteration, .. }) => {
                assert_eq!(iteration, 0)
            }
            other => panic!("Expected a numeric instability, got {other:?}"),
        }
        assert_eq!(reports, 0);
    }

    #[test]
    fn invalid_config_fails_before_optimization() {
        let device = Default::default();
        let model = Vgg16Config::new().init::<B>(&device);
        let image = Image::filled(8, 8, 1.0);

        let result = StyleTransfer::new(
            model,
            &image,
            &image,
            StyleTransferConfig::new(vec![0], vec![13]),
            &device,
        );

        assert!(matches!(result, Err(StyleTransferError::Config(_))));
    }

    #[test]
    fn images_too_small_for_the_layers_are_rejected() {
        let device = Default::default();
        let model = Vgg16Config::new().init::<B>(&device);
        let content = Image::filled(32, 32, 1.0);
        let style = Image::filled(4, 4, 1.0);

        // conv4_1 sits behind three poolings.
        let result = StyleTransfer::new(
            model,
            &content,
            &style,
            StyleTransferConfig::new(vec![0], vec![7]),
            &device,
        );

        match result {
            Err(StyleTransferError::Config(message)) => assert!(message.contains("style")),
            Err(other) => panic!("Expected a config error, got {other:?}"),
            Ok(_) => panic!("Expected a config error"),
        }
    }
}
