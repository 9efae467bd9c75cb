use burn::config::Config;

use crate::error::StyleTransferError;

/// Configuration of a [style transfer](crate::StyleTransfer) run.
///
/// Layer identifiers index the convolution layers of the [feature model](crate::FeatureExtractor),
/// `0` being the shallowest. Content layers are usually shallow, style layers deeper.
///
/// # Example
///
/// ```ignore
/// let config = StyleTransferConfig::new(vec![4], vec![1, 2, 3, 4])
///     .with_num_iterations(200)
///     .with_seed(Some(42));
/// ```
#[derive(Config, Debug)]
pub struct StyleTransferConfig {
    /// Layers supplying the content targets.
    pub content_layer_ids: Vec<usize>,

    /// Layers supplying the style targets.
    pub style_layer_ids: Vec<usize>,

    /// Relative importance of the content loss.
    #[config(default = 1.5)]
    pub weight_content: f64,

    /// Relative importance of the style loss.
    #[config(default = 10.0)]
    pub weight_style: f64,

    /// Relative importance of the denoise loss.
    #[config(default = 0.3)]
    pub weight_denoise: f64,

    /// Number of gradient steps.
    #[config(default = 120)]
    pub num_iterations: usize,

    /// Base step magnitude, before normalization by the gradient's standard deviation.
    #[config(default = 10.0)]
    pub step_size: f64,

    /// Seed of the mixed image noise. Drawn from the OS when unset.
    #[config(default = "None")]
    pub seed: Option<u64>,
}

impl StyleTransferConfig {
    /// Check the configuration against a feature model exposing `layer_count` layers.
    ///
    /// Nothing is clamped: the first invalid field is reported as
    /// [StyleTransferError::Config].
    pub fn validate(&self, layer_count: usize) -> crate::error::Result<()> {
        check_layers("content", &self.content_layer_ids, layer_count)?;
        check_layers("style", &self.style_layer_ids, layer_count)?;

        check_positive("weight_content", self.weight_content)?;
        check_positive("weight_style", self.weight_style)?;
        check_positive("weight_denoise", self.weight_denoise)?;
        check_positive("step_size", self.step_size)?;

        if self.num_iterations == 0 {
            return Err(StyleTransferError::Config(
                "num_iterations must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

fn check_layers(kind: &str, ids: &[usize], layer_count: usize) -> crate::error::Result<()> {
    if ids.is_empty() {
        return Err(StyleTransferError::Config(format!(
            "at least one {kind} layer is required"
        )));
    }

    match ids.iter().find(|id| **id >= layer_count) {
        Some(id) => Err(StyleTransferError::Config(format!(
            "{kind} layer {id} is out of range, the feature model has {layer_count} layers"
        ))),
        None => Ok(()),
    }
}

fn check_positive(name: &str, value: f64) -> crate::error::Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(StyleTransferError::Config(format!(
            "{name} must be a positive number, got {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StyleTransferConfig {
        StyleTransferConfig::new(vec![0, 1, 2], vec![7, 8, 9, 10, 11, 12])
    }

    #[test]
    fn defaults_match_documented_constants() {
        let config = config();

        assert_eq!(config.weight_content, 1.5);
        assert_eq!(config.weight_style, 10.0);
        assert_eq!(config.weight_denoise, 0.3);
        assert_eq!(config.num_iterations, 120);
        assert_eq!(config.step_size, 10.0);
        assert_eq!(config.seed, None);
    }

    #[test]
    fn valid_config_passes() {
        assert!(config().validate(13).is_ok());
    }

    #[test]
    fn out_of_range_layer_is_rejected() {
        let result = StyleTransferConfig::new(vec![0], vec![12, 13]).validate(13);

        match result {
            Err(StyleTransferError::Config(message)) => assert!(message.contains("13")),
            other => panic!("Expected a config error, got {other:?}"),
        }
    }

    #[test]
    fn empty_layers_are_rejected() {
        assert!(StyleTransferConfig::new(vec![], vec![1]).validate(13).is_err());
        assert!(StyleTransferConfig::new(vec![1], vec![]).validate(13).is_err());
    }

    #[test]
    fn non_positive_numbers_are_rejected() {
        assert!(config().with_weight_content(0.0).validate(13).is_err());
        assert!(config().with_weight_style(-1.0).validate(13).is_err());
        assert!(config().with_weight_denoise(f64::NAN).validate(13).is_err());
        assert!(config().with_step_size(0.0).validate(13).is_err());
        assert!(config().with_num_iterations(0).validate(13).is_err());
    }

    #[test]
    fn config_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = config().with_seed(Some(7)).with_num_iterations(3);

        config.save(&path).unwrap();
        let loaded = StyleTransferConfig::load(&path).unwrap();

        assert_eq!(loaded.content_layer_ids, config.content_layer_ids);
        assert_eq!(loaded.style_layer_ids, config.style_layer_ids);
        assert_eq!(loaded.num_iterations, 3);
        assert_eq!(loaded.seed, Some(7));
    }
}
