use std::path::PathBuf;

use anyhow::anyhow;
use burn::config::Config;
use clap::Parser;
use neural_style::StyleTransferConfig;

/// conv1_1, conv1_2 and conv2_1.
const DEFAULT_CONTENT_LAYERS: [usize; 3] = [0, 1, 2];
/// conv4_1 through conv5_3.
const DEFAULT_STYLE_LAYERS: [usize; 6] = [7, 8, 9, 10, 11, 12];

/// Paint the content of one image in the style of another.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Image supplying the structure to keep
    #[arg(long)]
    pub content: PathBuf,

    /// Image supplying the texture and colors
    #[arg(long)]
    pub style: PathBuf,

    /// Where to write the result, the format follows the extension
    #[arg(long, short)]
    pub output: PathBuf,

    /// JSON run configuration, the options below override its fields
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write the effective run configuration to this file
    #[arg(long)]
    pub save_config: Option<PathBuf>,

    /// Content layers (VGG16 convolutions, 0 = conv1_1 .. 12 = conv5_3) [default: 0,1,2]
    #[arg(long, value_delimiter = ',')]
    pub content_layers: Option<Vec<usize>>,

    /// Style layers (VGG16 convolutions, 0 = conv1_1 .. 12 = conv5_3) [default: 7,8,9,10,11,12]
    #[arg(long, value_delimiter = ',')]
    pub style_layers: Option<Vec<usize>>,

    /// Weight of the content loss [default: 1.5]
    #[arg(long)]
    pub weight_content: Option<f64>,

    /// Weight of the style loss [default: 10.0]
    #[arg(long)]
    pub weight_style: Option<f64>,

    /// Weight of the denoise loss [default: 0.3]
    #[arg(long)]
    pub weight_denoise: Option<f64>,

    /// Number of gradient steps [default: 120]
    #[arg(long)]
    pub iterations: Option<usize>,

    /// Base step size [default: 10.0]
    #[arg(long)]
    pub step_size: Option<f64>,

    /// Seed of the initial noise
    #[arg(long)]
    pub seed: Option<u64>,

    /// Resize the content image to WIDTHxHEIGHT before the run
    #[arg(long, value_parser = parse_size)]
    pub resize: Option<(u32, u32)>,

    /// Crop the content image to the centered band with this width / height ratio
    #[arg(long)]
    pub crop_ratio: Option<f32>,

    /// VGG16 weights (.mpk, or .pt/.pth with the `pytorch` feature) [default: user cache]
    #[arg(long)]
    pub weights: Option<PathBuf>,

    /// Store the loaded weights in the user cache for later runs
    #[arg(long)]
    pub cache_weights: bool,

    /// Also write content, result and style side by side to this file
    #[arg(long)]
    pub preview: Option<PathBuf>,

    /// Log the losses every N iterations
    #[arg(long, default_value_t = 10)]
    pub log_every: usize,

    /// Also write logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Log every iteration
    #[arg(long, short)]
    pub verbose: bool,
}

impl Args {
    /// The run configuration: the `--config` file, or the defaults, with overrides applied.
    pub fn run_config(&self) -> anyhow::Result<StyleTransferConfig> {
        let mut config = match &self.config {
            Some(path) => StyleTransferConfig::load(path)
                .map_err(|err| anyhow!("Failed to load '{}': {err:?}", path.display()))?,
            None => StyleTransferConfig::new(
                DEFAULT_CONTENT_LAYERS.to_vec(),
                DEFAULT_STYLE_LAYERS.to_vec(),
            ),
        };

        if let Some(layers) = &self.content_layers {
            config.content_layer_ids = layers.clone();
        }
        if let Some(layers) = &self.style_layers {
            config.style_layer_ids = layers.clone();
        }
        if let Some(weight) = self.weight_content {
            config.weight_content = weight;
        }
        if let Some(weight) = self.weight_style {
            config.weight_style = weight;
        }
        if let Some(weight) = self.weight_denoise {
            config.weight_denoise = weight;
        }
        if let Some(iterations) = self.iterations {
            config.num_iterations = iterations;
        }
        if let Some(step_size) = self.step_size {
            config.step_size = step_size;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }

        Ok(config)
    }
}

fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{value}'"))?;
    let width = width
        .parse()
        .map_err(|err| format!("invalid width '{width}': {err}"))?;
    let height = height
        .parse()
        .map_err(|err| format!("invalid height '{height}': {err}"))?;

    Ok((width, height))
}
