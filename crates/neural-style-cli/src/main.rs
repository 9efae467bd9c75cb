mod cli;
mod logging;

use anyhow::Context;
use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};
use burn::config::Config;
use clap::Parser;
use neural_style::model::save_to_cache;
use neural_style::{
    load_image, save_preview, IterationReport, StyleTransfer, Vgg16Config, WeightsSource,
};

use crate::cli::Args;

type Backend = Autodiff<NdArray<f32>>;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::install_logger(args.verbose, args.log_file.as_deref())?;

    let config = args.run_config()?;
    if let Some(path) = &args.save_config {
        config
            .save(path)
            .with_context(|| format!("Failed to write the configuration to '{}'", path.display()))?;
    }

    let device = NdArrayDevice::Cpu;

    let mut content = load_image(&args.content, args.resize)?;
    if let Some(ratio) = args.crop_ratio {
        content = content.center_crop(ratio)?;
    }
    let style = load_image(&args.style, None)?;
    log::info!(
        "Content {}x{}, style {}x{}",
        content.width(),
        content.height(),
        style.width(),
        style.height()
    );

    let source = match &args.weights {
        Some(path) => WeightsSource::File(path.clone()),
        None => WeightsSource::Cache,
    };
    let model = source.load(Vgg16Config::new().init::<Backend>(&device), &device)?;
    if args.cache_weights {
        save_to_cache(model.clone())?;
    }

    let log_every = args.log_every.max(1);
    let transfer = StyleTransfer::new(model, &content, &style, config, &device)?;
    let mixed = transfer.run_with(|report| log_progress(report, log_every, args.verbose))?;

    mixed.save(&args.output)?;
    log::info!("Wrote {}", args.output.display());

    if let Some(path) = &args.preview {
        save_preview(&content, &mixed, &style, path)?;
        log::info!("Wrote preview {}", path.display());
    }

    Ok(())
}

fn log_progress(report: &IterationReport, every: usize, verbose: bool) {
    let losses = &report.losses;
    let adjustments = &report.adjustments;

    if should_log(report.iteration, every, verbose) {
        log::info!(
            "Iteration {:>4} | content {:.4e} (adj {:.2e}) | style {:.4e} (adj {:.2e}) | denoise {:.4e} (adj {:.2e}) | step {:.3e}",
            report.iteration + 1,
            losses.content,
            adjustments.content,
            losses.style,
            adjustments.style,
            losses.denoise,
            adjustments.denoise,
            report.step,
        );
    }
}

/// Log every `every`-th completed iteration, or all of them when verbose.
fn should_log(iteration: usize, every: usize, verbose: bool) -> bool {
    verbose || (iteration + 1) % every == 0
}
