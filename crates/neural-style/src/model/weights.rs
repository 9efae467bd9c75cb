use std::fs::create_dir_all;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use burn::tensor::backend::Backend;

use super::Vgg16;
use crate::error::{Result, StyleTransferError};

const CACHE_DIR: &str = "neural-style";
const CACHE_FILE: &str = "vgg16.mpk";

/// Key remapping rules for loading torchvision VGG16 checkpoints.
///
/// torchvision numbers the `features` sequential including ReLU and pooling layers, the
/// module only numbers convolutions. Classifier weights are left unmatched and ignored.
pub const TORCHVISION_VGG16_KEY_REMAPS: &[(&str, &str)] = &[
    ("features\\.0\\.(.*)", "convs.0.$1"),
    ("features\\.2\\.(.*)", "convs.1.$1"),
    ("features\\.5\\.(.*)", "convs.2.$1"),
    ("features\\.7\\.(.*)", "convs.3.$1"),
    ("features\\.10\\.(.*)", "convs.4.$1"),
    ("features\\.12\\.(.*)", "convs.5.$1"),
    ("features\\.14\\.(.*)", "convs.6.$1"),
    ("features\\.17\\.(.*)", "convs.7.$1"),
    ("features\\.19\\.(.*)", "convs.8.$1"),
    ("features\\.21\\.(.*)", "convs.9.$1"),
    ("features\\.24\\.(.*)", "convs.10.$1"),
    ("features\\.26\\.(.*)", "convs.11.$1"),
    ("features\\.28\\.(.*)", "convs.12.$1"),
];

/// Where the pretrained VGG16 weights come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeightsSource {
    /// The per-user cache, `<cache dir>/neural-style/vgg16.mpk`.
    Cache,
    /// An explicit file: a Burn record (`.mpk`) or, with the `pytorch` feature, a torchvision
    /// checkpoint (`.pt`/`.pth`).
    File(PathBuf),
}

impl WeightsSource {
    /// Location of the cached weights.
    pub fn cache_path() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir().ok_or_else(|| {
            StyleTransferError::Resource("Could not get the user cache directory".to_string())
        })?;

        Ok(cache_dir.join(CACHE_DIR).join(CACHE_FILE))
    }

    /// Resolve the file the weights are read from.
    pub fn path(&self) -> Result<PathBuf> {
        match self {
            WeightsSource::Cache => Self::cache_path(),
            WeightsSource::File(path) => Ok(path.clone()),
        }
    }

    /// Load the weights into `model`.
    pub fn load<B: Backend>(&self, model: Vgg16<B>, device: &B::Device) -> Result<Vgg16<B>> {
        let path = self.path()?;

        if !path.exists() {
            let hint = match self {
                WeightsSource::Cache => {
                    "no cached weights, convert a torchvision checkpoint with --cache-weights"
                }
                WeightsSource::File(_) => "file not found",
            };
            return Err(StyleTransferError::input(path, hint));
        }

        log::info!("Loading VGG16 weights from {}", path.display());

        if is_pytorch_checkpoint(&path) {
            return load_pytorch(model, &path, device);
        }

        let record = NamedMpkFileRecorder::<FullPrecisionSettings>::new()
            .load(path.clone(), device)
            .map_err(|err| StyleTransferError::input(&path, err))?;

        Ok(model.load_record(record))
    }
}

/// Store `model` in the weights cache so later runs can use [WeightsSource::Cache].
pub fn save_to_cache<B: Backend>(model: Vgg16<B>) -> Result<PathBuf> {
    let path = WeightsSource::cache_path()?;

    if let Some(parent) = path.parent() {
        create_dir_all(parent).map_err(|err| StyleTransferError::Resource(err.to_string()))?;
    }

    model.save_file(path.clone(), &NamedMpkFileRecorder::<FullPrecisionSettings>::new())?;
    log::info!("Cached VGG16 weights at {}", path.display());

    Ok(path)
}

fn is_pytorch_checkpoint(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("pt") | Some("pth")
    )
}

#[cfg(feature = "pytorch")]
fn load_pytorch<B: Backend>(model: Vgg16<B>, path: &Path, device: &B::Device) -> Result<Vgg16<B>> {
    use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};

    let mut load_args = LoadArgs::new(path.to_path_buf());
    for (pattern, replacement) in TORCHVISION_VGG16_KEY_REMAPS {
        load_args = load_args.with_key_remap(pattern, replacement);
    }

    let record = PyTorchFileRecorder::<FullPrecisionSettings>::default()
        .load(load_args, device)
        .map_err(|err| StyleTransferError::input(path, err))?;

    Ok(model.load_record(record))
}

#[cfg(not(feature = "pytorch"))]
fn load_pytorch<B: Backend>(_model: Vgg16<B>, path: &Path, _device: &B::Device) -> Result<Vgg16<B>> {
    Err(StyleTransferError::input(
        path,
        "PyTorch checkpoints require the `pytorch` feature",
    ))
}
