use std::fs;
use std::path::Path;

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::error::{Result, StyleTransferError};

/// Number of channels of every image handled by the crate.
pub const CHANNELS: usize = 3;

/// An RGB image stored as `f32` samples, row major, `[height, width, channel]`.
///
/// Samples are nominally in `[0, 255]`; only [saving](Image::save) clips them.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    height: usize,
    width: usize,
    data: Vec<f32>,
}

impl Image {
    /// Create an image from `[height, width, 3]` samples.
    pub fn new(height: usize, width: usize, data: Vec<f32>) -> Result<Self> {
        if height == 0 || width == 0 {
            return Err(StyleTransferError::Config(format!(
                "images must not be empty, got {height}x{width}"
            )));
        }
        if data.len() != height * width * CHANNELS {
            return Err(StyleTransferError::Config(format!(
                "expected {} samples for a {height}x{width} image, got {}",
                height * width * CHANNELS,
                data.len()
            )));
        }

        Ok(Self {
            height,
            width,
            data,
        })
    }

    /// An image where every sample is `value`.
    pub fn filled(height: usize, width: usize, value: f32) -> Self {
        Self {
            height,
            width,
            data: vec![value; height * width * CHANNELS],
        }
    }

    /// `[height, width, channels]`.
    pub fn dims(&self) -> [usize; 3] {
        [self.height, self.width, CHANNELS]
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Raw samples, `[height, width, channel]` order.
    pub fn samples(&self) -> &[f32] {
        &self.data
    }

    /// Mean of all samples.
    pub fn mean(&self) -> f64 {
        self.data.iter().map(|v| *v as f64).sum::<f64>() / self.data.len() as f64
    }

    /// Convert to a `[1, 3, H, W]` tensor.
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 4> {
        let data = TensorData::new(self.data.clone(), [self.height, self.width, CHANNELS]);

        Tensor::<B, 3>::from_data(data, device)
            .permute([2, 0, 1])
            .unsqueeze::<4>()
    }

    /// Convert back from a `[1, 3, H, W]` tensor.
    pub fn from_tensor<B: Backend>(tensor: Tensor<B, 4>) -> Result<Self> {
        let [_, _, height, width] = tensor.dims();
        let data = tensor
            .permute([0, 2, 3, 1])
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|err| StyleTransferError::Resource(format!("{err:?}")))?;

        Self::new(height, width, data)
    }

    /// Clip to `[0, 255]` and quantize to 8 bits per channel.
    pub fn to_rgb8(&self) -> RgbImage {
        let pixels = self
            .data
            .iter()
            .map(|value| value.clamp(0.0, 255.0) as u8)
            .collect();

        RgbImage::from_raw(self.width as u32, self.height as u32, pixels)
            .expect("Sample count matches the image dimensions")
    }

    fn from_rgb8(image: &RgbImage) -> Self {
        Self {
            height: image.height() as usize,
            width: image.width() as usize,
            data: image.as_raw().iter().map(|value| *value as f32).collect(),
        }
    }

    /// Resample to `width` x `height`.
    pub fn resize(&self, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(StyleTransferError::Config(format!(
                "cannot resize to {width}x{height}"
            )));
        }
        let resized = imageops::resize(&self.to_rgb8(), width, height, FilterType::CatmullRom);

        Ok(Self::from_rgb8(&resized))
    }

    /// Keep the full width and the vertically centered band of height `width / ratio`.
    pub fn center_crop(&self, ratio: f32) -> Result<Self> {
        let new_height = (self.width as f32 / ratio) as usize;
        if !(ratio.is_finite() && ratio > 0.0) || new_height == 0 || new_height > self.height {
            return Err(StyleTransferError::Config(format!(
                "cannot crop a {}x{} image to a {ratio} aspect ratio",
                self.height, self.width
            )));
        }

        let top = self.height / 2 - new_height / 2;
        let row = self.width * CHANNELS;
        let data = self.data[top * row..(top + new_height) * row].to_vec();

        Self::new(new_height, self.width, data)
    }

    /// Encode and write the image, the format follows the file extension.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| StyleTransferError::Output {
                    path: path.to_path_buf(),
                    source: err.into(),
                })?;
            }
        }

        self.to_rgb8()
            .save(path)
            .map_err(|source| StyleTransferError::Output {
                path: path.to_path_buf(),
                source,
            })
    }
}

/// Read and decode an RGB image, optionally resized to `(width, height)`.
pub fn load_image<P: AsRef<Path>>(path: P, resize: Option<(u32, u32)>) -> Result<Image> {
    let path = path.as_ref();
    let decoded = image::open(path)
        .map_err(|err| StyleTransferError::input(path, err))?
        .to_rgb8();

    let decoded = match resize {
        Some((width, height)) => imageops::resize(&decoded, width, height, FilterType::CatmullRom),
        None => decoded,
    };

    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(StyleTransferError::input(path, "image is empty"));
    }

    Ok(Image::from_rgb8(&decoded))
}

/// Write content, mixed and style images side by side, top aligned.
pub fn save_preview<P: AsRef<Path>>(
    content: &Image,
    mixed: &Image,
    style: &Image,
    path: P,
) -> Result<()> {
    let panels = [content.to_rgb8(), mixed.to_rgb8(), style.to_rgb8()];
    let width = panels.iter().map(|panel| panel.width()).sum();
    let height = panels.iter().map(|panel| panel.height()).max().unwrap_or(0);

    let mut canvas = RgbImage::new(width, height);
    let mut x = 0;
    for panel in panels.iter() {
        imageops::replace(&mut canvas, panel, x, 0);
        x += panel.width() as i64;
    }

    Image::from_rgb8(&canvas).save(path)
}
