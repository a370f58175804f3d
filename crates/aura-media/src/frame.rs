//! Frame type and geometry helpers.
//!
//! Pixels are `H x W x 3` RGB arrays in standard (row-major) layout.

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::{concatenate, Array3, Axis};

use aura_models::LayoutMode;

use crate::error::{MediaError, MediaResult};

/// Edge length above which source frames are scaled down before inference.
pub const DEFAULT_FRAME_LIMIT: u32 = 1280;

/// Smallest edge the style models accept.
pub const MIN_MODEL_EDGE: u32 = 256;

/// One decoded image of a video, moved between stages and never shared.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Zero-based position in the source stream
    pub index: u64,
    pub pixels: Array3<u8>,
}

impl Frame {
    pub fn new(index: u64, pixels: Array3<u8>) -> Self {
        Self { index, pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.dim().1 as u32
    }

    pub fn height(&self) -> u32 {
        self.pixels.dim().0 as u32
    }

    /// `(width, height)`
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    /// Replace the pixels, keeping the index.
    pub fn map_pixels(self, f: impl FnOnce(Array3<u8>) -> MediaResult<Array3<u8>>) -> MediaResult<Self> {
        Ok(Self {
            index: self.index,
            pixels: f(self.pixels)?,
        })
    }
}

/// Alignment multiple for a model variant: the `tiny` generators need 16.
pub fn alignment_for(model_name: &str) -> u32 {
    if model_name.to_lowercase().contains("tiny") {
        16
    } else {
        8
    }
}

/// Round `edge` down to `multiple`, never below [`MIN_MODEL_EDGE`].
pub fn align_edge(edge: u32, multiple: u32) -> u32 {
    if edge < MIN_MODEL_EDGE {
        MIN_MODEL_EDGE
    } else {
        edge - edge % multiple
    }
}

/// Model input size for a still image: alignment only, no limit scaling.
pub fn aligned_dimensions(width: u32, height: u32, model_name: &str) -> (u32, u32) {
    let multiple = alignment_for(model_name);
    (align_edge(width, multiple), align_edge(height, multiple))
}

/// Model input size for video frames.
///
/// Sources whose longer edge exceeds `limit` are scaled down proportionally
/// (rounding down) before alignment.
pub fn target_dimensions(width: u32, height: u32, limit: u32, model_name: &str) -> (u32, u32) {
    let max_edge = width.max(height);
    let (w, h) = if limit > 0 && max_edge > limit {
        let scale = |edge: u32| (u64::from(edge) * u64::from(limit) / u64::from(max_edge)) as u32;
        (scale(width), scale(height))
    } else {
        (width, height)
    };
    aligned_dimensions(w, h, model_name)
}

/// Convert an RGB image into an `H x W x 3` array.
pub fn image_to_array(img: RgbImage) -> MediaResult<Array3<u8>> {
    let (w, h) = img.dimensions();
    Array3::from_shape_vec((h as usize, w as usize, 3), img.into_raw())
        .map_err(|e| MediaError::internal(format!("image buffer shape: {e}")))
}

/// Convert an `H x W x 3` array into an RGB image.
pub fn array_to_image(pixels: &Array3<u8>) -> MediaResult<RgbImage> {
    let (h, w, c) = pixels.dim();
    if c != 3 {
        return Err(MediaError::UnsupportedChannels(c));
    }
    let raw = pixels.as_standard_layout().iter().copied().collect::<Vec<u8>>();
    RgbImage::from_raw(w as u32, h as u32, raw)
        .ok_or_else(|| MediaError::internal("pixel buffer shorter than frame"))
}

/// Resize with a Lanczos kernel. Frames already at the target size are returned untouched.
pub fn resize_lanczos(pixels: Array3<u8>, width: u32, height: u32) -> MediaResult<Array3<u8>> {
    let (h, w, _) = pixels.dim();
    if w as u32 == width && h as u32 == height {
        return Ok(pixels);
    }
    let img = array_to_image(&pixels)?;
    image_to_array(imageops::resize(&img, width, height, FilterType::Lanczos3))
}

/// Arrange the original and generated frames according to `layout`.
pub fn arrange(
    layout: LayoutMode,
    original: &Array3<u8>,
    generated: Array3<u8>,
) -> MediaResult<Array3<u8>> {
    let axis = match layout {
        LayoutMode::None => return Ok(generated),
        LayoutMode::Horizontal => Axis(1),
        LayoutMode::Vertical => Axis(0),
    };
    concatenate(axis, &[original.view(), generated.view()])
        .map_err(|e| MediaError::internal(format!("frame concatenation: {e}")))
}
