//! Still image decode/encode.

use std::path::Path;

use ndarray::Array3;

use crate::error::{MediaError, MediaResult};
use crate::frame::{array_to_image, image_to_array};

/// Decode any supported image into RGB pixels. Alpha is dropped.
pub fn read_image(path: &Path) -> MediaResult<Array3<u8>> {
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }
    image_to_array(image::open(path)?.to_rgb8())
}

/// Encode pixels to `path`, choosing the format from its extension.
pub fn write_image(path: &Path, pixels: &Array3<u8>) -> MediaResult<()> {
    array_to_image(pixels)?.save(path)?;
    Ok(())
}
