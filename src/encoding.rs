use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{ImageFormat, RgbImage};

use crate::errors::{LandCoverError, Result};

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| LandCoverError::image_processing("png encoding", e))?;
    Ok(bytes)
}

/// PNG bytes of `image`, base64 encoded with the standard alphabet.
pub fn encode_png_base64(image: &RgbImage) -> Result<String> {
    encode_png(image).map(|bytes| STANDARD.encode(bytes))
}
