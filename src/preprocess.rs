use std::io::Cursor;

use image::{
    imageops, imageops::FilterType, DynamicImage, ImageBuffer, ImageDecoder, ImageError,
    ImageReader, Pixel, Primitive, Rgb, RgbImage,
};
use ndarray::prelude::*;
use nshare::AsNdarray3;

use crate::errors::{LandCoverError, Result};

/// Per-channel statistics of the ImageNet-pretrained encoder, RGB order.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Decodes an uploaded file into an 8-bit RGB image.
///
/// Grayscale and alpha images are converted to plain RGB, and an EXIF
/// orientation tag is applied so the result is upright. Anything that does
/// not decode is reported as an invalid upload.
pub fn decode_upload(bytes: &[u8]) -> Result<RgbImage> {
    if bytes.is_empty() {
        return Err(LandCoverError::invalid_upload("uploaded file is empty"));
    }

    let invalid =
        |e: ImageError| LandCoverError::invalid_upload(format!("cannot decode image: {e}"));
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| LandCoverError::invalid_upload(format!("cannot read upload: {e}")))?
        .into_decoder()
        .map_err(invalid)?;
    let orientation = decoder.orientation().map_err(invalid)?;

    let mut image = DynamicImage::from_decoder(decoder).map_err(invalid)?;
    image.apply_orientation(orientation);
    Ok(image.into_rgb8())
}

/// Stretches the image to `size` x `size`. Aspect ratio is not preserved.
///
/// `Triangle` widens its kernel when shrinking, so large uploads are
/// averaged rather than point-sampled.
pub fn resize_to_square(image: &RgbImage, size: u32) -> RgbImage {
    if image.dimensions() == (size, size) {
        return image.clone();
    }
    imageops::resize(image, size, size, FilterType::Triangle)
}

/// Builds the `[1, 3, H, W]` model input: samples scaled to [0, 1], then
/// normalized with the encoder's mean and std.
pub fn to_input_tensor<S>(image: &ImageBuffer<Rgb<S>, Vec<S>>) -> Array4<f32>
where
    Rgb<S>: Pixel<Subpixel = S>,
    S: Into<f32> + Primitive + 'static,
{
    let max: f32 = S::DEFAULT_MAX_VALUE.into();
    let mut tensor = image
        .as_ndarray3()
        .insert_axis(Axis(0))
        .mapv(|v| <S as Into<f32>>::into(v) / max);

    for (channel, mut plane) in tensor.axis_iter_mut(Axis(1)).enumerate() {
        let (mean, std) = (IMAGENET_MEAN[channel], IMAGENET_STD[channel]);
        plane.mapv_inplace(|v| (v - mean) / std);
    }

    tensor
}
