//! Encoding captured frames.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, codecs::jpeg::JpegEncoder};

use crate::{configuration::CaptureFormat, error::TimeloopError, segment::CapturedImage};

/// Encode a rasterised frame into a [`CapturedImage`].
///
/// The image keeps its native dimensions. JPEG output drops any alpha
/// channel first.
///
/// # Errors
///
/// Returns [`TimeloopError::CaptureError`] for an empty raster and
/// [`TimeloopError::ImageError`] if the encoder fails.
///
/// # Example
///
/// ```
/// use image::{DynamicImage, RgbImage};
/// use timeloop::{CaptureFormat, encode_image};
///
/// let frame = DynamicImage::ImageRgb8(RgbImage::new(64, 36));
/// let captured = encode_image(&frame, CaptureFormat::default())?;
/// assert_eq!(captured.mime_type(), "image/jpeg");
/// assert_eq!((captured.width(), captured.height()), (64, 36));
/// # Ok::<(), timeloop::TimeloopError>(())
/// ```
pub fn encode_image(
    image: &DynamicImage,
    format: CaptureFormat,
) -> Result<CapturedImage, TimeloopError> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(TimeloopError::CaptureError(format!(
            "cannot encode a {width}x{height} frame"
        )));
    }

    let mut output = Cursor::new(Vec::new());
    match format {
        CaptureFormat::Jpeg { quality } => {
            let rgb = image.to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut output, quality.clamp(1, 100));
            encoder.encode_image(&rgb)?;
        }
        CaptureFormat::Png => {
            image.write_to(&mut output, ImageFormat::Png)?;
        }
    }

    Ok(CapturedImage::new(
        output.into_inner(),
        format.mime_type(),
        width,
        height,
    ))
}
