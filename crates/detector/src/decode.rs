use crate::error::DetectError;
use common::span_debug;
use image::ImageFormat;
use std::io::Cursor;

// Caps decoded dimensions so a small compressed upload cannot expand into
// an arbitrarily large pixel buffer
const MAX_IMAGE_DIMENSION: u32 = 10_000;

/// An owned RGB8 pixel buffer plus its origin dimensions. Exclusively owned
/// by the request that decoded it; both dimensions are guaranteed positive.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl DecodedFrame {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Turns raw upload bytes into a validated RGB frame.
///
/// Cheap structural checks (size, declared content type) are split out in
/// [`ImageDecoder::validate`] so the orchestrator can reject bad uploads
/// before dispatching any CPU-bound work; the actual parse runs on the
/// blocking pool alongside inference.
#[derive(Debug, Clone, Copy)]
pub struct ImageDecoder {
    max_upload_bytes: usize,
}

impl ImageDecoder {
    pub fn new(max_upload_bytes: usize) -> Self {
        Self { max_upload_bytes }
    }

    /// Validate upload size and declared content type without touching the
    /// byte stream.
    pub fn validate(&self, len: usize, content_type: Option<&str>) -> Result<(), DetectError> {
        if len == 0 {
            return Err(DetectError::InvalidInput("upload is empty".to_string()));
        }
        if len > self.max_upload_bytes {
            return Err(DetectError::InvalidInput(format!(
                "upload of {} bytes exceeds the {} byte limit",
                len, self.max_upload_bytes
            )));
        }
        match content_type {
            Some(ct) if ct.starts_with("image/") => Ok(()),
            Some(ct) => Err(DetectError::InvalidInput(format!(
                "file must be an image, got content type {ct}"
            ))),
            None => Err(DetectError::InvalidInput(
                "missing content type on upload".to_string(),
            )),
        }
    }

    /// Decode upload bytes into an RGB8 frame. CPU-bound.
    pub fn decode(
        &self,
        bytes: &[u8],
        content_type: Option<&str>,
    ) -> Result<DecodedFrame, DetectError> {
        self.validate(bytes.len(), content_type)?;

        let _s = span_debug!("decode_image");

        let format = image::guess_format(bytes)
            .map_err(|_| DetectError::InvalidInput("unrecognized image format".to_string()))?;

        if !matches!(
            format,
            ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::Bmp | ImageFormat::WebP
        ) {
            return Err(DetectError::InvalidInput(format!(
                "unsupported image format {format:?}, expected JPEG, PNG, BMP or WebP"
            )));
        }

        let mut limits = image::Limits::default();
        limits.max_image_width = Some(MAX_IMAGE_DIMENSION);
        limits.max_image_height = Some(MAX_IMAGE_DIMENSION);

        let mut reader = image::ImageReader::with_format(Cursor::new(bytes), format);
        reader.limits(limits);

        let img = reader.decode().map_err(|e| match e {
            image::ImageError::Limits(_) => DetectError::InvalidInput(format!(
                "image dimensions exceed the {MAX_IMAGE_DIMENSION} pixel limit"
            )),
            e => DetectError::InvalidInput(format!("failed to decode image: {e}")),
        })?;

        // Some images are RGBA or grayscale; the model expects three channels
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Err(DetectError::InvalidInput(
                "image has zero width or height".to_string(),
            ));
        }

        tracing::debug!(width, height, ?format, "Decoded upload");

        Ok(DecodedFrame {
            pixels: rgb.into_raw(),
            width,
            height,
        })
    }
}
