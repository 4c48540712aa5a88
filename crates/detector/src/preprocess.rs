use crate::decode::DecodedFrame;
use common::span_debug;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer, images::Image};
use ndarray::{Array, IxDyn};

const LETTERBOX_COLOR: u8 = 114;
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Model-ready tensor plus the letterbox transform needed to map boxes back
/// to original frame coordinates.
#[derive(Debug)]
pub struct Preprocessed {
    /// NCHW float tensor, ImageNet-normalized
    pub tensor: Array<f32, IxDyn>,
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

/// Resize with preserved aspect ratio onto a letterboxed canvas of
/// `input_size`, then normalize into an NCHW tensor.
pub fn preprocess_frame(frame: &DecodedFrame, input_size: (u32, u32)) -> anyhow::Result<Preprocessed> {
    let _s = span_debug!("preprocess_frame");

    let (width, height) = frame.dimensions();
    // usize arithmetic: width * height * 3 can exceed u32 for dimensions a
    // small compressed upload is allowed to declare
    let expected = width as usize * height as usize * 3;
    if frame.pixels.len() != expected {
        anyhow::bail!(
            "pixel buffer size mismatch: expected {} bytes, got {}",
            expected,
            frame.pixels.len()
        );
    }

    let scale = (input_size.0 as f32 / width as f32).min(input_size.1 as f32 / height as f32);
    let new_width = (width as f32 * scale) as u32;
    let new_height = (height as f32 * scale) as u32;

    let offset_x = (input_size.0 - new_width) / 2;
    let offset_y = (input_size.1 - new_height) / 2;

    let mut rgb = frame.pixels.clone();
    let src = Image::from_slice_u8(width, height, &mut rgb, PixelType::U8x3)?;

    let mut resized = Image::new(new_width, new_height, PixelType::U8x3);
    Resizer::new().resize(
        &src,
        &mut resized,
        &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
    )?;

    let mut letterboxed = vec![LETTERBOX_COLOR; (input_size.0 * input_size.1 * 3) as usize];
    let resized_data = resized.buffer();
    let stride = input_size.0 * 3;

    for y in 0..new_height {
        let src_row = (y * new_width * 3) as usize;
        let dst_row = ((y + offset_y) * stride + offset_x * 3) as usize;

        letterboxed[dst_row..dst_row + (new_width * 3) as usize]
            .copy_from_slice(&resized_data[src_row..src_row + (new_width * 3) as usize]);
    }

    let tensor = normalize(&letterboxed, input_size)?;

    Ok(Preprocessed {
        tensor,
        scale,
        offset_x: offset_x as f32,
        offset_y: offset_y as f32,
    })
}

fn normalize(pixels: &[u8], input_size: (u32, u32)) -> anyhow::Result<Array<f32, IxDyn>> {
    let width = input_size.0 as usize;
    let height = input_size.1 as usize;
    let spatial = width * height;

    let mut output = vec![0.0f32; 3 * spatial];

    for (i, px) in pixels.chunks_exact(3).enumerate() {
        let r = px[0] as f32 / 255.0;
        let g = px[1] as f32 / 255.0;
        let b = px[2] as f32 / 255.0;

        output[i] = (r - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        output[i + spatial] = (g - IMAGENET_MEAN[1]) / IMAGENET_STD[1];
        output[i + 2 * spatial] = (b - IMAGENET_MEAN[2]) / IMAGENET_STD[2];
    }

    Ok(Array::from_shape_vec(
        IxDyn(&[1, 3, height, width]),
        output,
    )?)
}
