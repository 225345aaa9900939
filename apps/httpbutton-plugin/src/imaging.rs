//! Raster helpers: PNG data URLs and the key-face fit used for remote images.

use std::io::Cursor;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, ImageResult, Rgba, RgbaImage};

/// Edge length of a key face in pixels.
pub const KEY_SIZE: u32 = 128;

/// How a source image maps onto a square key face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropPlan {
    pub scaled_width: u32,
    pub scaled_height: u32,
    /// Left edge of the crop window in the scaled image.
    pub source_x: u32,
    pub crop_width: u32,
    /// Left edge of the crop on the destination canvas.
    pub dest_x: u32,
}

/// Scale to key height keeping the aspect ratio, then keep the rightmost
/// key-wide window. Narrow images sit right-aligned on a black canvas.
pub fn crop_plan(width: u32, height: u32) -> CropPlan {
    let height = height.max(1);
    let scaled_width = ((f64::from(width) * f64::from(KEY_SIZE)) / f64::from(height))
        .round()
        .max(1.0) as u32;
    let crop_width = scaled_width.min(KEY_SIZE);
    CropPlan {
        scaled_width,
        scaled_height: KEY_SIZE,
        source_x: scaled_width.saturating_sub(KEY_SIZE),
        crop_width,
        dest_x: KEY_SIZE - crop_width,
    }
}

/// Render a decoded image as a key face.
pub fn fit_to_key(source: &DynamicImage) -> RgbaImage {
    let plan = crop_plan(source.width(), source.height());
    let scaled = source
        .resize_exact(plan.scaled_width, plan.scaled_height, FilterType::Triangle)
        .to_rgba8();
    let window =
        imageops::crop_imm(&scaled, plan.source_x, 0, plan.crop_width, plan.scaled_height)
            .to_image();
    let mut canvas = RgbaImage::from_pixel(KEY_SIZE, KEY_SIZE, Rgba([0, 0, 0, 255]));
    imageops::overlay(&mut canvas, &window, i64::from(plan.dest_x), 0);
    canvas
}

pub fn decode(bytes: &[u8]) -> ImageResult<DynamicImage> {
    image::load_from_memory(bytes)
}

pub fn encode_png(image: &RgbaImage) -> ImageResult<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    image.write_to(&mut cursor, ImageFormat::Png)?;
    Ok(cursor.into_inner())
}

pub fn png_data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

pub fn svg_data_url(svg: &str) -> String {
    format!("data:image/svg+xml;base64,{}", STANDARD.encode(svg))
}
