use std::io::Cursor;
use std::time::Duration;

use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage, RgbaImage, imageops};
use tracing::debug;

use crate::error::CoverError;
use crate::http;

const JPEG_QUALITY: u8 = 90;
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Composites every pixel over opaque white.
pub(crate) fn flatten_onto_white(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let alpha = u16::from(a);
        let blend = |channel: u8| {
            let mixed = u16::from(channel) * alpha + 255 * (255 - alpha);
            ((mixed + 127) / 255) as u8
        };
        Rgb([blend(r), blend(g), blend(b)])
    })
}

/// Centres the image on a white square whose side is the larger dimension.
pub(crate) fn pad_to_square(image: &RgbImage) -> RgbImage {
    let (width, height) = image.dimensions();
    let side = width.max(height);
    if width == height {
        return image.clone();
    }
    let mut square = RgbImage::from_pixel(side, side, WHITE);
    let x = (side - width) / 2;
    let y = (side - height) / 2;
    imageops::replace(&mut square, image, i64::from(x), i64::from(y));
    square
}

pub(crate) fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>, CoverError> {
    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode_image(image)
        .map_err(CoverError::Encode)?;
    Ok(out.into_inner())
}

/// Decodes any supported image and returns it as a white-backed square JPEG.
pub(crate) fn square_jpeg(raw: &[u8]) -> Result<Vec<u8>, CoverError> {
    let decoded = image::load_from_memory(raw).map_err(CoverError::Decode)?;
    let flattened = flatten_onto_white(&decoded.to_rgba8());
    let square = pad_to_square(&flattened);
    debug!(
        "cover {}x{} padded to {}x{}",
        decoded.width(),
        decoded.height(),
        square.width(),
        square.height()
    );
    encode_jpeg(&square)
}

pub(crate) struct CoverProcessor {
    agent: ureq::Agent,
    image_domain: String,
}

impl CoverProcessor {
    pub(crate) fn new(image_domain: &str, timeout: Duration) -> Self {
        Self {
            agent: http::build_agent(timeout),
            image_domain: image_domain.to_string(),
        }
    }

    pub(crate) fn photo_url(&self, photo: &str) -> String {
        if photo.starts_with("http://") || photo.starts_with("https://") {
            photo.to_string()
        } else {
            http::join_url(&self.image_domain, photo)
        }
    }

    pub(crate) fn prepare_cover(&self, photo_url: &str) -> Result<Vec<u8>, CoverError> {
        let raw = http::get_bytes(&self.agent, photo_url)?;
        square_jpeg(&raw)
    }
}
