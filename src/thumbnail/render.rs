//! Thumbnail rasterization and fallback icons.
//!
//! Thumbnails are square: the source image is scaled to cover the canvas,
//! centre-cropped, clipped to a rounded rectangle, outlined, and marked with a
//! small status dot before being JPEG-encoded into a data URL.

use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, Rgb, RgbImage};

use super::FailureKind;
use crate::core::config::ThumbnailConfig;
use crate::core::constants::FALLBACK_ICON_SIZE;
use crate::Result;

const IMAGE_INSET: f64 = 2.0;
const IMAGE_RADIUS: f64 = 8.0;
const BORDER_WIDTH: f64 = 3.0;
const BORDER_RADIUS: f64 = 7.0;
const STATUS_DOT_OFFSET: f64 = 8.0;
const STATUS_DOT_RADIUS: f64 = 4.0;
const BACKGROUND: [u8; 3] = [0xff, 0xff, 0xff];

#[derive(Debug, Clone, Copy)]
struct RoundedRect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    radius: f64,
}

impl RoundedRect {
    /// Signed distance from `(px, py)` to the outline; negative inside.
    fn distance(&self, px: f64, py: f64) -> f64 {
        let half_w = self.width / 2.0;
        let half_h = self.height / 2.0;
        let qx = (px - (self.x + half_w)).abs() - (half_w - self.radius);
        let qy = (py - (self.y + half_h)).abs() - (half_h - self.radius);
        let outside = qx.max(0.0).hypot(qy.max(0.0));
        let inside = qx.max(qy).min(0.0);
        outside + inside - self.radius
    }
}

/// Decodes `bytes` and renders the thumbnail as a `data:image/jpeg` URL.
pub fn render_thumbnail(bytes: &[u8], config: &ThumbnailConfig) -> Result<String> {
    let source = image::load_from_memory(bytes)?;
    let canvas = compose(&source, config);
    let jpeg = encode_jpeg(&canvas, config.jpeg_quality)?;
    Ok(data_url("image/jpeg", &jpeg))
}

/// Draws the thumbnail canvas.
pub fn compose(source: &DynamicImage, config: &ThumbnailConfig) -> RgbImage {
    let size = config.size_px.max(1);
    let size_f = size as f64;
    let mut canvas = RgbImage::from_pixel(size, size, Rgb(BACKGROUND));

    let inner = (size_f - 2.0 * IMAGE_INSET).max(1.0) as u32;
    let fitted = source
        .resize_to_fill(inner, inner, FilterType::Triangle)
        .to_rgb8();

    let clip = RoundedRect {
        x: IMAGE_INSET,
        y: IMAGE_INSET,
        width: size_f - 2.0 * IMAGE_INSET,
        height: size_f - 2.0 * IMAGE_INSET,
        radius: IMAGE_RADIUS,
    };
    let border = RoundedRect {
        x: BORDER_WIDTH / 2.0,
        y: BORDER_WIDTH / 2.0,
        width: size_f - BORDER_WIDTH,
        height: size_f - BORDER_WIDTH,
        radius: BORDER_RADIUS,
    };
    let dot = (size_f - STATUS_DOT_OFFSET, STATUS_DOT_OFFSET);

    for (x, y, pixel) in canvas.enumerate_pixels_mut() {
        let (px, py) = (x as f64 + 0.5, y as f64 + 0.5);

        let coverage = (0.5 - clip.distance(px, py)).clamp(0.0, 1.0);
        if coverage > 0.0 {
            let sx = (x as i64 - IMAGE_INSET as i64).clamp(0, fitted.width() as i64 - 1) as u32;
            let sy = (y as i64 - IMAGE_INSET as i64).clamp(0, fitted.height() as i64 - 1) as u32;
            blend(pixel, fitted.get_pixel(sx, sy).0, coverage);
        }

        let stroke = (BORDER_WIDTH / 2.0 + 0.5 - border.distance(px, py).abs()).clamp(0.0, 1.0);
        if stroke > 0.0 {
            blend(pixel, config.border_color, stroke);
        }

        let to_dot = (px - dot.0).hypot(py - dot.1);
        let fill = (STATUS_DOT_RADIUS + 0.5 - to_dot).clamp(0.0, 1.0);
        if fill > 0.0 {
            blend(pixel, config.status_color, fill);
        }
    }

    canvas
}

fn blend(pixel: &mut Rgb<u8>, color: [u8; 3], alpha: f64) {
    for (channel, target) in pixel.0.iter_mut().zip(color) {
        let mixed = *channel as f64 * (1.0 - alpha) + target as f64 * alpha;
        *channel = mixed.round() as u8;
    }
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality).encode(
        image.as_raw(),
        image.width(),
        image.height(),
        ColorType::Rgb8,
    )?;
    Ok(buffer)
}

pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// Camera placeholder tinted by failure kind.
pub fn fallback_icon(kind: FailureKind) -> String {
    let svg = camera_svg(FALLBACK_ICON_SIZE, "#fff5f5", kind.color());
    data_url("image/svg+xml", svg.as_bytes())
}

/// Camera glyph in a filled circle on a 24-unit view box.
pub fn camera_svg(size: u32, background: &str, color: &str) -> String {
    format!(
        concat!(
            "<svg xmlns='http://www.w3.org/2000/svg' width='{size}' height='{size}' viewBox='0 0 24 24'>",
            "<circle cx='12' cy='12' r='11' fill='{bg}' stroke='{fg}' stroke-width='2'/>",
            "<path d='M9 3l1.5 2h3L15 3h2a1 1 0 0 1 1 1v12a1 1 0 0 1-1 1H7a1 1 0 0 1-1-1V4a1 1 0 0 1 1-1h2z",
            "M7 5v10h10V5h-1.5l-1.5 2h-3L9 5H7zm5 8a2.5 2.5 0 1 1 0-5 2.5 2.5 0 0 1 0 5z' ",
            "fill='{fg}' transform='translate(1,1) scale(0.85)'/>",
            "</svg>"
        ),
        size = size,
        bg = background,
        fg = color,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
    }

    #[test]
    fn test_compose_layout() {
        let config = ThumbnailConfig::default();
        let canvas = compose(&solid(200, 100, [255, 0, 0]), &config);

        assert_eq!(canvas.dimensions(), (60, 60));
        assert_eq!(canvas.get_pixel(0, 0).0, BACKGROUND);
        assert_eq!(canvas.get_pixel(30, 30).0, [255, 0, 0]);
        assert_eq!(canvas.get_pixel(1, 30).0, config.border_color);
        assert_eq!(canvas.get_pixel(52, 8).0, config.status_color);
    }

    #[test]
    fn test_render_produces_jpeg_data_url() {
        let mut png = Vec::new();
        solid(90, 120, [10, 200, 30])
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageOutputFormat::Png)
            .unwrap();

        let url = render_thumbnail(&png, &ThumbnailConfig::default()).unwrap();
        let encoded = url.strip_prefix("data:image/jpeg;base64,").unwrap();
        let bytes = base64::engine::general_purpose::STANDARD.decode(encoded).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (60, 60));
    }

    #[test]
    fn test_undecodable_bytes_fail() {
        assert!(render_thumbnail(b"<html>404</html>", &ThumbnailConfig::default()).is_err());
    }

    #[test]
    fn test_fallback_icons_are_tinted() {
        let timeout = fallback_icon(FailureKind::Timeout);
        let error = fallback_icon(FailureKind::Error);
        assert!(timeout.starts_with("data:image/svg+xml;base64,"));
        assert_ne!(timeout, error);

        let svg = camera_svg(50, "#fff5f5", "#dc3545");
        assert!(svg.contains("width='50'"));
        assert!(svg.contains("stroke='#dc3545'"));
    }
}
