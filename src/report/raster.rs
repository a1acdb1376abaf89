//! PNG rasterization of chart markup.

use anyhow::{Context, Result};
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use resvg::{tiny_skia, usvg};
use std::sync::Arc;
use tracing::debug;

/// Turns SVG chart markup into PNG bytes. Fonts are loaded once per instance.
pub struct Rasterizer {
    fontdb: Arc<usvg::fontdb::Database>,
}

impl Rasterizer {
    /// Rasterizer using the fonts installed on this machine.
    pub fn with_system_fonts() -> Self {
        let mut fontdb = usvg::fontdb::Database::new();
        fontdb.load_system_fonts();
        debug!("Loaded {} font faces for chart text", fontdb.len());

        Self {
            fontdb: Arc::new(fontdb),
        }
    }

    pub fn render_png(&self, svg: &str) -> Result<Vec<u8>> {
        let options = usvg::Options {
            fontdb: Arc::clone(&self.fontdb),
            ..usvg::Options::default()
        };
        let tree = usvg::Tree::from_str(svg, &options).context("Failed to parse chart markup")?;

        let size = tree.size().to_int_size();
        let (width, height) = (size.width(), size.height());
        let mut pixmap = tiny_skia::Pixmap::new(width, height)
            .with_context(|| format!("Cannot allocate a {}x{} canvas", width, height))?;
        resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

        // Charts paint an opaque background, so premultiplied pixels are plain RGBA.
        let mut png = Vec::new();
        PngEncoder::new(&mut png)
            .write_image(pixmap.data(), width, height, ExtendedColorType::Rgba8)
            .context("Failed to encode PNG")?;
        Ok(png)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

    #[test]
    fn test_render_png_keeps_canvas_size() {
        let svg = "<svg xmlns='http://www.w3.org/2000/svg' width='120' height='80'>\
                   <rect width='120' height='80' fill='#ffffff'/>\
                   <rect x='10' y='10' width='50' height='20' fill='#1f77b4'/></svg>";
        let png = Rasterizer::with_system_fonts().render_png(svg).unwrap();

        assert_eq!(png[..8], PNG_SIGNATURE);
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (120, 80));
        assert_eq!(decoded.get_pixel(0, 0).0, [255, 255, 255, 255]);
        assert_eq!(decoded.get_pixel(30, 20).0, [0x1f, 0x77, 0xb4, 255]);
    }

    #[test]
    fn test_render_png_rejects_bad_markup() {
        let rasterizer = Rasterizer::with_system_fonts();
        assert!(rasterizer.render_png("<svg").is_err());
        assert!(rasterizer.render_png("not markup").is_err());
    }
}
