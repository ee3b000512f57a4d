use anyhow::{Context, anyhow};
use image::RgbImage;
use printpdf::{ColorBits, ColorSpace, Image, ImageXObject, Mm, PdfDocument, Px};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Both backends place one PDF point per canvas pixel, so a certificate
/// prints at the same physical size whichever backend produced it.
pub const POINTS_PER_PIXEL: f64 = 1.0;
const MM_PER_POINT: f64 = 25.4 / 72.0;

/// The composited certificate handed to a PDF backend.
pub struct PdfInput<'a> {
    /// The image artifact already written to disk.
    pub image_path: &'a Path,
    pub canvas: &'a RgbImage,
}

/// A strategy that turns a composited certificate into a single-page PDF.
///
/// Backends are tried in order; a backend that returns an error (or
/// panics) leaves the next one to try.
pub trait PdfBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn render(&self, input: &PdfInput<'_>, output: &Path) -> anyhow::Result<()>;
}

/// Lays the image out as a full-page element of a `genpdf` document.
///
/// `genpdf` documents always need a font family, so this backend fails
/// when the configured family is not installed.
pub struct GenPdfBackend {
    font_dir: PathBuf,
    font_name: String,
}

impl GenPdfBackend {
    pub fn new(font_dir: impl Into<PathBuf>, font_name: impl Into<String>) -> Self {
        GenPdfBackend {
            font_dir: font_dir.into(),
            font_name: font_name.into(),
        }
    }
}

impl PdfBackend for GenPdfBackend {
    fn name(&self) -> &'static str {
        "genpdf"
    }

    fn render(&self, input: &PdfInput<'_>, output: &Path) -> anyhow::Result<()> {
        let (width, height) = input.canvas.dimensions();

        let font_family = genpdf::fonts::from_files(&self.font_dir, &self.font_name, None)
            .map_err(|e| {
                anyhow!(
                    "Failed to load font family '{}' from {}: {}",
                    self.font_name,
                    self.font_dir.display(),
                    e
                )
            })?;

        let mut doc = genpdf::Document::new(font_family);
        doc.set_title("Certificate");
        // a hair of slack so float rounding never pushes the image onto a second page
        doc.set_paper_size(genpdf::Size::new(
            pixels_to_mm(width) + 0.01,
            pixels_to_mm(height) + 0.01,
        ));

        let image = genpdf::elements::Image::from_path(input.image_path)
            .map_err(|e| anyhow!("Failed to load {}: {}", input.image_path.display(), e))?
            .with_dpi(72.0 / POINTS_PER_PIXEL);
        doc.push(image);

        doc.render_to_file(output)
            .map_err(|e| anyhow!("Failed to render {}: {}", output.display(), e))
    }
}

/// Embeds the raw canvas as the only content of a single-page `printpdf`
/// document.
///
/// Uses no fonts, which makes it the fallback for hosts without the family
/// `genpdf` wants.
#[derive(Default)]
pub struct RasterPdfBackend;

impl PdfBackend for RasterPdfBackend {
    fn name(&self) -> &'static str {
        "raster"
    }

    fn render(&self, input: &PdfInput<'_>, output: &Path) -> anyhow::Result<()> {
        let (width, height) = input.canvas.dimensions();

        let (doc, page, layer) = PdfDocument::new(
            "Certificate",
            Mm(pixels_to_mm(width)),
            Mm(pixels_to_mm(height)),
            "Certificate",
        );
        let layer = doc.get_page(page).get_layer(layer);

        let image = ImageXObject::new(
            Px(width as usize),
            Px(height as usize),
            ColorSpace::Rgb,
            ColorBits::Bit8,
            true,
            None,
            None,
            input.canvas.as_raw().clone(),
        );
        Image::from(image).add_to_layer(
            layer,
            None,
            None,
            None,
            None,
            None,
            Some(72.0 / POINTS_PER_PIXEL),
        );

        let file = File::create(output)
            .with_context(|| format!("Failed to create {}", output.display()))?;
        let mut writer = BufWriter::new(file);
        doc.save(&mut writer)
            .map_err(|e| anyhow!("Failed to write {}: {}", output.display(), e))?;
        writer
            .flush()
            .with_context(|| format!("Failed to flush {}", output.display()))?;
        Ok(())
    }
}

fn pixels_to_mm(pixels: u32) -> f64 {
    pixels as f64 * POINTS_PER_PIXEL * MM_PER_POINT
}
