use anyhow::Context;
use clap::Parser;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use lms_server::certificate::{CertificatePaths, Typeface};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

const WIDTH: u32 = 1600;
const HEIGHT: u32 = 1200;
const BACKGROUND: Rgb<u8> = Rgb([245, 245, 230]);
const BORDER: Rgb<u8> = Rgb([180, 180, 180]);
const BORDER_OFFSET: u32 = 10;
const BORDER_WIDTH: u32 = 6;
const TITLE: &str = "Certificate Template";
const TITLE_COLOR: Rgb<u8> = Rgb([60, 60, 60]);
const TITLE_SIZE: f32 = 48.0;

/// Writes a plain certificate background so the renderer has a template to
/// draw on.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding the certificate template
    /// Can also be set using the MEDIA_ROOT environment variable.
    /// Default value: media
    #[arg(long, env = "MEDIA_ROOT", default_value = "media")]
    media_root: PathBuf,

    /// TrueType font for the heading; the built-in typeface is used when unusable
    /// Can also be set using the CERTIFICATE_FONT environment variable.
    #[arg(
        long,
        env = "CERTIFICATE_FONT",
        default_value = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"
    )]
    font: PathBuf,
}

fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::try_new("info")?).init();
    let args = Args::parse();

    let typeface = Typeface::load(Some(&args.font));
    let mut canvas = RgbImage::from_pixel(WIDTH, HEIGHT, BACKGROUND);

    for inset in 0..BORDER_WIDTH {
        let offset = BORDER_OFFSET + inset;
        let rect = Rect::at(offset as i32, offset as i32)
            .of_size(WIDTH - 2 * offset, HEIGHT - 2 * offset);
        draw_hollow_rect_mut(&mut canvas, rect, BORDER);
    }
    typeface.draw(&mut canvas, TITLE_COLOR, 80, 80, TITLE_SIZE, TITLE);

    let target = CertificatePaths::new(&args.media_root).template();
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    canvas
        .save(&target)
        .with_context(|| format!("Failed to write {}", target.display()))?;

    info!("Placeholder template written to {}", target.display());
    Ok(())
}
