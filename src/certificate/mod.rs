//! Certificate artifact generation.
//!
//! A certificate row can exist without artifacts; rendering is best-effort
//! and every failure ends in a resting state that a later invocation can
//! pick up from. Nothing here returns an error to the caller: the result
//! of an invocation is a [`RenderOutcome`].

mod pdf;
mod typeface;

pub use pdf::{GenPdfBackend, PdfBackend, PdfInput, RasterPdfBackend};
pub use typeface::Typeface;

use anyhow::anyhow;
use chrono::NaiveDateTime;
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, instrument, warn};

pub const TEMPLATE_PATH: &str = "certificates/templates/background.png";
pub const GENERATED_DIR: &str = "certificates/generated";

const INK: Rgb<u8> = Rgb([40, 40, 40]);

/// What a certificate says, plus its current artifact link.
#[derive(Debug, Clone)]
pub struct CertificateDetails {
    pub id: i64,
    pub uid: String,
    pub issued_at: NaiveDateTime,
    /// Link relative to the media root.
    pub pdf_path: Option<String>,
    pub student_name: String,
    pub course_title: String,
    pub instructor_name: String,
}

/// Where the renderer records a finished PDF.
pub trait CertificateStore {
    fn attach_pdf(&mut self, certificate_id: i64, pdf_path: &str) -> anyhow::Result<()>;
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RenderOutcome {
    /// No background template; nothing was written.
    TemplateMissing,
    /// The row already points at a PDF that exists.
    AlreadyLinked,
    /// A PDF was on disk but unlinked; it was linked without regenerating.
    LinkRepaired { pdf_path: String },
    Generated { pdf_path: String },
    /// Another invocation for the same certificate is running.
    InProgress,
    TemplateUnreadable,
    ImageWriteFailed,
    /// Every PDF backend failed; the image artifact was removed again.
    BackendsFailed,
    /// The PDF was written but could not be linked to the row.
    LinkFailed,
}

/// Fixed on-disk layout under the media root.
#[derive(Debug, Clone)]
pub struct CertificatePaths {
    media_root: PathBuf,
}

impl CertificatePaths {
    pub fn new(media_root: impl Into<PathBuf>) -> Self {
        CertificatePaths {
            media_root: media_root.into(),
        }
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    pub fn template(&self) -> PathBuf {
        self.media_root.join(TEMPLATE_PATH)
    }

    pub fn generated_dir(&self) -> PathBuf {
        self.media_root.join(GENERATED_DIR)
    }

    pub fn image_file(&self, certificate_id: i64) -> PathBuf {
        self.generated_dir()
            .join(format!("certificate-{}.png", certificate_id))
    }

    pub fn pdf_file(&self, certificate_id: i64) -> PathBuf {
        self.resolve(&self.pdf_link(certificate_id))
    }

    /// The value stored on the row for this certificate's PDF.
    pub fn pdf_link(&self, certificate_id: i64) -> String {
        format!("{}/certificate-{}.pdf", GENERATED_DIR, certificate_id)
    }

    pub fn resolve(&self, link: &str) -> PathBuf {
        self.media_root.join(link)
    }
}

#[derive(Debug, Clone)]
pub struct CertificateSettings {
    pub media_root: PathBuf,
    pub font_path: Option<PathBuf>,
    pub pdf_font_dir: PathBuf,
    pub pdf_font_name: String,
}

pub struct CertificateRenderer {
    paths: CertificatePaths,
    typeface: Typeface,
    backends: Vec<Box<dyn PdfBackend>>,
    in_flight: Mutex<HashSet<i64>>,
}

impl CertificateRenderer {
    /// Renderer with the `genpdf` backend first and the raster backend as fallback.
    pub fn new(settings: CertificateSettings) -> Self {
        let backends: Vec<Box<dyn PdfBackend>> = vec![
            Box::new(GenPdfBackend::new(
                settings.pdf_font_dir.clone(),
                settings.pdf_font_name.clone(),
            )),
            Box::new(RasterPdfBackend),
        ];
        Self::with_backends(settings, backends)
    }

    pub fn with_backends(settings: CertificateSettings, backends: Vec<Box<dyn PdfBackend>>) -> Self {
        CertificateRenderer {
            paths: CertificatePaths::new(settings.media_root),
            typeface: Typeface::load(settings.font_path.as_deref()),
            backends,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn paths(&self) -> &CertificatePaths {
        &self.paths
    }

    /// Brings the certificate's artifacts up to date.
    #[instrument(skip(self, certificate, store), fields(certificate_id = certificate.id))]
    pub fn render(
        &self,
        certificate: &CertificateDetails,
        store: &mut dyn CertificateStore,
    ) -> RenderOutcome {
        let Some(_claim) = InFlightClaim::acquire(&self.in_flight, certificate.id) else {
            debug!("Certificate {} is already being rendered", certificate.id);
            return RenderOutcome::InProgress;
        };

        let template = self.paths.template();
        if !template.is_file() {
            debug!("No certificate template at {}", template.display());
            return RenderOutcome::TemplateMissing;
        }

        if let Some(link) = &certificate.pdf_path {
            if self.paths.resolve(link).is_file() {
                debug!("Certificate {} already links {}", certificate.id, link);
                return RenderOutcome::AlreadyLinked;
            }
        }

        let pdf_link = self.paths.pdf_link(certificate.id);
        let pdf_file = self.paths.pdf_file(certificate.id);
        if pdf_file.is_file() {
            return match store.attach_pdf(certificate.id, &pdf_link) {
                Ok(()) => {
                    info!(
                        "Linked existing PDF {} to certificate {}",
                        pdf_link, certificate.id
                    );
                    RenderOutcome::LinkRepaired { pdf_path: pdf_link }
                }
                Err(e) => {
                    warn!("Could not link existing PDF {}: {:#}", pdf_link, e);
                    RenderOutcome::LinkFailed
                }
            };
        }

        let canvas = match self.compose(&template, certificate) {
            Ok(canvas) => canvas,
            Err(e) => {
                warn!("Certificate template {} unreadable: {}", template.display(), e);
                return RenderOutcome::TemplateUnreadable;
            }
        };

        let image_file = self.paths.image_file(certificate.id);
        let saved = std::fs::create_dir_all(self.paths.generated_dir())
            .map_err(anyhow::Error::from)
            .and_then(|_| canvas.save(&image_file).map_err(anyhow::Error::from));
        if let Err(e) = saved {
            warn!("Could not write {}: {:#}", image_file.display(), e);
            remove_artifact(&image_file);
            return RenderOutcome::ImageWriteFailed;
        }

        let input = PdfInput {
            image_path: &image_file,
            canvas: &canvas,
        };
        if !self.write_pdf(&input, &pdf_file) {
            warn!(
                "All PDF backends failed for certificate {}, removing {}",
                certificate.id,
                image_file.display()
            );
            remove_artifact(&image_file);
            return RenderOutcome::BackendsFailed;
        }

        match store.attach_pdf(certificate.id, &pdf_link) {
            Ok(()) => {
                info!("Generated {} for certificate {}", pdf_link, certificate.id);
                RenderOutcome::Generated { pdf_path: pdf_link }
            }
            Err(e) => {
                warn!(
                    "Generated {} but could not link it to certificate {}: {:#}",
                    pdf_link, certificate.id, e
                );
                RenderOutcome::LinkFailed
            }
        }
    }

    /// Prints the certificate text onto a copy of the template.
    pub fn compose(
        &self,
        template: &Path,
        certificate: &CertificateDetails,
    ) -> image::ImageResult<RgbImage> {
        let mut canvas = image::open(template)?.to_rgb8();
        let (width, height) = canvas.dimensions();
        let (w, h) = (width as f32, height as f32);

        let name_size = w * 0.045;
        let title_size = w * 0.03;
        let caption_size = w * 0.018;

        self.draw_centered(&mut canvas, &certificate.student_name, name_size, h * 0.36);
        self.draw_centered(&mut canvas, &certificate.course_title, title_size, h * 0.48);
        self.draw_centered(
            &mut canvas,
            &format!("Instructor: {}", certificate.instructor_name),
            caption_size,
            h * 0.78,
        );
        self.typeface.draw(
            &mut canvas,
            INK,
            (w * 0.06) as i32,
            (h * 0.90) as i32,
            caption_size,
            &format!("Certificate ID: {}", certificate.uid),
        );
        self.typeface.draw(
            &mut canvas,
            INK,
            (w * 0.76) as i32,
            (h * 0.90) as i32,
            caption_size,
            &certificate.issued_at.format("%d.%m.%Y").to_string(),
        );

        Ok(canvas)
    }

    fn draw_centered(&self, canvas: &mut RgbImage, text: &str, size: f32, top: f32) {
        let (text_width, _) = self.typeface.text_size(size, text);
        let x = (i64::from(canvas.width()) - i64::from(text_width)) / 2;
        self.typeface
            .draw(canvas, INK, x as i32, top as i32, size, text);
    }

    /// Tries each backend in order; returns whether one of them succeeded.
    fn write_pdf(&self, input: &PdfInput<'_>, output: &Path) -> bool {
        for backend in &self.backends {
            let result = panic::catch_unwind(AssertUnwindSafe(|| backend.render(input, output)))
                .unwrap_or_else(|_| Err(anyhow!("backend panicked")));

            match result {
                Ok(()) => {
                    debug!("PDF backend '{}' wrote {}", backend.name(), output.display());
                    return true;
                }
                Err(e) => {
                    warn!("PDF backend '{}' failed: {:#}", backend.name(), e);
                    remove_artifact(output);
                }
            }
        }
        false
    }
}

fn remove_artifact(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove {}: {}", path.display(), e);
        }
    }
}

/// Marks a certificate as being rendered for as long as it is held.
struct InFlightClaim<'a> {
    registry: &'a Mutex<HashSet<i64>>,
    certificate_id: i64,
}

impl<'a> InFlightClaim<'a> {
    fn acquire(registry: &'a Mutex<HashSet<i64>>, certificate_id: i64) -> Option<Self> {
        let mut ids = registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        ids.insert(certificate_id).then_some(InFlightClaim {
            registry,
            certificate_id,
        })
    }
}

impl Drop for InFlightClaim<'_> {
    fn drop(&mut self) {
        let mut ids = self
            .registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        ids.remove(&self.certificate_id);
    }
}
