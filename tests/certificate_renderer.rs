use chrono::NaiveDate;
use image::{Rgb, RgbImage};
use lms_server::certificate::{
    CertificateDetails, CertificatePaths, CertificateRenderer, CertificateSettings,
    CertificateStore, GenPdfBackend, PdfBackend, PdfInput, RasterPdfBackend, RenderOutcome,
    Typeface,
};
use lopdf::{Document, Object};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const DEJAVU_DIR: &str = "/usr/share/fonts/truetype/dejavu";

// test doubles

#[derive(Default)]
struct MemoryStore {
    links: Vec<(i64, String)>,
    fail: bool,
}

impl CertificateStore for MemoryStore {
    fn attach_pdf(&mut self, certificate_id: i64, pdf_path: &str) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("store unavailable");
        }
        self.links.push((certificate_id, pdf_path.to_string()));
        Ok(())
    }
}

/// Writes a partial file and then fails.
struct FailingBackend {
    calls: Arc<AtomicUsize>,
}

impl PdfBackend for FailingBackend {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn render(&self, _input: &PdfInput<'_>, output: &Path) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::fs::write(output, b"%PDF-partial")?;
        anyhow::bail!("simulated backend failure")
    }
}

struct PanickingBackend;

impl PdfBackend for PanickingBackend {
    fn name(&self) -> &'static str {
        "panicking"
    }

    fn render(&self, _input: &PdfInput<'_>, _output: &Path) -> anyhow::Result<()> {
        panic!("simulated backend panic")
    }
}

/// Counts invocations and delegates to the raster backend.
struct CountingBackend {
    calls: Arc<AtomicUsize>,
}

impl PdfBackend for CountingBackend {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn render(&self, input: &PdfInput<'_>, output: &Path) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        RasterPdfBackend.render(input, output)
    }
}

/// Blocks inside the backend until the test releases it.
struct GatedBackend {
    entered: Sender<()>,
    release: Mutex<Receiver<()>>,
}

impl PdfBackend for GatedBackend {
    fn name(&self) -> &'static str {
        "gated"
    }

    fn render(&self, input: &PdfInput<'_>, output: &Path) -> anyhow::Result<()> {
        self.entered.send(())?;
        self.release
            .lock()
            .map_err(|_| anyhow::anyhow!("gate poisoned"))?
            .recv()?;
        RasterPdfBackend.render(input, output)
    }
}

// setup

fn settings(media_root: &Path) -> CertificateSettings {
    CertificateSettings {
        media_root: media_root.to_path_buf(),
        font_path: None,
        pdf_font_dir: media_root.join("no-such-fonts"),
        pdf_font_name: "Missing".to_string(),
    }
}

fn write_template(media_root: &Path, width: u32, height: u32) {
    let target = CertificatePaths::new(media_root).template();
    std::fs::create_dir_all(target.parent().unwrap()).unwrap();
    RgbImage::from_pixel(width, height, Rgb([245, 245, 230]))
        .save(&target)
        .unwrap();
}

fn details(id: i64) -> CertificateDetails {
    CertificateDetails {
        id,
        uid: "5f0c3a8e-1b2d-4c6e-9f10-2a3b4c5d6e7f".to_string(),
        issued_at: NaiveDate::from_ymd_opt(2025, 3, 14)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap(),
        pdf_path: None,
        student_name: "Ada Lovelace".to_string(),
        course_title: "Analytical Engines".to_string(),
        instructor_name: "Charles Babbage".to_string(),
    }
}

fn generated_files(paths: &CertificatePaths) -> Vec<String> {
    match std::fs::read_dir(paths.generated_dir()) {
        Ok(entries) => {
            let mut names: Vec<String> = entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            names
        }
        Err(_) => Vec::new(),
    }
}

fn media() -> TempDir {
    tempfile::tempdir().unwrap()
}

/// Page count plus width and height of the first page's MediaBox, in points.
fn pdf_page_size(path: &Path) -> (usize, f64, f64) {
    let doc = Document::load(path).unwrap();
    let pages = doc.get_pages();
    let page_id = *pages.values().next().unwrap();
    let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
    let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
    let number = |object: &Object| match object {
        Object::Integer(value) => *value as f64,
        Object::Real(value) => *value,
        other => panic!("unexpected MediaBox entry {:?}", other),
    };
    (
        pages.len(),
        number(&media_box[2]) - number(&media_box[0]),
        number(&media_box[3]) - number(&media_box[1]),
    )
}

/// Copies the DejaVu Sans family into `dir` under the `genpdf` naming scheme,
/// or returns `false` when the host does not have it.
fn install_dejavu(dir: &Path, family: &str) -> bool {
    let faces = [
        ("DejaVuSans.ttf", "Regular"),
        ("DejaVuSans-Bold.ttf", "Bold"),
        ("DejaVuSans-Oblique.ttf", "Italic"),
        ("DejaVuSans-BoldOblique.ttf", "BoldItalic"),
    ];
    let sources: Vec<PathBuf> = faces
        .iter()
        .map(|(file, _)| Path::new(DEJAVU_DIR).join(file))
        .collect();
    if sources.iter().any(|source| !source.is_file()) {
        eprintln!("DejaVu Sans not installed under {}, skipping", DEJAVU_DIR);
        return false;
    }
    for (source, (_, style)) in sources.iter().zip(faces) {
        std::fs::copy(source, dir.join(format!("{}-{}.ttf", family, style))).unwrap();
    }
    true
}

// template handling

#[test]
fn test_render_template_missing_writes_nothing() {
    let dir = media();
    let renderer = CertificateRenderer::new(settings(dir.path()));
    let mut store = MemoryStore::default();

    let outcome = renderer.render(&details(1), &mut store);

    assert_eq!(outcome, RenderOutcome::TemplateMissing);
    assert!(store.links.is_empty());
    assert!(!renderer.paths().generated_dir().exists());
}

#[test]
fn test_render_template_unreadable() {
    let dir = media();
    let template = CertificatePaths::new(dir.path()).template();
    std::fs::create_dir_all(template.parent().unwrap()).unwrap();
    std::fs::write(&template, b"definitely not a png").unwrap();
    let renderer = CertificateRenderer::new(settings(dir.path()));
    let mut store = MemoryStore::default();

    let outcome = renderer.render(&details(1), &mut store);

    assert_eq!(outcome, RenderOutcome::TemplateUnreadable);
    assert!(store.links.is_empty());
    assert!(generated_files(renderer.paths()).is_empty());
}

// generation

#[test]
fn test_render_generates_and_links_artifacts() {
    let dir = media();
    write_template(dir.path(), 400, 300);
    let renderer = CertificateRenderer::new(settings(dir.path()));
    let mut store = MemoryStore::default();

    let outcome = renderer.render(&details(7), &mut store);

    let expected_link = "certificates/generated/certificate-7.pdf".to_string();
    assert_eq!(
        outcome,
        RenderOutcome::Generated {
            pdf_path: expected_link.clone()
        }
    );
    assert_eq!(store.links, vec![(7, expected_link)]);
    assert_eq!(
        generated_files(renderer.paths()),
        vec!["certificate-7.pdf", "certificate-7.png"]
    );

    let pdf = std::fs::read(renderer.paths().pdf_file(7)).unwrap();
    assert!(pdf.starts_with(b"%PDF-"));
    let image = image::open(renderer.paths().image_file(7)).unwrap();
    assert_eq!((image.width(), image.height()), (400, 300));
}

#[test]
fn test_render_raster_page_matches_canvas_size() {
    let dir = media();
    write_template(dir.path(), 640, 480);
    let renderer =
        CertificateRenderer::with_backends(settings(dir.path()), vec![Box::new(RasterPdfBackend)]);
    let mut store = MemoryStore::default();

    let outcome = renderer.render(&details(3), &mut store);

    assert!(matches!(outcome, RenderOutcome::Generated { .. }));
    let (pages, width, height) = pdf_page_size(&renderer.paths().pdf_file(3));
    assert_eq!(pages, 1);
    assert!((width - 640.0).abs() < 0.5, "width {}", width);
    assert!((height - 480.0).abs() < 0.5, "height {}", height);
}

#[test]
fn test_genpdf_backend_renders_single_page_with_installed_family() {
    let fonts = media();
    if !install_dejavu(fonts.path(), "Certificate") {
        return;
    }
    let dir = media();
    let image_path = dir.path().join("certificate-1.png");
    let canvas = RgbImage::from_pixel(1600, 1200, Rgb([245, 245, 230]));
    canvas.save(&image_path).unwrap();
    let output = dir.path().join("certificate-1.pdf");

    let backend = GenPdfBackend::new(fonts.path(), "Certificate");
    backend
        .render(
            &PdfInput {
                image_path: &image_path,
                canvas: &canvas,
            },
            &output,
        )
        .unwrap();

    let (pages, width, height) = pdf_page_size(&output);
    assert_eq!(pages, 1);
    assert!((width - 1600.0).abs() < 0.5, "width {}", width);
    assert!((height - 1200.0).abs() < 0.5, "height {}", height);
}

#[test]
fn test_render_through_genpdf_backend_links_pdf() {
    let fonts = media();
    if !install_dejavu(fonts.path(), "Certificate") {
        return;
    }
    let dir = media();
    write_template(dir.path(), 800, 600);
    let settings = CertificateSettings {
        pdf_font_dir: fonts.path().to_path_buf(),
        pdf_font_name: "Certificate".to_string(),
        ..settings(dir.path())
    };
    let renderer = CertificateRenderer::with_backends(
        settings,
        vec![Box::new(GenPdfBackend::new(fonts.path(), "Certificate"))],
    );
    let mut store = MemoryStore::default();

    let outcome = renderer.render(&details(12), &mut store);

    assert!(matches!(outcome, RenderOutcome::Generated { .. }));
    let (pages, width, height) = pdf_page_size(&renderer.paths().pdf_file(12));
    assert_eq!(pages, 1);
    assert!((width - 800.0).abs() < 0.5, "width {}", width);
    assert!((height - 600.0).abs() < 0.5, "height {}", height);
}

#[test]
fn test_compose_prints_text_onto_template() {
    let dir = media();
    write_template(dir.path(), 800, 600);
    let renderer = CertificateRenderer::new(settings(dir.path()));

    let canvas = renderer
        .compose(&renderer.paths().template(), &details(1))
        .unwrap();

    let background = Rgb([245, 245, 230]);
    let inked = canvas.pixels().filter(|p| **p != background).count();
    assert_eq!(canvas.dimensions(), (800, 600));
    assert!(inked > 0);
    // nothing above the student name line
    let top_band_inked = (0..(600.0 * 0.36) as u32)
        .flat_map(|y| (0..800).map(move |x| (x, y)))
        .filter(|(x, y)| *canvas.get_pixel(*x, *y) != background)
        .count();
    assert_eq!(top_band_inked, 0);
}

// typefaces

#[test]
fn test_typeface_without_configured_font_is_builtin() {
    assert!(Typeface::load(None).is_builtin());
}

#[test]
fn test_typeface_missing_or_corrupt_font_falls_back_to_builtin() {
    let dir = media();
    let corrupt = dir.path().join("corrupt.ttf");
    std::fs::write(&corrupt, b"not a font").unwrap();

    assert!(Typeface::load(Some(dir.path().join("absent.ttf").as_path())).is_builtin());
    assert!(Typeface::load(Some(corrupt.as_path())).is_builtin());
}

#[test]
fn test_typeface_loads_scalable_font() {
    let font = Path::new(DEJAVU_DIR).join("DejaVuSans.ttf");
    if !font.is_file() {
        eprintln!("{} not installed, skipping", font.display());
        return;
    }

    let typeface = Typeface::load(Some(font.as_path()));

    assert!(!typeface.is_builtin());
    let (width, height) = typeface.text_size(48.0, "Ada Lovelace");
    assert!(width > 0 && height > 0);
}

#[test]
fn test_compose_with_unusable_font_still_prints_text() {
    let dir = media();
    write_template(dir.path(), 800, 600);
    let settings = CertificateSettings {
        font_path: Some(dir.path().join("absent.ttf")),
        ..settings(dir.path())
    };
    let renderer = CertificateRenderer::new(settings);

    let canvas = renderer
        .compose(&renderer.paths().template(), &details(1))
        .unwrap();

    let background = Rgb([245, 245, 230]);
    assert!(canvas.pixels().any(|p| *p != background));
}

// backend fallback

#[test]
fn test_render_falls_back_after_failing_backend() {
    let dir = media();
    write_template(dir.path(), 400, 300);
    let failing_calls = Arc::new(AtomicUsize::new(0));
    let renderer = CertificateRenderer::with_backends(
        settings(dir.path()),
        vec![
            Box::new(FailingBackend {
                calls: failing_calls.clone(),
            }),
            Box::new(RasterPdfBackend),
        ],
    );
    let mut store = MemoryStore::default();

    let outcome = renderer.render(&details(2), &mut store);

    assert!(matches!(outcome, RenderOutcome::Generated { .. }));
    assert_eq!(failing_calls.load(Ordering::SeqCst), 1);
    let pdf = std::fs::read(renderer.paths().pdf_file(2)).unwrap();
    assert!(!pdf.starts_with(b"%PDF-partial"));
}

#[test]
fn test_render_falls_back_after_panicking_backend() {
    let dir = media();
    write_template(dir.path(), 400, 300);
    let renderer = CertificateRenderer::with_backends(
        settings(dir.path()),
        vec![Box::new(PanickingBackend), Box::new(RasterPdfBackend)],
    );
    let mut store = MemoryStore::default();

    let outcome = renderer.render(&details(4), &mut store);

    assert!(matches!(outcome, RenderOutcome::Generated { .. }));
    assert_eq!(store.links.len(), 1);
}

#[test]
fn test_render_all_backends_fail_cleans_up() {
    let dir = media();
    write_template(dir.path(), 400, 300);
    let calls = Arc::new(AtomicUsize::new(0));
    let renderer = CertificateRenderer::with_backends(
        settings(dir.path()),
        vec![
            Box::new(FailingBackend {
                calls: calls.clone(),
            }),
            Box::new(PanickingBackend),
        ],
    );
    let mut store = MemoryStore::default();

    let outcome = renderer.render(&details(5), &mut store);

    assert_eq!(outcome, RenderOutcome::BackendsFailed);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(store.links.is_empty());
    assert!(generated_files(renderer.paths()).is_empty());

    // a later invocation starts over from scratch
    let outcome = renderer.render(&details(5), &mut store);
    assert_eq!(outcome, RenderOutcome::BackendsFailed);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// idempotence and repair

#[test]
fn test_render_already_linked_does_not_touch_files() {
    let dir = media();
    write_template(dir.path(), 400, 300);
    let calls = Arc::new(AtomicUsize::new(0));
    let renderer = CertificateRenderer::with_backends(
        settings(dir.path()),
        vec![Box::new(CountingBackend {
            calls: calls.clone(),
        })],
    );
    let mut store = MemoryStore::default();

    let first = renderer.render(&details(8), &mut store);
    let RenderOutcome::Generated { pdf_path } = first else {
        panic!("expected generation, got {:?}", first);
    };
    let before = std::fs::read(renderer.paths().pdf_file(8)).unwrap();

    let mut linked = details(8);
    linked.pdf_path = Some(pdf_path);
    let second = renderer.render(&linked, &mut store);

    assert_eq!(second, RenderOutcome::AlreadyLinked);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.links.len(), 1);
    assert_eq!(std::fs::read(renderer.paths().pdf_file(8)).unwrap(), before);
}

#[test]
fn test_render_repairs_missing_link() {
    let dir = media();
    write_template(dir.path(), 400, 300);
    let calls = Arc::new(AtomicUsize::new(0));
    let renderer = CertificateRenderer::with_backends(
        settings(dir.path()),
        vec![Box::new(CountingBackend {
            calls: calls.clone(),
        })],
    );
    let pdf_file = renderer.paths().pdf_file(9);
    std::fs::create_dir_all(pdf_file.parent().unwrap()).unwrap();
    std::fs::write(&pdf_file, b"%PDF-1.4 existing").unwrap();
    let mut store = MemoryStore::default();

    let outcome = renderer.render(&details(9), &mut store);

    assert_eq!(
        outcome,
        RenderOutcome::LinkRepaired {
            pdf_path: "certificates/generated/certificate-9.pdf".to_string()
        }
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(std::fs::read(&pdf_file).unwrap(), b"%PDF-1.4 existing");
    assert!(!renderer.paths().image_file(9).exists());
}

#[test]
fn test_render_stale_link_regenerates() {
    let dir = media();
    write_template(dir.path(), 400, 300);
    let renderer =
        CertificateRenderer::with_backends(settings(dir.path()), vec![Box::new(RasterPdfBackend)]);
    let mut store = MemoryStore::default();
    let mut stale = details(10);
    stale.pdf_path = Some("certificates/generated/gone.pdf".to_string());

    let outcome = renderer.render(&stale, &mut store);

    assert!(matches!(outcome, RenderOutcome::Generated { .. }));
    assert!(renderer.paths().pdf_file(10).is_file());
}

#[test]
fn test_render_link_failure_keeps_artifacts_for_repair() {
    let dir = media();
    write_template(dir.path(), 400, 300);
    let renderer =
        CertificateRenderer::with_backends(settings(dir.path()), vec![Box::new(RasterPdfBackend)]);
    let mut failing_store = MemoryStore {
        fail: true,
        ..MemoryStore::default()
    };

    let outcome = renderer.render(&details(11), &mut failing_store);

    assert_eq!(outcome, RenderOutcome::LinkFailed);
    assert!(renderer.paths().pdf_file(11).is_file());

    let mut store = MemoryStore::default();
    let outcome = renderer.render(&details(11), &mut store);
    assert!(matches!(outcome, RenderOutcome::LinkRepaired { .. }));
    assert_eq!(store.links.len(), 1);
}

#[test]
fn test_render_distinct_certificates_do_not_collide() {
    let dir = media();
    write_template(dir.path(), 400, 300);
    let renderer = Arc::new(CertificateRenderer::with_backends(
        settings(dir.path()),
        vec![Box::new(RasterPdfBackend)],
    ));

    let handles: Vec<_> = (20..24)
        .map(|id| {
            let renderer = renderer.clone();
            std::thread::spawn(move || {
                let mut store = MemoryStore::default();
                renderer.render(&details(id), &mut store)
            })
        })
        .collect();

    for handle in handles {
        assert!(matches!(
            handle.join().unwrap(),
            RenderOutcome::Generated { .. }
        ));
    }
    assert_eq!(generated_files(renderer.paths()).len(), 8);
}

#[test]
fn test_render_same_certificate_while_in_flight_reports_in_progress() {
    let dir = media();
    write_template(dir.path(), 400, 300);
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let renderer = Arc::new(CertificateRenderer::with_backends(
        settings(dir.path()),
        vec![Box::new(GatedBackend {
            entered: entered_tx,
            release: Mutex::new(release_rx),
        })],
    ));

    let first = {
        let renderer = renderer.clone();
        std::thread::spawn(move || {
            let mut store = MemoryStore::default();
            let outcome = renderer.render(&details(30), &mut store);
            (outcome, store.links)
        })
    };
    entered_rx.recv_timeout(Duration::from_secs(30)).unwrap();

    let mut store = MemoryStore::default();
    assert_eq!(
        renderer.render(&details(30), &mut store),
        RenderOutcome::InProgress
    );
    assert!(store.links.is_empty());

    release_tx.send(()).unwrap();
    let (outcome, links) = first.join().unwrap();
    let RenderOutcome::Generated { pdf_path } = outcome else {
        panic!("expected generation, got {:?}", outcome);
    };
    assert_eq!(links, vec![(30, pdf_path.clone())]);

    // the claim is released once the first render returns
    let mut linked = details(30);
    linked.pdf_path = Some(pdf_path);
    assert_eq!(
        renderer.render(&linked, &mut store),
        RenderOutcome::AlreadyLinked
    );
}
