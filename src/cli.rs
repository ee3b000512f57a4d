use crate::certificate::CertificateSettings;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// SQLite database file (e.g., "lms.sqlite3")
    /// Can also be set using the DATABASE_URL environment variable.
    /// Default value: lms.sqlite3
    #[arg(long, env = "DATABASE_URL", default_value = "lms.sqlite3")]
    pub connection_str: String,

    /// Database connection pool size
    /// Can also be set using the DB_POOL_MAX_SIZE environment variable.
    /// Default value: 10
    #[arg(long, env = "DB_POOL_MAX_SIZE", default_value = "10")]
    pub db_pool_max_size: u32,

    /// Server listen address and port (e.g., "127.0.0.1:3000")
    /// Can also be set using the SERVER_ADDRESS environment variable.
    /// Default value: 127.0.0.1:3000
    #[arg(long, env = "SERVER_ADDRESS", default_value = "127.0.0.1:3000")]
    pub server_address: SocketAddr,

    /// Directory holding the certificate template and generated artifacts
    /// Can also be set using the MEDIA_ROOT environment variable.
    /// Default value: media
    #[arg(long, env = "MEDIA_ROOT", default_value = "media")]
    pub media_root: PathBuf,

    /// TrueType font used to print certificate text
    /// Can also be set using the CERTIFICATE_FONT environment variable.
    /// Falls back to a built-in bitmap typeface when unusable.
    #[arg(
        long,
        env = "CERTIFICATE_FONT",
        default_value = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"
    )]
    pub certificate_font: PathBuf,

    /// Directory with the font family the PDF document backend loads
    /// Can also be set using the PDF_FONT_DIR environment variable.
    /// Default value: /usr/share/fonts/truetype/liberation
    #[arg(
        long,
        env = "PDF_FONT_DIR",
        default_value = "/usr/share/fonts/truetype/liberation"
    )]
    pub pdf_font_dir: PathBuf,

    /// Font family name inside PDF_FONT_DIR (e.g., "LiberationSans")
    /// Can also be set using the PDF_FONT_NAME environment variable.
    /// Default value: LiberationSans
    #[arg(long, env = "PDF_FONT_NAME", default_value = "LiberationSans")]
    pub pdf_font_name: String,

    /// Log level (e.g., "info")
    /// Can also be set using the RUST_LOG environment variable.
    /// Default value: info
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn certificate_settings(&self) -> CertificateSettings {
        CertificateSettings {
            media_root: self.media_root.clone(),
            font_path: Some(self.certificate_font.clone()),
            pdf_font_dir: self.pdf_font_dir.clone(),
            pdf_font_name: self.pdf_font_name.clone(),
        }
    }
}
