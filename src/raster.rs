//! PDF page rasterization.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use image::DynamicImage;
use pdf::error::PdfError;
use pdf::file::{CachedFile, FileOptions};
use thiserror::Error;

/// Errors raised while reading or rendering a PDF.
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("failed to read PDF {path}: {message}")]
    Unreadable { path: PathBuf, message: String },
    #[error("failed to run {program}: {source}")]
    Spawn { program: PathBuf, source: io::Error },
    #[error("rendering page {page} failed: {message}")]
    Render { page: usize, message: String },
    #[error("page {page} image could not be decoded: {source}")]
    Decode {
        page: usize,
        source: image::ImageError,
    },
    #[error("rasterizer I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Source of page images for a PDF.
pub trait PageRasterizer: Send + Sync {
    /// Number of pages; fails when the PDF cannot be read.
    fn page_count(&self, pdf: &Path) -> Result<usize, RasterError>;

    /// Render the zero-based page `index` to an image.
    fn render_page(&self, pdf: &Path, index: usize) -> Result<DynamicImage, RasterError>;
}

/// Open a PDF file using the `pdf` crate with the default cached options.
fn open_pdf(path: &Path) -> Result<CachedFile<Vec<u8>>, PdfError> {
    FileOptions::cached().open(path)
}

/// Read the page count of a PDF without rendering anything.
pub fn pdf_page_count(path: &Path) -> Result<usize, RasterError> {
    let pdf = open_pdf(path).map_err(|err| RasterError::Unreadable {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    Ok(pdf.num_pages() as usize)
}

/// Renders pages with poppler's `pdftoppm`.
#[derive(Debug, Clone)]
pub struct PopplerRasterizer {
    pub executable: PathBuf,
    pub dpi: u32,
}

impl Default for PopplerRasterizer {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("pdftoppm"),
            dpi: 200,
        }
    }
}

impl PageRasterizer for PopplerRasterizer {
    fn page_count(&self, pdf: &Path) -> Result<usize, RasterError> {
        pdf_page_count(pdf)
    }

    fn render_page(&self, pdf: &Path, index: usize) -> Result<DynamicImage, RasterError> {
        let workdir = tempfile::tempdir()?;
        let prefix = workdir.path().join("page");
        // pdftoppm numbers pages from 1.
        let number = (index + 1).to_string();

        let output = Command::new(&self.executable)
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-f")
            .arg(&number)
            .arg("-l")
            .arg(&number)
            .arg("-png")
            .arg("-singlefile")
            .arg(pdf)
            .arg(&prefix)
            .output()
            .map_err(|source| RasterError::Spawn {
                program: self.executable.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(RasterError::Render {
                page: index,
                message: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        let image = image::open(prefix.with_extension("png"))
            .map_err(|source| RasterError::Decode {
                page: index,
                source,
            })?;
        tracing::debug!(
            page = index,
            width = image.width(),
            height = image.height(),
            "rendered page"
        );
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreadable_pdf_is_reported_with_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"this is not a pdf").unwrap();
        match pdf_page_count(&path) {
            Err(RasterError::Unreadable { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn missing_pdf_is_unreadable() {
        let rasterizer = PopplerRasterizer::default();
        assert!(matches!(
            rasterizer.page_count(Path::new("/nonexistent/book.pdf")),
            Err(RasterError::Unreadable { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn pdftoppm_failures_name_the_page() {
        use std::os::unix::fs::PermissionsExt;

        let missing = PopplerRasterizer {
            executable: PathBuf::from("/nonexistent/pdftoppm"),
            ..PopplerRasterizer::default()
        };
        assert!(matches!(
            missing.render_page(Path::new("book.pdf"), 0),
            Err(RasterError::Spawn { .. })
        ));

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("pdftoppm");
        std::fs::write(
            &script,
            "#!/bin/sh\necho 'Wrong page range given' >&2\nexit 99\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        let rasterizer = PopplerRasterizer {
            executable: script,
            ..PopplerRasterizer::default()
        };
        match rasterizer.render_page(Path::new("book.pdf"), 4) {
            Err(RasterError::Render { page, message }) => {
                assert_eq!(page, 4);
                assert_eq!(message, "Wrong page range given");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
