//! Hebrew text extraction from scanned multi-column PDF books.
//!
//! Each PDF page is rendered to an image, cut into columns according to a
//! [`ColumnLayout`], recognized column by column in reading order and written
//! out as one text file per page plus a combined `complete_book.txt`.

pub mod assemble;
pub mod layout;
pub mod ocr;
pub mod output;
pub mod pipeline;
pub mod raster;

pub use assemble::{SEPARATOR, TextUnit, assemble_document, assemble_page, missing_pages};
pub use layout::{
    ColumnLayout, LayoutError, LayoutLevel, PageImage, PixelRect, ReadingOrder, Region, Remainder,
    Slicing,
};
pub use ocr::{OcrError, TesseractConfig, TesseractEngine, TextRecognizer};
pub use output::{COMBINED_FILE_NAME, OutputDir, OutputError, UnitKey, padding_width};
pub use pipeline::{
    FailurePolicy, Granularity, PageReport, Pipeline, PipelineError, PipelineSettings, RunSummary,
};
pub use raster::{PageRasterizer, PopplerRasterizer, RasterError};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install a stderr `tracing` subscriber filtered by `RUST_LOG`.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "hebpdf2text=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
