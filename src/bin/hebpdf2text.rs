use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use hebpdf2text::{
    ColumnLayout, FailurePolicy, Granularity, Pipeline, PipelineError, PipelineSettings,
    PopplerRasterizer, ReadingOrder, Remainder, Slicing, TesseractConfig, TesseractEngine,
};

#[derive(Debug, Clone, ValueEnum)]
enum LayoutChoice {
    /// One page per image, four columns
    FourColumns,
    /// Two pages per image, two columns each
    TwoPageSpread,
}

#[derive(Debug, Clone, ValueEnum)]
enum DirectionChoice {
    Rtl,
    Ltr,
}

#[derive(Debug, Clone, ValueEnum)]
enum RemainderChoice {
    Trailing,
    Leading,
    Discard,
}

#[derive(Debug, Parser)]
#[command(about = "Extract Hebrew text from a scanned multi-column PDF.")]
struct Args {
    /// Input PDF
    input: PathBuf,

    /// Directory for per-page text files and complete_book.txt
    output_dir: PathBuf,

    /// Column layout preset
    #[arg(long, value_enum, default_value_t = LayoutChoice::FourColumns)]
    layout: LayoutChoice,

    /// Override the number of columns per side
    #[arg(long)]
    columns: Option<usize>,

    /// Override the number of sides per page image
    #[arg(long)]
    sides: Option<usize>,

    /// Explicit column cut positions as fractions of the side width (e.g. 0.3,0.65)
    #[arg(long, value_delimiter = ',', conflicts_with = "columns")]
    cuts: Option<Vec<f64>>,

    /// Override the reading direction of sides and columns
    #[arg(long, value_enum)]
    direction: Option<DirectionChoice>,

    /// Slice that receives leftover pixels when the width does not divide evenly
    #[arg(long, value_enum, default_value_t = RemainderChoice::Trailing)]
    remainder: RemainderChoice,

    /// Write one file per side instead of one per page image
    #[arg(long)]
    per_side: bool,

    /// OCR language
    #[arg(long, default_value = "heb")]
    lang: String,

    /// Tesseract executable
    #[arg(long, default_value = "tesseract")]
    tesseract: PathBuf,

    /// Tesseract language data directory
    #[arg(long)]
    tessdata_dir: Option<PathBuf>,

    /// Tesseract page segmentation mode
    #[arg(long)]
    psm: Option<u8>,

    /// pdftoppm executable
    #[arg(long, default_value = "pdftoppm")]
    pdftoppm: PathBuf,

    /// Rendering resolution
    #[arg(long, default_value_t = 200)]
    dpi: u32,

    /// Seconds before a single OCR call is killed
    #[arg(long, default_value_t = 30)]
    ocr_timeout: u64,

    /// Extra attempts after a transient OCR failure
    #[arg(long, default_value_t = 1)]
    retries: u32,

    /// Pages processed in parallel
    #[arg(long, default_value_t = 1)]
    jobs: usize,

    /// Abort on the first failed region or page instead of leaving it empty
    #[arg(long)]
    strict: bool,
}

fn main() -> ExitCode {
    hebpdf2text::init_logging();
    let args = Args::parse();

    match run(&args) {
        Ok(document) => {
            println!(
                "Text extraction complete. Full text available at: {}",
                document.display()
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(error = %err, "extraction failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<PathBuf, PipelineError> {
    let rasterizer = PopplerRasterizer {
        executable: args.pdftoppm.clone(),
        dpi: args.dpi,
    };
    let engine = TesseractEngine::new(TesseractConfig {
        executable: args.tesseract.clone(),
        tessdata_dir: args.tessdata_dir.clone(),
        page_segmentation: args.psm,
        timeout: Duration::from_secs(args.ocr_timeout),
    });
    let settings = PipelineSettings {
        layout: build_layout(args),
        language: args.lang.clone(),
        granularity: if args.per_side {
            Granularity::Side
        } else {
            Granularity::Page
        },
        retries: args.retries,
        on_failure: if args.strict {
            FailurePolicy::Abort
        } else {
            FailurePolicy::Placeholder
        },
        jobs: args.jobs.max(1),
    };

    let pipeline = Pipeline::new(rasterizer, engine, settings);
    let summary = pipeline.run(&args.input, &args.output_dir)?;
    if summary.failed_region_count() > 0 || !summary.skipped_pages().is_empty() {
        eprintln!(
            "warning: {} region(s) failed, pages skipped: {:?}",
            summary.failed_region_count(),
            summary.skipped_pages()
        );
    }
    Ok(summary.document)
}

fn build_layout(args: &Args) -> ColumnLayout {
    let mut layout = match args.layout {
        LayoutChoice::FourColumns => ColumnLayout::four_columns(),
        LayoutChoice::TwoPageSpread => ColumnLayout::two_page_spread(),
    };

    if let Some(columns) = args.columns {
        layout.columns.slicing = Slicing::Equal(columns);
    }

    if let Some(cuts) = &args.cuts {
        layout.columns.slicing = Slicing::Cuts(cuts.clone());
    }

    if let Some(sides) = args.sides {
        layout.sides.slicing = Slicing::Equal(sides);
    }

    if let Some(direction) = &args.direction {
        let order = match direction {
            DirectionChoice::Rtl => ReadingOrder::RightToLeft,
            DirectionChoice::Ltr => ReadingOrder::LeftToRight,
        };
        layout.sides.order = order.clone();
        layout.columns.order = order;
    }

    layout.with_remainder(match args.remainder {
        RemainderChoice::Trailing => Remainder::Trailing,
        RemainderChoice::Leading => Remainder::Leading,
        RemainderChoice::Discard => Remainder::Discard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cuts_and_columns_are_mutually_exclusive() {
        let err = Args::try_parse_from([
            "hebpdf2text",
            "book.pdf",
            "out",
            "--columns",
            "3",
            "--cuts",
            "0.3,0.6",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn cuts_override_the_preset() {
        let args =
            Args::try_parse_from(["hebpdf2text", "book.pdf", "out", "--cuts", "0.3,0.6"]).unwrap();
        let layout = build_layout(&args);
        assert_eq!(layout.columns.slicing, Slicing::Cuts(vec![0.3, 0.6]));
        assert_eq!(layout.region_count(), 3);
    }
}
