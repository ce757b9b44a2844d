use std::path::PathBuf;

use clap::Parser;
use hebpdf2text::{OutputDir, OutputError};

#[derive(Debug, Parser)]
#[command(about = "Rebuild complete_book.txt from the page files in an output directory.")]
struct Args {
    /// Directory holding page_*.txt files
    output_dir: PathBuf,
}

fn main() -> Result<(), OutputError> {
    hebpdf2text::init_logging();
    let args = Args::parse();
    let out = OutputDir::open(&args.output_dir)?;
    let document = out.combine()?;
    println!("Combined text written to {}", document.display());
    Ok(())
}
