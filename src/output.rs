//! Per-page text files and the combined book.
//!
//! Every output unit (a page, or one side of a page) is written to its own
//! UTF-8 file named `page_<index>.txt` or `page_<index>_<side>.txt`, with the
//! index zero-padded so that file-name order is page order. The combined
//! document is re-derived from those files.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::assemble::{assemble_document, assemble_page};

/// Name of the aggregate document inside an output directory.
pub const COMBINED_FILE_NAME: &str = "complete_book.txt";

const PREFIX: &str = "page_";
const EXTENSION: &str = ".txt";
const MIN_PADDING: usize = 3;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to create output directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("output directory {0} does not exist")]
    MissingDir(PathBuf),
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
}

/// Identifies one output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitKey {
    pub page: usize,
    /// Reading-order position of the side, for side-per-file output.
    pub side: Option<usize>,
}

impl UnitKey {
    pub fn page(page: usize) -> Self {
        Self { page, side: None }
    }

    pub fn side(page: usize, side: usize) -> Self {
        Self {
            page,
            side: Some(side),
        }
    }

    /// File name with the page index padded to `width` digits.
    pub fn file_name(&self, width: usize) -> String {
        match self.side {
            None => format!("{PREFIX}{:0width$}{EXTENSION}", self.page),
            Some(side) => format!("{PREFIX}{:0width$}_{side}{EXTENSION}", self.page),
        }
    }

    /// Inverse of [`UnitKey::file_name`] for any padding width.
    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_prefix(PREFIX)?.strip_suffix(EXTENSION)?;
        let (page, side) = match stem.split_once('_') {
            Some((page, side)) => (page, Some(side)),
            None => (stem, None),
        };
        let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        if !digits(page) || !side.is_none_or(digits) {
            return None;
        }
        Some(Self {
            page: page.parse().ok()?,
            side: match side {
                Some(side) => Some(side.parse().ok()?),
                None => None,
            },
        })
    }
}

/// Digits needed so that lexicographic file-name order equals page order
/// for `page_count` pages; never fewer than three.
pub fn padding_width(page_count: usize) -> usize {
    let highest = page_count.saturating_sub(1);
    let digits = highest.checked_ilog10().map_or(1, |log| log as usize + 1);
    digits.max(MIN_PADDING)
}

/// An output directory holding unit files and the combined document.
#[derive(Debug, Clone)]
pub struct OutputDir {
    root: PathBuf,
}

impl OutputDir {
    /// Use `root`, creating it and its parents if absent.
    pub fn create(root: impl AsRef<Path>) -> Result<Self, OutputError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|source| OutputError::CreateDir {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    /// Use an existing directory.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, OutputError> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(OutputError::MissingDir(root));
        }
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn combined_path(&self) -> PathBuf {
        self.root.join(COMBINED_FILE_NAME)
    }

    /// Write the text of one unit, replacing an earlier run's file.
    pub fn write_unit(
        &self,
        key: UnitKey,
        width: usize,
        text: &str,
    ) -> Result<PathBuf, OutputError> {
        let path = self.root.join(key.file_name(width));
        write_file(&path, text)?;
        tracing::debug!(path = %path.display(), "wrote unit file");
        Ok(path)
    }

    /// Unit files in the directory, ordered by (page, side).
    pub fn unit_files(&self) -> Result<Vec<(UnitKey, PathBuf)>, OutputError> {
        let read_err = |source: io::Error| OutputError::Read {
            path: self.root.clone(),
            source,
        };
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(read_err)? {
            let entry = entry.map_err(read_err)?;
            if !entry.file_type().map_err(read_err)?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if name != COMBINED_FILE_NAME && name.ends_with(EXTENSION) {
                    names.push(name.to_owned());
                }
            }
        }
        names.sort();

        let mut units = Vec::with_capacity(names.len());
        for name in names {
            match UnitKey::parse(&name) {
                Some(key) => units.push((key, self.root.join(name))),
                None => tracing::debug!(file = %name, "skipping non-page text file"),
            }
        }
        if units.windows(2).any(|pair| pair[0].0 > pair[1].0) {
            tracing::warn!(
                dir = %self.root.display(),
                "file-name order disagrees with page order; combining in page order"
            );
        }
        units.sort_by_key(|(key, _)| *key);
        Ok(units)
    }

    /// Re-read every unit file in the directory and write the combined document.
    pub fn combine(&self) -> Result<PathBuf, OutputError> {
        self.combine_units(self.unit_files()?)
    }

    /// Write the combined document from the given unit files only.
    ///
    /// Other `page_*.txt` files in the directory are left out.
    pub fn combine_units<I>(&self, units: I) -> Result<PathBuf, OutputError>
    where
        I: IntoIterator<Item = (UnitKey, PathBuf)>,
    {
        let mut units: Vec<(UnitKey, PathBuf)> = units.into_iter().collect();
        units.sort_by_key(|(key, _)| *key);

        let mut pages: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for (key, path) in units {
            let text = fs::read_to_string(&path).map_err(|source| OutputError::Read {
                path: path.clone(),
                source,
            })?;
            pages.entry(key.page).or_default().push(text);
        }

        let page_count = pages.len();
        let document = assemble_document(
            pages
                .into_iter()
                .map(|(page, sides)| (page, assemble_page(&sides))),
        );
        let path = self.combined_path();
        write_file(&path, &document)?;
        tracing::info!(pages = page_count, path = %path.display(), "wrote combined document");
        Ok(path)
    }
}

fn write_file(path: &Path, text: &str) -> Result<(), OutputError> {
    fs::write(path, text).map_err(|source| OutputError::Write {
        path: path.to_path_buf(),
        source,
    })
}
