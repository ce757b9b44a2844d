//! End-to-end extraction: rasterize, segment, recognize, assemble, write.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use thiserror::Error;

use crate::assemble::{TextUnit, assemble_units};
use crate::layout::{ColumnLayout, LayoutError, PageImage, Region};
use crate::ocr::{OcrError, TextRecognizer, ensure_language, recognize_with_retry};
use crate::output::{OutputDir, OutputError, UnitKey, padding_width};
use crate::raster::{PageRasterizer, RasterError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid column layout: {0}")]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Raster(#[from] RasterError),
    #[error(transparent)]
    Ocr(#[from] OcrError),
    #[error(transparent)]
    Output(#[from] OutputError),
    #[error("page {page}, region {position}: {source}")]
    Region {
        page: usize,
        position: usize,
        source: OcrError,
    },
    #[error("failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// How many files each page produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Granularity {
    /// One file per page image.
    #[default]
    Page,
    /// One file per side of a split page.
    Side,
}

/// What to do when a region or page cannot be processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log the failure and substitute empty text.
    #[default]
    Placeholder,
    /// Stop the run with the error.
    Abort,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub layout: ColumnLayout,
    /// OCR language resource, `heb` by default.
    pub language: String,
    pub granularity: Granularity,
    /// Extra attempts for a region after a transient OCR failure.
    pub retries: u32,
    pub on_failure: FailurePolicy,
    /// Pages processed concurrently; 1 keeps the run sequential.
    pub jobs: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            layout: ColumnLayout::default(),
            language: "heb".to_string(),
            granularity: Granularity::default(),
            retries: 1,
            on_failure: FailurePolicy::default(),
            jobs: 1,
        }
    }
}

/// Outcome of one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageReport {
    pub page: usize,
    pub regions: usize,
    pub failed_regions: Vec<usize>,
    /// Unit files written for this page.
    pub files: Vec<(UnitKey, PathBuf)>,
    pub skipped: bool,
}

impl PageReport {
    fn skipped(page: usize) -> Self {
        Self {
            page,
            regions: 0,
            failed_regions: Vec::new(),
            files: Vec::new(),
            skipped: true,
        }
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub pages: Vec<PageReport>,
    pub document: PathBuf,
}

impl RunSummary {
    pub fn region_count(&self) -> usize {
        self.pages.iter().map(|p| p.regions).sum()
    }

    pub fn failed_region_count(&self) -> usize {
        self.pages.iter().map(|p| p.failed_regions.len()).sum()
    }

    pub fn skipped_pages(&self) -> Vec<usize> {
        self.pages.iter().filter(|p| p.skipped).map(|p| p.page).collect()
    }
}

/// Extraction pipeline over a rasterizer and a recognizer.
pub struct Pipeline<R, O> {
    rasterizer: R,
    recognizer: O,
    settings: PipelineSettings,
}

impl<R, O> Pipeline<R, O>
where
    R: PageRasterizer,
    O: TextRecognizer,
{
    pub fn new(rasterizer: R, recognizer: O, settings: PipelineSettings) -> Self {
        Self {
            rasterizer,
            recognizer,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn recognizer(&self) -> &O {
        &self.recognizer
    }

    /// Checks made once before any page is touched.
    pub fn check_preconditions(&self) -> Result<(), PipelineError> {
        self.settings.layout.validate()?;
        ensure_language(&self.recognizer, &self.settings.language)?;
        Ok(())
    }

    /// Extract `pdf` into `output_dir` and write the combined document.
    pub fn run(&self, pdf: &Path, output_dir: &Path) -> Result<RunSummary, PipelineError> {
        self.check_preconditions()?;
        let page_count = self.rasterizer.page_count(pdf)?;
        let out = OutputDir::create(output_dir)?;
        let width = padding_width(page_count);
        tracing::info!(
            pdf = %pdf.display(),
            pages = page_count,
            regions_per_page = self.settings.layout.region_count(),
            jobs = self.settings.jobs,
            "starting extraction"
        );

        let pages = if self.settings.jobs > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.settings.jobs)
                .build()?;
            pool.install(|| {
                (0..page_count)
                    .into_par_iter()
                    .map(|index| self.process_page(pdf, index, &out, width))
                    .collect::<Result<Vec<_>, _>>()
            })?
        } else {
            (0..page_count)
                .map(|index| self.process_page(pdf, index, &out, width))
                .collect::<Result<Vec<_>, _>>()?
        };

        let document = self.combine_run(&out, &pages)?;
        let summary = RunSummary { pages, document };
        tracing::info!(
            regions = summary.region_count(),
            failed_regions = summary.failed_region_count(),
            skipped_pages = ?summary.skipped_pages(),
            "extraction finished"
        );
        Ok(summary)
    }

    /// Rasterize, segment and recognize one page, then write its file(s).
    pub fn process_page(
        &self,
        pdf: &Path,
        index: usize,
        out: &OutputDir,
        width: usize,
    ) -> Result<PageReport, PipelineError> {
        let image = match self.rasterizer.render_page(pdf, index) {
            Ok(image) => image,
            Err(err) => return self.skip_page(index, err.into()),
        };
        let page = PageImage::new(index, image);
        let regions = match self.settings.layout.segment(&page) {
            Ok(regions) => regions,
            Err(err) => return self.skip_page(index, err.into()),
        };

        let mut report = PageReport {
            page: index,
            regions: regions.len(),
            failed_regions: Vec::new(),
            files: Vec::new(),
            skipped: false,
        };
        let mut units: BTreeMap<UnitKey, Vec<TextUnit>> = BTreeMap::new();
        for region in &regions {
            let text = match self.recognize_region(&page, region) {
                Ok(text) => text,
                Err(err) => match self.settings.on_failure {
                    FailurePolicy::Abort => return Err(err),
                    FailurePolicy::Placeholder => {
                        tracing::warn!(
                            page = index,
                            position = region.position,
                            column = region.column,
                            error = %err,
                            "region failed, using empty text"
                        );
                        report.failed_regions.push(region.position);
                        String::new()
                    }
                },
            };
            units.entry(self.unit_key(region)).or_default().push(TextUnit {
                page: index,
                position: region.position,
                text,
            });
        }

        for (key, mut texts) in units {
            let text = assemble_units(&mut texts);
            let path = out.write_unit(key, width, &text)?;
            report.files.push((key, path));
        }
        tracing::info!(page = index, regions = report.regions, "page done");
        Ok(report)
    }

    /// Combine the units written by this run, leaving out stale files.
    fn combine_run(
        &self,
        out: &OutputDir,
        pages: &[PageReport],
    ) -> Result<PathBuf, PipelineError> {
        let written: Vec<(UnitKey, PathBuf)> = pages
            .iter()
            .flat_map(|page| page.files.iter().cloned())
            .collect();
        let ours: BTreeSet<&PathBuf> = written.iter().map(|(_, path)| path).collect();
        let stale: Vec<PathBuf> = out
            .unit_files()?
            .into_iter()
            .filter(|(_, path)| !ours.contains(path))
            .map(|(_, path)| path)
            .collect();
        if !stale.is_empty() {
            tracing::warn!(
                count = stale.len(),
                files = ?stale,
                "leaving unit files from an earlier run out of the combined document"
            );
        }
        Ok(out.combine_units(written)?)
    }

    fn recognize_region(&self, page: &PageImage, region: &Region) -> Result<String, PipelineError> {
        let crop = page.crop(region);
        tracing::debug!(
            page = region.page,
            position = region.position,
            x = region.bounds.x,
            width = region.bounds.width,
            "recognizing region"
        );
        recognize_with_retry(
            &self.recognizer,
            &crop,
            &self.settings.language,
            self.settings.retries,
        )
        .map_err(|source| PipelineError::Region {
            page: region.page,
            position: region.position,
            source,
        })
    }

    fn unit_key(&self, region: &Region) -> UnitKey {
        match self.settings.granularity {
            Granularity::Page => UnitKey::page(region.page),
            Granularity::Side => UnitKey::side(region.page, region.side),
        }
    }

    fn skip_page(&self, index: usize, err: PipelineError) -> Result<PageReport, PipelineError> {
        match self.settings.on_failure {
            FailurePolicy::Abort => Err(err),
            FailurePolicy::Placeholder => {
                tracing::error!(page = index, error = %err, "skipping page");
                Ok(PageReport::skipped(index))
            }
        }
    }
}
