//! Column segmentation for scanned multi-column pages.
//!
//! A page image is cut into vertical slices on two levels: an outer split into
//! sides (the two pages of a scanned spread) and an inner split of every side
//! into text columns. Both levels use the same slicing primitive, and the
//! resulting regions come back in reading order.

use image::DynamicImage;
use thiserror::Error;

/// Errors raised while validating a layout or cutting a page with it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LayoutError {
    #[error("a layout level needs at least one slice")]
    NoSlices,
    #[error("page image is empty ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
    #[error("{extent} pixels cannot be cut into {slices} non-empty slices")]
    TooNarrow { extent: u32, slices: usize },
    #[error("cut positions must be finite, strictly increasing and inside (0, 1): {0:?}")]
    InvalidCuts(Vec<f64>),
    #[error("reading order {order:?} is not a permutation of {slices} slices")]
    InvalidOrder { order: Vec<usize>, slices: usize },
}

/// Half-open horizontal pixel range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn width(&self) -> u32 {
        self.end - self.start
    }
}

/// Pixel-based rectangle inside a page image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Where the pixels left over by an uneven equal split end up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Remainder {
    /// The rightmost slice absorbs the remainder.
    #[default]
    Trailing,
    /// The leftmost slice absorbs the remainder.
    Leading,
    /// Every slice is `extent / n` wide and the remainder stays uncovered at
    /// the right edge. In a two-level layout that happens inside every side
    /// too, so a few pixel columns go unread mid-page.
    Discard,
}

/// How one level cuts its parent extent.
#[derive(Debug, Clone, PartialEq)]
pub enum Slicing {
    /// `n` slices of equal width.
    Equal(usize),
    /// Explicit cut positions as fractions of the parent width.
    Cuts(Vec<f64>),
}

impl Slicing {
    pub fn count(&self) -> usize {
        match self {
            Slicing::Equal(count) => *count,
            Slicing::Cuts(cuts) => cuts.len() + 1,
        }
    }

    fn validate(&self) -> Result<(), LayoutError> {
        match self {
            Slicing::Equal(0) => Err(LayoutError::NoSlices),
            Slicing::Equal(_) => Ok(()),
            Slicing::Cuts(cuts) => {
                let inside = cuts.iter().all(|c| c.is_finite() && *c > 0.0 && *c < 1.0);
                let increasing = cuts.windows(2).all(|pair| pair[0] < pair[1]);
                if inside && increasing {
                    Ok(())
                } else {
                    Err(LayoutError::InvalidCuts(cuts.clone()))
                }
            }
        }
    }
}

/// Order in which the slices of one level are read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReadingOrder {
    /// Rightmost slice first, as Hebrew text is read.
    #[default]
    RightToLeft,
    LeftToRight,
    /// `order[k]` is the left-to-right slice index read at position `k`.
    Explicit(Vec<usize>),
}

impl ReadingOrder {
    /// Left-to-right slice index for every reading-order position.
    pub fn permutation(&self, slices: usize) -> Result<Vec<usize>, LayoutError> {
        match self {
            ReadingOrder::RightToLeft => Ok((0..slices).rev().collect()),
            ReadingOrder::LeftToRight => Ok((0..slices).collect()),
            ReadingOrder::Explicit(order) => {
                let mut seen = vec![false; slices];
                let bijective = order.len() == slices
                    && order
                        .iter()
                        .all(|&index| index < slices && !std::mem::replace(&mut seen[index], true));
                if bijective {
                    Ok(order.clone())
                } else {
                    Err(LayoutError::InvalidOrder {
                        order: order.clone(),
                        slices,
                    })
                }
            }
        }
    }
}

/// One level of a column layout: how to cut and in which order to read.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutLevel {
    pub slicing: Slicing,
    pub order: ReadingOrder,
}

impl LayoutLevel {
    pub fn equal(count: usize, order: ReadingOrder) -> Self {
        Self {
            slicing: Slicing::Equal(count),
            order,
        }
    }

    fn validate(&self) -> Result<(), LayoutError> {
        self.slicing.validate()?;
        self.order.permutation(self.slicing.count()).map(|_| ())
    }
}

/// Column layout of a scanned page.
///
/// The page is first cut into `sides`, then every side into `columns`.
/// A single-page scan uses one side.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnLayout {
    pub sides: LayoutLevel,
    pub columns: LayoutLevel,
    pub remainder: Remainder,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self::four_columns()
    }
}

impl ColumnLayout {
    /// A single page with `count` columns read in `order`.
    pub fn columns(count: usize, order: ReadingOrder) -> Self {
        Self {
            sides: LayoutLevel::equal(1, ReadingOrder::RightToLeft),
            columns: LayoutLevel::equal(count, order),
            remainder: Remainder::default(),
        }
    }

    /// One image per page, four columns read right to left.
    pub fn four_columns() -> Self {
        Self::columns(4, ReadingOrder::RightToLeft)
    }

    /// A two-page spread per image, two columns per page, all right to left.
    pub fn two_page_spread() -> Self {
        Self {
            sides: LayoutLevel::equal(2, ReadingOrder::RightToLeft),
            columns: LayoutLevel::equal(2, ReadingOrder::RightToLeft),
            remainder: Remainder::default(),
        }
    }

    pub fn with_remainder(mut self, remainder: Remainder) -> Self {
        self.remainder = remainder;
        self
    }

    pub fn side_count(&self) -> usize {
        self.sides.slicing.count()
    }

    pub fn region_count(&self) -> usize {
        self.side_count() * self.columns.slicing.count()
    }

    /// Checks everything that does not depend on the page width.
    pub fn validate(&self) -> Result<(), LayoutError> {
        self.sides.validate()?;
        self.columns.validate()
    }

    /// Cut a page image into regions, ordered by reading position.
    pub fn segment(&self, page: &PageImage) -> Result<Vec<Region>, LayoutError> {
        self.segment_extent(page.index, page.image.width(), page.image.height())
    }

    /// Geometry behind [`ColumnLayout::segment`] for a `width` x `height` page.
    pub fn segment_extent(
        &self,
        page: usize,
        width: u32,
        height: u32,
    ) -> Result<Vec<Region>, LayoutError> {
        if width == 0 || height == 0 {
            return Err(LayoutError::EmptyImage { width, height });
        }
        self.validate()?;

        let side_spans = slice_spans(width, &self.sides.slicing, self.remainder)?;
        let side_order = self.sides.order.permutation(side_spans.len())?;
        let per_side = self.columns.slicing.count();

        let mut regions = Vec::with_capacity(side_spans.len() * per_side);
        for (side, &side_slice) in side_order.iter().enumerate() {
            let outer = side_spans[side_slice];
            let column_spans = slice_spans(outer.width(), &self.columns.slicing, self.remainder)?;
            let column_order = self.columns.order.permutation(column_spans.len())?;
            for &column_slice in &column_order {
                let span = column_spans[column_slice];
                regions.push(Region {
                    page,
                    side,
                    column: side_slice * per_side + column_slice,
                    position: regions.len(),
                    bounds: PixelRect {
                        x: outer.start + span.start,
                        y: 0,
                        width: span.width(),
                        height,
                    },
                });
            }
        }
        Ok(regions)
    }
}

/// Cut `[0, extent)` into contiguous slices, left to right.
pub fn slice_spans(
    extent: u32,
    slicing: &Slicing,
    remainder: Remainder,
) -> Result<Vec<Span>, LayoutError> {
    slicing.validate()?;
    let slices = slicing.count();
    let too_narrow = LayoutError::TooNarrow { extent, slices };

    let bounds: Vec<u32> = match slicing {
        Slicing::Equal(count) => {
            let count_u32 = u32::try_from(*count).map_err(|_| too_narrow.clone())?;
            let base = extent / count_u32;
            if base == 0 {
                return Err(too_narrow);
            }
            let extra = extent - base * count_u32;
            let mut widths = vec![base; *count];
            match remainder {
                Remainder::Trailing => widths[count - 1] += extra,
                Remainder::Leading => widths[0] += extra,
                Remainder::Discard => {}
            }
            std::iter::once(0)
                .chain(widths.iter().scan(0u32, |edge, width| {
                    *edge += width;
                    Some(*edge)
                }))
                .collect()
        }
        Slicing::Cuts(cuts) => std::iter::once(0)
            .chain(cuts.iter().map(|c| (c * extent as f64).round() as u32))
            .chain(std::iter::once(extent))
            .collect(),
    };

    if bounds.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(too_narrow);
    }
    Ok(bounds
        .windows(2)
        .map(|pair| Span {
            start: pair[0],
            end: pair[1],
        })
        .collect())
}

/// A rasterized page, immutable once produced.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub index: usize,
    pub image: DynamicImage,
}

impl PageImage {
    pub fn new(index: usize, image: DynamicImage) -> Self {
        Self { index, image }
    }

    /// Copy out the pixels of one region.
    pub fn crop(&self, region: &Region) -> DynamicImage {
        let PixelRect {
            x,
            y,
            width,
            height,
        } = region.bounds;
        self.image.crop_imm(x, y, width, height)
    }
}

/// A rectangular slice of a page and its place in reading order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub page: usize,
    /// Reading-order position of the side this region belongs to.
    pub side: usize,
    /// Left-to-right slice index across the whole page.
    pub column: usize,
    /// Reading-order position within the page.
    pub position: usize,
    pub bounds: PixelRect,
}
