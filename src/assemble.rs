//! Reading-order assembly of recognized text.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

/// Blank line placed between consecutive columns and between pages.
pub const SEPARATOR: &str = "\n\n";

/// Text recognized for one region, tagged with where it belongs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextUnit {
    pub page: usize,
    pub position: usize,
    pub text: String,
}

/// Join texts that are already in reading order.
pub fn assemble_page<S: AsRef<str>>(texts: &[S]) -> String {
    let mut page = String::new();
    for (i, text) in texts.iter().enumerate() {
        if i > 0 {
            page.push_str(SEPARATOR);
        }
        page.push_str(text.as_ref());
    }
    page
}

/// Sort units by reading position, then join them.
pub fn assemble_units(units: &mut [TextUnit]) -> String {
    units.sort_by_key(|unit| unit.position);
    let texts: Vec<&str> = units.iter().map(|unit| unit.text.as_str()).collect();
    assemble_page(&texts)
}

/// Join page texts in increasing page-index order, whatever order they arrive in.
///
/// Missing page indices are logged and skipped; a repeated index keeps the
/// text supplied last.
pub fn assemble_document<I>(pages: I) -> String
where
    I: IntoIterator<Item = (usize, String)>,
{
    let mut ordered = BTreeMap::new();
    for (index, text) in pages {
        if ordered.insert(index, text).is_some() {
            tracing::warn!(page = index, "page supplied more than once, keeping the last text");
        }
    }

    let missing = missing_pages(ordered.keys().copied());
    if !missing.is_empty() {
        tracing::warn!(?missing, "document has gaps in its page sequence");
    }

    let texts: Vec<String> = ordered.into_values().collect();
    assemble_page(&texts)
}

/// Runs of absent page indices between 0 and the highest index present.
pub fn missing_pages<I>(indices: I) -> Vec<Range<usize>>
where
    I: IntoIterator<Item = usize>,
{
    let present: BTreeSet<usize> = indices.into_iter().collect();
    let mut gaps = Vec::new();
    let mut next = 0;
    for index in present {
        if index > next {
            gaps.push(next..index);
        }
        next = index.saturating_add(1);
    }
    gaps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_page_is_empty_string() {
        let texts: [&str; 0] = [];
        assert_eq!(assemble_page(&texts), "");
    }

    #[test]
    fn page_texts_joined_by_blank_line() {
        assert_eq!(assemble_page(&["a", "b"]), "a\n\nb");
        assert_eq!(assemble_page(&["only"]), "only");
    }

    #[test]
    fn units_follow_reading_position() {
        let mut units = vec![
            TextUnit {
                page: 0,
                position: 2,
                text: "ג".into(),
            },
            TextUnit {
                page: 0,
                position: 0,
                text: "א".into(),
            },
            TextUnit {
                page: 0,
                position: 1,
                text: "ב".into(),
            },
        ];
        assert_eq!(assemble_units(&mut units), "א\n\nב\n\nג");
    }

    #[test]
    fn document_is_ordered_by_page_index() {
        let pages = vec![
            (0, "A".to_string()),
            (2, "C".to_string()),
            (1, "B".to_string()),
        ];
        assert_eq!(assemble_document(pages), "A\n\nB\n\nC");
    }

    #[test]
    fn document_skips_gaps() {
        let pages = vec![(3, "D".to_string()), (0, "A".to_string())];
        assert_eq!(assemble_document(pages), "A\n\nD");
        assert_eq!(missing_pages([3, 0]), vec![1..3]);
        assert_eq!(missing_pages([1, 2, 5, 7]), vec![0..1, 3..5, 6..7]);
    }

    #[test]
    fn gaps_are_ranges_not_indices() {
        assert_eq!(missing_pages([0, usize::MAX]), vec![1..usize::MAX]);
    }

    #[test]
    fn empty_document() {
        assert_eq!(assemble_document(Vec::<(usize, String)>::new()), "");
        assert!(missing_pages(Vec::<usize>::new()).is_empty());
    }
}
