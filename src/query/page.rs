//! Range restriction and count derivation for paged raw queries.
//!
//! The count query is derived textually: `.valueMap(true)` becomes
//! `.count()` and any `.range(..)` clause is removed. Queries shaped
//! differently are counted as written.

use std::sync::OnceLock;

use regex::Regex;

fn value_map_regex() -> &'static Regex {
    static VALUE_MAP: OnceLock<Regex> = OnceLock::new();
    VALUE_MAP.get_or_init(|| Regex::new(r"\.valueMap\(true\)").expect("valueMap pattern"))
}

fn range_regex() -> &'static Regex {
    static RANGE: OnceLock<Regex> = OnceLock::new();
    RANGE.get_or_init(|| Regex::new(r"\.range\([^)]+\)").expect("range pattern"))
}

/// Appends `.range(offset, offset + limit)` to `query`.
pub fn paginate(query: &str, offset: usize, limit: usize) -> String {
    format!("{query}.range({offset}, {})", offset.saturating_add(limit))
}

/// Counting variant of a listing query.
pub fn derive_count_query(query: &str) -> String {
    let counted = value_map_regex().replace_all(query, ".count()");
    range_regex().replace_all(&counted, "").into_owned()
}

/// Zero-based page request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pageable {
    page: usize,
    size: usize,
}

impl Pageable {
    /// Page `page` of `size` rows.
    pub fn new(page: usize, size: usize) -> Self {
        Self { page, size }
    }

    /// Zero-based page number.
    pub fn page(&self) -> usize {
        self.page
    }

    /// Requested rows per page.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Index of the first row: `page * size`.
    pub fn offset(&self) -> usize {
        self.page.saturating_mul(self.size)
    }

    /// Request for the following page.
    pub fn next(&self) -> Self {
        Self::new(self.page + 1, self.size)
    }
}

/// One page of results plus the total row count.
#[derive(Clone, Debug, PartialEq)]
pub struct Page<T> {
    content: Vec<T>,
    pageable: Pageable,
    total: u64,
}

impl<T> Page<T> {
    /// Assembles a page.
    pub fn new(content: Vec<T>, pageable: Pageable, total: u64) -> Self {
        Self {
            content,
            pageable,
            total,
        }
    }

    /// Rows of this page.
    pub fn content(&self) -> &[T] {
        &self.content
    }

    /// Consumes the page, returning its rows.
    pub fn into_content(self) -> Vec<T> {
        self.content
    }

    /// Request that produced the page.
    pub fn pageable(&self) -> Pageable {
        self.pageable
    }

    /// Offset of the first row.
    pub fn offset(&self) -> usize {
        self.pageable.offset()
    }

    /// Requested page size.
    pub fn size(&self) -> usize {
        self.pageable.size()
    }

    /// Total rows across all pages.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of pages; an unsized request counts as a single page.
    pub fn total_pages(&self) -> u64 {
        match self.pageable.size() {
            0 => 1,
            size => self.total.div_ceil(size as u64),
        }
    }

    /// Returns `true` when a following page exists.
    pub fn has_next(&self) -> bool {
        (self.pageable.page() as u64) + 1 < self.total_pages()
    }

    /// Converts every row, keeping the paging metadata.
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            pageable: self.pageable,
            total: self.total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paginate_appends_half_open_range() {
        assert_eq!(
            paginate("g.V().hasLabel('person')", 10, 5),
            "g.V().hasLabel('person').range(10, 15)"
        );
    }

    #[test]
    fn count_query_rewrites_value_map_and_drops_range() {
        let listing = paginate("g.V().hasLabel('person').valueMap(true)", 20, 10);
        assert_eq!(derive_count_query(&listing), "g.V().hasLabel('person').count()");
        assert_eq!(derive_count_query("g.E().limit(2)"), "g.E().limit(2)");
    }

    #[test]
    fn page_metadata() {
        let page = Page::new(vec![1, 2, 3], Pageable::new(1, 3), 7);
        assert_eq!(page.offset(), 3);
        assert_eq!(page.total_pages(), 3);
        assert!(page.has_next());
        let last = Page::new(vec![7], Pageable::new(2, 3), 7);
        assert!(!last.has_next());
        assert_eq!(last.map(|n| n * 2).content(), &[14]);
    }
}
