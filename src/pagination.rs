//! Offset-based pagination for ledger listings.

use serde::{Deserialize, Serialize};

/// The largest page size a caller may request.
pub const MAX_PAGE_SIZE: u64 = 100;

/// The page size used when a request does not specify one.
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// A request for one page of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageQuery {
    page: u64,
    page_size: u64,
}

impl PageQuery {
    /// Create a page request.
    ///
    /// `page` is 1-based and clamped up to 1; `page_size` is clamped to
    /// `1..=`[MAX_PAGE_SIZE]. Out-of-range input is normalized rather than
    /// rejected so transport layers do not need their own clamping rules.
    pub fn new(page: u64, page_size: u64) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// The 1-based page number.
    pub fn page(&self) -> u64 {
        self.page
    }

    /// The number of items per page.
    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// The number of rows to skip for this page.
    pub fn offset(&self) -> u64 {
        (self.page - 1) * self.page_size
    }
}

impl Default for PageQuery {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

/// One page of results plus the counts needed to render pagination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    /// The items on this page, possibly empty when the page is past the end.
    pub items: Vec<T>,
    /// The 1-based page number that was requested.
    pub page: u64,
    /// The page size that was applied.
    pub page_size: u64,
    /// The total number of matching items across all pages.
    pub total_count: u64,
    /// `ceil(total_count / page_size)`.
    pub total_pages: u64,
}

impl<T> Page<T> {
    /// Assemble a page from the items fetched for `query` and the total
    /// matching count.
    pub fn new(items: Vec<T>, total_count: u64, query: PageQuery) -> Self {
        Self {
            items,
            page: query.page(),
            page_size: query.page_size(),
            total_count,
            total_pages: total_count.div_ceil(query.page_size()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::pagination::{MAX_PAGE_SIZE, Page, PageQuery};

    #[test]
    fn page_size_is_clamped() {
        assert_eq!(PageQuery::new(1, 500).page_size(), MAX_PAGE_SIZE);
        assert_eq!(PageQuery::new(1, 0).page_size(), 1);
        assert_eq!(PageQuery::new(0, 20).page(), 1);
    }

    #[test]
    fn offset_is_zero_based() {
        assert_eq!(PageQuery::new(1, 20).offset(), 0);
        assert_eq!(PageQuery::new(3, 20).offset(), 40);
    }

    #[test]
    fn total_pages_rounds_up() {
        let page = Page::new(vec![0; 5], 45, PageQuery::new(3, 20));

        assert_eq!(page.total_pages, 3);
        assert_eq!(page.items.len(), 5);
    }

    #[test]
    fn empty_result_has_zero_pages() {
        let page: Page<i64> = Page::new(vec![], 0, PageQuery::new(1, 20));

        assert_eq!(page.total_pages, 0);
        assert!(page.items.is_empty());
    }
}
