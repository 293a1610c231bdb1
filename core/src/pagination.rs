//! Page/size state for the book list.
//!
//! `total_pages` always comes from the server's pagination metadata; the
//! controller never divides counts itself.

use thiserror::Error;

use crate::endpoint::Query;
use crate::types::Pagination;

/// Page sizes offered to the user.
pub const PAGE_SIZES: [u32; 4] = [5, 10, 20, 50];
pub const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaginationError {
    #[error("unsupported page size {0}, expected 5, 10, 20 or 50")]
    UnsupportedPageSize(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageController {
    current_page: u32,
    items_per_page: u32,
    total_pages: u32,
    total_items: u32,
}

impl Default for PageController {
    fn default() -> Self {
        Self {
            current_page: 1,
            items_per_page: DEFAULT_PAGE_SIZE,
            total_pages: 1,
            total_items: 0,
        }
    }
}

impl PageController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(size: u32) -> Result<Self, PaginationError> {
        let mut pager = Self::default();
        pager.set_items_per_page(size)?;
        Ok(pager)
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn items_per_page(&self) -> u32 {
        self.items_per_page
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn total_items(&self) -> u32 {
        self.total_items
    }

    /// Change the page size. Always returns to page 1, even when the size
    /// is unchanged.
    pub fn set_items_per_page(&mut self, size: u32) -> Result<(), PaginationError> {
        if !PAGE_SIZES.contains(&size) {
            return Err(PaginationError::UnsupportedPageSize(size));
        }
        self.items_per_page = size;
        self.current_page = 1;
        Ok(())
    }

    /// Adopt the server's metadata. Missing metadata, or zero pages, count
    /// as a single page.
    pub fn sync(&mut self, pagination: Option<&Pagination>) {
        self.total_pages = pagination.map(|p| p.total_pages).filter(|&n| n > 0).unwrap_or(1);
        self.total_items = pagination.map(|p| p.total).unwrap_or(0);
    }

    pub fn has_previous(&self) -> bool {
        self.current_page > 1
    }

    pub fn has_next(&self) -> bool {
        self.current_page < self.total_pages
    }

    /// Returns whether the page changed.
    pub fn next(&mut self) -> bool {
        if !self.has_next() {
            return false;
        }
        self.current_page += 1;
        true
    }

    /// Returns whether the page changed.
    pub fn previous(&mut self) -> bool {
        if !self.has_previous() {
            return false;
        }
        self.current_page -= 1;
        true
    }

    /// Jump to `page`, clamped into `1..=total_pages`. Returns whether the
    /// page changed.
    pub fn go_to(&mut self, page: u32) -> bool {
        let page = page.clamp(1, self.total_pages.max(1));
        let changed = page != self.current_page;
        self.current_page = page;
        changed
    }

    /// Whether the page navigation should be shown at all.
    pub fn shows_controls(&self) -> bool {
        self.total_items > 0
    }

    pub fn query(&self) -> Query {
        Query::list_books(self.current_page, self.items_per_page)
    }
}
