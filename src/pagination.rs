/// Page request and response envelope shared by listing operations
use crate::config::ListingConfig;
use serde::{Deserialize, Serialize};

/// Query parameters for a listing
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageRequest {
    /// 1-based page number (default: 1)
    pub page: Option<u32>,
    /// Page size (default: 20, max: 100)
    pub limit: Option<u32>,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: Some(page),
            limit: Some(limit),
        }
    }

    /// Clamp into a usable `(page, limit)` pair
    pub fn normalize(&self, listing: &ListingConfig) -> (u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = match self.limit {
            Some(0) | None => listing.default_limit,
            Some(limit) => limit.min(listing.max_limit),
        };
        (page, limit)
    }

    pub fn offset(&self, listing: &ListingConfig) -> u64 {
        let (page, limit) = self.normalize(listing);
        (page as u64 - 1) * limit as u64
    }
}

/// One page of results
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, page: u32, limit: u32) -> Self {
        let total_pages = if limit == 0 {
            0
        } else {
            total.div_ceil(limit as u64)
        };

        Self {
            items,
            total,
            page,
            limit,
            total_pages,
            has_next: (page as u64) < total_pages,
            has_prev: page > 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_defaults_and_ceiling() {
        let listing = ListingConfig::default();

        assert_eq!(PageRequest::default().normalize(&listing), (1, 20));
        assert_eq!(PageRequest::new(0, 500).normalize(&listing), (1, 100));
        assert_eq!(PageRequest::new(3, 10).offset(&listing), 20);
    }

    #[test]
    fn test_page_envelope() {
        let page = Page::new(vec![1, 2], 45, 2, 20);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next);
        assert!(page.has_prev);

        let empty: Page<i32> = Page::new(vec![], 0, 1, 20);
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_next);
        assert!(!empty.has_prev);
    }
}
