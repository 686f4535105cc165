//! Page-number pagination for list endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub const DEFAULT_PER_PAGE: i64 = 20;
pub const MAX_PER_PAGE: i64 = 100;

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaginationParams {
    /// Page number (1-indexed). Defaults to 1.
    #[param(minimum = 1, default = 1)]
    #[serde(default = "default_page")]
    pub page: i64,

    /// Number of items per page. Defaults to 20, max 100.
    #[param(minimum = 1, maximum = 100, default = 20)]
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    DEFAULT_PER_PAGE
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl PaginationParams {
    pub fn page(&self) -> i64 {
        self.page.max(1)
    }

    pub fn per_page(&self) -> i64 {
        self.per_page.clamp(1, MAX_PER_PAGE)
    }

    pub fn limit_offset(&self) -> (i64, i64) {
        let offset = self
            .page()
            .saturating_sub(1)
            .saturating_mul(self.per_page());
        (self.per_page(), offset)
    }

    pub fn into_metadata(self, total_count: i64) -> PaginationMeta {
        PaginationMeta::new(self.page(), self.per_page(), total_count)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaginationMeta {
    pub page: i64,
    pub per_page: i64,
    pub total_count: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl PaginationMeta {
    pub fn new(page: i64, per_page: i64, total_count: i64) -> Self {
        let total_pages = ((total_count + per_page - 1) / per_page).max(1);

        Self {
            page,
            per_page,
            total_count,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

/// `{data, pagination}` envelope shared by paginated listings.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Page<T: Serialize> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T: Serialize> Page<T> {
    pub fn new(data: Vec<T>, params: PaginationParams, total_count: i64) -> Self {
        Self {
            data,
            pagination: params.into_metadata(total_count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(page: i64, per_page: i64) -> PaginationParams {
        PaginationParams { page, per_page }
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        assert_eq!(params(0, 20).page(), 1);
        assert_eq!(params(-3, 20).page(), 1);
        assert_eq!(params(1, 500).per_page(), MAX_PER_PAGE);
        assert_eq!(params(1, 0).per_page(), 1);
    }

    #[test]
    fn test_limit_offset() {
        assert_eq!(params(1, 20).limit_offset(), (20, 0));
        assert_eq!(params(3, 10).limit_offset(), (10, 20));
    }

    #[test]
    fn test_huge_page_saturates_instead_of_overflowing() {
        let (limit, offset) = params(i64::MAX, MAX_PER_PAGE).limit_offset();
        assert_eq!(limit, MAX_PER_PAGE);
        assert_eq!(offset, i64::MAX);

        let meta = params(i64::MAX, 20).into_metadata(95);
        assert!(!meta.has_next);
        assert!(meta.has_prev);
    }

    #[test]
    fn test_meta_for_audit_log_pages() {
        let meta = PaginationMeta::new(1, 20, 95);
        assert_eq!(meta.total_pages, 5);
        assert!(meta.has_next);
        assert!(!meta.has_prev);

        let meta = PaginationMeta::new(5, 20, 95);
        assert!(!meta.has_next);
        assert!(meta.has_prev);
    }

    #[test]
    fn test_empty_listing_has_one_page() {
        let meta = PaginationMeta::new(1, 20, 0);
        assert_eq!(meta.total_pages, 1);
        assert!(!meta.has_next);
    }

    #[test]
    fn test_page_envelope() {
        let page = Page::new(vec!["alice", "bob"], params(2, 2), 5);
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.pagination.total_pages, 3);
        assert!(page.pagination.has_prev);
    }
}
