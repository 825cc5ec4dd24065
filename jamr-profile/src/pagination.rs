//! Pagination utilities
//!
//! Offset pages carry a total count; keyset (cursor) pages carry only a
//! continuation token.

use jamr_common::db::ProfileDetail;
use serde::Serialize;

/// Offset pagination metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub page: i64,
    pub page_size: i64,
    /// Total number of pages
    pub total_pages: i64,
    /// Offset for SQL LIMIT/OFFSET query
    pub offset: i64,
}

/// Calculate pagination metadata for a requested page
///
/// Pages below 1 are treated as page 1. Pages past the end are not clamped:
/// they produce an offset beyond the last row and therefore an empty page.
///
/// # Examples
/// ```
/// use jamr_profile::pagination::calculate_pagination;
///
/// // 250 total results at 100 per page = 3 pages (100 + 100 + 50)
/// let p = calculate_pagination(250, 2, 100);
/// assert_eq!(p.page, 2);
/// assert_eq!(p.total_pages, 3);
/// assert_eq!(p.offset, 100);
/// ```
pub fn calculate_pagination(total_results: i64, requested_page: i64, page_size: i64) -> Pagination {
    let page_size = page_size.max(1);
    let total_results = total_results.max(0);
    let total_pages = if total_results == 0 {
        0
    } else {
        (total_results - 1) / page_size + 1
    };
    let page = requested_page.max(1);
    let offset = (page - 1).saturating_mul(page_size);

    Pagination {
        page,
        page_size,
        total_pages,
        offset,
    }
}

/// Blank cursors mean "first page"
pub fn normalize_cursor(cursor: Option<&str>) -> Option<&str> {
    cursor.map(str::trim).filter(|c| !c.is_empty())
}

/// One offset page of hydrated profiles
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfilePage {
    pub items: Vec<ProfileDetail>,
    pub page: i64,
    pub page_size: i64,
    pub total_results: i64,
    pub total_pages: i64,
}

/// One keyset page of hydrated profiles
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CursorPage {
    pub items: Vec<ProfileDetail>,
    pub has_next: bool,
    /// Id of the last item when another page exists
    pub next_cursor: Option<String>,
}
