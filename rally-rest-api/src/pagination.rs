// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! Page-number pagination of listing endpoints.

use serde::{Deserialize, Serialize};

/// Query parameters of paginated listings.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    /// 1-based page number.
    pub page: Option<usize>,
    /// Requested page size.
    pub page_size: Option<usize>,
}

/// A page of results.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    /// Total number of items across all pages.
    pub count: usize,
    /// The items of the requested page.
    pub results: Vec<T>,
}

/// Slices `items` according to `query`, clamping the page size to `[1, max_page_size]`.
pub fn paginate<T>(items: Vec<T>, query: PageQuery, default_page_size: usize, max_page_size: usize) -> Page<T> {
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(default_page_size).clamp(1, max_page_size);
    let count = items.len();

    let results = items
        .into_iter()
        .skip((page - 1).saturating_mul(page_size))
        .take(page_size)
        .collect();

    Page { count, results }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slices_pages() {
        let items: Vec<u32> = (0..25).collect();

        let first = paginate(
            items.clone(),
            PageQuery {
                page: Some(1),
                page_size: Some(10),
            },
            10,
            100,
        );
        assert_eq!(first.count, 25);
        assert_eq!(first.results, (0..10).collect::<Vec<_>>());

        let last = paginate(
            items,
            PageQuery {
                page: Some(3),
                page_size: Some(10),
            },
            10,
            100,
        );
        assert_eq!(last.results, (20..25).collect::<Vec<_>>());
    }

    #[test]
    fn clamps_page_size() {
        let items: Vec<u32> = (0..500).collect();

        let page = paginate(
            items,
            PageQuery {
                page: Some(1),
                page_size: Some(10_000),
            },
            10,
            100,
        );
        assert_eq!(page.results.len(), 100);
    }
}
