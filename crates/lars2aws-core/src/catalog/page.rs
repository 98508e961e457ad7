//! Search and paging over stream/build lists for selectors.

use serde::Serialize;

/// One page of a filtered list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub more: bool,
}

/// Keep items whose key contains `query` (case-insensitive), then cut page
/// `page` (1-based) of `per_page` items.
pub fn search_page<T, F>(items: &[T], query: &str, page: usize, per_page: usize, key: F) -> Page<T>
where
    T: Clone,
    F: Fn(&T) -> &str,
{
    let query = query.trim().to_lowercase();
    let matching: Vec<&T> = items
        .iter()
        .filter(|item| query.is_empty() || key(item).to_lowercase().contains(&query))
        .collect();

    let per_page = per_page.max(1);
    let start = page.saturating_sub(1).saturating_mul(per_page);
    let end = start.saturating_add(per_page);

    Page {
        items: matching
            .iter()
            .skip(start)
            .take(per_page)
            .map(|item| (*item).clone())
            .collect(),
        more: end < matching.len(),
    }
}
