//! Paging and sorting for list endpoints.

use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE: i64 = 500;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Sort order drawn from a fixed list of columns.
///
/// `column` always points into that list, so it is safe to place in SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub column: &'static str,
    pub descending: bool,
}

impl Sort {
    /// Parse `name` or `-name`. `None` if the column is not in `columns`.
    pub fn parse(raw: &str, columns: &'static [&'static str]) -> Option<Self> {
        let (descending, name) = match raw.strip_prefix('-') {
            Some(name) => (true, name),
            None => (false, raw),
        };
        columns
            .iter()
            .copied()
            .find(|column| *column == name)
            .map(|column| Sort { column, descending })
    }

    pub fn ascending(column: &'static str) -> Self {
        Sort {
            column,
            descending: false,
        }
    }

    pub fn direction(&self) -> &'static str {
        if self.descending {
            "DESC"
        } else {
            "ASC"
        }
    }
}

/// A validated page request. `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub page_size: i64,
    pub sort: Sort,
}

impl PageRequest {
    /// First page of [`DEFAULT_PAGE_SIZE`] rows sorted by `column`.
    pub fn first(column: &'static str) -> Self {
        PageRequest {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort: Sort::ascending(column),
        }
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }

    /// Apply this page to rows already filtered and sorted in memory.
    pub fn slice<T>(&self, rows: Vec<T>) -> Vec<T> {
        let offset = usize::try_from(self.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(self.limit()).unwrap_or(0);
        rows.into_iter().skip(offset).take(limit).collect()
    }
}

/// One page of rows and the number of rows matching the filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_records: i64,
}

/// Pagination block of a list response. Empty when nothing matched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageMetadata {
    #[serde(skip_serializing_if = "is_zero")]
    pub current_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub page_size: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub first_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub last_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub total_records: i64,
}

impl PageMetadata {
    pub fn calculate(total_records: i64, request: &PageRequest) -> Self {
        if total_records == 0 {
            return PageMetadata::default();
        }
        PageMetadata {
            current_page: request.page,
            page_size: request.page_size,
            first_page: 1,
            last_page: (total_records + request.page_size - 1) / request.page_size,
            total_records,
        }
    }
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}
