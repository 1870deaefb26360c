use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;

/// Offset pagination for list endpoints, 1-indexed.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(crate = "rocket::serde")]
pub struct PaginationParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl PaginationParams {
    pub const DEFAULT_PAGE_SIZE: i64 = 20;
    pub const MAX_PAGE_SIZE: i64 = 100;

    pub fn new(page: Option<i64>, page_size: Option<i64>) -> Self {
        Self { page, page_size }
    }

    pub fn effective_page(&self) -> i64 {
        self.page.filter(|p| *p >= 1).unwrap_or(1)
    }

    pub fn effective_page_size(&self) -> i64 {
        match self.page_size {
            Some(size) if size >= 1 => size.min(Self::MAX_PAGE_SIZE),
            _ => Self::DEFAULT_PAGE_SIZE,
        }
    }

    /// SQL OFFSET derived from the capped page size.
    pub fn offset(&self) -> i64 {
        (self.effective_page() - 1) * self.effective_page_size()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(crate = "rocket::serde")]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub page: i64,
    pub page_size: i64,
    pub total_items: i64,
    pub total_pages: i64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, params: &PaginationParams, total_items: i64) -> Self {
        let page_size = params.effective_page_size();
        let total_pages = (total_items + page_size - 1) / page_size;

        Self {
            data,
            page: params.effective_page(),
            page_size,
            total_items,
            total_pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PaginatedResponse<U> {
        PaginatedResponse {
            data: self.data.into_iter().map(f).collect(),
            page: self.page,
            page_size: self.page_size,
            total_items: self.total_items,
            total_pages: self.total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_absent() {
        let params = PaginationParams::default();
        assert_eq!(params.effective_page(), 1);
        assert_eq!(params.effective_page_size(), 20);
        assert_eq!(params.offset(), 0);
    }

    #[test]
    fn page_size_is_capped() {
        let params = PaginationParams::new(Some(3), Some(500));
        assert_eq!(params.effective_page_size(), 100);
        assert_eq!(params.offset(), 200);
    }

    #[test]
    fn non_positive_values_fall_back() {
        let params = PaginationParams::new(Some(0), Some(-5));
        assert_eq!(params.effective_page(), 1);
        assert_eq!(params.effective_page_size(), 20);
    }

    #[test]
    fn total_pages_rounds_up() {
        let response = PaginatedResponse::new(vec![1, 2], &PaginationParams::new(Some(1), Some(2)), 5);
        assert_eq!(response.total_pages, 3);
        assert_eq!(response.page_size, 2);

        let empty: PaginatedResponse<i32> = PaginatedResponse::new(vec![], &PaginationParams::default(), 0);
        assert_eq!(empty.total_pages, 0);
    }
}
