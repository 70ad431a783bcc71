// src/models/pagination.rs

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct PageParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageParams {
    // Teto da página: o OFFSET precisa caber em i64
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).clamp(1, i64::MAX / MAX_PAGE_SIZE)
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.limit())
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, total: i64, params: &PageParams) -> Self {
        let limit = params.limit();
        Self {
            items,
            total,
            page: params.page(),
            limit,
            total_pages: (total + limit - 1) / limit,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_page_and_limit() {
        let params = PageParams { page: Some(0), limit: Some(500) };
        assert_eq!((params.page(), params.limit(), params.offset()), (1, 100, 0));

        let params = PageParams { page: Some(3), limit: None };
        assert_eq!((params.limit(), params.offset()), (20, 40));
    }

    #[test]
    fn huge_pages_do_not_overflow_the_offset() {
        let params = PageParams { page: Some(i64::MAX), limit: Some(MAX_PAGE_SIZE) };
        assert!(params.offset() > 0);
        assert_eq!(params.page(), i64::MAX / MAX_PAGE_SIZE);

        let params = PageParams { page: Some(i64::MIN), limit: Some(i64::MAX) };
        assert_eq!((params.page(), params.offset()), (1, 0));
    }

    #[test]
    fn total_pages_rounds_up() {
        let params = PageParams { page: Some(1), limit: Some(20) };
        assert_eq!(Paginated::new(vec![1], 41, &params).total_pages, 3);
        assert_eq!(Paginated::<i32>::new(vec![], 0, &params).total_pages, 0);
    }
}
