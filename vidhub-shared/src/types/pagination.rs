use serde::{Deserialize, Serialize};

const MAX_PER_PAGE: u64 = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 { 1 }
fn default_per_page() -> u64 { 20 }

impl PaginationParams {
    /// Saturates instead of overflowing on absurd page numbers.
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit())
    }

    pub fn limit(&self) -> u64 {
        self.per_page.clamp(1, MAX_PER_PAGE)
    }

    /// `(limit, offset)` as the signed values SQL `LIMIT`/`OFFSET` take.
    /// Offsets past `i64::MAX` clamp to it, which simply yields an empty page.
    pub fn sql_window(&self) -> (i64, i64) {
        let limit = i64::try_from(self.limit()).unwrap_or(i64::MAX);
        let offset = i64::try_from(self.offset()).unwrap_or(i64::MAX);
        (limit, offset)
    }
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self { page: default_page(), per_page: default_per_page() }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Paginated<T: Serialize> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub total_pages: u64,
}

impl<T: Serialize> Paginated<T> {
    pub fn new(items: Vec<T>, total: u64, params: &PaginationParams) -> Self {
        let per_page = params.limit();
        Self {
            items,
            total,
            page: params.page,
            per_page,
            total_pages: total.div_ceil(per_page),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window() {
        let params = PaginationParams { page: 3, per_page: 10 };
        assert_eq!(params.offset(), 20);
        assert_eq!(params.limit(), 10);

        let page_zero = PaginationParams { page: 0, per_page: 10 };
        assert_eq!(page_zero.offset(), 0);
    }

    #[test]
    fn per_page_is_clamped() {
        let params = PaginationParams { page: 2, per_page: 500 };
        assert_eq!(params.limit(), 100);
        assert_eq!(params.offset(), 100);

        let params = PaginationParams { page: 1, per_page: 0 };
        assert_eq!(params.limit(), 1);
    }

    #[test]
    fn total_pages() {
        let params = PaginationParams::default();
        let page: Paginated<u8> = Paginated::new(vec![], 0, &params);
        assert_eq!(page.total_pages, 0);

        let page: Paginated<u8> = Paginated::new(vec![1], 41, &params);
        assert_eq!(page.total_pages, 3);
    }

    #[test]
    fn huge_page_saturates() {
        let params = PaginationParams { page: u64::MAX, per_page: 20 };
        assert_eq!(params.offset(), u64::MAX);
        assert_eq!(params.sql_window(), (20, i64::MAX));

        let params = PaginationParams { page: 3, per_page: 10 };
        assert_eq!(params.sql_window(), (10, 20));
    }
}
