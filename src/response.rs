use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug)]
pub struct ApiResponse<T> {
    pub status_code: u16,
    pub status_message: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Creates a successful (200 OK) response with data.
    pub fn ok(data: T) -> Self {
        Self::success(StatusCode::OK, data)
    }

    /// Creates a successful response with a specific status code and data.
    pub fn success(status: StatusCode, data: T) -> Self {
        ApiResponse {
            status_code: status.as_u16(),
            status_message: status.canonical_reason().unwrap_or("Success").to_string(),
            data: Some(data),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = Json(self);

        (status, body).into_response()
    }
}

/// One page of a paginated listing.
#[derive(Serialize, Deserialize, Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub total_pages: i64,
    pub total_items: i64,
    pub has_next: bool,
    pub has_previous: bool,
}

/// Resolves a requested page number against the number of available items.
///
/// A missing or unparsable page number selects the first page, a number
/// outside `1..=total_pages` selects the last page. There is always at
/// least one page, even for an empty listing.
///
/// Returns `(page, total_pages)`.
pub fn resolve_page(requested: Option<&str>, total_items: i64, per_page: i64) -> (i64, i64) {
    let total_pages = ((total_items + per_page - 1) / per_page).max(1);
    let page = match requested.map(str::trim).map(str::parse::<i64>) {
        None | Some(Err(_)) => 1,
        Some(Ok(n)) if (1..=total_pages).contains(&n) => n,
        Some(Ok(_)) => total_pages,
    };
    (page, total_pages)
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, page: i64, total_pages: i64, total_items: i64) -> Self {
        Page {
            items,
            page,
            total_pages,
            total_items,
            has_next: page < total_pages,
            has_previous: page > 1,
        }
    }
}
