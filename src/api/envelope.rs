//! Envelope and pagination wire types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unified response envelope returned by every non-binary endpoint.
///
/// `code` 0 and 200 mean success. Any other value is a business-logic error,
/// even when the HTTP status was 2xx. A missing `data` field decodes as
/// `T::default()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de> + Default"))]
pub struct ApiResponse<T = Value> {
    /// Business status classifier.
    #[serde(default)]
    pub code: i64,
    /// Payload.
    #[serde(default)]
    pub data: T,
    /// Human-readable message from the server.
    #[serde(default)]
    pub message: String,
}

impl<T> ApiResponse<T> {
    /// Returns true when `code` denotes success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        is_success_code(self.code)
    }

    /// Discards the envelope and returns the payload.
    pub fn into_data(self) -> T {
        self.data
    }
}

/// Error body shape for non-2xx responses.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Map<String, Value>>,
}

/// Sort direction for paginated listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Pagination query parameters (`page`, `pageSize`, `sortBy`, `sortOrder`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<SortOrder>,
}

impl PaginationParams {
    /// Creates params for a page of the given size.
    #[must_use]
    pub fn page(page: u32, page_size: u32) -> Self {
        Self {
            page: Some(page),
            page_size: Some(page_size),
            ..Self::default()
        }
    }

    /// Adds a sort column and direction.
    #[must_use]
    pub fn sorted_by(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.sort_by = Some(column.into());
        self.sort_order = Some(order);
        self
    }

    /// Query pairs in wire order, skipping unset fields.
    #[must_use]
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(4);
        if let Some(page) = self.page {
            pairs.push(("page".to_string(), page.to_string()));
        }
        if let Some(page_size) = self.page_size {
            pairs.push(("pageSize".to_string(), page_size.to_string()));
        }
        if let Some(sort_by) = &self.sort_by {
            pairs.push(("sortBy".to_string(), sort_by.clone()));
        }
        if let Some(sort_order) = self.sort_order {
            pairs.push(("sortOrder".to_string(), sort_order.as_str().to_string()));
        }
        pairs
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedData<T> {
    pub list: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

/// Returns true for the business codes that denote success (0 and 200).
#[must_use]
pub fn is_success_code(code: i64) -> bool {
    code == 0 || code == 200
}

/// Extracts `data` from an envelope, or returns the body untouched in raw mode.
///
/// No validation is performed: a body without a `data` field unwraps to
/// `Value::Null`.
#[must_use]
pub fn unwrap_envelope(mut body: Value, raw: bool) -> Value {
    if raw {
        return body;
    }
    body.get_mut("data").map(Value::take).unwrap_or(Value::Null)
}

/// Returns `(code, message)` when the body carries a numeric non-success code.
#[must_use]
pub fn business_error(body: &Value) -> Option<(i64, &str)> {
    let code = body.get("code")?.as_i64()?;
    if is_success_code(code) {
        return None;
    }
    let message = body.get("message").and_then(Value::as_str).unwrap_or("");
    Some((code, message))
}
