//! Stateless HTTP request builder and response parser for the catalog API.
//!
//! # Design
//! `CatalogClient` holds only a `base_url` and carries no mutable state between
//! calls. Each endpoint is split into a `build_*` method that produces an
//! `HttpRequest` and a `parse_*` method that consumes an `HttpResponse`.
//! The caller executes the actual HTTP round-trip, keeping the core
//! deterministic and free of I/O dependencies.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::http::{query_string, HttpMethod, HttpRequest, HttpResponse};
use crate::types::{
    ApiResponse, Book, BookId, BorrowReceipt, BorrowSummaryItem, CreateBook, CreateBorrow, UpdateBook,
};

/// Everything but RFC 3986 unreserved characters is escaped in a path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

fn book_path(id: &BookId) -> String {
    format!("/books/{}", utf8_percent_encode(id.as_str(), PATH_SEGMENT))
}

/// Synchronous, stateless client for the catalog API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogClient {
    base_url: String,
}

impl CatalogClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_list_books(&self, page: Option<u32>, limit: Option<u32>) -> HttpRequest {
        let query = query_string(&[("page", page), ("limit", limit)]);
        self.get(format!("/books{query}"))
    }

    pub fn build_get_book(&self, id: &BookId) -> HttpRequest {
        self.get(book_path(id))
    }

    pub fn build_create_book(&self, input: &CreateBook) -> Result<HttpRequest, ApiError> {
        self.with_json(HttpMethod::Post, "/books".to_string(), input)
    }

    pub fn build_update_book(&self, id: &BookId, input: &UpdateBook) -> Result<HttpRequest, ApiError> {
        self.with_json(HttpMethod::Put, book_path(id), input)
    }

    pub fn build_delete_book(&self, id: &BookId) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Delete,
            path: format!("{}{}", self.base_url, book_path(id)),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn build_create_borrow(&self, input: &CreateBorrow) -> Result<HttpRequest, ApiError> {
        self.with_json(HttpMethod::Post, "/borrow".to_string(), input)
    }

    pub fn build_borrow_summary(&self) -> HttpRequest {
        self.get("/borrow".to_string())
    }

    pub fn parse_list_books(&self, response: HttpResponse) -> Result<ApiResponse<Vec<Book>>, ApiError> {
        parse_envelope(response)
    }

    pub fn parse_get_book(&self, response: HttpResponse) -> Result<ApiResponse<Book>, ApiError> {
        parse_envelope(response)
    }

    pub fn parse_create_book(&self, response: HttpResponse) -> Result<ApiResponse<Book>, ApiError> {
        parse_envelope(response)
    }

    pub fn parse_update_book(&self, response: HttpResponse) -> Result<ApiResponse<Book>, ApiError> {
        parse_envelope(response)
    }

    /// `data` is `null` on success; only the envelope's message survives.
    pub fn parse_delete_book(&self, response: HttpResponse) -> Result<ApiResponse<()>, ApiError> {
        let envelope: ApiResponse<serde_json::Value> = parse_envelope(response)?;
        Ok(ApiResponse {
            success: envelope.success,
            message: envelope.message,
            data: (),
            pagination: envelope.pagination,
        })
    }

    pub fn parse_create_borrow(&self, response: HttpResponse) -> Result<ApiResponse<BorrowReceipt>, ApiError> {
        parse_envelope(response)
    }

    pub fn parse_borrow_summary(
        &self,
        response: HttpResponse,
    ) -> Result<ApiResponse<Vec<BorrowSummaryItem>>, ApiError> {
        parse_envelope(response)
    }

    fn get(&self, path: String) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            path: format!("{}{path}", self.base_url),
            headers: Vec::new(),
            body: None,
        }
    }

    fn with_json<T: Serialize>(&self, method: HttpMethod, path: String, input: &T) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_string(input).map_err(|e| ApiError::Serialization(e.to_string()))?;
        Ok(HttpRequest {
            method,
            path: format!("{}{path}", self.base_url),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Some(body),
        })
    }
}

#[derive(Deserialize)]
struct EnvelopeHead {
    success: bool,
    #[serde(default)]
    message: String,
}

/// Map the status, reject `success: false`, then decode the full envelope.
///
/// The head is read first so an unsuccessful envelope with a `null` payload
/// still reports the server's message instead of a decode failure.
fn parse_envelope<T: DeserializeOwned>(response: HttpResponse) -> Result<ApiResponse<T>, ApiError> {
    if !response.is_success() {
        return Err(ApiError::from_status(response.status, &response.body));
    }
    let head: EnvelopeHead =
        serde_json::from_str(&response.body).map_err(|e| ApiError::Deserialization(e.to_string()))?;
    if !head.success {
        return Err(ApiError::Server {
            status: response.status,
            message: Some(head.message).filter(|m| !m.is_empty()),
        });
    }
    serde_json::from_str(&response.body).map_err(|e| ApiError::Deserialization(e.to_string()))
}
