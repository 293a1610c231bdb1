//! Client core for the library catalog service.
//!
//! # Overview
//! Builds `HttpRequest` values and parses `HttpResponse` values without
//! touching the network (host-does-IO pattern). On top of that sits a
//! tag-invalidated query cache with optimistic writes, plus the pagination,
//! form and view state a front end needs. The caller executes the actual
//! HTTP round-trip, either by draining [`QueryStore::take_requests`] itself
//! or through a [`Transport`].
//!
//! # Design
//! - `CatalogClient` is stateless: it holds only `base_url`.
//! - Each operation is split into `build_*` (produces request) and
//!   `parse_*` (consumes response), so the I/O boundary is explicit.
//! - `QueryStore` is an explicit value, constructed per application or per
//!   test; all mutation goes through `&mut`, so no reader ever sees a
//!   half-applied patch.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod forms;
pub mod http;
pub mod pagination;
pub mod shell;
pub mod store;
pub mod transport;
pub mod types;
pub mod views;

pub use client::CatalogClient;
pub use config::ClientConfig;
pub use endpoint::{CacheKey, Endpoint, Mutation, Query, QueryData, Tag};
pub use error::ApiError;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use pagination::PageController;
pub use shell::{Notification, Route};
pub use store::{MutationId, MutationStatus, QueryStatus, QueryStore};
pub use transport::{Transport, UreqTransport};
pub use types::{ApiResponse, Book, BookId, CreateBook, CreateBorrow, Genre, UpdateBook};
