//! In-memory implementation of the catalog REST API under `/api`.
//!
//! Books live in an insertion-ordered map so paging is stable; borrows are an
//! append-only log aggregated on read. Every response uses the
//! `{ success, message, data, pagination? }` envelope, and every error is
//! `{ success: false, message }`.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Genre {
    Fiction,
    NonFiction,
    Science,
    History,
    Biography,
    Fantasy,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub author: String,
    pub genre: Genre,
    pub isbn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub copies: u32,
    pub available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct CreateBook {
    pub title: String,
    pub author: String,
    pub genre: Genre,
    pub isbn: String,
    #[serde(default)]
    pub description: Option<String>,
    pub copies: u32,
}

#[derive(Deserialize)]
pub struct UpdateBook {
    pub title: Option<String>,
    pub author: Option<String>,
    pub genre: Option<Genre>,
    pub isbn: Option<String>,
    pub description: Option<String>,
    pub copies: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBorrow {
    pub book: String,
    pub quantity: u32,
    pub due_date: NaiveDate,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Borrow {
    #[serde(rename = "_id")]
    pub id: String,
    pub book: String,
    pub quantity: u32,
    pub due_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowReceipt {
    #[serde(flatten)]
    pub borrow: Borrow,
    pub updated_book: Book,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BookRef {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub isbn: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRow {
    pub book: BookRef,
    pub total_quantity: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: u32,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

#[derive(Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub message: String,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl<T> Envelope<T> {
    fn ok(message: &str, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.to_string(),
            data,
            pagination: None,
        })
    }
}

#[derive(Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        };
        tracing::debug!(%status, message = %self, "request rejected");
        let body = serde_json::json!({ "success": false, "message": self.to_string() });
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Default)]
pub struct Store {
    pub books: IndexMap<String, Book>,
    pub borrows: Vec<Borrow>,
}

pub type Db = Arc<RwLock<Store>>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Store::default()));
    let api = Router::new()
        .route("/books", get(list_books).post(create_book))
        .route("/books/{id}", get(get_book).put(update_book).delete(delete_book))
        .route("/borrow", get(borrow_summary).post(create_borrow));
    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn not_found() -> AppError {
    AppError::NotFound("Book not found".to_string())
}

fn require(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("Validation failed: {field} is required")));
    }
    Ok(())
}

fn total_pages(total: u32, limit: u32) -> u32 {
    total.div_ceil(limit)
}

async fn list_books(
    State(db): State<Db>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> AppResult<Json<Envelope<Vec<Book>>>> {
    let Query(params) = params?;
    let page = params.page.filter(|&p| p > 0).unwrap_or(DEFAULT_PAGE);
    let limit = params.limit.filter(|&l| l > 0).unwrap_or(DEFAULT_LIMIT);

    let store = db.read().await;
    let total = u32::try_from(store.books.len()).unwrap_or(u32::MAX);
    let skip = ((page - 1) as usize).saturating_mul(limit as usize);
    let data: Vec<Book> = store.books.values().skip(skip).take(limit as usize).cloned().collect();

    Ok(Json(Envelope {
        success: true,
        message: "Books retrieved successfully".to_string(),
        data,
        pagination: Some(Pagination {
            total,
            page,
            limit,
            total_pages: total_pages(total, limit),
        }),
    }))
}

async fn create_book(
    State(db): State<Db>,
    input: Result<Json<CreateBook>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Envelope<Book>>)> {
    let Json(input) = input?;
    require("title", &input.title)?;
    require("author", &input.author)?;
    require("isbn", &input.isbn)?;

    let mut store = db.write().await;
    if store.books.values().any(|b| b.isbn == input.isbn) {
        return Err(AppError::BadRequest("A book with this ISBN already exists".to_string()));
    }
    let now = Utc::now();
    let book = Book {
        id: Uuid::new_v4().simple().to_string(),
        title: input.title,
        author: input.author,
        genre: input.genre,
        isbn: input.isbn,
        description: input.description.filter(|d| !d.is_empty()),
        copies: input.copies,
        available: input.copies > 0,
        created_at: now,
        updated_at: now,
    };
    store.books.insert(book.id.clone(), book.clone());
    tracing::info!(id = %book.id, "book created");
    Ok((StatusCode::CREATED, Envelope::ok("Book created successfully", book)))
}

async fn get_book(State(db): State<Db>, Path(id): Path<String>) -> AppResult<Json<Envelope<Book>>> {
    let store = db.read().await;
    let book = store.books.get(&id).cloned().ok_or_else(not_found)?;
    Ok(Envelope::ok("Book retrieved successfully", book))
}

async fn update_book(
    State(db): State<Db>,
    Path(id): Path<String>,
    input: Result<Json<UpdateBook>, JsonRejection>,
) -> AppResult<Json<Envelope<Book>>> {
    let Json(input) = input?;
    let mut store = db.write().await;
    let book = store.books.get_mut(&id).ok_or_else(not_found)?;
    for (field, value) in [("title", &input.title), ("author", &input.author), ("isbn", &input.isbn)] {
        if let Some(value) = value {
            require(field, value)?;
        }
    }

    if let Some(title) = input.title {
        book.title = title;
    }
    if let Some(author) = input.author {
        book.author = author;
    }
    if let Some(genre) = input.genre {
        book.genre = genre;
    }
    if let Some(isbn) = input.isbn {
        book.isbn = isbn;
    }
    if let Some(description) = input.description {
        book.description = Some(description).filter(|d| !d.is_empty());
    }
    if let Some(copies) = input.copies {
        book.copies = copies;
    }
    book.available = book.copies > 0;
    book.updated_at = Utc::now();
    Ok(Envelope::ok("Book updated successfully", book.clone()))
}

async fn delete_book(State(db): State<Db>, Path(id): Path<String>) -> AppResult<Json<Envelope<()>>> {
    let mut store = db.write().await;
    store.books.shift_remove(&id).ok_or_else(not_found)?;
    tracing::info!(%id, "book deleted");
    Ok(Envelope::ok("Book deleted successfully", ()))
}

async fn create_borrow(
    State(db): State<Db>,
    input: Result<Json<CreateBorrow>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Envelope<BorrowReceipt>>)> {
    let Json(input) = input?;
    if input.quantity == 0 {
        return Err(AppError::BadRequest("Quantity must be at least 1".to_string()));
    }

    let mut store = db.write().await;
    let book = store.books.get_mut(&input.book).ok_or_else(not_found)?;
    if input.quantity > book.copies {
        return Err(AppError::BadRequest("Not enough copies available".to_string()));
    }
    let now = Utc::now();
    book.copies -= input.quantity;
    book.available = book.copies > 0;
    book.updated_at = now;
    let updated_book = book.clone();

    let borrow = Borrow {
        id: Uuid::new_v4().simple().to_string(),
        book: input.book,
        quantity: input.quantity,
        due_date: input.due_date,
        created_at: now,
        updated_at: now,
    };
    store.borrows.push(borrow.clone());
    tracing::info!(book = %borrow.book, quantity = borrow.quantity, "book borrowed");
    Ok((
        StatusCode::CREATED,
        Envelope::ok("Book borrowed successfully", BorrowReceipt { borrow, updated_book }),
    ))
}

async fn borrow_summary(State(db): State<Db>) -> Json<Envelope<Vec<SummaryRow>>> {
    let store = db.read().await;
    let mut totals: IndexMap<&str, u32> = IndexMap::new();
    for borrow in &store.borrows {
        *totals.entry(borrow.book.as_str()).or_default() += borrow.quantity;
    }
    let rows = totals
        .into_iter()
        .filter_map(|(id, total_quantity)| {
            let book = store.books.get(id)?;
            Some(SummaryRow {
                book: BookRef {
                    id: book.id.clone(),
                    title: book.title.clone(),
                    isbn: book.isbn.clone(),
                },
                total_quantity,
            })
        })
        .collect();
    Envelope::ok("Borrowed books summary retrieved successfully", rows)
}
