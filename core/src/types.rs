//! Domain DTOs for the library catalog API.
//!
//! # Design
//! These types mirror the mock-server's schema but are defined independently.
//! Integration tests catch any schema drift between the two crates.
//!
//! Wire names are camelCase (`_id`, `createdAt`, `totalQuantity`), matching
//! the remote API. `available` is part of the wire shape of `Book`, but the
//! client treats it as derived from `copies`: see [`Book::sync_availability`].

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Opaque, server-assigned book identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookId(pub String);

impl BookId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BookId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Genre {
    Fiction,
    NonFiction,
    Science,
    History,
    Biography,
    Fantasy,
}

impl Genre {
    pub const ALL: [Genre; 6] = [
        Genre::Fiction,
        Genre::NonFiction,
        Genre::Science,
        Genre::History,
        Genre::Biography,
        Genre::Fantasy,
    ];

    /// Wire spelling, e.g. `NON_FICTION`.
    pub fn as_str(self) -> &'static str {
        match self {
            Genre::Fiction => "FICTION",
            Genre::NonFiction => "NON_FICTION",
            Genre::Science => "SCIENCE",
            Genre::History => "HISTORY",
            Genre::Biography => "BIOGRAPHY",
            Genre::Fantasy => "FANTASY",
        }
    }

    /// Human-readable label, e.g. `NON FICTION`.
    pub fn label(self) -> String {
        self.as_str().replace('_', " ")
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A catalog entry as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    #[serde(rename = "_id")]
    pub id: BookId,
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

impl Book {
    /// Re-derive `available` from `copies`.
    ///
    /// Applied to every book the client writes into its cache, whether it
    /// came from the server or from an optimistic patch.
    pub fn sync_availability(&mut self) {
        self.available = self.copies > 0;
    }

    /// Apply the fields present in `patch`, then re-derive availability.
    pub fn apply_patch(&mut self, patch: &UpdateBook) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(author) = &patch.author {
            self.author = author.clone();
        }
        if let Some(genre) = patch.genre {
            self.genre = genre;
        }
        if let Some(isbn) = &patch.isbn {
            self.isbn = isbn.clone();
        }
        if let Some(description) = &patch.description {
            self.description = Some(description.clone()).filter(|d| !d.is_empty());
        }
        if let Some(copies) = patch.copies {
            self.copies = copies;
        }
        self.sync_availability();
    }
}

/// Request payload for creating a new book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBook {
    pub title: String,
    pub author: String,
    pub genre: Genre,
    pub isbn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub copies: u32,
}

/// Request payload for updating an existing book. Only the fields present in
/// the JSON are applied; omitted fields remain unchanged on the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBook {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<Genre>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copies: Option<u32>,
}

impl UpdateBook {
    pub fn copies(copies: u32) -> Self {
        Self {
            copies: Some(copies),
            ..Self::default()
        }
    }
}

/// Request payload for `POST /borrow`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBorrow {
    pub book: BookId,
    pub quantity: u32,
    #[serde(with = "due_date")]
    pub due_date: NaiveDate,
}

/// A recorded borrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Borrow {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub book: BookId,
    pub quantity: u32,
    #[serde(with = "due_date")]
    pub due_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// `data` of a successful `POST /borrow`. Some deployments also return the
/// book with its decremented copy count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowReceipt {
    #[serde(flatten)]
    pub borrow: Borrow,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_book: Option<Book>,
}

/// Projection of a book embedded in a borrow summary row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookRef {
    #[serde(rename = "_id")]
    pub id: BookId,
    pub title: String,
    pub isbn: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowSummaryItem {
    pub book: BookRef,
    pub total_quantity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: u32,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

/// Envelope wrapped around every API response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

mod due_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d";

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&date.format(FORMAT))
    }

    /// Accepts `yyyy-MM-dd` as well as full RFC 3339 timestamps, which some
    /// servers echo back after storing the date.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let date_part = raw.get(..10).unwrap_or(&raw);
        NaiveDate::parse_from_str(date_part, FORMAT).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_book() -> Book {
        serde_json::from_str(
            r#"{
                "_id": "b1",
                "title": "Dune",
                "author": "Frank Herbert",
                "genre": "FICTION",
                "isbn": "9780441013593",
                "copies": 2,
                "available": true,
                "createdAt": "2024-06-20T10:00:00.000Z",
                "updatedAt": "2024-06-20T10:00:00.000Z"
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn book_deserializes_wire_names() {
        let book = sample_book();
        assert_eq!(book.id.as_str(), "b1");
        assert_eq!(book.genre, Genre::Fiction);
        assert!(book.description.is_none());
    }

    #[test]
    fn genre_uses_screaming_snake_case() {
        let json = serde_json::to_value(Genre::NonFiction).unwrap();
        assert_eq!(json, "NON_FICTION");
        assert_eq!(Genre::NonFiction.label(), "NON FICTION");
    }

    #[test]
    fn apply_patch_rederives_available() {
        let mut book = sample_book();
        book.apply_patch(&UpdateBook::copies(0));
        assert_eq!(book.copies, 0);
        assert!(!book.available);
        assert_eq!(book.title, "Dune");
    }

    #[test]
    fn apply_patch_clears_description_on_empty_string() {
        let mut book = sample_book();
        book.description = Some("Spice".to_string());
        book.apply_patch(&UpdateBook {
            description: Some(String::new()),
            ..UpdateBook::default()
        });
        assert_eq!(book.description, None);
    }

    #[test]
    fn update_book_omits_absent_fields() {
        let patch = UpdateBook {
            title: Some("New".to_string()),
            ..UpdateBook::default()
        };
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json, serde_json::json!({ "title": "New" }));
    }

    #[test]
    fn create_borrow_serializes_due_date_as_calendar_date() {
        let input = CreateBorrow {
            book: BookId::from("b1"),
            quantity: 1,
            due_date: NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
        };
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["dueDate"], "2025-01-31");
        assert_eq!(json["book"], "b1");
    }

    #[test]
    fn borrow_accepts_timestamp_due_date() {
        let borrow: Borrow = serde_json::from_str(
            r#"{"_id":"x","book":"b1","quantity":2,"dueDate":"2025-01-31T00:00:00.000Z"}"#,
        )
        .unwrap();
        assert_eq!(borrow.due_date, NaiveDate::from_ymd_opt(2025, 1, 31).unwrap());
    }

    #[test]
    fn borrow_receipt_reads_optional_updated_book() {
        let receipt: BorrowReceipt =
            serde_json::from_str(r#"{"book":"b1","quantity":1,"dueDate":"2025-01-31"}"#).unwrap();
        assert!(receipt.updated_book.is_none());
        assert_eq!(receipt.borrow.quantity, 1);
    }

    #[test]
    fn envelope_pagination_is_optional() {
        let resp: ApiResponse<Option<()>> =
            serde_json::from_str(r#"{"success":true,"message":"Book deleted","data":null}"#).unwrap();
        assert!(resp.pagination.is_none());
        assert!(resp.data.is_none());
    }
}
