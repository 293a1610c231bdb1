//! What flows and views hand to the presentation layer: where to go next
//! and what to tell the user.

use std::fmt;

use crate::types::BookId;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    Books,
    CreateBook,
    BookDetails(BookId),
    EditBook(BookId),
    BorrowBook(BookId),
    BorrowSummary,
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Route::Books => "/".to_string(),
            Route::CreateBook => "/create-book".to_string(),
            Route::BookDetails(id) => format!("/books/{id}"),
            Route::EditBook(id) => format!("/edit-book/{id}"),
            Route::BorrowBook(id) => format!("/borrow/{id}"),
            Route::BorrowSummary => "/borrow-summary".to_string(),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Success,
    Error,
    Info,
}

/// A dismissable toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: Level,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: Level::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: Level::Error,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: Level::Info,
            message: message.into(),
        }
    }
}
