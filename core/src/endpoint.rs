//! Declarative endpoint definitions.
//!
//! # Design
//! Every endpoint is a variant of a closed enum: [`Query`] for reads that are
//! cached, [`Mutation`] for writes. Each variant knows how to build its
//! request, parse its response, which [`Tag`]s its result provides or
//! invalidates, and, for update and delete, which optimistic edit to apply
//! to cached book lists. The store dispatches on these variants, so adding an
//! endpoint is a compile error until every table below handles it.

use std::collections::BTreeSet;
use std::fmt;

use crate::client::CatalogClient;
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};
use crate::types::{
    ApiResponse, Book, BookId, BorrowReceipt, BorrowSummaryItem, CreateBook, CreateBorrow, UpdateBook,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Endpoint {
    ListBooks,
    GetBook,
    CreateBook,
    UpdateBook,
    DeleteBook,
    CreateBorrow,
    BorrowSummary,
}

impl Endpoint {
    pub fn name(self) -> &'static str {
        match self {
            Endpoint::ListBooks => "getBooks",
            Endpoint::GetBook => "getBookById",
            Endpoint::CreateBook => "createBook",
            Endpoint::UpdateBook => "updateBook",
            Endpoint::DeleteBook => "deleteBook",
            Endpoint::CreateBorrow => "createBorrow",
            Endpoint::BorrowSummary => "getBorrowSummary",
        }
    }
}

/// Label attached to cached entries; invalidating it stales every carrier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tag {
    /// `Books:LIST`
    BooksList,
    /// `Books:<id>`
    Book(BookId),
    /// `Borrows:LIST`
    BorrowsList,
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::BooksList => f.write_str("Books:LIST"),
            Tag::Book(id) => write!(f, "Books:{id}"),
            Tag::BorrowsList => f.write_str("Borrows:LIST"),
        }
    }
}

/// Identity of a cache entry: endpoint plus its serialized arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub endpoint: Endpoint,
    pub args: String,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.endpoint.name(), self.args)
    }
}

/// A cached read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Query {
    ListBooks { page: Option<u32>, limit: Option<u32> },
    GetBook(BookId),
    BorrowSummary,
}

impl Query {
    pub fn list_books(page: u32, limit: u32) -> Self {
        Query::ListBooks {
            page: Some(page),
            limit: Some(limit),
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        match self {
            Query::ListBooks { .. } => Endpoint::ListBooks,
            Query::GetBook(_) => Endpoint::GetBook,
            Query::BorrowSummary => Endpoint::BorrowSummary,
        }
    }

    /// Absent list arguments are left out of the key, so `{}` and
    /// `{"page":1}` are different entries, mirroring the request URL.
    pub fn key(&self) -> CacheKey {
        let args = match self {
            Query::ListBooks { page, limit } => {
                let present: Vec<String> = [("page", page), ("limit", limit)]
                    .into_iter()
                    .filter_map(|(name, value)| value.map(|v| format!("\"{name}\":{v}")))
                    .collect();
                format!("{{{}}}", present.join(","))
            }
            Query::GetBook(id) => serde_json::Value::String(id.0.clone()).to_string(),
            Query::BorrowSummary => "null".to_string(),
        };
        CacheKey {
            endpoint: self.endpoint(),
            args,
        }
    }

    pub fn request(&self, client: &CatalogClient) -> HttpRequest {
        match self {
            Query::ListBooks { page, limit } => client.build_list_books(*page, *limit),
            Query::GetBook(id) => client.build_get_book(id),
            Query::BorrowSummary => client.build_borrow_summary(),
        }
    }

    /// Parse the response and re-derive availability of every book in it.
    pub fn parse(&self, client: &CatalogClient, response: HttpResponse) -> Result<QueryData, ApiError> {
        let mut data = match self {
            Query::ListBooks { .. } => QueryData::Books(client.parse_list_books(response)?),
            Query::GetBook(_) => QueryData::Book(client.parse_get_book(response)?),
            Query::BorrowSummary => QueryData::BorrowSummary(client.parse_borrow_summary(response)?),
        };
        data.sync_availability();
        Ok(data)
    }

    /// Tags this query's entry carries, given its current data (if any).
    pub fn provides(&self, data: Option<&QueryData>) -> BTreeSet<Tag> {
        let mut tags = BTreeSet::new();
        match self {
            Query::ListBooks { .. } => {
                tags.insert(Tag::BooksList);
                if let Some(books) = data.and_then(QueryData::as_books) {
                    tags.extend(books.data.iter().map(|b| Tag::Book(b.id.clone())));
                }
            }
            Query::GetBook(id) => {
                tags.insert(Tag::Book(id.clone()));
            }
            Query::BorrowSummary => {
                tags.insert(Tag::BorrowsList);
                if let Some(summary) = data.and_then(QueryData::as_borrow_summary) {
                    tags.extend(summary.data.iter().map(|row| Tag::Book(row.book.id.clone())));
                }
            }
        }
        tags
    }
}

/// Payload of a successful query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryData {
    Books(ApiResponse<Vec<Book>>),
    Book(ApiResponse<Book>),
    BorrowSummary(ApiResponse<Vec<BorrowSummaryItem>>),
}

impl QueryData {
    pub fn as_books(&self) -> Option<&ApiResponse<Vec<Book>>> {
        match self {
            QueryData::Books(books) => Some(books),
            _ => None,
        }
    }

    pub fn as_book(&self) -> Option<&ApiResponse<Book>> {
        match self {
            QueryData::Book(book) => Some(book),
            _ => None,
        }
    }

    pub fn as_borrow_summary(&self) -> Option<&ApiResponse<Vec<BorrowSummaryItem>>> {
        match self {
            QueryData::BorrowSummary(summary) => Some(summary),
            _ => None,
        }
    }

    fn sync_availability(&mut self) {
        match self {
            QueryData::Books(books) => books.data.iter_mut().for_each(Book::sync_availability),
            QueryData::Book(book) => book.data.sync_availability(),
            QueryData::BorrowSummary(_) => {}
        }
    }
}

/// A write against the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    CreateBook(CreateBook),
    UpdateBook { id: BookId, patch: UpdateBook },
    DeleteBook(BookId),
    CreateBorrow(CreateBorrow),
}

impl Mutation {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            Mutation::CreateBook(_) => Endpoint::CreateBook,
            Mutation::UpdateBook { .. } => Endpoint::UpdateBook,
            Mutation::DeleteBook(_) => Endpoint::DeleteBook,
            Mutation::CreateBorrow(_) => Endpoint::CreateBorrow,
        }
    }

    pub fn request(&self, client: &CatalogClient) -> Result<HttpRequest, ApiError> {
        match self {
            Mutation::CreateBook(input) => client.build_create_book(input),
            Mutation::UpdateBook { id, patch } => client.build_update_book(id, patch),
            Mutation::DeleteBook(id) => Ok(client.build_delete_book(id)),
            Mutation::CreateBorrow(input) => client.build_create_borrow(input),
        }
    }

    pub fn parse(&self, client: &CatalogClient, response: HttpResponse) -> Result<MutationData, ApiError> {
        Ok(match self {
            Mutation::CreateBook(_) => MutationData::Book(client.parse_create_book(response)?),
            Mutation::UpdateBook { .. } => MutationData::Book(client.parse_update_book(response)?),
            Mutation::DeleteBook(_) => MutationData::Deleted(client.parse_delete_book(response)?),
            Mutation::CreateBorrow(_) => MutationData::Borrow(client.parse_create_borrow(response)?),
        })
    }

    /// Tags invalidated once the server confirms the write.
    pub fn invalidates(&self) -> Vec<Tag> {
        match self {
            Mutation::CreateBook(_) => vec![Tag::BooksList],
            Mutation::UpdateBook { id, .. } | Mutation::DeleteBook(id) => {
                vec![Tag::Book(id.clone()), Tag::BooksList]
            }
            Mutation::CreateBorrow(input) => {
                vec![Tag::BooksList, Tag::BorrowsList, Tag::Book(input.book.clone())]
            }
        }
    }

    /// Edit applied to cached book lists before the server answers.
    pub fn optimistic(&self) -> Option<OptimisticEdit> {
        match self {
            Mutation::UpdateBook { id, patch } => Some(OptimisticEdit::Patch(id.clone(), patch.clone())),
            Mutation::DeleteBook(id) => Some(OptimisticEdit::Remove(id.clone())),
            Mutation::CreateBook(_) | Mutation::CreateBorrow(_) => None,
        }
    }
}

/// Payload of a successful mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationData {
    Book(ApiResponse<Book>),
    Deleted(ApiResponse<()>),
    Borrow(ApiResponse<BorrowReceipt>),
}

impl MutationData {
    pub fn message(&self) -> &str {
        match self {
            MutationData::Book(resp) => &resp.message,
            MutationData::Deleted(resp) => &resp.message,
            MutationData::Borrow(resp) => &resp.message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimisticEdit {
    Patch(BookId, UpdateBook),
    Remove(BookId),
}

impl OptimisticEdit {
    pub fn target(&self) -> &BookId {
        match self {
            OptimisticEdit::Patch(id, _) | OptimisticEdit::Remove(id) => id,
        }
    }

    /// Apply to one cached list. Returns the inverse edit, or `None` when the
    /// book is not in the list.
    pub fn apply(&self, books: &mut Vec<Book>) -> Option<Undo> {
        match self {
            OptimisticEdit::Patch(id, patch) => {
                let book = books.iter_mut().find(|b| &b.id == id)?;
                let previous = book.clone();
                book.apply_patch(patch);
                Some(Undo::Restore(previous))
            }
            OptimisticEdit::Remove(id) => {
                let index = books.iter().position(|b| &b.id == id)?;
                let order = books.iter().map(|b| b.id.clone()).collect();
                let book = books.remove(index);
                Some(Undo::Reinsert { order, book })
            }
        }
    }
}

/// Inverse of one [`OptimisticEdit`] on one list.
///
/// Reverting touches only the edited book, so patches for other books that
/// landed in the same list meanwhile survive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Undo {
    Restore(Book),
    /// `order` is the list's ids before the removal. The book goes back in
    /// front of its nearest surviving successor, else after its nearest
    /// surviving predecessor.
    Reinsert { order: Vec<BookId>, book: Book },
}

impl Undo {
    pub fn revert(self, books: &mut Vec<Book>) {
        match self {
            Undo::Restore(previous) => {
                if let Some(slot) = books.iter_mut().find(|b| b.id == previous.id) {
                    *slot = previous;
                }
            }
            Undo::Reinsert { order, book } => {
                if books.iter().any(|b| b.id == book.id) {
                    return;
                }
                let index = reinsert_index(&order, &book.id, books);
                books.insert(index, book);
            }
        }
    }
}

fn reinsert_index(order: &[BookId], id: &BookId, books: &[Book]) -> usize {
    let Some(at) = order.iter().position(|o| o == id) else {
        return books.len();
    };
    let find = |wanted: &BookId| books.iter().position(|b| &b.id == wanted);
    order[at + 1..]
        .iter()
        .find_map(find)
        .or_else(|| order[..at].iter().rev().find_map(|prev| find(prev).map(|i| i + 1)))
        .unwrap_or(0)
}
