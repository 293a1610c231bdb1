//! Read-side view models: the paginated book list, one book's detail, and
//! the borrow summary.
//!
//! Each view owns its store subscriptions and releases them on `close`.
//! Rendering state comes from the cache entry on every call; nothing is
//! copied out of the store.

use tracing::debug;

use crate::endpoint::{Mutation, Query};
use crate::pagination::{PageController, PaginationError};
use crate::shell::{Notification, Route};
use crate::store::{CacheEntry, MutationId, MutationStatus, QueryStatus, QueryStore, SubscriptionId};
use crate::types::{Book, BookId, BorrowSummaryItem};

/// Shown when a failed query carries no usable message.
pub const FALLBACK_ERROR_MESSAGE: &str = "Something went wrong";

pub const UNAVAILABLE_NOTICE: &str = "This book is currently unavailable or has no copies.";

/// What a content area should render.
#[derive(Debug, PartialEq, Eq)]
pub enum ViewState<'a, T: ?Sized> {
    Loading,
    Failed(String),
    Empty,
    Ready(&'a T),
}

/// Map an entry to a view state. A failed refetch over existing data still
/// reports the failure.
fn view_state<'a, T: ?Sized>(
    entry: Option<&'a CacheEntry>,
    project: impl FnOnce(&'a CacheEntry) -> Option<&'a T>,
    is_empty: impl FnOnce(&T) -> bool,
) -> ViewState<'a, T> {
    let Some(entry) = entry else {
        return ViewState::Loading;
    };
    match entry.status() {
        QueryStatus::Loading => ViewState::Loading,
        QueryStatus::Error => ViewState::Failed(
            entry
                .error()
                .and_then(|e| e.server_message())
                .unwrap_or(FALLBACK_ERROR_MESSAGE)
                .to_string(),
        ),
        QueryStatus::Success => match project(entry) {
            Some(data) if is_empty(data) => ViewState::Empty,
            Some(data) => ViewState::Ready(data),
            None => ViewState::Loading,
        },
    }
}

/// Either the route to the borrow form or the notice explaining why not.
pub fn borrow_gate(book: &Book) -> Result<Route, Notification> {
    if !book.available || book.copies == 0 {
        return Err(Notification::info(UNAVAILABLE_NOTICE));
    }
    Ok(Route::BorrowBook(book.id.clone()))
}

#[derive(Debug)]
pub struct BookListView {
    pager: PageController,
    query: Query,
    subscription: Option<SubscriptionId>,
    pending_delete: Option<BookId>,
    deleting: Option<MutationId>,
}

impl BookListView {
    pub fn open(store: &mut QueryStore, pager: PageController) -> Self {
        let query = pager.query();
        let subscription = store.subscribe(query.clone());
        Self {
            pager,
            query,
            subscription: Some(subscription),
            pending_delete: None,
            deleting: None,
        }
    }

    pub fn pager(&self) -> &PageController {
        &self.pager
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn state<'s>(&self, store: &'s QueryStore) -> ViewState<'s, [Book]> {
        view_state(
            store.entry(&self.query),
            |entry| entry.data().and_then(|d| d.as_books()).map(|resp| resp.data.as_slice()),
            <[Book]>::is_empty,
        )
    }

    /// Adopt the pagination metadata of the current page, once loaded.
    pub fn refresh_pagination(&mut self, store: &QueryStore) {
        if let Some(resp) = store.data(&self.query).and_then(|d| d.as_books()) {
            self.pager.sync(resp.pagination.as_ref());
        }
    }

    pub fn next_page(&mut self, store: &mut QueryStore) {
        if self.pager.next() {
            self.resubscribe(store);
        }
    }

    pub fn previous_page(&mut self, store: &mut QueryStore) {
        if self.pager.previous() {
            self.resubscribe(store);
        }
    }

    pub fn go_to_page(&mut self, store: &mut QueryStore, page: u32) {
        if self.pager.go_to(page) {
            self.resubscribe(store);
        }
    }

    pub fn set_items_per_page(&mut self, store: &mut QueryStore, size: u32) -> Result<(), PaginationError> {
        self.pager.set_items_per_page(size)?;
        self.resubscribe(store);
        Ok(())
    }

    /// Subscribe to the new page before dropping the old one, so a shared
    /// key is never evicted in between.
    fn resubscribe(&mut self, store: &mut QueryStore) {
        let query = self.pager.query();
        if query == self.query && self.subscription.is_some() {
            return;
        }
        debug!(page = self.pager.current_page(), limit = self.pager.items_per_page(), "switching page");
        let subscription = store.subscribe(query.clone());
        if let Some(old) = self.subscription.replace(subscription) {
            store.unsubscribe(old);
        }
        self.query = query;
    }

    // Delete confirmation

    pub fn request_delete(&mut self, id: BookId) {
        self.pending_delete = Some(id);
    }

    pub fn pending_delete(&self) -> Option<&BookId> {
        self.pending_delete.as_ref()
    }

    pub fn cancel_delete(&mut self) {
        self.pending_delete = None;
    }

    /// Delete the book awaiting confirmation. The row disappears from every
    /// cached list at once and comes back if the server refuses.
    pub fn confirm_delete(&mut self, store: &mut QueryStore) -> Option<MutationId> {
        let id = self.pending_delete.take()?;
        let mutation = store.mutate(Mutation::DeleteBook(id));
        self.deleting = Some(mutation);
        Some(mutation)
    }

    pub fn is_deleting(&self) -> bool {
        self.deleting.is_some()
    }

    /// Toast for a settled delete, reported once.
    pub fn poll_delete(&mut self, store: &mut QueryStore) -> Option<Notification> {
        let id = self.deleting?;
        let notification = match store.take_mutation(id)? {
            MutationStatus::Pending => return None,
            MutationStatus::Succeeded(data) => Notification::success(data.message().to_string()),
            MutationStatus::Failed(err) => Notification::error(format!("Failed to delete book: {}", err.user_message())),
        };
        self.deleting = None;
        Some(notification)
    }

    pub fn close(&mut self, store: &mut QueryStore) {
        if let Some(subscription) = self.subscription.take() {
            store.unsubscribe(subscription);
        }
    }
}

#[derive(Debug)]
pub struct DetailView {
    query: Query,
    subscription: Option<SubscriptionId>,
}

impl DetailView {
    pub fn open(store: &mut QueryStore, id: BookId) -> Self {
        let query = Query::GetBook(id);
        let subscription = store.subscribe(query.clone());
        Self {
            query,
            subscription: Some(subscription),
        }
    }

    pub fn state<'s>(&self, store: &'s QueryStore) -> ViewState<'s, Book> {
        view_state(
            store.entry(&self.query),
            |entry| entry.data().and_then(|d| d.as_book()).map(|resp| &resp.data),
            |_| false,
        )
    }

    pub fn close(&mut self, store: &mut QueryStore) {
        if let Some(subscription) = self.subscription.take() {
            store.unsubscribe(subscription);
        }
    }
}

#[derive(Debug)]
pub struct SummaryView {
    subscription: Option<SubscriptionId>,
}

impl SummaryView {
    pub fn open(store: &mut QueryStore) -> Self {
        Self {
            subscription: Some(store.subscribe(Query::BorrowSummary)),
        }
    }

    pub fn state<'s>(&self, store: &'s QueryStore) -> ViewState<'s, [BorrowSummaryItem]> {
        view_state(
            store.entry(&Query::BorrowSummary),
            |entry| {
                entry
                    .data()
                    .and_then(|d| d.as_borrow_summary())
                    .map(|resp| resp.data.as_slice())
            },
            <[BorrowSummaryItem]>::is_empty,
        )
    }

    pub fn close(&mut self, store: &mut QueryStore) {
        if let Some(subscription) = self.subscription.take() {
            store.unsubscribe(subscription);
        }
    }
}
