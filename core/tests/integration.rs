//! End-to-end tests against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then drives the query store,
//! forms and views over real HTTP through `UreqTransport`. Validates that
//! request building, response parsing, tag invalidation and optimistic
//! writes hold up against the actual server.

use catalog_core::endpoint::Tag;
use catalog_core::forms::{BorrowBookFlow, BorrowDraft, CreateBookFlow, EditBookFlow};
use catalog_core::views::{BookListView, SummaryView, ViewState};
use catalog_core::{
    ApiError, BookId, CatalogClient, Genre, Mutation, MutationStatus, PageController, Query, QueryStore, Route,
    Transport, UpdateBook, UreqTransport,
};
use chrono::NaiveDate;

/// Start the mock server on its own runtime and return the API base URL.
fn start_server() -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    format!("http://{addr}/api")
}

fn list_titles(view: &BookListView, store: &QueryStore) -> Vec<(String, bool)> {
    match view.state(store) {
        ViewState::Ready(books) => books.iter().map(|b| (b.title.clone(), b.available)).collect(),
        ViewState::Empty => Vec::new(),
        other => panic!("list not ready: {other:?}"),
    }
}

#[test]
fn create_list_update_scenario() {
    let base_url = start_server();
    let transport = UreqTransport::default();
    let mut store = QueryStore::new(CatalogClient::new(&base_url));

    // An empty list first.
    let mut list = BookListView::open(&mut store, PageController::new());
    store.run_until_idle(&transport);
    assert_eq!(list.state(&store), ViewState::Empty);

    // Create through the form; the open list refetches on its own.
    let mut form = CreateBookFlow::new();
    form.draft.title = "A".into();
    form.draft.author = "B".into();
    form.draft.genre = Some(Genre::Fiction);
    form.draft.isbn = "123".into();
    form.draft.copies = "2".into();
    form.submit(&mut store).unwrap();
    assert_eq!(store.run_until_idle(&transport), 2, "create plus one list refetch");

    let outcome = form.poll(&mut store).unwrap();
    assert_eq!(outcome.navigate, Some(Route::Books));
    assert_eq!(list_titles(&list, &store), vec![("A".to_string(), true)]);
    list.refresh_pagination(&store);
    assert_eq!(list.pager().total_items(), 1);

    // copies -> 0 flips availability before the server answers.
    let id = match list.state(&store) {
        ViewState::Ready(books) => books[0].id.clone(),
        other => panic!("list not ready: {other:?}"),
    };
    let mutation = store.mutate(Mutation::UpdateBook {
        id: id.clone(),
        patch: UpdateBook::copies(0),
    });
    assert_eq!(list_titles(&list, &store), vec![("A".to_string(), false)]);

    store.run_until_idle(&transport);
    assert!(matches!(store.take_mutation(mutation), Some(MutationStatus::Succeeded(_))));
    assert_eq!(list_titles(&list, &store), vec![("A".to_string(), false)]);

    list.close(&mut store);
}

#[test]
fn failed_update_rolls_back() {
    let base_url = start_server();
    let transport = UreqTransport::default();
    let mut store = QueryStore::new(CatalogClient::new(&base_url));

    let mut form = CreateBookFlow::new();
    form.draft.title = "Doomed".into();
    form.draft.author = "B".into();
    form.draft.genre = Some(Genre::History);
    form.draft.isbn = "999".into();
    form.draft.copies = "3".into();
    form.submit(&mut store).unwrap();
    store.run_until_idle(&transport);
    form.poll(&mut store).unwrap();

    let list = BookListView::open(&mut store, PageController::new());
    store.run_until_idle(&transport);
    let before = match list.state(&store) {
        ViewState::Ready(books) => books.to_vec(),
        other => panic!("list not ready: {other:?}"),
    };
    let id = before[0].id.clone();

    // Remove the book behind the cache's back so the update gets a 404.
    let client = store.client().clone();
    let deleted = transport.execute(&client.build_delete_book(&id)).unwrap();
    client.parse_delete_book(deleted).unwrap();

    let mutation = store.mutate(Mutation::UpdateBook {
        id: id.clone(),
        patch: UpdateBook::copies(0),
    });
    assert_ne!(list.state(&store), ViewState::Ready(before.as_slice()));
    store.run_until_idle(&transport);

    match store.take_mutation(mutation) {
        Some(MutationStatus::Failed(ApiError::NotFound { message })) => {
            assert_eq!(message.as_deref(), Some("Book not found"));
        }
        other => panic!("expected 404, got {other:?}"),
    }
    assert_eq!(list.state(&store), ViewState::Ready(before.as_slice()));
    assert!(!store.tagged(&Tag::Book(id)).is_empty());
}

#[test]
fn borrow_flow_updates_summary_and_detail() {
    let base_url = start_server();
    let transport = UreqTransport::default();
    let mut store = QueryStore::new(CatalogClient::new(&base_url));

    let mut form = CreateBookFlow::new();
    form.draft.title = "Dune".into();
    form.draft.author = "Frank Herbert".into();
    form.draft.genre = Some(Genre::Science);
    form.draft.isbn = "9780441013593".into();
    form.draft.copies = "3".into();
    form.submit(&mut store).unwrap();
    store.run_until_idle(&transport);
    form.poll(&mut store).unwrap();

    let mut list = BookListView::open(&mut store, PageController::new());
    store.run_until_idle(&transport);
    let id: BookId = match list.state(&store) {
        ViewState::Ready(books) => books[0].id.clone(),
        other => panic!("list not ready: {other:?}"),
    };

    let summary = SummaryView::open(&mut store);
    let mut borrow = BorrowBookFlow::open(&mut store, id.clone());
    store.run_until_idle(&transport);
    assert_eq!(summary.state(&store), ViewState::Empty);

    // Over-borrowing never leaves the client.
    borrow.draft = BorrowDraft {
        quantity: "4".into(),
        due_date: NaiveDate::from_ymd_opt(2025, 2, 1),
    };
    assert!(borrow.submit(&mut store).is_err());
    assert!(store.is_idle());

    borrow.draft.quantity = "3".into();
    borrow.submit(&mut store).unwrap();
    store.run_until_idle(&transport);
    let outcome = borrow.poll(&mut store).unwrap();
    assert_eq!(outcome.navigate, Some(Route::BorrowSummary));

    let ViewState::Ready(rows) = summary.state(&store) else {
        panic!("summary not ready");
    };
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].book.title, "Dune");
    assert_eq!(rows[0].total_quantity, 3);

    let book = borrow.book(&store).unwrap();
    assert_eq!(book.copies, 0);
    assert!(!book.available);
    assert_eq!(list_titles(&list, &store), vec![("Dune".to_string(), false)]);

    borrow.close(&mut store);
    list.close(&mut store);
}

#[test]
fn edit_flow_round_trip() {
    let base_url = start_server();
    let transport = UreqTransport::default();
    let mut store = QueryStore::new(CatalogClient::new(&base_url));

    let mut form = CreateBookFlow::new();
    form.draft.title = "Emma".into();
    form.draft.author = "Jane Austen".into();
    form.draft.genre = Some(Genre::Fiction);
    form.draft.isbn = "222".into();
    form.draft.copies = "1".into();
    form.submit(&mut store).unwrap();
    store.run_until_idle(&transport);
    form.poll(&mut store).unwrap();

    let list = BookListView::open(&mut store, PageController::new());
    store.run_until_idle(&transport);
    let id = match list.state(&store) {
        ViewState::Ready(books) => books[0].id.clone(),
        other => panic!("list not ready: {other:?}"),
    };

    let mut edit = EditBookFlow::open(&mut store, id.clone());
    store.run_until_idle(&transport);
    assert!(edit.sync(&store));
    assert_eq!(edit.draft.title, "Emma");

    edit.draft.description = "A novel".into();
    edit.submit(&mut store).unwrap();
    store.run_until_idle(&transport);
    let outcome = edit.poll(&mut store).unwrap();
    assert_eq!(outcome.notification.message, "Book updated successfully!");

    // The detail entry was refetched, so the form re-syncs from the server.
    assert!(edit.sync(&store));
    assert_eq!(edit.draft.description, "A novel");
    assert_eq!(store.data(&Query::GetBook(id)).and_then(|d| d.as_book()).unwrap().data.description.as_deref(), Some("A novel"));
    edit.close(&mut store);
}
