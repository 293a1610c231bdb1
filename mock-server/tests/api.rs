use axum::http::{self, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use mock_server::{app, Book};
use serde_json::{json, Value};
use tower::{Service, ServiceExt};

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<String> {
    Request::builder().method(method).uri(uri).body(String::new()).unwrap()
}

/// Send through a shared router so state persists between calls.
async fn send(app: &mut Router, request: Request<String>) -> (StatusCode, Value) {
    let resp = ServiceExt::<Request<String>>::ready(app)
        .await
        .unwrap()
        .call(request)
        .await
        .unwrap();
    let status = resp.status();
    (status, body_json(resp).await)
}

fn book_json(title: &str, isbn: &str, copies: u32) -> String {
    json!({ "title": title, "author": "Author", "genre": "FICTION", "isbn": isbn, "copies": copies }).to_string()
}

async fn create(app: &mut Router, title: &str, isbn: &str, copies: u32) -> Book {
    let (status, body) = send(app, json_request("POST", "/api/books", &book_json(title, isbn, copies))).await;
    assert_eq!(status, StatusCode::CREATED);
    serde_json::from_value(body["data"].clone()).unwrap()
}

// --- list ---

#[tokio::test]
async fn list_books_empty_has_pagination() {
    let resp = app().oneshot(empty_request("GET", "/api/books")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"], json!([]));
    assert_eq!(body["pagination"], json!({ "total": 0, "page": 1, "limit": 10, "totalPages": 0 }));
}

#[tokio::test]
async fn list_books_pages_in_insertion_order() {
    let mut app = app();
    for i in 0..7 {
        create(&mut app, &format!("Book {i}"), &format!("isbn-{i}"), 1).await;
    }

    let (status, body) = send(&mut app, empty_request("GET", "/api/books?page=2&limit=5")).await;
    assert_eq!(status, StatusCode::OK);
    let titles: Vec<&str> = body["data"].as_array().unwrap().iter().map(|b| b["title"].as_str().unwrap()).collect();
    assert_eq!(titles, vec!["Book 5", "Book 6"]);
    assert_eq!(body["pagination"], json!({ "total": 7, "page": 2, "limit": 5, "totalPages": 2 }));
}

#[tokio::test]
async fn list_books_rejects_malformed_query() {
    let resp = app().oneshot(empty_request("GET", "/api/books?page=abc")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = body_json(resp).await;
    assert_eq!(body["success"], false);
    assert!(body["message"].is_string());
}

// --- create ---

#[tokio::test]
async fn create_book_returns_201_and_derives_availability() {
    let mut app = app();
    let book = create(&mut app, "A", "123", 2).await;
    assert_eq!(book.title, "A");
    assert!(book.available);

    let empty = create(&mut app, "B", "456", 0).await;
    assert!(!empty.available);
}

#[tokio::test]
async fn create_book_missing_field_is_400_with_message() {
    let resp = app()
        .oneshot(json_request("POST", "/api/books", r#"{"title":"No author"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = body_json(resp).await;
    assert_eq!(body["success"], false);
    assert!(!body["message"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn create_book_blank_title_is_rejected() {
    let resp = app()
        .oneshot(json_request("POST", "/api/books", &book_json("  ", "1", 1)))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = body_json(resp).await;
    assert_eq!(body["message"], "Validation failed: title is required");
}

#[tokio::test]
async fn create_book_duplicate_isbn_is_rejected() {
    let mut app = app();
    create(&mut app, "A", "123", 1).await;
    let (status, body) = send(&mut app, json_request("POST", "/api/books", &book_json("B", "123", 1))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "A book with this ISBN already exists");
}

// --- get / update / delete ---

#[tokio::test]
async fn unknown_book_is_404_everywhere() {
    let mut app = app();
    for request in [
        empty_request("GET", "/api/books/missing"),
        json_request("PUT", "/api/books/missing", r#"{"copies":1}"#),
        empty_request("DELETE", "/api/books/missing"),
    ] {
        let (status, body) = send(&mut app, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "success": false, "message": "Book not found" }));
    }
}

#[tokio::test]
async fn update_is_partial_and_rederives_availability() {
    let mut app = app();
    let book = create(&mut app, "A", "123", 2).await;

    let (status, body) = send(&mut app, json_request("PUT", &format!("/api/books/{}", book.id), r#"{"copies":0}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "A");
    assert_eq!(body["data"]["copies"], 0);
    assert_eq!(body["data"]["available"], false);
}

#[tokio::test]
async fn rejected_update_changes_nothing() {
    let mut app = app();
    let book = create(&mut app, "Old", "123", 2).await;
    let path = format!("/api/books/{}", book.id);

    let (status, body) = send(&mut app, json_request("PUT", &path, r#"{"title":"New","author":"","copies":0}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Validation failed: author is required");

    let (_, body) = send(&mut app, empty_request("GET", &path)).await;
    assert_eq!(body["data"]["title"], "Old");
    assert_eq!(body["data"]["author"], "Author");
    assert_eq!(body["data"]["copies"], 2);
}

#[tokio::test]
async fn empty_description_clears_it() {
    let mut app = app();
    let book = create(&mut app, "A", "123", 1).await;
    let path = format!("/api/books/{}", book.id);

    let (_, body) = send(&mut app, json_request("PUT", &path, r#"{"description":"Notes"}"#)).await;
    assert_eq!(body["data"]["description"], "Notes");
    let (status, body) = send(&mut app, json_request("PUT", &path, r#"{"description":""}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].get("description").map_or(true, Value::is_null));
}

// --- borrow ---

#[tokio::test]
async fn borrow_decrements_copies_and_aggregates() {
    let mut app = app();
    let dune = create(&mut app, "Dune", "111", 3).await;
    let emma = create(&mut app, "Emma", "222", 5).await;

    for (id, qty) in [(&emma.id, 1), (&dune.id, 2), (&emma.id, 2)] {
        let payload = json!({ "book": id, "quantity": qty, "dueDate": "2025-02-01" }).to_string();
        let (status, body) = send(&mut app, json_request("POST", "/api/borrow", &payload)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["book"], id.as_str());
        assert_eq!(body["data"]["dueDate"], "2025-02-01");
    }

    let (_, body) = send(&mut app, empty_request("GET", &format!("/api/books/{}", dune.id))).await;
    assert_eq!(body["data"]["copies"], 1);

    let (status, body) = send(&mut app, empty_request("GET", "/api/borrow")).await;
    assert_eq!(status, StatusCode::OK);
    let rows: Vec<(String, u64)> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| (row["book"]["title"].as_str().unwrap().to_string(), row["totalQuantity"].as_u64().unwrap()))
        .collect();
    assert_eq!(rows, vec![("Emma".to_string(), 3), ("Dune".to_string(), 2)]);
}

#[tokio::test]
async fn borrowing_last_copy_marks_unavailable() {
    let mut app = app();
    let book = create(&mut app, "A", "1", 2).await;
    let payload = json!({ "book": book.id, "quantity": 2, "dueDate": "2025-02-01" }).to_string();
    let (_, body) = send(&mut app, json_request("POST", "/api/borrow", &payload)).await;
    assert_eq!(body["data"]["updatedBook"]["copies"], 0);
    assert_eq!(body["data"]["updatedBook"]["available"], false);
}

#[tokio::test]
async fn borrow_rejections() {
    let mut app = app();
    let book = create(&mut app, "A", "1", 2).await;

    let too_many = json!({ "book": book.id, "quantity": 3, "dueDate": "2025-02-01" }).to_string();
    let (status, body) = send(&mut app, json_request("POST", "/api/borrow", &too_many)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Not enough copies available");

    let zero = json!({ "book": book.id, "quantity": 0, "dueDate": "2025-02-01" }).to_string();
    let (status, _) = send(&mut app, json_request("POST", "/api/borrow", &zero)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let unknown = json!({ "book": "nope", "quantity": 1, "dueDate": "2025-02-01" }).to_string();
    let (status, body) = send(&mut app, json_request("POST", "/api/borrow", &unknown)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Book not found");

    let (_, body) = send(&mut app, empty_request("GET", &format!("/api/books/{}", book.id))).await;
    assert_eq!(body["data"]["copies"], 2, "rejected borrows leave copies alone");
}

// --- full lifecycle ---

#[tokio::test]
async fn book_lifecycle() {
    let mut app = app();
    let book = create(&mut app, "Walk dog", "9", 1).await;
    let path = format!("/api/books/{}", book.id);

    let (status, body) = send(&mut app, empty_request("GET", &path)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["_id"], book.id.as_str());

    let (status, body) = send(&mut app, json_request("PUT", &path, r#"{"title":"Walk cat"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Walk cat");
    assert_eq!(body["data"]["copies"], 1);

    let (status, body) = send(&mut app, empty_request("DELETE", &path)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], Value::Null);
    assert_eq!(body["message"], "Book deleted successfully");

    let (status, _) = send(&mut app, empty_request("GET", &path)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(&mut app, empty_request("GET", "/api/books")).await;
    assert_eq!(body["data"], json!([]));
}
