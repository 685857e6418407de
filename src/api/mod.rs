//! Books HTTP API.

pub mod books;

use axum::{Json, Router, routing::get};
use serde_json::{Value, json};

use crate::db::Database;

/// Shared state for the books handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
}

/// The books routes. Admission and tracking layers are applied by the
/// caller so tests can exercise the routes bare.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/books", get(books::list_books).post(books::create_book))
        .route(
            "/books/:id",
            get(books::get_book)
                .put(books::update_book)
                .delete(books::delete_book),
        )
}

/// Liveness probe; mounted outside the admission layer so health checks
/// are never rate limited.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
