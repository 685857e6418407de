//! CRUD handlers for the books catalog.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;
use tracing::info;

use super::AppState;
use crate::db::Book;
use crate::error::ApiError;

/// Create/update payload.
#[derive(Debug, Deserialize)]
pub struct BookPayload {
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub isbn: Option<String>,
    #[serde(default)]
    pub published_year: Option<i64>,
}

impl BookPayload {
    fn validate(&self) -> Result<(), ApiError> {
        if self.title.trim().is_empty() {
            return Err(ApiError::Validation("title must not be empty".into()));
        }
        if self.author.trim().is_empty() {
            return Err(ApiError::Validation("author must not be empty".into()));
        }
        Ok(())
    }
}

pub async fn list_books(State(state): State<AppState>) -> Result<Json<Vec<Book>>, ApiError> {
    Ok(Json(state.db.books().list().await?))
}

pub async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Book>, ApiError> {
    match state.db.books().find(id).await? {
        Some(book) => Ok(Json(book)),
        None => Err(ApiError::NotFound(id)),
    }
}

pub async fn create_book(
    State(state): State<AppState>,
    Json(payload): Json<BookPayload>,
) -> Result<(StatusCode, Json<Book>), ApiError> {
    payload.validate()?;
    let book = state
        .db
        .books()
        .create(
            payload.title.trim(),
            payload.author.trim(),
            payload.isbn.as_deref(),
            payload.published_year,
        )
        .await?;
    info!(id = book.id, "Book created");
    Ok((StatusCode::CREATED, Json(book)))
}

pub async fn update_book(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<BookPayload>,
) -> Result<Json<Book>, ApiError> {
    payload.validate()?;
    match state
        .db
        .books()
        .update(
            id,
            payload.title.trim(),
            payload.author.trim(),
            payload.isbn.as_deref(),
            payload.published_year,
        )
        .await?
    {
        Some(book) => Ok(Json(book)),
        None => Err(ApiError::NotFound(id)),
    }
}

pub async fn delete_book(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if state.db.books().delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(id))
    }
}
