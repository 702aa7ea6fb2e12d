use axum::Json;

use crate::models::style::{self, Style};

/// GET /api/v1/styles: the built-in style catalog.
pub async fn list_styles() -> Json<&'static [Style]> {
    Json(style::catalog())
}
