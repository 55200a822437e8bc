use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

pub type AppResult<T> = Result<T, AppErr>;

#[derive(thiserror::Error, Debug)]
pub enum AppErr {
    #[error("missing field: {0}")]
    Missing(&'static str),

    #[error("{0}")]
    Bad(String),

    #[error("{0} not found")]
    NotFound(&'static str),
}

impl IntoResponse for AppErr {
    fn into_response(self) -> axum::response::Response {
        let code = match self {
            AppErr::Missing(_) | AppErr::Bad(_) => StatusCode::BAD_REQUEST,
            AppErr::NotFound(_) => StatusCode::NOT_FOUND,
        };
        (code, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn bad<E: std::fmt::Display>(e: E) -> AppErr {
    AppErr::Bad(e.to_string())
}
