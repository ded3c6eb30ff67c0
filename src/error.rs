use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Token requerido")]
    MissingToken,

    #[error("Pase no encontrado")]
    NotFound,

    #[error("Datos del pase incompletos: {0}")]
    IncompleteData(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::MissingToken => (StatusCode::BAD_REQUEST, "Token requerido".to_string()),
            AppError::NotFound => (StatusCode::NOT_FOUND, "Pase no encontrado".to_string()),
            AppError::IncompleteData(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Datos del pase incompletos: {}", msg),
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({ "error": error_message }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
