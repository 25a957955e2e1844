use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use thiserror::Error;

use crate::{session::Flash, views};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("username {0} is already taken")]
    DuplicateUsername(String),
    #[error("slot is already booked")]
    SlotTaken,
    /// The appointment left the state the update required.
    #[error("appointment {0} is no longer in a state that allows this change")]
    StatusChanged(i32),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found")]
    NotFound,
    #[error("forbidden")]
    Forbidden,
    #[error("login required")]
    LoginRequired,
    /// A validation failure the user should see as a flash message.
    #[error("{0}")]
    Rejected(Flash),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("template error: {0}")]
    Template(#[from] tera::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn rejected(message: impl Into<String>) -> Self {
        AppError::Rejected(Flash::danger(message))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                views::error_page(StatusCode::NOT_FOUND, "The requested page does not exist."),
            )
                .into_response(),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                views::error_page(StatusCode::FORBIDDEN, "You are not allowed to access this page."),
            )
                .into_response(),
            AppError::LoginRequired => Redirect::to("/login").into_response(),
            AppError::Rejected(flash) => {
                warn!("unhandled rejection: {}", flash.message);
                (
                    StatusCode::BAD_REQUEST,
                    views::error_page(StatusCode::BAD_REQUEST, &flash.message),
                )
                    .into_response()
            }
            AppError::Store(e) => {
                error!("store error: {}", e);
                internal()
            }
            AppError::Template(e) => {
                error!("template error: {:?}", e);
                internal()
            }
            AppError::Internal(e) => {
                error!("internal error: {}", e);
                internal()
            }
        }
    }
}

fn internal() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        views::error_page(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong."),
    )
        .into_response()
}
