use std::sync::Arc;

use axum::response::{IntoResponse, Redirect, Response};

use crate::{
    error::AppError,
    models::{Doctor, Patient},
    session::{Session, SessionStore, SessionUser},
    store::Store,
    views::Page,
};

pub mod admin;
pub mod auth;
pub mod doctor;
pub mod patient;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, sessions: SessionStore) -> Self {
        AppState { store, sessions }
    }
}

/// Collects the logged-in user and drains pending flashes for rendering.
pub(crate) async fn page(session: &Session) -> Page {
    Page {
        user: session.user().await,
        flashes: session.take_flashes().await,
    }
}

/// Turns a rejected form submission into a flash plus a redirect to `back`.
/// Every other error propagates unchanged.
pub(crate) async fn flash_rejection(session: &Session, err: AppError, back: &str) -> Result<Response, AppError> {
    match err {
        AppError::Rejected(flash) => {
            warn!("rejected: {}", flash.message);
            session.push_flash(flash).await;
            Ok(Redirect::to(back).into_response())
        }
        other => Err(other),
    }
}

pub(crate) async fn current_doctor(state: &AppState, user: &SessionUser) -> Result<Doctor, AppError> {
    state
        .store
        .doctor_by_user(user.user_id)
        .await?
        .ok_or(AppError::Forbidden)
}

pub(crate) async fn current_patient(state: &AppState, user: &SessionUser) -> Result<Patient, AppError> {
    state
        .store
        .patient_by_user(user.user_id)
        .await?
        .ok_or(AppError::Forbidden)
}
