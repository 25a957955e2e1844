use axum::{
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;

use super::{flash_rejection, page, AppState};
use crate::{
    accounts::{self, DoctorForm},
    error::AppError,
    models::Role,
    session::{AuthUser, FlashLevel},
    views,
};

const RECENT_APPOINTMENTS: i64 = 20;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    pub q: String,
}

pub async fn dashboard(State(state): State<AppState>, auth: AuthUser) -> Result<Html<String>, AppError> {
    auth.require(Role::Admin)?;
    let store = state.store.as_ref();
    let totals = store.totals().await?;
    let doctors = store.doctors().await?;
    let patients = store.patients().await?;
    let recent = store.recent_appointments(Some(RECENT_APPOINTMENTS)).await?;
    let load = store.department_load().await?;
    views::admin_dashboard(
        &page(&auth.session).await,
        &totals,
        &doctors,
        &patients,
        &recent,
        &load,
    )
}

pub async fn doctors(State(state): State<AppState>, auth: AuthUser) -> Result<Html<String>, AppError> {
    auth.require(Role::Admin)?;
    let doctors = state.store.doctors().await?;
    let departments = state.store.departments().await?;
    views::admin_doctors(&page(&auth.session).await, &doctors, &departments)
}

pub async fn add_doctor(
    State(state): State<AppState>,
    auth: AuthUser,
    Form(form): Form<DoctorForm>,
) -> Result<Response, AppError> {
    auth.require(Role::Admin)?;
    match accounts::add_doctor(state.store.as_ref(), &form).await {
        Ok(_) => {
            auth.session.flash(FlashLevel::Success, "Doctor added").await;
            Ok(Redirect::to("/admin/doctors").into_response())
        }
        Err(err) => flash_rejection(&auth.session, err, "/admin/doctors").await,
    }
}

pub async fn delete_doctor(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
) -> Result<Redirect, AppError> {
    auth.require(Role::Admin)?;
    if !state.store.delete_doctor(id).await? {
        return Err(AppError::NotFound);
    }
    info!("doctor {} removed by {}", id, auth.user.username);
    auth.session.flash(FlashLevel::Info, "Doctor removed").await;
    Ok(Redirect::to("/admin/doctors"))
}

pub async fn appointments(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(search): Query<SearchQuery>,
) -> Result<Html<String>, AppError> {
    auth.require(Role::Admin)?;
    let query = search.q.trim();
    let appointments = if query.is_empty() {
        state.store.recent_appointments(None).await?
    } else {
        state.store.search_appointments(query).await?
    };
    views::admin_appointments(&page(&auth.session).await, &appointments, query)
}
