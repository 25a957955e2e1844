use axum::{
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;

use super::{current_patient, flash_rejection, page, AppState};
use crate::{
    accounts::non_blank,
    error::AppError,
    models::Role,
    scheduling::{self, BookingForm},
    session::{AuthUser, FlashLevel},
    store::DoctorSearch,
    views,
};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DoctorQuery {
    pub q: String,
    pub dept: String,
}

pub async fn dashboard(State(state): State<AppState>, auth: AuthUser) -> Result<Html<String>, AppError> {
    let user = auth.require(Role::Patient)?;
    let patient = current_patient(&state, user).await?;
    let departments = state.store.departments().await?;
    let appointments = state.store.patient_appointments(patient.id).await?;
    views::patient_dashboard(
        &page(&auth.session).await,
        &patient,
        &departments,
        &appointments,
    )
}

pub async fn search_doctors(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<DoctorQuery>,
) -> Result<Html<String>, AppError> {
    auth.require(Role::Patient)?;
    // a malformed department id is ignored rather than rejected
    let search = DoctorSearch {
        name: non_blank(&query.q),
        department_id: query.dept.trim().parse().ok(),
    };
    let doctors = state.store.search_doctors(&search).await?;
    let departments = state.store.departments().await?;
    views::search_doctors(
        &page(&auth.session).await,
        &doctors,
        &departments,
        query.q.trim(),
        search.department_id,
    )
}

pub async fn book_form(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(doctor_id): Path<i32>,
) -> Result<Html<String>, AppError> {
    auth.require(Role::Patient)?;
    let doctor = state.store.doctor(doctor_id).await?.ok_or(AppError::NotFound)?;
    views::book_appointment(&page(&auth.session).await, &doctor)
}

pub async fn book(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(doctor_id): Path<i32>,
    Form(form): Form<BookingForm>,
) -> Result<Response, AppError> {
    let user = auth.require(Role::Patient)?;
    let patient = current_patient(&state, user).await?;
    match scheduling::book(state.store.as_ref(), patient.id, doctor_id, &form).await {
        Ok(_) => {
            auth.session.flash(FlashLevel::Success, "Appointment booked").await;
            Ok(Redirect::to("/patient/dashboard").into_response())
        }
        Err(err) => flash_rejection(&auth.session, err, &format!("/patient/book/{}", doctor_id)).await,
    }
}

pub async fn cancel(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
) -> Result<Response, AppError> {
    let user = auth.require(Role::Patient)?;
    let patient = current_patient(&state, user).await?;
    match scheduling::patient_cancel(state.store.as_ref(), patient.id, id).await {
        Ok(()) => {
            auth.session.flash(FlashLevel::Info, "Appointment cancelled").await;
            Ok(Redirect::to("/patient/dashboard").into_response())
        }
        Err(err) => flash_rejection(&auth.session, err, &format!("/patient/appointment/{}", id)).await,
    }
}

pub async fn appointment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
) -> Result<Html<String>, AppError> {
    let user = auth.require(Role::Patient)?;
    let patient = current_patient(&state, user).await?;
    let appointment = scheduling::patient_appointment(state.store.as_ref(), patient.id, id).await?;
    let treatment = state.store.treatment(appointment.id).await?;
    views::patient_appointment(
        &page(&auth.session).await,
        &appointment,
        treatment.as_ref(),
    )
}
