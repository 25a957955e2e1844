use std::collections::HashSet;

use axum::{
    extract::{Path, State},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use chrono::Local;

use super::{current_doctor, flash_rejection, page, AppState};
use crate::{
    error::AppError,
    models::{AppointmentStatus, Role},
    scheduling::{self, DoctorAction, TreatmentForm},
    session::{AuthUser, FlashLevel},
    views,
};

pub async fn dashboard(State(state): State<AppState>, auth: AuthUser) -> Result<Html<String>, AppError> {
    let user = auth.require(Role::Doctor)?;
    let doctor = current_doctor(&state, user).await?;
    let today = Local::now().date_naive();
    let upcoming = state.store.doctor_appointments_from(doctor.id, today).await?;

    let mut seen = HashSet::new();
    let patients: Vec<(i32, String)> = upcoming
        .iter()
        .filter(|a| seen.insert(a.patient_id))
        .map(|a| (a.patient_id, a.patient_name.clone()))
        .collect();

    views::doctor_dashboard(&page(&auth.session).await, &doctor, &upcoming, &patients)
}

pub async fn appointment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
) -> Result<Html<String>, AppError> {
    let user = auth.require(Role::Doctor)?;
    let doctor = current_doctor(&state, user).await?;
    let appointment = scheduling::doctor_appointment(state.store.as_ref(), doctor.id, id).await?;
    let treatment = state.store.treatment(appointment.id).await?;
    views::doctor_appointment(
        &page(&auth.session).await,
        &appointment,
        treatment.as_ref(),
    )
}

pub async fn act(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
    Form(form): Form<TreatmentForm>,
) -> Result<Response, AppError> {
    let user = auth.require(Role::Doctor)?;
    let doctor = current_doctor(&state, user).await?;
    // ownership and existence are checked before the form is interpreted
    scheduling::doctor_appointment(state.store.as_ref(), doctor.id, id).await?;

    let back = format!("/doctor/appointment/{}", id);
    let result = match DoctorAction::from_form(&form) {
        Ok(action) => scheduling::doctor_act(state.store.as_ref(), doctor.id, id, action).await,
        Err(err) => Err(err),
    };
    match result {
        Ok(AppointmentStatus::Completed) => {
            auth.session.flash(FlashLevel::Success, "Appointment completed").await;
            Ok(Redirect::to("/doctor/dashboard").into_response())
        }
        Ok(_) => {
            auth.session.flash(FlashLevel::Info, "Appointment cancelled").await;
            Ok(Redirect::to("/doctor/dashboard").into_response())
        }
        Err(err) => flash_rejection(&auth.session, err, &back).await,
    }
}
