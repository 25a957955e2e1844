//! Appointment lifecycle: booking, doctor close-out and patient cancellation.

use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;

use crate::{
    accounts::non_blank,
    error::{AppError, StoreError},
    models::{Appointment, AppointmentDetails, AppointmentStatus},
    session::Flash,
    store::{NewAppointment, Store, TreatmentNotes},
};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BookingForm {
    pub date: String,
    pub time: String,
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TreatmentForm {
    pub action: String,
    pub diagnosis: String,
    pub prescription: String,
    pub notes: String,
}

#[derive(Debug, Clone)]
pub enum DoctorAction {
    Complete(TreatmentNotes),
    Cancel,
}

impl DoctorAction {
    pub fn from_form(form: &TreatmentForm) -> Result<Self, AppError> {
        match form.action.as_str() {
            "complete" => Ok(DoctorAction::Complete(TreatmentNotes {
                diagnosis: non_blank(&form.diagnosis),
                prescription: non_blank(&form.prescription),
                notes: non_blank(&form.notes),
            })),
            "cancel" => Ok(DoctorAction::Cancel),
            _ => Err(AppError::rejected("Unknown action")),
        }
    }

    fn target(&self) -> AppointmentStatus {
        match self {
            DoctorAction::Complete(_) => AppointmentStatus::Completed,
            DoctorAction::Cancel => AppointmentStatus::Cancelled,
        }
    }
}

pub fn parse_slot(date: &str, time: &str) -> Result<(NaiveDate, NaiveTime), AppError> {
    let invalid = || AppError::rejected("Invalid date/time format");
    let date = NaiveDate::parse_from_str(date.trim(), DATE_FORMAT).map_err(|_| invalid())?;
    let time = NaiveTime::parse_from_str(time.trim(), TIME_FORMAT).map_err(|_| invalid())?;
    Ok((date, time))
}

fn slot_unavailable() -> AppError {
    AppError::rejected("Selected slot is not available")
}

/// Books `doctor_id` for the patient unless the slot is already held.
pub async fn book(
    store: &dyn Store,
    patient_id: i32,
    doctor_id: i32,
    form: &BookingForm,
) -> Result<Appointment, AppError> {
    let doctor = store.doctor(doctor_id).await?.ok_or(AppError::NotFound)?;
    let (date, time) = parse_slot(&form.date, &form.time)?;

    if store.slot_taken(doctor.id, date, time).await? {
        warn!("slot {} {} for doctor {} already taken", date, time, doctor.id);
        return Err(slot_unavailable());
    }

    let new = NewAppointment {
        doctor_id: doctor.id,
        patient_id,
        date,
        time,
        reason: non_blank(&form.reason),
    };
    // a concurrent booking can still win between the check and the insert
    let appointment = store.insert_appointment(&new).await.map_err(|e| match e {
        StoreError::SlotTaken => slot_unavailable(),
        other => other.into(),
    })?;
    info!(
        "appointment {} booked: doctor {} patient {} at {} {}",
        appointment.id, doctor.id, patient_id, date, time
    );
    Ok(appointment)
}

/// Loads an appointment that must belong to `doctor_id`.
pub async fn doctor_appointment(
    store: &dyn Store,
    doctor_id: i32,
    appointment_id: i32,
) -> Result<AppointmentDetails, AppError> {
    let appointment = store
        .appointment(appointment_id)
        .await?
        .ok_or(AppError::NotFound)?;
    if appointment.doctor_id != doctor_id {
        return Err(AppError::Forbidden);
    }
    Ok(appointment)
}

pub async fn patient_appointment(
    store: &dyn Store,
    patient_id: i32,
    appointment_id: i32,
) -> Result<AppointmentDetails, AppError> {
    let appointment = store
        .appointment(appointment_id)
        .await?
        .ok_or(AppError::NotFound)?;
    if appointment.patient_id != patient_id {
        return Err(AppError::Forbidden);
    }
    Ok(appointment)
}

/// Applies a doctor's decision and returns the resulting status.
pub async fn doctor_act(
    store: &dyn Store,
    doctor_id: i32,
    appointment_id: i32,
    action: DoctorAction,
) -> Result<AppointmentStatus, AppError> {
    let appointment = doctor_appointment(store, doctor_id, appointment_id).await?;

    let target = action.target();
    if !appointment.status.can_become(target) {
        return Err(doctor_refusal(appointment.status));
    }

    let applied = match action {
        DoctorAction::Complete(notes) => store
            .complete_appointment(appointment.id, &notes)
            .await
            .map(|treatment| info!("appointment {} completed, treatment {}", appointment.id, treatment.id)),
        DoctorAction::Cancel => store
            .cancel_appointment(appointment.id)
            .await
            .map(|()| info!("appointment {} cancelled by doctor {}", appointment.id, doctor_id)),
    };
    match applied {
        Ok(()) => Ok(target),
        // the patient changed it between our read and the update
        Err(StoreError::StatusChanged(_)) => {
            let current = doctor_appointment(store, doctor_id, appointment_id).await?;
            warn!("appointment {} moved to {} during a doctor update", current.id, current.status);
            Err(doctor_refusal(current.status))
        }
        Err(other) => Err(other.into()),
    }
}

fn doctor_refusal(current: AppointmentStatus) -> AppError {
    match current {
        AppointmentStatus::Cancelled => AppError::Rejected(Flash::warning(
            "This appointment was cancelled by the patient. You cannot modify it.",
        )),
        _ => AppError::Rejected(Flash::warning("Completed appointments cannot be cancelled")),
    }
}

fn patient_refusal() -> AppError {
    AppError::Rejected(Flash::warning("Only booked appointments can be cancelled"))
}

pub async fn patient_cancel(store: &dyn Store, patient_id: i32, appointment_id: i32) -> Result<(), AppError> {
    let appointment = patient_appointment(store, patient_id, appointment_id).await?;
    if !appointment.status.can_become(AppointmentStatus::Cancelled) {
        return Err(patient_refusal());
    }
    store.cancel_appointment(appointment.id).await.map_err(|e| match e {
        StoreError::StatusChanged(_) => patient_refusal(),
        other => other.into(),
    })?;
    info!("appointment {} cancelled by patient {}", appointment.id, patient_id);
    Ok(())
}
