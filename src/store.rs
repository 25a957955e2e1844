use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use sqlx::FromRow;

use crate::{
    error::StoreError,
    models::{
        Appointment, AppointmentDetails, Department, DepartmentLoad, Doctor,
        Patient, Role, Treatment, User,
    },
};

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgStore;

#[derive(Debug, Clone)]
pub struct NewPatient {
    pub username: String,
    pub password: String,
    pub full_name: String,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub contact: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewDoctor {
    pub username: String,
    pub password: String,
    pub full_name: String,
    pub specialization_id: Option<i32>,
    pub availability: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub doctor_id: i32,
    pub patient_id: i32,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TreatmentNotes {
    pub diagnosis: Option<String>,
    pub prescription: Option<String>,
    pub notes: Option<String>,
}

/// Filters for the patient-facing doctor search. Inactive doctors are never returned.
#[derive(Debug, Clone, Default)]
pub struct DoctorSearch {
    pub name: Option<String>,
    pub department_id: Option<i32>,
}

#[derive(Debug, Clone, Copy, Default, FromRow, Serialize)]
pub struct ClinicTotals {
    pub doctors: i64,
    pub patients: i64,
    pub appointments: i64,
}

/// Everything the handlers need from persistence.
///
/// Account creation methods create the `users` row and the profile row
/// together and fail with [`StoreError::DuplicateUsername`] without
/// leaving anything behind.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    async fn admin_exists(&self) -> Result<bool, StoreError>;
    async fn create_user(&self, username: &str, password: &str, role: Role) -> Result<User, StoreError>;
    async fn create_patient(&self, new: &NewPatient) -> Result<Patient, StoreError>;
    async fn create_doctor(&self, new: &NewDoctor) -> Result<Doctor, StoreError>;
    /// Removes the doctor and its user; appointments and treatments go with them.
    async fn delete_doctor(&self, id: i32) -> Result<bool, StoreError>;

    async fn departments(&self) -> Result<Vec<Department>, StoreError>;
    async fn create_department(&self, name: &str, description: &str) -> Result<Department, StoreError>;
    async fn department_load(&self) -> Result<Vec<DepartmentLoad>, StoreError>;

    async fn doctors(&self) -> Result<Vec<Doctor>, StoreError>;
    async fn doctor(&self, id: i32) -> Result<Option<Doctor>, StoreError>;
    async fn doctor_by_user(&self, user_id: i32) -> Result<Option<Doctor>, StoreError>;
    async fn search_doctors(&self, search: &DoctorSearch) -> Result<Vec<Doctor>, StoreError>;

    async fn patients(&self) -> Result<Vec<Patient>, StoreError>;
    async fn patient_by_user(&self, user_id: i32) -> Result<Option<Patient>, StoreError>;

    async fn totals(&self) -> Result<ClinicTotals, StoreError>;

    async fn appointment(&self, id: i32) -> Result<Option<AppointmentDetails>, StoreError>;
    /// Newest date first; `None` lists everything.
    async fn recent_appointments(&self, limit: Option<i64>) -> Result<Vec<AppointmentDetails>, StoreError>;
    /// Case-insensitive substring match on the patient or doctor name.
    async fn search_appointments(&self, query: &str) -> Result<Vec<AppointmentDetails>, StoreError>;
    async fn doctor_appointments_from(
        &self,
        doctor_id: i32,
        from: NaiveDate,
    ) -> Result<Vec<AppointmentDetails>, StoreError>;
    async fn patient_appointments(&self, patient_id: i32) -> Result<Vec<AppointmentDetails>, StoreError>;

    /// True when a non-cancelled appointment holds the slot.
    async fn slot_taken(&self, doctor_id: i32, date: NaiveDate, time: NaiveTime) -> Result<bool, StoreError>;
    async fn insert_appointment(&self, new: &NewAppointment) -> Result<Appointment, StoreError>;
    /// Cancels a booked appointment. Fails with [`StoreError::StatusChanged`]
    /// when it is no longer booked.
    async fn cancel_appointment(&self, id: i32) -> Result<(), StoreError>;
    /// Marks the appointment completed and inserts or updates its single
    /// treatment. A cancelled appointment is left untouched and reported as
    /// [`StoreError::StatusChanged`].
    async fn complete_appointment(&self, id: i32, notes: &TreatmentNotes) -> Result<Treatment, StoreError>;
    async fn treatment(&self, appointment_id: i32) -> Result<Option<Treatment>, StoreError>;
}
