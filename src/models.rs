use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::FromRow;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Doctor,
    Patient,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Patient => "patient",
        }
    }

    /// Landing page after login.
    pub fn dashboard(&self) -> &'static str {
        match self {
            Role::Admin => "/admin/dashboard",
            Role::Doctor => "/doctor/dashboard",
            Role::Patient => "/patient/dashboard",
        }
    }
}

impl TryFrom<String> for Role {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "admin" => Ok(Role::Admin),
            "doctor" => Ok(Role::Doctor),
            "patient" => Ok(Role::Patient),
            _ => Err(ParseEnumError { kind: "role", value }),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Booked -> {Completed, Cancelled}; both are terminal, except that a
/// completed visit may be completed again to edit its treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppointmentStatus {
    Booked,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Booked => "Booked",
            AppointmentStatus::Completed => "Completed",
            AppointmentStatus::Cancelled => "Cancelled",
        }
    }

    pub fn can_become(&self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (self, next),
            (Booked, Completed) | (Booked, Cancelled) | (Completed, Completed)
        )
    }
}

impl TryFrom<String> for AppointmentStatus {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "Booked" => Ok(AppointmentStatus::Booked),
            "Completed" => Ok(AppointmentStatus::Completed),
            "Cancelled" => Ok(AppointmentStatus::Cancelled),
            _ => Err(ParseEnumError { kind: "appointment status", value }),
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub password: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
}

#[derive(Debug, Clone, FromRow)]
pub struct Department {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Doctor {
    pub id: i32,
    pub user_id: i32,
    pub full_name: String,
    pub specialization_id: Option<i32>,
    pub department_name: Option<String>,
    pub availability: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct Patient {
    pub id: i32,
    pub user_id: i32,
    pub full_name: String,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub contact: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Appointment {
    pub id: i32,
    pub doctor_id: i32,
    pub patient_id: i32,
    pub date: NaiveDate,
    pub time: NaiveTime,
    #[sqlx(try_from = "String")]
    pub status: AppointmentStatus,
    pub reason: Option<String>,
}

// Appointment joined with the names shown on every listing.
#[derive(Debug, Clone, FromRow)]
pub struct AppointmentDetails {
    pub id: i32,
    pub doctor_id: i32,
    pub patient_id: i32,
    pub date: NaiveDate,
    pub time: NaiveTime,
    #[sqlx(try_from = "String")]
    pub status: AppointmentStatus,
    pub reason: Option<String>,
    pub doctor_name: String,
    pub patient_name: String,
    pub department_name: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Treatment {
    pub id: i32,
    pub appointment_id: i32,
    pub diagnosis: Option<String>,
    pub prescription: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DepartmentLoad {
    pub name: String,
    pub appointments: i64,
}
