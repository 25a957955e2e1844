use serde::Deserialize;

use crate::{
    error::{AppError, StoreError},
    models::{Doctor, Patient, User},
    store::{NewDoctor, NewPatient, Store},
};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegistrationForm {
    pub username: String,
    pub password: String,
    pub full_name: String,
    pub age: String,
    pub gender: String,
    pub contact: String,
    pub address: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DoctorForm {
    pub full_name: String,
    pub username: String,
    pub password: String,
    pub specialization: String,
    pub availability: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

pub(crate) fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn duplicate_username(err: StoreError) -> AppError {
    match err {
        StoreError::DuplicateUsername(_) => AppError::rejected("Username already exists"),
        other => other.into(),
    }
}

async fn ensure_username_free(store: &dyn Store, username: &str) -> Result<(), AppError> {
    if store.user_by_username(username).await?.is_some() {
        return Err(AppError::rejected("Username already exists"));
    }
    Ok(())
}

/// Self-service sign-up. Always creates a patient account.
pub async fn register_patient(store: &dyn Store, form: &RegistrationForm) -> Result<Patient, AppError> {
    let username = form.username.trim();
    if username.is_empty() || form.password.is_empty() {
        return Err(AppError::rejected("Username and password are required"));
    }
    let age = match non_blank(&form.age) {
        Some(raw) => Some(
            raw.parse::<i32>()
                .ok()
                .filter(|age| *age >= 0)
                .ok_or_else(|| AppError::rejected("Age must be a number"))?,
        ),
        None => None,
    };
    ensure_username_free(store, username).await?;

    let new = NewPatient {
        username: username.to_string(),
        password: form.password.clone(),
        full_name: non_blank(&form.full_name).unwrap_or_else(|| username.to_string()),
        age,
        gender: non_blank(&form.gender),
        contact: non_blank(&form.contact),
        address: non_blank(&form.address),
    };
    let patient = store.create_patient(&new).await.map_err(duplicate_username)?;
    info!("registered patient {} ({})", patient.full_name, username);
    Ok(patient)
}

pub async fn add_doctor(store: &dyn Store, form: &DoctorForm) -> Result<Doctor, AppError> {
    let username = form.username.trim();
    let full_name = form.full_name.trim();
    if username.is_empty() || form.password.is_empty() || full_name.is_empty() {
        return Err(AppError::rejected("Name, username and password are required"));
    }
    let specialization_id = match non_blank(&form.specialization) {
        Some(raw) => {
            let id = raw
                .parse::<i32>()
                .map_err(|_| AppError::rejected("Unknown department"))?;
            if !store.departments().await?.iter().any(|d| d.id == id) {
                return Err(AppError::rejected("Unknown department"));
            }
            Some(id)
        }
        None => None,
    };
    ensure_username_free(store, username).await?;

    let new = NewDoctor {
        username: username.to_string(),
        password: form.password.clone(),
        full_name: full_name.to_string(),
        specialization_id,
        availability: non_blank(&form.availability),
    };
    let doctor = store.create_doctor(&new).await.map_err(duplicate_username)?;
    info!("added doctor {} ({})", doctor.full_name, username);
    Ok(doctor)
}

/// Plaintext comparison against the stored password.
pub async fn authenticate(store: &dyn Store, form: &LoginForm) -> Result<Option<User>, AppError> {
    let user = store.user_by_username(form.username.trim()).await?;
    Ok(user.filter(|u| u.password == form.password))
}
