use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Utc};
use tokio::sync::Mutex;

use super::{ClinicTotals, DoctorSearch, NewAppointment, NewDoctor, NewPatient, Store, TreatmentNotes};
use crate::{
    error::StoreError,
    models::{
        Appointment, AppointmentDetails, AppointmentStatus, Department, DepartmentLoad, Doctor,
        Patient, Role, Treatment, User,
    },
};

#[derive(Default)]
struct Tables {
    next_id: i32,
    users: Vec<User>,
    departments: Vec<Department>,
    doctors: Vec<Doctor>,
    patients: Vec<Patient>,
    appointments: Vec<Appointment>,
    treatments: Vec<Treatment>,
}

impl Tables {
    fn id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn add_user(&mut self, username: &str, password: &str, role: Role) -> Result<User, StoreError> {
        if self.users.iter().any(|u| u.username == username) {
            return Err(StoreError::DuplicateUsername(username.to_string()));
        }
        let user = User {
            id: self.id(),
            username: username.to_string(),
            password: password.to_string(),
            role,
        };
        self.users.push(user.clone());
        Ok(user)
    }

    fn department_name(&self, id: Option<i32>) -> Option<String> {
        id.and_then(|id| self.departments.iter().find(|d| d.id == id))
            .map(|d| d.name.clone())
    }

    fn details(&self, a: &Appointment) -> AppointmentDetails {
        let doctor = self.doctors.iter().find(|d| d.id == a.doctor_id);
        let patient = self.patients.iter().find(|p| p.id == a.patient_id);
        AppointmentDetails {
            id: a.id,
            doctor_id: a.doctor_id,
            patient_id: a.patient_id,
            date: a.date,
            time: a.time,
            status: a.status,
            reason: a.reason.clone(),
            doctor_name: doctor.map(|d| d.full_name.clone()).unwrap_or_default(),
            patient_name: patient.map(|p| p.full_name.clone()).unwrap_or_default(),
            department_name: doctor.and_then(|d| d.department_name.clone()),
        }
    }

    fn listing(&self, keep: impl Fn(&Appointment) -> bool, newest_first: bool) -> Vec<AppointmentDetails> {
        let mut rows: Vec<AppointmentDetails> = self
            .appointments
            .iter()
            .filter(|&a| keep(a))
            .map(|a| self.details(a))
            .collect();
        rows.sort_by_key(|a| (a.date, a.time));
        if newest_first {
            rows.reverse();
        }
        rows
    }
}

/// Store kept in process memory, mirroring the Postgres constraints.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn user_count(&self) -> usize {
        self.tables.lock().await.users.len()
    }

    pub async fn treatment_count(&self, appointment_id: i32) -> usize {
        self.tables
            .lock()
            .await
            .treatments
            .iter()
            .filter(|t| t.appointment_id == appointment_id)
            .count()
    }

    pub async fn set_doctor_active(&self, doctor_id: i32, active: bool) {
        let mut tables = self.tables.lock().await;
        if let Some(doctor) = tables.doctors.iter_mut().find(|d| d.id == doctor_id) {
            doctor.is_active = active;
        }
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[async_trait]
impl Store for MemoryStore {
    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|u| u.username == username).cloned())
    }

    async fn admin_exists(&self) -> Result<bool, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().any(|u| u.role == Role::Admin))
    }

    async fn create_user(&self, username: &str, password: &str, role: Role) -> Result<User, StoreError> {
        self.tables.lock().await.add_user(username, password, role)
    }

    async fn create_patient(&self, new: &NewPatient) -> Result<Patient, StoreError> {
        let mut tables = self.tables.lock().await;
        let user = tables.add_user(&new.username, &new.password, Role::Patient)?;
        let patient = Patient {
            id: tables.id(),
            user_id: user.id,
            full_name: new.full_name.clone(),
            age: new.age,
            gender: new.gender.clone(),
            contact: new.contact.clone(),
            address: new.address.clone(),
        };
        tables.patients.push(patient.clone());
        Ok(patient)
    }

    async fn create_doctor(&self, new: &NewDoctor) -> Result<Doctor, StoreError> {
        let mut tables = self.tables.lock().await;
        let user = tables.add_user(&new.username, &new.password, Role::Doctor)?;
        let doctor = Doctor {
            id: tables.id(),
            user_id: user.id,
            full_name: new.full_name.clone(),
            specialization_id: new.specialization_id,
            department_name: tables.department_name(new.specialization_id),
            availability: new.availability.clone(),
            is_active: true,
        };
        tables.doctors.push(doctor.clone());
        Ok(doctor)
    }

    async fn delete_doctor(&self, id: i32) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(pos) = tables.doctors.iter().position(|d| d.id == id) else {
            return Ok(false);
        };
        let doctor = tables.doctors.remove(pos);
        tables.users.retain(|u| u.id != doctor.user_id);
        let removed: Vec<i32> = tables
            .appointments
            .iter()
            .filter(|a| a.doctor_id == id)
            .map(|a| a.id)
            .collect();
        tables.appointments.retain(|a| a.doctor_id != id);
        tables.treatments.retain(|t| !removed.contains(&t.appointment_id));
        Ok(true)
    }

    async fn departments(&self) -> Result<Vec<Department>, StoreError> {
        Ok(self.tables.lock().await.departments.clone())
    }

    async fn create_department(&self, name: &str, description: &str) -> Result<Department, StoreError> {
        let mut tables = self.tables.lock().await;
        let department = Department {
            id: tables.id(),
            name: name.to_string(),
            description: Some(description.to_string()),
        };
        tables.departments.push(department.clone());
        Ok(department)
    }

    async fn department_load(&self) -> Result<Vec<DepartmentLoad>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .departments
            .iter()
            .map(|dep| DepartmentLoad {
                name: dep.name.clone(),
                appointments: tables
                    .appointments
                    .iter()
                    .filter(|a| {
                        tables
                            .doctors
                            .iter()
                            .any(|d| d.id == a.doctor_id && d.specialization_id == Some(dep.id))
                    })
                    .count() as i64,
            })
            .collect())
    }

    async fn doctors(&self) -> Result<Vec<Doctor>, StoreError> {
        Ok(self.tables.lock().await.doctors.clone())
    }

    async fn doctor(&self, id: i32) -> Result<Option<Doctor>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.doctors.iter().find(|d| d.id == id).cloned())
    }

    async fn doctor_by_user(&self, user_id: i32) -> Result<Option<Doctor>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.doctors.iter().find(|d| d.user_id == user_id).cloned())
    }

    async fn search_doctors(&self, search: &DoctorSearch) -> Result<Vec<Doctor>, StoreError> {
        let tables = self.tables.lock().await;
        let mut doctors: Vec<Doctor> = tables
            .doctors
            .iter()
            .filter(|d| d.is_active)
            .filter(|d| search.name.as_deref().map_or(true, |n| contains_ci(&d.full_name, n)))
            .filter(|d| search.department_id.map_or(true, |id| d.specialization_id == Some(id)))
            .cloned()
            .collect();
        doctors.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(doctors)
    }

    async fn patients(&self) -> Result<Vec<Patient>, StoreError> {
        Ok(self.tables.lock().await.patients.clone())
    }

    async fn patient_by_user(&self, user_id: i32) -> Result<Option<Patient>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.patients.iter().find(|p| p.user_id == user_id).cloned())
    }

    async fn totals(&self) -> Result<ClinicTotals, StoreError> {
        let tables = self.tables.lock().await;
        Ok(ClinicTotals {
            doctors: tables.doctors.len() as i64,
            patients: tables.patients.len() as i64,
            appointments: tables.appointments.len() as i64,
        })
    }

    async fn appointment(&self, id: i32) -> Result<Option<AppointmentDetails>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.appointments.iter().find(|a| a.id == id).map(|a| tables.details(a)))
    }

    async fn recent_appointments(&self, limit: Option<i64>) -> Result<Vec<AppointmentDetails>, StoreError> {
        let tables = self.tables.lock().await;
        let mut rows = tables.listing(|_| true, true);
        if let Some(limit) = limit {
            rows.truncate(limit.max(0) as usize);
        }
        Ok(rows)
    }

    async fn search_appointments(&self, query: &str) -> Result<Vec<AppointmentDetails>, StoreError> {
        let tables = self.tables.lock().await;
        let rows = tables.listing(|_| true, true);
        Ok(rows
            .into_iter()
            .filter(|a| contains_ci(&a.patient_name, query) || contains_ci(&a.doctor_name, query))
            .collect())
    }

    async fn doctor_appointments_from(
        &self,
        doctor_id: i32,
        from: NaiveDate,
    ) -> Result<Vec<AppointmentDetails>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.listing(|a| a.doctor_id == doctor_id && a.date >= from, false))
    }

    async fn patient_appointments(&self, patient_id: i32) -> Result<Vec<AppointmentDetails>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.listing(|a| a.patient_id == patient_id, false))
    }

    async fn slot_taken(&self, doctor_id: i32, date: NaiveDate, time: NaiveTime) -> Result<bool, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.appointments.iter().any(|a| {
            a.doctor_id == doctor_id
                && a.date == date
                && a.time == time
                && a.status != AppointmentStatus::Cancelled
        }))
    }

    async fn insert_appointment(&self, new: &NewAppointment) -> Result<Appointment, StoreError> {
        let mut tables = self.tables.lock().await;
        let clash = tables.appointments.iter().any(|a| {
            a.doctor_id == new.doctor_id
                && a.date == new.date
                && a.time == new.time
                && a.status != AppointmentStatus::Cancelled
        });
        if clash {
            return Err(StoreError::SlotTaken);
        }
        let appointment = Appointment {
            id: tables.id(),
            doctor_id: new.doctor_id,
            patient_id: new.patient_id,
            date: new.date,
            time: new.time,
            status: AppointmentStatus::Booked,
            reason: new.reason.clone(),
        };
        tables.appointments.push(appointment.clone());
        Ok(appointment)
    }

    async fn cancel_appointment(&self, id: i32) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        match tables.appointments.iter_mut().find(|a| a.id == id) {
            Some(a) if a.status == AppointmentStatus::Booked => {
                a.status = AppointmentStatus::Cancelled;
                Ok(())
            }
            _ => Err(StoreError::StatusChanged(id)),
        }
    }

    async fn complete_appointment(&self, id: i32, notes: &TreatmentNotes) -> Result<Treatment, StoreError> {
        let mut tables = self.tables.lock().await;
        match tables.appointments.iter_mut().find(|a| a.id == id) {
            Some(a) if a.status != AppointmentStatus::Cancelled => a.status = AppointmentStatus::Completed,
            _ => return Err(StoreError::StatusChanged(id)),
        }
        if let Some(t) = tables.treatments.iter_mut().find(|t| t.appointment_id == id) {
            t.diagnosis = notes.diagnosis.clone();
            t.prescription = notes.prescription.clone();
            t.notes = notes.notes.clone();
            return Ok(t.clone());
        }
        let treatment = Treatment {
            id: tables.id(),
            appointment_id: id,
            diagnosis: notes.diagnosis.clone(),
            prescription: notes.prescription.clone(),
            notes: notes.notes.clone(),
            created_at: Utc::now(),
        };
        tables.treatments.push(treatment.clone());
        Ok(treatment)
    }

    async fn treatment(&self, appointment_id: i32) -> Result<Option<Treatment>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.treatments.iter().find(|t| t.appointment_id == appointment_id).cloned())
    }
}
