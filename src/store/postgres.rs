use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::{ClinicTotals, DoctorSearch, NewAppointment, NewDoctor, NewPatient, Store, TreatmentNotes};
use crate::{
    error::StoreError,
    models::{
        Appointment, AppointmentDetails, AppointmentStatus, Department, DepartmentLoad, Doctor,
        Patient, Role, Treatment, User,
    },
};

const DOCTOR_SELECT: &str = "SELECT d.id, d.user_id, d.full_name, d.specialization_id, \
     dep.name AS department_name, d.availability, d.is_active \
     FROM doctors d \
     LEFT JOIN departments dep ON dep.id = d.specialization_id";

const APPOINTMENT_SELECT: &str = "SELECT a.id, a.doctor_id, a.patient_id, a.date, a.time, a.status, a.reason, \
     d.full_name AS doctor_name, p.full_name AS patient_name, dep.name AS department_name \
     FROM appointments a \
     JOIN doctors d ON d.id = a.doctor_id \
     JOIN patients p ON p.id = a.patient_id \
     LEFT JOIN departments dep ON dep.id = d.specialization_id";

const USERNAME_CONSTRAINT: &str = "users_username_key";
const OPEN_SLOT_CONSTRAINT: &str = "appointments_open_slot";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }
}

fn map_unique(err: sqlx::Error, username: &str) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            match db.constraint() {
                Some(USERNAME_CONSTRAINT) => return StoreError::DuplicateUsername(username.to_string()),
                Some(OPEN_SLOT_CONSTRAINT) => return StoreError::SlotTaken,
                _ => {}
            }
        }
    }
    StoreError::Database(err)
}

async fn insert_user(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    username: &str,
    password: &str,
    role: Role,
) -> Result<User, StoreError> {
    sqlx::query_as::<_, User>(
        "INSERT INTO users (username, password, role) VALUES ($1, $2, $3)
         RETURNING id, username, password, role",
    )
    .bind(username)
    .bind(password)
    .bind(role.as_str())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_unique(e, username))
}

#[async_trait]
impl Store for PgStore {
    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT id, username, password, role FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn admin_exists(&self) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE role = 'admin')")
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn create_user(&self, username: &str, password: &str, role: Role) -> Result<User, StoreError> {
        let mut tx = self.pool.begin().await?;
        let user = insert_user(&mut tx, username, password, role).await?;
        tx.commit().await?;
        Ok(user)
    }

    async fn create_patient(&self, new: &NewPatient) -> Result<Patient, StoreError> {
        let mut tx = self.pool.begin().await?;
        let user = insert_user(&mut tx, &new.username, &new.password, Role::Patient).await?;
        let patient = sqlx::query_as::<_, Patient>(
            "INSERT INTO patients (user_id, full_name, age, gender, contact, address)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, user_id, full_name, age, gender, contact, address",
        )
        .bind(user.id)
        .bind(&new.full_name)
        .bind(new.age)
        .bind(&new.gender)
        .bind(&new.contact)
        .bind(&new.address)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(patient)
    }

    async fn create_doctor(&self, new: &NewDoctor) -> Result<Doctor, StoreError> {
        let mut tx = self.pool.begin().await?;
        let user = insert_user(&mut tx, &new.username, &new.password, Role::Doctor).await?;
        let doctor_id: i32 = sqlx::query_scalar(
            "INSERT INTO doctors (user_id, full_name, specialization_id, availability)
             VALUES ($1, $2, $3, $4)
             RETURNING id",
        )
        .bind(user.id)
        .bind(&new.full_name)
        .bind(new.specialization_id)
        .bind(&new.availability)
        .fetch_one(&mut *tx)
        .await?;
        let doctor = sqlx::query_as::<_, Doctor>(&format!("{DOCTOR_SELECT} WHERE d.id = $1"))
            .bind(doctor_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(doctor)
    }

    async fn delete_doctor(&self, id: i32) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let user_id: Option<i32> = sqlx::query_scalar("DELETE FROM doctors WHERE id = $1 RETURNING user_id")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(user_id) = user_id else {
            return Ok(false);
        };
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn departments(&self) -> Result<Vec<Department>, StoreError> {
        let departments = sqlx::query_as::<_, Department>("SELECT id, name, description FROM departments ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(departments)
    }

    async fn create_department(&self, name: &str, description: &str) -> Result<Department, StoreError> {
        let department = sqlx::query_as::<_, Department>(
            "INSERT INTO departments (name, description) VALUES ($1, $2)
             RETURNING id, name, description",
        )
        .bind(name)
        .bind(description)
        .fetch_one(&self.pool)
        .await?;
        Ok(department)
    }

    async fn department_load(&self) -> Result<Vec<DepartmentLoad>, StoreError> {
        let load = sqlx::query_as::<_, DepartmentLoad>(
            "SELECT dep.name, COUNT(a.id) AS appointments
             FROM departments dep
             LEFT JOIN doctors d ON d.specialization_id = dep.id
             LEFT JOIN appointments a ON a.doctor_id = d.id
             GROUP BY dep.id, dep.name
             ORDER BY dep.id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(load)
    }

    async fn doctors(&self) -> Result<Vec<Doctor>, StoreError> {
        let doctors = sqlx::query_as::<_, Doctor>(&format!("{DOCTOR_SELECT} ORDER BY d.id"))
            .fetch_all(&self.pool)
            .await?;
        Ok(doctors)
    }

    async fn doctor(&self, id: i32) -> Result<Option<Doctor>, StoreError> {
        let doctor = sqlx::query_as::<_, Doctor>(&format!("{DOCTOR_SELECT} WHERE d.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(doctor)
    }

    async fn doctor_by_user(&self, user_id: i32) -> Result<Option<Doctor>, StoreError> {
        let doctor = sqlx::query_as::<_, Doctor>(&format!("{DOCTOR_SELECT} WHERE d.user_id = $1"))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(doctor)
    }

    async fn search_doctors(&self, search: &DoctorSearch) -> Result<Vec<Doctor>, StoreError> {
        let mut query = QueryBuilder::<Postgres>::new(DOCTOR_SELECT);
        query.push(" WHERE d.is_active");
        if let Some(name) = &search.name {
            query.push(" AND d.full_name ILIKE ").push_bind(format!("%{}%", name));
        }
        if let Some(department_id) = search.department_id {
            query.push(" AND d.specialization_id = ").push_bind(department_id);
        }
        query.push(" ORDER BY d.full_name");

        let doctors = query.build_query_as::<Doctor>().fetch_all(&self.pool).await?;
        Ok(doctors)
    }

    async fn patients(&self) -> Result<Vec<Patient>, StoreError> {
        let patients = sqlx::query_as::<_, Patient>(
            "SELECT id, user_id, full_name, age, gender, contact, address FROM patients ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(patients)
    }

    async fn patient_by_user(&self, user_id: i32) -> Result<Option<Patient>, StoreError> {
        let patient = sqlx::query_as::<_, Patient>(
            "SELECT id, user_id, full_name, age, gender, contact, address FROM patients WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(patient)
    }

    async fn totals(&self) -> Result<ClinicTotals, StoreError> {
        let totals = sqlx::query_as::<_, ClinicTotals>(
            "SELECT (SELECT COUNT(*) FROM doctors) AS doctors,
                    (SELECT COUNT(*) FROM patients) AS patients,
                    (SELECT COUNT(*) FROM appointments) AS appointments",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(totals)
    }

    async fn appointment(&self, id: i32) -> Result<Option<AppointmentDetails>, StoreError> {
        let appointment = sqlx::query_as::<_, AppointmentDetails>(&format!("{APPOINTMENT_SELECT} WHERE a.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(appointment)
    }

    async fn recent_appointments(&self, limit: Option<i64>) -> Result<Vec<AppointmentDetails>, StoreError> {
        // LIMIT NULL means no limit
        let appointments = sqlx::query_as::<_, AppointmentDetails>(&format!(
            "{APPOINTMENT_SELECT} ORDER BY a.date DESC, a.time DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(appointments)
    }

    async fn search_appointments(&self, query: &str) -> Result<Vec<AppointmentDetails>, StoreError> {
        let appointments = sqlx::query_as::<_, AppointmentDetails>(&format!(
            "{APPOINTMENT_SELECT}
             WHERE p.full_name ILIKE $1 OR d.full_name ILIKE $1
             ORDER BY a.date DESC, a.time DESC"
        ))
        .bind(format!("%{}%", query))
        .fetch_all(&self.pool)
        .await?;
        Ok(appointments)
    }

    async fn doctor_appointments_from(
        &self,
        doctor_id: i32,
        from: NaiveDate,
    ) -> Result<Vec<AppointmentDetails>, StoreError> {
        let appointments = sqlx::query_as::<_, AppointmentDetails>(&format!(
            "{APPOINTMENT_SELECT}
             WHERE a.doctor_id = $1 AND a.date >= $2
             ORDER BY a.date ASC, a.time ASC"
        ))
        .bind(doctor_id)
        .bind(from)
        .fetch_all(&self.pool)
        .await?;
        Ok(appointments)
    }

    async fn patient_appointments(&self, patient_id: i32) -> Result<Vec<AppointmentDetails>, StoreError> {
        let appointments = sqlx::query_as::<_, AppointmentDetails>(&format!(
            "{APPOINTMENT_SELECT}
             WHERE a.patient_id = $1
             ORDER BY a.date ASC, a.time ASC"
        ))
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(appointments)
    }

    async fn slot_taken(&self, doctor_id: i32, date: NaiveDate, time: NaiveTime) -> Result<bool, StoreError> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                 SELECT 1 FROM appointments
                 WHERE doctor_id = $1 AND date = $2 AND time = $3 AND status <> 'Cancelled'
             )",
        )
        .bind(doctor_id)
        .bind(date)
        .bind(time)
        .fetch_one(&self.pool)
        .await?;
        Ok(taken)
    }

    async fn insert_appointment(&self, new: &NewAppointment) -> Result<Appointment, StoreError> {
        sqlx::query_as::<_, Appointment>(
            "INSERT INTO appointments (doctor_id, patient_id, date, time, status, reason)
             VALUES ($1, $2, $3, $4, 'Booked', $5)
             RETURNING id, doctor_id, patient_id, date, time, status, reason",
        )
        .bind(new.doctor_id)
        .bind(new.patient_id)
        .bind(new.date)
        .bind(new.time)
        .bind(&new.reason)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique(e, ""))
    }

    async fn cancel_appointment(&self, id: i32) -> Result<(), StoreError> {
        let updated = sqlx::query("UPDATE appointments SET status = $1 WHERE id = $2 AND status = $3")
            .bind(AppointmentStatus::Cancelled.as_str())
            .bind(id)
            .bind(AppointmentStatus::Booked.as_str())
            .execute(&self.pool)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(StoreError::StatusChanged(id));
        }
        Ok(())
    }

    async fn complete_appointment(&self, id: i32, notes: &TreatmentNotes) -> Result<Treatment, StoreError> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query("UPDATE appointments SET status = $1 WHERE id = $2 AND status <> $3")
            .bind(AppointmentStatus::Completed.as_str())
            .bind(id)
            .bind(AppointmentStatus::Cancelled.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(StoreError::StatusChanged(id));
        }
        let treatment = sqlx::query_as::<_, Treatment>(
            "INSERT INTO treatments (appointment_id, diagnosis, prescription, notes)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (appointment_id) DO UPDATE
             SET diagnosis = EXCLUDED.diagnosis,
                 prescription = EXCLUDED.prescription,
                 notes = EXCLUDED.notes
             RETURNING id, appointment_id, diagnosis, prescription, notes, created_at",
        )
        .bind(id)
        .bind(&notes.diagnosis)
        .bind(&notes.prescription)
        .bind(&notes.notes)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(treatment)
    }

    async fn treatment(&self, appointment_id: i32) -> Result<Option<Treatment>, StoreError> {
        let treatment = sqlx::query_as::<_, Treatment>(
            "SELECT id, appointment_id, diagnosis, prescription, notes, created_at
             FROM treatments WHERE appointment_id = $1",
        )
        .bind(appointment_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(treatment)
    }
}
