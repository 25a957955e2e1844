//! Server-rendered HTML pages.
//!
//! Templates live in `templates/` and are compiled into the binary. Names end
//! in `.html`, so tera autoescapes every interpolated value.

use std::sync::OnceLock;

use axum::{http::StatusCode, response::Html};
use serde::Serialize;
use tera::{Context, Tera};

use crate::{
    error::AppError,
    models::{AppointmentDetails, AppointmentStatus, Department, DepartmentLoad, Doctor, Patient, Treatment},
    session::{Flash, SessionUser},
    store::ClinicTotals,
};

static TEMPLATES: OnceLock<Result<Tera, tera::Error>> = OnceLock::new();

macro_rules! template {
    ($name:literal) => {
        ($name, include_str!(concat!("../templates/", $name)))
    };
}

fn load_templates() -> Result<Tera, tera::Error> {
    let mut tera = Tera::default();
    tera.add_raw_templates(vec![
        template!("base.html"),
        template!("appointments.html"),
        template!("department_options.html"),
        template!("treatment.html"),
        template!("error.html"),
        template!("index.html"),
        template!("login.html"),
        template!("register.html"),
        template!("admin_dashboard.html"),
        template!("admin_doctors.html"),
        template!("admin_appointments.html"),
        template!("doctor_dashboard.html"),
        template!("doctor_appointment.html"),
        template!("patient_dashboard.html"),
        template!("search_doctors.html"),
        template!("book_appointment.html"),
        template!("patient_appointment.html"),
    ])?;
    Ok(tera)
}

/// The compiled template set, loaded on first use.
pub fn templates() -> Result<&'static Tera, AppError> {
    TEMPLATES
        .get_or_init(load_templates)
        .as_ref()
        .map_err(|e| AppError::Internal(format!("templates failed to load: {:?}", e)))
}

/// Per-request chrome: who is logged in and which flashes to show.
pub struct Page {
    pub user: Option<SessionUser>,
    pub flashes: Vec<Flash>,
}

#[derive(Serialize)]
struct UserView<'a> {
    username: &'a str,
    role: &'static str,
    dashboard: &'static str,
}

#[derive(Serialize)]
struct FlashView<'a> {
    level: &'static str,
    message: &'a str,
}

#[derive(Serialize)]
struct AppointmentRow<'a> {
    id: i32,
    date: String,
    time: String,
    doctor: &'a str,
    department: &'a str,
    patient: &'a str,
    status: &'static str,
    reason: &'a str,
}

impl<'a> From<&'a AppointmentDetails> for AppointmentRow<'a> {
    fn from(a: &'a AppointmentDetails) -> Self {
        AppointmentRow {
            id: a.id,
            date: a.date.to_string(),
            time: a.time.format("%H:%M").to_string(),
            doctor: &a.doctor_name,
            department: opt(&a.department_name),
            patient: &a.patient_name,
            status: a.status.as_str(),
            reason: opt(&a.reason),
        }
    }
}

#[derive(Serialize)]
struct DoctorRow<'a> {
    id: i32,
    name: &'a str,
    department: &'a str,
    availability: &'a str,
    active: bool,
}

impl<'a> From<&'a Doctor> for DoctorRow<'a> {
    fn from(d: &'a Doctor) -> Self {
        DoctorRow {
            id: d.id,
            name: &d.full_name,
            department: opt(&d.department_name),
            availability: opt(&d.availability),
            active: d.is_active,
        }
    }
}

#[derive(Serialize)]
struct TreatmentView<'a> {
    diagnosis: &'a str,
    prescription: &'a str,
    notes: &'a str,
    recorded: String,
}

impl<'a> From<&'a Treatment> for TreatmentView<'a> {
    fn from(t: &'a Treatment) -> Self {
        TreatmentView {
            diagnosis: opt(&t.diagnosis),
            prescription: opt(&t.prescription),
            notes: opt(&t.notes),
            recorded: t.created_at.format("%Y-%m-%d %H:%M UTC").to_string(),
        }
    }
}

/// Current values for the doctor's treatment form; blank when unset.
#[derive(Serialize)]
struct TreatmentForm<'a> {
    diagnosis: &'a str,
    prescription: &'a str,
    notes: &'a str,
}

#[derive(Serialize)]
struct DepartmentOption<'a> {
    id: i32,
    name: &'a str,
    selected: bool,
}

#[derive(Serialize)]
struct LoadRow<'a> {
    name: &'a str,
    appointments: i64,
    share: String,
}

#[derive(Serialize)]
struct PatientRow<'a> {
    name: &'a str,
    contact: &'a str,
}

fn opt(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("-")
}

fn blank(value: Option<&Option<String>>) -> &str {
    value.and_then(|v| v.as_deref()).unwrap_or_default()
}

fn appointment_rows(appointments: &[AppointmentDetails]) -> Vec<AppointmentRow<'_>> {
    appointments.iter().map(AppointmentRow::from).collect()
}

fn department_options(departments: &[Department], selected: Option<i32>) -> Vec<DepartmentOption<'_>> {
    departments
        .iter()
        .map(|d| DepartmentOption {
            id: d.id,
            name: &d.name,
            selected: selected == Some(d.id),
        })
        .collect()
}

fn render(template: &str, title: &str, page: &Page, mut context: Context) -> Result<Html<String>, AppError> {
    let user = page.user.as_ref().map(|u| UserView {
        username: &u.username,
        role: u.role.as_str(),
        dashboard: u.role.dashboard(),
    });
    let flashes: Vec<FlashView> = page
        .flashes
        .iter()
        .map(|f| FlashView {
            level: f.level.as_str(),
            message: &f.message,
        })
        .collect();
    context.insert("title", title);
    context.insert("user", &user);
    context.insert("flashes", &flashes);
    Ok(Html(templates()?.render(template, &context)?))
}

pub fn error_page(status: StatusCode, message: &str) -> Html<String> {
    let page = Page {
        user: None,
        flashes: Vec::new(),
    };
    let title = format!("{} {}", status.as_u16(), status.canonical_reason().unwrap_or("Error"));
    let mut context = Context::new();
    context.insert("message", message);
    render("error.html", &title, &page, context).unwrap_or_else(|e| {
        error!("error page failed to render: {}", e);
        Html(title)
    })
}

pub fn index(page: &Page) -> Result<Html<String>, AppError> {
    render("index.html", "Clinic", page, Context::new())
}

pub fn login(page: &Page) -> Result<Html<String>, AppError> {
    render("login.html", "Login", page, Context::new())
}

pub fn register(page: &Page) -> Result<Html<String>, AppError> {
    render("register.html", "Register", page, Context::new())
}

pub fn admin_dashboard(
    page: &Page,
    totals: &ClinicTotals,
    doctors: &[Doctor],
    patients: &[Patient],
    recent: &[AppointmentDetails],
    load: &[DepartmentLoad],
) -> Result<Html<String>, AppError> {
    let total: i64 = load.iter().map(|l| l.appointments).sum();
    let load: Vec<LoadRow> = load
        .iter()
        .map(|l| {
            let share = if total > 0 {
                l.appointments as f64 * 100.0 / total as f64
            } else {
                0.0
            };
            LoadRow {
                name: &l.name,
                appointments: l.appointments,
                share: format!("{:.1}", share),
            }
        })
        .collect();
    let doctors: Vec<DoctorRow> = doctors.iter().map(DoctorRow::from).collect();
    let patients: Vec<PatientRow> = patients
        .iter()
        .map(|p| PatientRow {
            name: &p.full_name,
            contact: opt(&p.contact),
        })
        .collect();

    let mut context = Context::new();
    context.insert("totals", totals);
    context.insert("load", &load);
    context.insert("doctors", &doctors);
    context.insert("patients", &patients);
    context.insert("appointments", &appointment_rows(recent));
    context.insert("link", &None::<&str>);
    render("admin_dashboard.html", "Admin dashboard", page, context)
}

pub fn admin_doctors(page: &Page, doctors: &[Doctor], departments: &[Department]) -> Result<Html<String>, AppError> {
    let doctors: Vec<DoctorRow> = doctors.iter().map(DoctorRow::from).collect();
    let mut context = Context::new();
    context.insert("doctors", &doctors);
    context.insert("departments", &department_options(departments, None));
    render("admin_doctors.html", "Doctors", page, context)
}

pub fn admin_appointments(
    page: &Page,
    appointments: &[AppointmentDetails],
    query: &str,
) -> Result<Html<String>, AppError> {
    let mut context = Context::new();
    context.insert("query", query);
    context.insert("appointments", &appointment_rows(appointments));
    context.insert("link", &None::<&str>);
    render("admin_appointments.html", "Appointments", page, context)
}

pub fn doctor_dashboard(
    page: &Page,
    doctor: &Doctor,
    upcoming: &[AppointmentDetails],
    patients: &[(i32, String)],
) -> Result<Html<String>, AppError> {
    let names: Vec<&str> = patients.iter().map(|(_, name)| name.as_str()).collect();
    let mut context = Context::new();
    context.insert("doctor", &DoctorRow::from(doctor));
    context.insert("appointments", &appointment_rows(upcoming));
    context.insert("patients", &names);
    context.insert("link", "/doctor/appointment/");
    render("doctor_dashboard.html", "Doctor dashboard", page, context)
}

pub fn doctor_appointment(
    page: &Page,
    appointment: &AppointmentDetails,
    treatment: Option<&Treatment>,
) -> Result<Html<String>, AppError> {
    let form = TreatmentForm {
        diagnosis: blank(treatment.map(|t| &t.diagnosis)),
        prescription: blank(treatment.map(|t| &t.prescription)),
        notes: blank(treatment.map(|t| &t.notes)),
    };
    let mut context = Context::new();
    context.insert("appointment", &AppointmentRow::from(appointment));
    context.insert("treatment", &treatment.map(TreatmentView::from));
    context.insert("form", &form);
    render("doctor_appointment.html", "Appointment", page, context)
}

pub fn patient_dashboard(
    page: &Page,
    patient: &Patient,
    departments: &[Department],
    appointments: &[AppointmentDetails],
) -> Result<Html<String>, AppError> {
    let mut context = Context::new();
    context.insert("patient", &patient.full_name);
    context.insert("departments", &department_options(departments, None));
    context.insert("appointments", &appointment_rows(appointments));
    context.insert("link", "/patient/appointment/");
    render("patient_dashboard.html", "Patient dashboard", page, context)
}

pub fn search_doctors(
    page: &Page,
    doctors: &[Doctor],
    departments: &[Department],
    query: &str,
    department: Option<i32>,
) -> Result<Html<String>, AppError> {
    let doctors: Vec<DoctorRow> = doctors.iter().map(DoctorRow::from).collect();
    let mut context = Context::new();
    context.insert("query", query);
    context.insert("doctors", &doctors);
    context.insert("departments", &department_options(departments, department));
    render("search_doctors.html", "Find a doctor", page, context)
}

pub fn book_appointment(page: &Page, doctor: &Doctor) -> Result<Html<String>, AppError> {
    let mut context = Context::new();
    context.insert("doctor", &DoctorRow::from(doctor));
    render("book_appointment.html", "Book appointment", page, context)
}

pub fn patient_appointment(
    page: &Page,
    appointment: &AppointmentDetails,
    treatment: Option<&Treatment>,
) -> Result<Html<String>, AppError> {
    let mut context = Context::new();
    context.insert("appointment", &AppointmentRow::from(appointment));
    context.insert("treatment", &treatment.map(TreatmentView::from));
    context.insert("can_cancel", &appointment.status.can_become(AppointmentStatus::Cancelled));
    render("patient_appointment.html", "Appointment", page, context)
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};

    use super::*;
    use crate::{models::Role, session::FlashLevel};

    fn admin_page(flashes: Vec<Flash>) -> Page {
        Page {
            user: Some(SessionUser {
                user_id: 1,
                role: Role::Admin,
                username: "admin".to_string(),
            }),
            flashes,
        }
    }

    fn appointment(patient_name: &str) -> AppointmentDetails {
        AppointmentDetails {
            id: 42,
            doctor_id: 1,
            patient_id: 2,
            date: NaiveDate::from_ymd_opt(2099, 3, 1).unwrap(),
            time: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            status: AppointmentStatus::Booked,
            reason: None,
            doctor_name: "Gregory House".to_string(),
            patient_name: patient_name.to_string(),
            department_name: Some("Cardiology".to_string()),
        }
    }

    #[test]
    fn every_template_loads() {
        let tera = templates().unwrap();
        assert_eq!(tera.get_template_names().count(), 17);
    }

    #[test]
    fn layout_renders_flashes_and_user() {
        let page = admin_page(vec![Flash::new(FlashLevel::Success, "Doctor <added>")]);
        let Html(html) = index(&page).unwrap();
        assert!(html.contains(r#"class="flash flash-success""#));
        assert!(html.contains("Doctor &lt;added&gt;"));
        assert!(html.contains(r#"href="/admin/dashboard""#));
        assert!(html.contains("<title>Clinic - Clinic</title>"));
    }

    #[test]
    fn stored_values_are_escaped() {
        let Html(html) = admin_appointments(
            &admin_page(Vec::new()),
            &[appointment("<script>alert(1)</script>")],
            r#"" onfocus="x"#,
        )
        .unwrap();
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains(r#"value="" onfocus"#));
        assert!(html.contains("09:30"));
    }

    #[test]
    fn appointment_links_follow_the_role() {
        let rows = [appointment("alice")];
        let Html(doctor) = doctor_dashboard(
            &admin_page(Vec::new()),
            &Doctor {
                id: 1,
                user_id: 5,
                full_name: "Gregory House".to_string(),
                specialization_id: Some(1),
                department_name: Some("Cardiology".to_string()),
                availability: None,
                is_active: true,
            },
            &rows,
            &[(2, "alice".to_string())],
        )
        .unwrap();
        assert!(doctor.contains(r#"href="/doctor/appointment/42""#));

        let Html(admin) = admin_appointments(&admin_page(Vec::new()), &rows, "").unwrap();
        assert!(!admin.contains("/appointment/42"));

        let Html(empty) = admin_appointments(&admin_page(Vec::new()), &[], "").unwrap();
        assert!(empty.contains("No appointments."));
    }

    #[test]
    fn error_page_shows_status() {
        let Html(html) = error_page(StatusCode::NOT_FOUND, "The requested page does not exist.");
        assert!(html.contains("404 Not Found"));
        assert!(html.contains("The requested page does not exist."));
    }
}
