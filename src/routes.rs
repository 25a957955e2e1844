use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};

use crate::{
    error::AppError,
    handlers::{admin, auth, doctor, patient, AppState},
    session::session_layer,
};

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(auth::index))
        .route("/register", get(auth::register_form).post(auth::register))
        .route("/login", get(auth::login_form).post(auth::login))
        .route("/logout", get(auth::logout))
        .route("/admin/dashboard", get(admin::dashboard))
        .route("/admin/doctors", get(admin::doctors).post(admin::add_doctor))
        .route("/admin/doctors/delete/:id", post(admin::delete_doctor))
        .route("/admin/appointments", get(admin::appointments))
        .route("/doctor/dashboard", get(doctor::dashboard))
        .route("/doctor/appointment/:id", get(doctor::appointment).post(doctor::act))
        .route("/patient/dashboard", get(patient::dashboard))
        .route("/patient/search_doctors", get(patient::search_doctors))
        .route("/patient/book/:doctor_id", get(patient::book_form).post(patient::book))
        .route("/patient/appointment/cancel/:id", post(patient::cancel))
        .route("/patient/appointment/:id", get(patient::appointment))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.sessions.clone(), session_layer))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

async fn not_found() -> AppError {
    AppError::NotFound
}

async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let response = next.run(req).await;
    info!("{} {} -> {}", method, path, response.status().as_u16());
    response
}
