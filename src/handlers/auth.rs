use axum::{
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};

use super::{flash_rejection, page, AppState};
use crate::{
    accounts::{self, LoginForm, RegistrationForm},
    error::AppError,
    session::{FlashLevel, Session},
    views,
};

pub async fn index(session: Session) -> Result<Html<String>, AppError> {
    views::index(&page(&session).await)
}

pub async fn register_form(session: Session) -> Result<Html<String>, AppError> {
    views::register(&page(&session).await)
}

pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RegistrationForm>,
) -> Result<Response, AppError> {
    match accounts::register_patient(state.store.as_ref(), &form).await {
        Ok(_) => {
            session
                .flash(FlashLevel::Success, "Registration successful. Please login.")
                .await;
            Ok(Redirect::to("/login").into_response())
        }
        Err(err) => flash_rejection(&session, err, "/register").await,
    }
}

pub async fn login_form(session: Session) -> Result<Html<String>, AppError> {
    views::login(&page(&session).await)
}

pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    match accounts::authenticate(state.store.as_ref(), &form).await? {
        Some(user) => {
            session.login(&user).await;
            session.flash(FlashLevel::Success, "Logged in successfully").await;
            info!("{} logged in as {}", user.username, user.role);
            Ok(Redirect::to(user.role.dashboard()).into_response())
        }
        None => {
            warn!("failed login for {}", form.username.trim());
            session.flash(FlashLevel::Danger, "Invalid credentials").await;
            Ok(Redirect::to("/login").into_response())
        }
    }
}

pub async fn logout(session: Session) -> Redirect {
    session.logout().await;
    session.flash(FlashLevel::Info, "Logged out").await;
    Redirect::to("/")
}
