use std::{
    collections::HashMap,
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{Role, User},
};

pub const SESSION_COOKIE: &str = "clinic_session";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashLevel {
    Success,
    Info,
    Warning,
    Danger,
}

impl FlashLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlashLevel::Success => "success",
            FlashLevel::Info => "info",
            FlashLevel::Warning => "warning",
            FlashLevel::Danger => "danger",
        }
    }
}

/// One-shot message shown on the next rendered page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

impl Flash {
    pub fn new(level: FlashLevel, message: impl Into<String>) -> Self {
        Flash {
            level,
            message: message.into(),
        }
    }

    pub fn danger(message: impl Into<String>) -> Self {
        Flash::new(FlashLevel::Danger, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Flash::new(FlashLevel::Warning, message)
    }
}

impl fmt::Display for Flash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone)]
pub struct SessionUser {
    pub user_id: i32,
    pub role: Role,
    pub username: String,
}

#[derive(Debug)]
struct SessionData {
    user: Option<SessionUser>,
    flashes: Vec<Flash>,
    last_seen: Instant,
}

impl SessionData {
    fn new() -> Self {
        SessionData {
            user: None,
            flashes: Vec::new(),
            last_seen: Instant::now(),
        }
    }

    fn is_empty(&self) -> bool {
        self.user.is_none() && self.flashes.is_empty()
    }
}

/// Server-side session table keyed by the cookie value.
///
/// Entries exist only while they hold a user or pending flashes, and are
/// dropped once idle for longer than the configured timeout.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<Uuid, SessionData>>>,
    idle: Duration,
}

impl SessionStore {
    pub fn new(idle: Duration) -> Self {
        SessionStore {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            idle,
        }
    }

    /// Looks up a live entry, evicting it if it went idle.
    fn live<'a>(&self, sessions: &'a mut HashMap<Uuid, SessionData>, id: Uuid) -> Option<&'a mut SessionData> {
        let expired = sessions.get(&id)?.last_seen.elapsed() >= self.idle;
        if expired {
            sessions.remove(&id);
            return None;
        }
        let data = sessions.get_mut(&id)?;
        data.last_seen = Instant::now();
        Some(data)
    }

    fn insert(&self, sessions: &mut HashMap<Uuid, SessionData>, data: SessionData) -> Uuid {
        let idle = self.idle;
        let before = sessions.len();
        sessions.retain(|_, s| s.last_seen.elapsed() < idle);
        if sessions.len() < before {
            debug!("expired {} idle sessions", before - sessions.len());
        }
        let id = Uuid::new_v4();
        sessions.insert(id, data);
        id
    }

    async fn is_live(&self, id: Uuid) -> bool {
        let mut sessions = self.sessions.lock().await;
        self.live(&mut sessions, id).is_some()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

/// Handle to the current request's session. The table entry is created on
/// the first write, so read-only visitors never occupy one.
#[derive(Clone)]
pub struct Session {
    id: Arc<Mutex<Option<Uuid>>>,
    store: SessionStore,
}

impl Session {
    fn new(id: Option<Uuid>, store: SessionStore) -> Self {
        Session {
            id: Arc::new(Mutex::new(id)),
            store,
        }
    }

    async fn current_id(&self) -> Option<Uuid> {
        *self.id.lock().await
    }

    async fn write<R>(&self, f: impl FnOnce(&mut SessionData) -> R) -> R {
        let mut id = self.id.lock().await;
        let mut sessions = self.store.sessions.lock().await;
        if let Some(key) = *id {
            if let Some(data) = self.store.live(&mut sessions, key) {
                return f(data);
            }
        }
        let mut data = SessionData::new();
        let result = f(&mut data);
        *id = Some(self.store.insert(&mut sessions, data));
        result
    }

    pub async fn user(&self) -> Option<SessionUser> {
        let key = (*self.id.lock().await)?;
        let mut sessions = self.store.sessions.lock().await;
        self.store.live(&mut sessions, key).and_then(|s| s.user.clone())
    }

    /// Logs `user` in under a fresh session id, carrying over pending flashes.
    pub async fn login(&self, user: &User) {
        let mut id = self.id.lock().await;
        let mut sessions = self.store.sessions.lock().await;
        let mut data = id
            .and_then(|old| sessions.remove(&old))
            .unwrap_or_else(SessionData::new);
        data.user = Some(SessionUser {
            user_id: user.id,
            role: user.role,
            username: user.username.clone(),
        });
        data.last_seen = Instant::now();
        *id = Some(self.store.insert(&mut sessions, data));
    }

    pub async fn logout(&self) {
        let mut id = self.id.lock().await;
        if let Some(old) = id.take() {
            self.store.sessions.lock().await.remove(&old);
        }
    }

    pub async fn push_flash(&self, flash: Flash) {
        self.write(|data| data.flashes.push(flash)).await;
    }

    pub async fn flash(&self, level: FlashLevel, message: impl Into<String>) {
        self.push_flash(Flash::new(level, message)).await;
    }

    pub async fn take_flashes(&self) -> Vec<Flash> {
        let mut id = self.id.lock().await;
        let Some(key) = *id else {
            return Vec::new();
        };
        let mut sessions = self.store.sessions.lock().await;
        let Some(data) = self.store.live(&mut sessions, key) else {
            *id = None;
            return Vec::new();
        };
        let flashes = std::mem::take(&mut data.flashes);
        if data.is_empty() {
            sessions.remove(&key);
            *id = None;
        }
        flashes
    }
}

/// Attaches a [`Session`] to every request. The cookie is issued when the
/// handler first writes to the session and cleared once the entry is gone.
pub async fn session_layer(
    State(store): State<SessionStore>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let presented = jar.get(SESSION_COOKIE).is_some();
    let mut known = jar
        .get(SESSION_COOKIE)
        .and_then(|c| Uuid::parse_str(c.value()).ok());
    if let Some(id) = known {
        if !store.is_live(id).await {
            known = None;
        }
    }

    let session = Session::new(known, store);
    req.extensions_mut().insert(session.clone());
    let response = next.run(req).await;

    match session.current_id().await {
        Some(id) if Some(id) != known => {
            let cookie = Cookie::build((SESSION_COOKIE, id.to_string()))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax);
            (jar.add(cookie), response).into_response()
        }
        None if presented => (jar.remove(Cookie::build(SESSION_COOKIE).path("/")), response).into_response(),
        _ => response,
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::Internal("session layer missing".to_string()))
    }
}

/// A logged-in user. Anonymous requests are sent to the login page.
pub struct AuthUser {
    pub user: SessionUser,
    pub session: Session,
}

impl AuthUser {
    pub fn require(&self, role: Role) -> Result<&SessionUser, AppError> {
        if self.user.role == role {
            Ok(&self.user)
        } else {
            warn!(
                "user {} with role {} denied {} area",
                self.user.username, self.user.role, role
            );
            Err(AppError::Forbidden)
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state).await?;
        match session.user().await {
            Some(user) => Ok(AuthUser { user, session }),
            None => {
                session.flash(FlashLevel::Warning, "Please login first.").await;
                Err(AppError::LoginRequired)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(60 * 60);

    fn doctor() -> User {
        User {
            id: 7,
            username: "dr_house".to_string(),
            password: "vicodin".to_string(),
            role: Role::Doctor,
        }
    }

    #[tokio::test]
    async fn flashes_are_drained_once() {
        let store = SessionStore::new(HOUR);
        let session = Session::new(None, store.clone());
        session.flash(FlashLevel::Info, "hello").await;
        session.push_flash(Flash::danger("oops")).await;
        assert_eq!(store.len().await, 1);

        let flashes = session.take_flashes().await;
        assert_eq!(flashes.len(), 2);
        assert_eq!(flashes[0].level, FlashLevel::Info);
        assert!(session.take_flashes().await.is_empty());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn reading_an_empty_session_stores_nothing() {
        let store = SessionStore::new(HOUR);
        let session = Session::new(None, store.clone());
        assert!(session.user().await.is_none());
        assert!(session.take_flashes().await.is_empty());
        assert_eq!(store.len().await, 0);
        assert!(session.current_id().await.is_none());
    }

    #[tokio::test]
    async fn login_rotates_the_id_and_logout_drops_the_entry() {
        let store = SessionStore::new(HOUR);
        let session = Session::new(None, store.clone());
        session.flash(FlashLevel::Warning, "Please login first.").await;
        let anonymous = session.current_id().await;

        session.login(&doctor()).await;
        assert_ne!(session.current_id().await, anonymous);
        let current = session.user().await.unwrap();
        assert_eq!(current.user_id, 7);
        assert_eq!(current.role, Role::Doctor);
        assert_eq!(session.take_flashes().await.len(), 1);
        assert_eq!(store.len().await, 1);

        session.logout().await;
        assert!(session.user().await.is_none());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn idle_sessions_expire() {
        let store = SessionStore::new(Duration::ZERO);
        let session = Session::new(None, store.clone());
        session.login(&doctor()).await;
        let id = session.current_id().await.unwrap();

        assert!(!store.is_live(id).await);
        assert!(session.user().await.is_none());
        assert_eq!(store.len().await, 0);
    }
}
