use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use rocket::{
    fairing::{self, Fairing, Info, Kind},
    http::{Cookie, Status},
    request::{FromRequest, Outcome},
    tokio::sync::RwLock,
    Build, Request, Rocket,
};
use serde::Serialize;
use thiserror::Error;

use crate::{config::AppConfig, error::Error};

pub const SESSION_COOKIE: &str = "session_token";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("The session backing store rejected the operation: {0}")]
    Backing(String),
}

/// What a session knows about the logged-in user. Deliberately excludes the
/// password hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionUser {
    pub name: String,
    pub email: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashKind {
    Success,
    Error,
}

/// A one-shot notification. Queued in the session, removed when the next
/// page renders.
#[derive(Clone, Debug, Serialize)]
pub struct FlashMessage {
    pub kind: FlashKind,
    pub message: String,
}

#[derive(Clone, Debug)]
pub struct SessionData {
    pub user: Option<SessionUser>,
    pub flashes: Vec<FlashMessage>,
    pub idle_deadline: DateTime<Utc>,
    pub hard_deadline: DateTime<Utc>,
}

/// Storage behind the session store. The application ships an in-memory
/// implementation; an external store only has to implement these three
/// operations.
#[rocket::async_trait]
pub trait SessionBacking: Send + Sync {
    async fn read(&self, token: &str) -> Result<Option<SessionData>, SessionError>;
    async fn write(&self, token: &str, data: SessionData) -> Result<(), SessionError>;
    async fn delete(&self, token: &str) -> Result<(), SessionError>;
}

#[derive(Default)]
pub struct MemoryBacking {
    sessions: RwLock<HashMap<String, SessionData>>,
}

#[rocket::async_trait]
impl SessionBacking for MemoryBacking {
    async fn read(&self, token: &str) -> Result<Option<SessionData>, SessionError> {
        Ok(self.sessions.read().await.get(token).cloned())
    }

    async fn write(&self, token: &str, data: SessionData) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        // Expired entries would otherwise linger until their own token is
        // presented again, which anonymous crawlers never do.
        let now = Utc::now();
        sessions.retain(|_, entry| now <= entry.idle_deadline && now <= entry.hard_deadline);
        sessions.insert(token.to_owned(), data);
        Ok(())
    }

    async fn delete(&self, token: &str) -> Result<(), SessionError> {
        self.sessions.write().await.remove(token);
        Ok(())
    }
}

pub struct SessionStore {
    backing: Box<dyn SessionBacking>,
    idle_timeout: Duration,
    absolute_timeout: Duration,
}

impl SessionStore {
    pub fn in_memory(idle_timeout: Duration, absolute_timeout: Duration) -> Self {
        Self {
            backing: Box::new(MemoryBacking::default()),
            idle_timeout,
            absolute_timeout,
        }
    }

    fn new_token() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect()
    }

    fn fresh_data(&self) -> SessionData {
        let now = Utc::now();
        SessionData {
            user: None,
            flashes: Vec::new(),
            idle_deadline: now + self.idle_timeout,
            hard_deadline: now + self.absolute_timeout,
        }
    }

    pub async fn create(&self) -> Result<String, SessionError> {
        let token = Self::new_token();
        self.backing.write(&token, self.fresh_data()).await?;
        Ok(token)
    }

    /// Reads a live session. A session past either deadline is deleted and
    /// reported as absent.
    async fn load(&self, token: &str) -> Result<Option<SessionData>, SessionError> {
        let Some(data) = self.backing.read(token).await? else {
            return Ok(None);
        };
        let now = Utc::now();
        if data.idle_deadline < now || data.hard_deadline < now {
            self.backing.delete(token).await?;
            return Ok(None);
        }
        Ok(Some(data))
    }

    /// Applies a change to a session and pushes its idle deadline forward.
    /// An expired or unknown token gets a fresh record.
    async fn update<F>(&self, token: &str, apply: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut SessionData) + Send,
    {
        let mut data = match self.load(token).await? {
            Some(data) => data,
            None => self.fresh_data(),
        };
        apply(&mut data);
        data.idle_deadline = Utc::now() + self.idle_timeout;
        self.backing.write(token, data).await
    }

    pub async fn set_user(&self, token: &str, user: SessionUser) -> Result<(), SessionError> {
        self.update(token, |data| data.user = Some(user)).await
    }

    pub async fn flash(
        &self,
        token: &str,
        kind: FlashKind,
        message: impl Into<String>,
    ) -> Result<(), SessionError> {
        let message = message.into();
        self.update(token, |data| data.flashes.push(FlashMessage { kind, message }))
            .await
    }

    pub async fn take_flashes(&self, token: &str) -> Result<Vec<FlashMessage>, SessionError> {
        let mut taken = Vec::new();
        self.update(token, |data| taken = std::mem::take(&mut data.flashes))
            .await?;
        Ok(taken)
    }

    pub async fn destroy(&self, token: &str) -> Result<(), SessionError> {
        self.backing.delete(token).await
    }
}

pub struct SessionFairing {
    idle_timeout: Duration,
    absolute_timeout: Duration,
}

impl SessionFairing {
    pub fn fairing(config: &AppConfig) -> Self {
        Self {
            idle_timeout: Duration::minutes(config.session_idle_minutes),
            absolute_timeout: Duration::minutes(config.session_absolute_minutes),
        }
    }
}

#[rocket::async_trait]
impl Fairing for SessionFairing {
    fn info(&self) -> Info {
        Info {
            name: "Sessions",
            kind: Kind::Ignite | Kind::Singleton,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> fairing::Result {
        Ok(rocket.manage(SessionStore::in_memory(
            self.idle_timeout,
            self.absolute_timeout,
        )))
    }
}

/// The session attached to the current request. Store failures on the
/// cosmetic operations (flashes) are logged and swallowed; losing a
/// notification must never fail a request.
pub struct Session<'r> {
    token: String,
    store: &'r SessionStore,
}

impl<'r> Session<'r> {
    pub async fn user(&self) -> Option<SessionUser> {
        match self.store.load(&self.token).await {
            Ok(data) => data.and_then(|data| data.user),
            Err(e) => {
                error!("Failed to read session: {e}");
                None
            }
        }
    }

    pub async fn set_user(&self, user: SessionUser) -> Result<(), SessionError> {
        self.store.set_user(&self.token, user).await
    }

    pub async fn flash(&self, kind: FlashKind, message: impl Into<String>) {
        if let Err(e) = self.store.flash(&self.token, kind, message).await {
            error!("Failed to queue flash message: {e}");
        }
    }

    pub async fn take_flashes(&self) -> Vec<FlashMessage> {
        match self.store.take_flashes(&self.token).await {
            Ok(flashes) => flashes,
            Err(e) => {
                error!("Failed to drain flash messages: {e}");
                Vec::new()
            }
        }
    }

    pub async fn destroy(self) -> Result<(), SessionError> {
        self.store.destroy(&self.token).await
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Session<'r> {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(store) = req.rocket().state::<SessionStore>() else {
            return Outcome::Error((Status::InternalServerError, Error::SessionStoreNotFound));
        };

        // Several guards may run for one request; the first of them adds the
        // cookie, so pending cookies count too.
        let cookies = req.cookies();
        if let Some(cookie) = cookies.get_pending(SESSION_COOKIE) {
            let token = cookie.value().to_owned();
            match store.load(&token).await {
                Ok(Some(_)) => return Outcome::Success(Session { token, store }),
                Ok(None) => {}
                Err(e) => return Outcome::Error((Status::InternalServerError, e.into())),
            }
        }

        match store.create().await {
            Ok(token) => {
                cookies.add(Cookie::build((SESSION_COOKIE, token.clone())).http_only(true));
                Outcome::Success(Session { token, store })
            }
            Err(e) => Outcome::Error((Status::InternalServerError, e.into())),
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for SessionUser {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let session = match req.guard::<Session<'r>>().await {
            Outcome::Success(session) => session,
            Outcome::Error(e) => return Outcome::Error(e),
            Outcome::Forward(f) => return Outcome::Forward(f),
        };

        match session.user().await {
            Some(user) => Outcome::Success(user),
            None => Outcome::Forward(Status::Unauthorized),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SessionStore {
        SessionStore::in_memory(Duration::minutes(5), Duration::minutes(10))
    }

    #[rocket::async_test]
    async fn flashes_are_consumed_on_take() {
        let store = store();
        let token = store.create().await.unwrap();
        store
            .flash(&token, FlashKind::Error, "wrong password")
            .await
            .unwrap();

        let flashes = store.take_flashes(&token).await.unwrap();
        assert_eq!(flashes.len(), 1);
        assert_eq!(flashes[0].kind, FlashKind::Error);
        assert_eq!(flashes[0].message, "wrong password");

        assert!(store.take_flashes(&token).await.unwrap().is_empty());
    }

    #[rocket::async_test]
    async fn expired_sessions_read_as_absent() {
        let store = SessionStore::in_memory(Duration::seconds(-1), Duration::minutes(10));
        let token = store.create().await.unwrap();
        assert!(store.load(&token).await.unwrap().is_none());
    }

    #[rocket::async_test]
    async fn destroy_forgets_the_user_and_is_idempotent() {
        let store = store();
        let token = store.create().await.unwrap();
        store
            .set_user(
                &token,
                SessionUser {
                    name: "Ada".into(),
                    email: "ada@example.com".into(),
                },
            )
            .await
            .unwrap();

        store.destroy(&token).await.unwrap();
        assert!(store.load(&token).await.unwrap().is_none());
        // Destroying an already-gone session must not fail.
        store.destroy(&token).await.unwrap();
    }

    #[rocket::async_test]
    async fn unknown_tokens_read_as_absent() {
        assert!(store().load("no-such-token").await.unwrap().is_none());
    }

    #[rocket::async_test]
    async fn writes_sweep_expired_sessions() {
        let backing = MemoryBacking::default();
        let now = Utc::now();

        let expired = SessionData {
            user: None,
            flashes: Vec::new(),
            idle_deadline: now - Duration::minutes(1),
            hard_deadline: now + Duration::minutes(10),
        };
        backing.write("stale", expired).await.unwrap();

        let fresh = SessionData {
            user: None,
            flashes: Vec::new(),
            idle_deadline: now + Duration::minutes(5),
            hard_deadline: now + Duration::minutes(10),
        };
        backing.write("fresh", fresh).await.unwrap();

        assert!(backing.read("stale").await.unwrap().is_none());
        assert!(backing.read("fresh").await.unwrap().is_some());
    }
}
