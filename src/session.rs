use actix_web::cookie::Cookie;
use actix_web::{HttpMessage, HttpRequest};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use textnonce::TextNonce;

use std::collections::HashMap;
use std::iter;
use std::mem;
use std::sync::Mutex;

use super::oauth::Credentials;

pub const SESSION_COOKIE: &str = "session";

/// Per-browser login state. Every field that used to live in an untyped
/// session dictionary is a named, typed slot here; handlers receive the
/// struct explicitly and write it back through the store.
///
/// Nothing in this struct is persisted; it is trusted only after the full
/// verification chain in `oauth::verify_identity` has passed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoginSession {
    /// Single-use anti-forgery token minted by the login page.
    pub state: Option<String>,
    /// Credentials from the last successful code exchange.
    pub credentials: Option<Credentials>,
    /// The provider's stable subject id for the logged-in user.
    pub subject: Option<String>,
    /// Local account id resolved by the account linker.
    pub user_id: Option<i32>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub picture: Option<String>,
    pub provider: Option<String>,
    /// Pending one-shot notices, drained into the next page response.
    pub flash: Vec<String>,
}

impl LoginSession {
    pub fn is_logged_in(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn flash<S: Into<String>>(&mut self, message: S) {
        self.flash.push(message.into());
    }

    pub fn take_flash(&mut self) -> Vec<String> {
        mem::take(&mut self.flash)
    }

    /// Clears every identity field. Pending flash notices survive so the
    /// logout notice still reaches the user.
    pub fn clear_identity(&mut self) {
        self.state = None;
        self.credentials = None;
        self.subject = None;
        self.user_id = None;
        self.username = None;
        self.email = None;
        self.picture = None;
        self.provider = None;
    }
}

/// Generates the anti-forgery state: 32 characters from the alphanumeric
/// alphabet, fresh per login page render.
pub fn generate_state() -> String {
    let mut rng = thread_rng();
    iter::repeat(())
        .map(|()| rng.sample(Alphanumeric))
        .take(32)
        .collect()
}

pub fn session_cookie(id: &str) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, id.to_owned())
        .path("/")
        .http_only(true)
        .finish()
}

/// In-memory store of browser sessions, keyed by an opaque cookie value.
///
/// TODO: evict sessions after an idle timeout; entries currently live until
/// process restart.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, LoginSession>>,
}

impl SessionStore {
    pub fn new() -> SessionStore {
        SessionStore {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves the browser session for a request, minting a fresh one when
    /// the cookie is missing or refers to a session we no longer hold.
    /// Returns the session id and a working copy of the state; callers write
    /// mutations back with [`SessionStore::put`].
    ///
    /// Fresh sessions are not stored here: anonymous read-only traffic would
    /// otherwise grow the map by one entry per request. A session enters the
    /// map only when a handler `put`s state worth keeping.
    pub fn resolve(&self, req: &HttpRequest) -> (String, LoginSession) {
        if let Some(cookie) = req.cookie(SESSION_COOKIE) {
            if let Some(session) = self.get(cookie.value()) {
                return (cookie.value().to_owned(), session);
            }
        }

        (TextNonce::new().into_string(), LoginSession::default())
    }

    pub fn get(&self, id: &str) -> Option<LoginSession> {
        self.sessions
            .lock()
            .expect("session store lock poisoned")
            .get(id)
            .cloned()
    }

    pub fn put(&self, id: &str, session: LoginSession) {
        self.sessions
            .lock()
            .expect("session store lock poisoned")
            .insert(id.to_owned(), session);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.sessions
            .lock()
            .expect("session store lock poisoned")
            .len()
    }
}
