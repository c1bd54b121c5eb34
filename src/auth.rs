use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};

use super::api::ApiResponse;
use super::db::{self, LookupOrCreateUser};
use super::error::{Error, Result};
use super::oauth;
use super::session::{self, LoginSession};
use crate::AppState;

/// Route handler for `GET /login`.
///
/// Mints the single-use anti-forgery state token, stores it in the session,
/// and hands it to the client for inclusion in the authorization request.
pub async fn show_login(data: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse> {
    let (sid, mut login_session) = data.sessions.resolve(&req);

    let state = session::generate_state();
    login_session.state = Some(state.clone());
    data.sessions.put(&sid, login_session);

    #[derive(Serialize)]
    struct LoginPage {
        state: String,
    }

    Ok(HttpResponse::Ok()
        .cookie(session::session_cookie(&sid))
        .json(ApiResponse::new(LoginPage { state })))
}

#[derive(Deserialize)]
pub struct ConnectQuery {
    state: Option<String>,
}

/// Route handler for `POST /gconnect`.
///
/// The callback half of the Google login: the request body is the raw
/// authorization code, the query string carries the anti-forgery state.
/// This route is its own cross-origin callback, authenticated by the state
/// token rather than the general CSRF layer.
///
/// Order is fixed: state check, code exchange, the verification chain, and
/// only then the userinfo fetch and account link. Any failure before the
/// final session write leaves the session untouched.
pub async fn gconnect(
    data: web::Data<AppState>,
    query: web::Query<ConnectQuery>,
    body: web::Bytes,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let (sid, mut login_session) = data.sessions.resolve(&req);

    check_state(&login_session, query.state.as_deref())?;

    let code = std::str::from_utf8(&body)
        .map_err(|_| Error::ExchangeFailed)?
        .trim()
        .to_owned();

    let credentials = data.oauth.exchange_code(&code).await?;
    let info = data.oauth.tokeninfo(&credentials.access_token).await?;
    oauth::verify_identity(&info, &credentials, data.oauth.client_id(), &login_session)?;

    let access_token = credentials.access_token.clone();
    let subject = credentials.id_token.sub.clone();
    // The state token is single-use; it dies with the exchange that
    // consumed it.
    login_session.state = None;
    login_session.credentials = Some(credentials);
    login_session.subject = Some(subject);

    let profile = data.oauth.userinfo(&access_token).await?;

    // Resolve or provision the local account; the session's user id always
    // equals the stored row's id, and an existing row is never updated by a
    // later login.
    let user = db::execute(
        &data.db,
        LookupOrCreateUser {
            name: profile.name.clone(),
            email: profile.email.clone(),
            picture: profile.picture.clone(),
        },
    )
    .await?;

    login_session.username = Some(profile.name.clone());
    login_session.email = Some(profile.email);
    login_session.picture = profile.picture.clone();
    login_session.provider = Some("google".to_owned());
    login_session.user_id = Some(user.id);
    login_session.flash(format!("you are now logged in as {}", profile.name));
    data.sessions.put(&sid, login_session);

    info!("{} logged in as user {}", profile.name, user.id);

    let fragment = format!(
        "<h3 class=\"text-center\">Hello, {}!</h3>\n\
         <img src=\"{}\" class=\"profile-img-card\" id=\"profile-img\">",
        profile.name,
        profile.picture.unwrap_or_default()
    );

    Ok(HttpResponse::Ok()
        .cookie(session::session_cookie(&sid))
        .content_type("text/html; charset=utf-8")
        .body(fragment))
}

/// Route handler for `GET /gdisconnect`.
///
/// Asks the provider to revoke the stored access token, then clears the
/// session's identity fields whatever the provider said. A revocation
/// refusal is reported but never blocks local teardown.
pub async fn gdisconnect(data: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse> {
    let (sid, mut login_session) = data.sessions.resolve(&req);

    let credentials = login_session
        .credentials
        .clone()
        .ok_or(Error::NotConnected)?;

    let revocation = data.oauth.revoke(&credentials.access_token).await;

    login_session.clear_identity();
    data.sessions.put(&sid, login_session);

    match revocation {
        Ok(()) => Ok(HttpResponse::Ok()
            .cookie(session::session_cookie(&sid))
            .json("Successfully disconnected.")),
        Err(e) => {
            warn!("token revocation failed: {}", e);
            Err(Error::RevocationFailed)
        }
    }
}

/// Route handler for `GET /disconnect`.
///
/// Provider-agnostic local logout: revokes when a provider is recorded,
/// clears the session either way, and bounces back to the catalog.
pub async fn disconnect(data: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse> {
    let (sid, mut login_session) = data.sessions.resolve(&req);

    if login_session.provider.is_none() {
        login_session.flash("You were not logged in");
        data.sessions.put(&sid, login_session);
        return Ok(redirect("/regions", &sid));
    }

    if let Some(credentials) = login_session.credentials.clone() {
        if let Err(e) = data.oauth.revoke(&credentials.access_token).await {
            warn!("token revocation failed during logout: {}", e);
        }
    }

    login_session.clear_identity();
    login_session.flash("You have successfully been logged out.");
    data.sessions.put(&sid, login_session);

    Ok(redirect("/", &sid))
}

pub fn redirect(location: &str, sid: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .cookie(session::session_cookie(sid))
        .header(header::LOCATION, location)
        .finish()
}

/// The callback's first gate: the presented state must equal the single-use
/// value the login page stored in the session. A session holding no state
/// can match nothing, so a bare callback always fails here.
fn check_state(login_session: &LoginSession, presented: Option<&str>) -> Result<()> {
    match login_session.state.as_deref() {
        Some(expected) if presented == Some(expected) => Ok(()),
        _ => Err(Error::StateMismatch),
    }
}

/// Explicit login guard. Handlers that mutate the catalog call this first
/// and return the redirect as-is when no one is logged in.
pub fn require_login(
    login_session: &LoginSession,
    sid: &str,
) -> ::std::result::Result<i32, HttpResponse> {
    match login_session.user_id {
        Some(id) => Ok(id),
        None => Err(redirect("/login", sid)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn matching_state_passes_the_gate() {
        let mut login_session = LoginSession::default();
        login_session.state = Some("ZHYcCb46JY0eqmsTSFnHhHglFlXHlFGx".into());
        assert!(check_state(&login_session, Some("ZHYcCb46JY0eqmsTSFnHhHglFlXHlFGx")).is_ok());
    }

    #[test]
    fn forged_state_is_rejected_and_the_session_untouched() {
        let mut login_session = LoginSession::default();
        login_session.state = Some("ZHYcCb46JY0eqmsTSFnHhHglFlXHlFGx".into());
        let before = login_session.clone();

        match check_state(&login_session, Some("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA")) {
            Err(Error::StateMismatch) => {}
            other => panic!("expected a state mismatch, got {:?}", other),
        }
        assert_eq!(login_session, before);
    }

    #[test]
    fn sessions_without_stored_state_never_match() {
        let login_session = LoginSession::default();
        assert!(check_state(&login_session, None).is_err());
        assert!(check_state(&login_session, Some("anything")).is_err());
    }

    #[test]
    fn guard_passes_through_the_logged_in_user() {
        let mut login_session = LoginSession::default();
        login_session.user_id = Some(7);
        match require_login(&login_session, "sid") {
            Ok(id) => assert_eq!(id, 7),
            Err(_) => panic!("logged-in session should pass the guard"),
        }
    }

    #[test]
    fn guard_redirects_anonymous_sessions_to_login() {
        let result = require_login(&LoginSession::default(), "sid");
        let response = result.expect_err("anonymous session should be redirected");
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok());
        assert_eq!(location, Some("/login"));
    }

    #[test]
    fn redirect_sets_location_and_session_cookie() {
        let response = redirect("/", "abc123");
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let cookie = response
            .cookies()
            .find(|c| c.name() == session::SESSION_COOKIE)
            .expect("session cookie");
        assert_eq!(cookie.value(), "abc123");
    }
}
