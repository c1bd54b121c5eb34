use reqwest::Client;

use std::fs;
use std::io;
use std::time::Duration;

use super::error::{Error, Result};
use super::session::LoginSession;

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const TOKENINFO_URL: &str = "https://www.googleapis.com/oauth2/v1/tokeninfo";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v1/userinfo";
const REVOKE_URL: &str = "https://accounts.google.com/o/oauth2/revoke";

/// The sign-in button posts the code via postMessage rather than a browser
/// redirect, so the exchange names this pseudo redirect URI.
const REDIRECT_URI: &str = "postmessage";

/// Every provider call gets a bounded timeout so a stalled upstream cannot
/// wedge request handling.
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// Contents of the Google console `client_secrets.json` export.
#[derive(Clone, Deserialize)]
pub struct Secrets {
    pub web: WebSecrets,
}

#[derive(Clone, Deserialize)]
pub struct WebSecrets {
    pub client_id: String,
    pub client_secret: String,
}

impl Secrets {
    pub fn load(path: &str) -> io::Result<Secrets> {
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// What a successful code exchange yields: the bearer token for provider
/// API calls plus the parsed identity token.
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub access_token: String,
    pub id_token: IdToken,
}

/// The claims we consume from the identity token.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IdToken {
    pub sub: String,
}

impl IdToken {
    /// Extracts the payload claims from a compact JWT. The signature is not
    /// checked here; trust comes from the tokeninfo introspection that every
    /// login performs against the same access token.
    pub fn parse(raw: &str) -> Result<IdToken> {
        let payload = raw.split('.').nth(1).ok_or(Error::ExchangeFailed)?;
        let bytes = base64::decode_config(payload, base64::URL_SAFE_NO_PAD)
            .map_err(|_| Error::ExchangeFailed)?;
        serde_json::from_slice(&bytes).map_err(|_| Error::ExchangeFailed)
    }
}

/// Introspection result from the tokeninfo endpoint. Only the fields the
/// verifier consumes are modeled; all are optional because error responses
/// carry none of them.
#[derive(Debug, Default, Deserialize)]
pub struct TokenInfo {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub issued_to: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub email: String,
    pub picture: Option<String>,
}

/// Client for the four Google OAuth 2.0 endpoints the login flow touches.
pub struct GoogleOAuth {
    client_id: String,
    client_secret: String,
    http: Client,
}

impl GoogleOAuth {
    pub fn new(secrets: &Secrets) -> Result<GoogleOAuth> {
        let http = Client::builder().timeout(PROVIDER_TIMEOUT).build()?;

        Ok(GoogleOAuth {
            client_id: secrets.web.client_id.clone(),
            client_secret: secrets.web.client_secret.clone(),
            http,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Upgrades a short-lived authorization code into credentials. A
    /// provider rejection (expired, reused, or malformed code) surfaces as
    /// `ExchangeFailed`.
    pub async fn exchange_code(&self, code: &str) -> Result<Credentials> {
        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            id_token: String,
        }

        let params = [
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", REDIRECT_URI),
            ("grant_type", "authorization_code"),
        ];

        let response = self.http.post(TOKEN_URL).form(&params).send().await?;
        if !response.status().is_success() {
            warn!("code exchange rejected with status {}", response.status());
            return Err(Error::ExchangeFailed);
        }

        let token: TokenResponse = response.json().await.map_err(|_| Error::ExchangeFailed)?;
        Ok(Credentials {
            access_token: token.access_token,
            id_token: IdToken::parse(&token.id_token)?,
        })
    }

    pub async fn tokeninfo(&self, access_token: &str) -> Result<TokenInfo> {
        Ok(self
            .http
            .get(TOKENINFO_URL)
            .query(&[("access_token", access_token)])
            .send()
            .await?
            .json()
            .await?)
    }

    pub async fn userinfo(&self, access_token: &str) -> Result<UserProfile> {
        Ok(self
            .http
            .get(USERINFO_URL)
            .query(&[("access_token", access_token), ("alt", "json")])
            .send()
            .await?
            .json()
            .await?)
    }

    pub async fn revoke(&self, access_token: &str) -> Result<()> {
        let response = self
            .http
            .get(REVOKE_URL)
            .query(&[("token", access_token)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::RevocationFailed);
        }
        Ok(())
    }
}

/// The post-exchange verification chain, run strictly in order with a
/// short-circuit on the first failure:
///
/// 1. the provider must not report an error for the access token;
/// 2. the identity token's subject must match the introspected one;
/// 3. the token must have been issued to this application;
/// 4. a session already connected for this subject short-circuits with
///    `AlreadyConnected` (soft, nothing is rewritten).
///
/// Pure over its inputs; no session state is touched here.
pub fn verify_identity(
    info: &TokenInfo,
    credentials: &Credentials,
    client_id: &str,
    session: &LoginSession,
) -> Result<()> {
    if let Some(message) = &info.error {
        return Err(Error::ProviderError(message.clone()));
    }

    let subject = credentials.id_token.sub.as_str();
    if info.user_id.as_deref() != Some(subject) {
        return Err(Error::SubjectMismatch);
    }

    if info.issued_to.as_deref() != Some(client_id) {
        return Err(Error::AudienceMismatch);
    }

    if session.credentials.is_some() && session.subject.as_deref() == Some(subject) {
        return Err(Error::AlreadyConnected);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT_ID: &str = "client-Y.apps.googleusercontent.com";

    fn credentials(sub: &str) -> Credentials {
        Credentials {
            access_token: "ya29.test-token".into(),
            id_token: IdToken { sub: sub.into() },
        }
    }

    fn tokeninfo_for(user_id: &str, issued_to: &str) -> TokenInfo {
        TokenInfo {
            error: None,
            user_id: Some(user_id.into()),
            issued_to: Some(issued_to.into()),
        }
    }

    #[test]
    fn verify_passes_for_matching_token() {
        let result = verify_identity(
            &tokeninfo_for("108", CLIENT_ID),
            &credentials("108"),
            CLIENT_ID,
            &LoginSession::default(),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn provider_error_short_circuits_first() {
        // Even with every other field mismatched, the provider's own error
        // is what gets reported.
        let info = TokenInfo {
            error: Some("invalid_token".into()),
            user_id: Some("999".into()),
            issued_to: Some("client-X".into()),
        };
        let result = verify_identity(&info, &credentials("108"), CLIENT_ID, &LoginSession::default());
        assert!(matches!(result, Err(Error::ProviderError(ref m)) if m == "invalid_token"));
    }

    #[test]
    fn substituted_token_fails_subject_check() {
        let result = verify_identity(
            &tokeninfo_for("999", CLIENT_ID),
            &credentials("108"),
            CLIENT_ID,
            &LoginSession::default(),
        );
        assert!(matches!(result, Err(Error::SubjectMismatch)));
    }

    #[test]
    fn missing_introspection_subject_fails_subject_check() {
        let info = TokenInfo {
            error: None,
            user_id: None,
            issued_to: Some(CLIENT_ID.into()),
        };
        let result = verify_identity(&info, &credentials("108"), CLIENT_ID, &LoginSession::default());
        assert!(matches!(result, Err(Error::SubjectMismatch)));
    }

    #[test]
    fn token_for_other_application_fails_audience_check() {
        // Token minted for client-X presented to an app registered as client-Y.
        let result = verify_identity(
            &tokeninfo_for("108", "client-X"),
            &credentials("108"),
            CLIENT_ID,
            &LoginSession::default(),
        );
        assert!(matches!(result, Err(Error::AudienceMismatch)));
    }

    #[test]
    fn relogin_for_connected_subject_is_already_connected() {
        let mut session = LoginSession::default();
        session.credentials = Some(credentials("108"));
        session.subject = Some("108".into());

        let result = verify_identity(
            &tokeninfo_for("108", CLIENT_ID),
            &credentials("108"),
            CLIENT_ID,
            &session,
        );
        assert!(matches!(result, Err(Error::AlreadyConnected)));
    }

    #[test]
    fn different_subject_in_same_session_verifies() {
        // Switching accounts in one browser session is a fresh login, not a
        // no-op.
        let mut session = LoginSession::default();
        session.credentials = Some(credentials("108"));
        session.subject = Some("108".into());

        let result = verify_identity(
            &tokeninfo_for("205", CLIENT_ID),
            &credentials("205"),
            CLIENT_ID,
            &session,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn id_token_payload_parses_without_signature() {
        let payload = base64::encode_config(br#"{"sub":"12345","aud":"x"}"#, base64::URL_SAFE_NO_PAD);
        let raw = format!("eyJhbGciOiJSUzI1NiJ9.{}.c2ln", payload);
        let token = IdToken::parse(&raw).unwrap();
        assert_eq!(token.sub, "12345");
    }

    #[test]
    fn garbage_id_token_is_an_exchange_failure() {
        assert!(matches!(IdToken::parse("not-a-jwt"), Err(Error::ExchangeFailed)));
        assert!(matches!(IdToken::parse("a.!!!.c"), Err(Error::ExchangeFailed)));
    }

    #[test]
    fn secrets_parse_google_console_export() {
        let raw = r#"{"web":{"client_id":"abc.apps.googleusercontent.com","client_secret":"s3cret","redirect_uris":["postmessage"]}}"#;
        let secrets: Secrets = serde_json::from_str(raw).unwrap();
        assert_eq!(secrets.web.client_id, "abc.apps.googleusercontent.com");
        assert_eq!(secrets.web.client_secret, "s3cret");
    }
}
