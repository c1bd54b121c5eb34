use actix_web::error::BlockingError;
use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use actix_web::ResponseError;
use derive_more::Display;
use diesel::r2d2;
use diesel::result::Error as DieselError;
use std::convert::From;

pub type Result<T> = ::std::result::Result<T, Error>;

#[derive(Debug, Display)]
pub enum Error {
    /// The anti-forgery state sent to the callback does not match the value
    /// minted when the login page was rendered.
    StateMismatch,

    /// The provider rejected the authorization code (expired, reused, or
    /// malformed), or its token response could not be read.
    ExchangeFailed,

    /// The provider's tokeninfo endpoint reported an error for the access
    /// token. Carries the provider's message verbatim.
    ProviderError(String),

    /// The identity token's subject does not match the subject the provider
    /// reported for the access token.
    SubjectMismatch,

    /// The token was issued to a different application than ours.
    AudienceMismatch,

    /// The session already holds credentials for this subject. Soft: the
    /// caller is told they are connected and nothing is rewritten.
    AlreadyConnected,

    /// Logout was requested without any stored provider credentials.
    NotConnected,

    /// The provider refused to revoke the access token. Soft: local session
    /// teardown proceeds regardless.
    RevocationFailed,

    NotFound,

    HttpError(reqwest::Error),

    DieselError(DieselError),

    PoolError(r2d2::PoolError),

    Canceled,
}

impl Error {
    /// Human-readable message used for the JSON error body.
    fn message(&self) -> String {
        match self {
            Self::StateMismatch => "Invalid state parameter.".into(),
            Self::ExchangeFailed => "Failed to upgrade the authorization code.".into(),
            Self::ProviderError(message) => message.clone(),
            Self::SubjectMismatch => "Token's user ID doesn't match given user ID.".into(),
            Self::AudienceMismatch => "Token's client ID does not match app's.".into(),
            Self::AlreadyConnected => "Current user is already connected.".into(),
            Self::NotConnected => "Current user not connected.".into(),
            Self::RevocationFailed => "Failed to revoke token for given user.".into(),
            Self::NotFound => "Not found.".into(),
            Self::HttpError(_) | Self::DieselError(_) | Self::PoolError(_) | Self::Canceled => {
                "Internal server error.".into()
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::HttpError(e) => Some(e),
            Self::DieselError(e) => Some(e),
            Self::PoolError(e) => Some(e),
            _ => None,
        }
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::StateMismatch
            | Self::ExchangeFailed
            | Self::SubjectMismatch
            | Self::AudienceMismatch
            | Self::NotConnected => StatusCode::UNAUTHORIZED,
            // Idempotent re-login is reported, not failed.
            Self::AlreadyConnected => StatusCode::OK,
            Self::RevocationFailed => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::ProviderError(_)
            | Self::HttpError(_)
            | Self::DieselError(_)
            | Self::PoolError(_)
            | Self::Canceled => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self.message())
    }
}

impl From<DieselError> for Error {
    fn from(e: DieselError) -> Error {
        Error::DieselError(e)
    }
}

impl From<r2d2::PoolError> for Error {
    fn from(e: r2d2::PoolError) -> Error {
        Error::PoolError(e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Error {
        Error::HttpError(e)
    }
}

impl From<BlockingError<Error>> for Error {
    fn from(e: BlockingError<Error>) -> Error {
        match e {
            BlockingError::Error(e) => e,
            BlockingError::Canceled => Error::Canceled,
        }
    }
}
