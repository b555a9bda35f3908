//! The crate error taxonomy and the mapping from MediaWiki error codes.

use std::fmt;

use reqwest::StatusCode;

use crate::upload::UploadResult;

/// An error reported inside a MediaWiki API response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// The error type for this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Connection, DNS, TLS or mid-stream failure below the HTTP layer.
    #[error("network failure: {0}")]
    Network(#[source] reqwest::Error),
    /// The per-request deadline elapsed.
    #[error("request timed out")]
    Timeout,
    /// Non-success HTTP status that carried no parseable API envelope.
    #[error("HTTP status {0}")]
    HttpStatus(StatusCode),
    /// The body was not the JSON envelope we expected.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),
    /// Generic server-reported API error.
    #[error("API request failed ({0})")]
    OperationFailed(ApiError),
    /// Access denied for a read or write.
    #[error("access denied ({0})")]
    Unauthorized(ApiError),
    /// The server rejected the token accompanying a mutating action.
    #[error("token rejected ({0})")]
    BadToken(ApiError),
    /// The action name is unknown to the server.
    #[error("unknown API action ({0})")]
    InvalidAction(ApiError),
    /// `assert=user` / `assert=bot` failed.
    #[error("account assertion failed ({0})")]
    AccountAssertion(ApiError),
    /// Edit/move collision with a concurrent change.
    #[error("operation conflict ({0})")]
    OperationConflict(ApiError),
    /// The server hit an internal exception.
    #[error("server internal error ({0})")]
    RemoteInternal(ApiError),
    /// The upload went through but the server attached warnings.
    #[error("upload finished with warnings: {}", .0.warning_codes())]
    UploadWarning(Box<UploadResult>),
    /// A title failed parser validation.
    #[error("bad title {text:?}: {reason}")]
    BadTitle { text: String, reason: &'static str },
    /// Redirect resolution found a cycle through the named title.
    #[error("circular redirect through {0:?}")]
    CircularRedirect(String),
    /// An operation needed site info that was never bootstrapped.
    #[error("site info not initialized; call bootstrap() first")]
    SiteNotInitialized,
    /// The caller triggered cancellation.
    #[error("operation cancelled")]
    Cancelled,
    /// `stash_next_chunk` was called while another stash was in flight.
    #[error("another chunk stash is already in flight")]
    ConcurrentStash,
    /// A method was called in a state that forbids it.
    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    InvalidUrl(#[from] url::ParseError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    UrlEncode(#[from] serde_urlencoded::ser::Error),
}

/// The result type for this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout
        } else {
            Error::Network(e)
        }
    }
}

impl Error {
    /// Translates a server-reported error code into the matching error kind.
    pub(crate) fn from_api_error(code: &str, message: &str) -> Error {
        let api = ApiError {
            code: code.to_owned(),
            message: message.to_owned(),
        };
        match code {
            "permissiondenied" | "readapidenied" | "mustbeloggedin" | "permissions"
            | "protectedpage" | "cascadeprotected" | "customcssjsprotected" => {
                Error::Unauthorized(api)
            }
            "badtoken" | "notoken" => Error::BadToken(api),
            "unknown_action" | "badvalue_action" => Error::InvalidAction(api),
            "assertuserfailed" | "assertbotfailed" | "assertnameduserfailed" => {
                Error::AccountAssertion(api)
            }
            "prev_revision" => Error::OperationConflict(api),
            c if c.ends_with("conflict") => Error::OperationConflict(api),
            c if c.starts_with("internal_api_error") => Error::RemoteInternal(api),
            "pagecannotexist" => Error::BadTitle {
                text: message.to_owned(),
                reason: "the namespace does not allow pages",
            },
            _ => Error::OperationFailed(api),
        }
    }

    /// The server-reported error code, for errors that carry one.
    pub fn api_code(&self) -> Option<&str> {
        match self {
            Error::OperationFailed(e)
            | Error::Unauthorized(e)
            | Error::BadToken(e)
            | Error::InvalidAction(e)
            | Error::AccountAssertion(e)
            | Error::OperationConflict(e)
            | Error::RemoteInternal(e) => Some(&e.code),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
