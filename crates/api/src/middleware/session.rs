//! Cookie-backed anonymous sessions.
//!
//! Every request passes through [`ensure_session`]. A valid token in the
//! session cookie is reused; a missing, expired or forged one is replaced
//! by a fresh session and a `Set-Cookie` header on the response.

use advex_core::session::SessionId;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::AppError;
use crate::session::{issue_token, validate_token, SessionConfig, SESSION_COOKIE};
use crate::state::AppState;

/// Session attached to the current request.
///
/// ```ignore
/// async fn my_handler(Session(session): Session) -> AppResult<Json<()>> {
///     tracing::info!(session = %session, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Session(pub SessionId);

impl FromRequestParts<AppState> for Session {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::InternalError("Session middleware not installed".into()))
    }
}

/// Resolve or create the session, then run the rest of the stack.
pub async fn ensure_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let existing = cookie_value(request.headers(), SESSION_COOKIE)
        .and_then(|token| validate_token(token, &state.config.session).ok());

    let (session, set_cookie) = match existing {
        Some(session) => (session, None),
        None => {
            let session = SessionId::generate();
            match session_cookie(&session, &state.config.session) {
                Ok(cookie) => (session, Some(cookie)),
                Err(e) => return e.into_response(),
            }
        }
    };

    request.extensions_mut().insert(Session(session));
    let mut response = next.run(request).await;

    if let Some(cookie) = set_cookie {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

fn session_cookie(session: &SessionId, config: &SessionConfig) -> Result<HeaderValue, AppError> {
    let token = issue_token(session, config)
        .map_err(|e| AppError::InternalError(format!("Failed to sign session token: {e}")))?;

    tracing::debug!(session = %session, "Issued new session");

    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE}={token}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        config.ttl_secs()
    ))
    .map_err(|e| AppError::InternalError(e.to_string()))
}

/// Value of cookie `name` across all `Cookie` headers.
fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
