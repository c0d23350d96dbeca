use axum::extract::{Request, State};
use axum::http::{header, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};

use crate::auth::cookie::{clear_session_cookie, get_cookie_value, sets_cookie};
use crate::extractors::RequestContext;
use crate::state::AppState;

pub const LOGIN_PATH: &str = "/login";
pub const HOME_PATH: &str = "/feed";

const STATIC_PREFIXES: &[&str] = &["/uploads/", "/assets/", "/static/", "/_next/", "/favicon"];
const AUTH_ONLY_PATHS: &[&str] = &["/login", "/register"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Static,
    Api,
    Public,
    AuthOnly,
    Protected,
}

impl RouteClass {
    pub fn classify(path: &str) -> Self {
        if STATIC_PREFIXES.iter().any(|p| path.starts_with(p)) || path == "/robots.txt" {
            RouteClass::Static
        } else if path == "/api" || path.starts_with("/api/") {
            RouteClass::Api
        } else if path == "/health" {
            RouteClass::Public
        } else if AUTH_ONLY_PATHS.contains(&path.trim_end_matches('/')) {
            RouteClass::AuthOnly
        } else {
            RouteClass::Protected
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Absent,
    Valid,
    /// A cookie was sent but names no live session.
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Continue,
    Redirect(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub gate: Gate,
    pub clear_cookie: bool,
}

impl Decision {
    fn go() -> Self {
        Self { gate: Gate::Continue, clear_cookie: false }
    }

    fn redirect(to: &'static str) -> Self {
        Self { gate: Gate::Redirect(to), clear_cookie: false }
    }

    fn clearing(self, clear: bool) -> Self {
        Self { clear_cookie: clear, ..self }
    }
}

/// Page gatekeeping. Pure: the axum glue below feeds it and applies the result.
pub fn decide(class: RouteClass, path: &str, session: SessionState) -> Decision {
    let stale = session == SessionState::Invalid;

    match class {
        RouteClass::Static => return Decision::go(),
        // Handlers answer 401 themselves; only tidy a stale cookie.
        RouteClass::Api | RouteClass::Public => return Decision::go().clearing(stale),
        _ => {}
    }

    if stale {
        return match class {
            RouteClass::AuthOnly => Decision::go().clearing(true),
            _ => Decision::redirect(LOGIN_PATH).clearing(true),
        };
    }

    let authenticated = session == SessionState::Valid;
    if path == "/" {
        return Decision::redirect(if authenticated { HOME_PATH } else { LOGIN_PATH });
    }

    match (class, authenticated) {
        (RouteClass::AuthOnly, true) => Decision::redirect(HOME_PATH),
        (RouteClass::Protected, false) => Decision::redirect(LOGIN_PATH),
        _ => Decision::go(),
    }
}

/// Resolves the session cookie once, stores a [`RequestContext`] for the
/// extractors and applies [`decide`].
pub async fn gatekeeper(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let class = RouteClass::classify(&path);
    if class == RouteClass::Static {
        return next.run(req).await;
    }

    let cookie_name = &state.config.auth.cookie_name;
    let token = get_cookie_value(req.headers(), cookie_name).map(str::to_owned);

    let (session, user) = match token.as_deref() {
        None => (SessionState::Absent, None),
        Some(token) => match state.auth.resolve_session(token).await {
            Ok(Some(user)) => (SessionState::Valid, Some(user)),
            Ok(None) => (SessionState::Invalid, None),
            Err(e) => {
                // Keep the cookie; the session may be fine once storage recovers.
                tracing::error!("Session lookup failed: {}", e);
                (SessionState::Absent, None)
            }
        },
    };

    let decision = decide(class, &path, session);
    if session == SessionState::Invalid {
        tracing::debug!(path = %path, "Stale session cookie");
    }

    let mut response = match decision.gate {
        Gate::Redirect(to) => Redirect::to(to).into_response(),
        Gate::Continue => {
            req.extensions_mut().insert(RequestContext {
                user,
                session_token: token,
            });
            next.run(req).await
        }
    };

    // A handler that just issued or cleared the cookie has the last word.
    if decision.clear_cookie && !sets_cookie(response.headers(), cookie_name) {
        if let Ok(value) = HeaderValue::from_str(&clear_session_cookie(&state.config.auth)) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }

    response
}
