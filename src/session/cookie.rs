use actix_web::cookie::{time::Duration, Cookie, SameSite};
use actix_web::HttpRequest;
use anyhow::Result;
use serde::Serialize;

use crate::models::{LoginState, SessionPayload};
use crate::utils::crypto::{CookieCodec, DecodeError};

/// Common cookie names used across the application
pub const SESSION_COOKIE_NAME: &str = "session";
pub const CSRF_COOKIE_NAME: &str = "csrf";
pub const LOGIN_STATE_COOKIE_NAME: &str = "state";

/// Path the login-state cookie is restricted to
pub const LOGIN_STATE_COOKIE_PATH: &str = "/auth";

/// Lifetime of the login-state cookie in seconds
pub const LOGIN_STATE_MAX_AGE_SECONDS: i64 = 60;

/// Options for cookie creation
pub struct CookieOptions {
    pub http_only: bool,
    pub same_site: Option<SameSite>,
    pub path: String,
    pub max_age: Duration,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            http_only: true,
            same_site: Some(SameSite::Strict),
            path: "/".to_string(),
            max_age: Duration::hours(1),
        }
    }
}

/// Cookie factory for the session, CSRF and login-state cookies
///
/// `secure` follows the scheme of the gateway's public base URL: over HTTPS
/// cookies are marked `Secure` and the session cookie is `SameSite=None`.
#[derive(Clone, Debug)]
pub struct CookieFactory {
    codec: CookieCodec,
    secure: bool,
}

impl CookieFactory {
    #[must_use]
    pub fn new(codec: CookieCodec, secure: bool) -> Self {
        Self { codec, secure }
    }

    #[must_use]
    pub fn codec(&self) -> &CookieCodec {
        &self.codec
    }

    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Build a cookie whose value is the sealed `data`
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails
    pub fn create_cookie<T: Serialize>(
        &self,
        name: &str,
        data: &T,
        options: CookieOptions,
    ) -> Result<Cookie<'static>> {
        let value = self.codec.encode(data)?;
        Ok(self.build_cookie(name, value, options))
    }

    fn build_cookie(&self, name: &str, value: String, options: CookieOptions) -> Cookie<'static> {
        let mut cookie = Cookie::build(name.to_owned(), value)
            .http_only(options.http_only)
            .secure(self.secure)
            .path(options.path)
            .max_age(options.max_age)
            .finish();
        cookie.set_same_site(options.same_site);
        cookie
    }

    /// Session cookie carrying the sealed payload
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails
    pub fn create_session_cookie(
        &self,
        payload: &SessionPayload,
        max_age_seconds: i64,
    ) -> Result<Cookie<'static>> {
        self.create_cookie(
            SESSION_COOKIE_NAME,
            payload,
            CookieOptions {
                same_site: self.secure.then_some(SameSite::None),
                max_age: Duration::seconds(max_age_seconds),
                ..Default::default()
            },
        )
    }

    /// Readable `SameSite=Strict` cookie holding the session's CSRF token
    #[must_use]
    pub fn create_csrf_cookie(&self, csrf_token: &str, max_age_seconds: i64) -> Cookie<'static> {
        self.build_cookie(
            CSRF_COOKIE_NAME,
            csrf_token.to_owned(),
            CookieOptions {
                http_only: false,
                same_site: Some(SameSite::Strict),
                max_age: Duration::seconds(max_age_seconds),
                ..Default::default()
            },
        )
    }

    /// Short-lived cookie carrying state across a login round trip
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails
    pub fn create_login_state_cookie(&self, state: &LoginState) -> Result<Cookie<'static>> {
        self.create_cookie(
            LOGIN_STATE_COOKIE_NAME,
            state,
            CookieOptions {
                same_site: Some(SameSite::Lax),
                path: LOGIN_STATE_COOKIE_PATH.to_string(),
                max_age: Duration::seconds(LOGIN_STATE_MAX_AGE_SECONDS),
                ..Default::default()
            },
        )
    }

    /// Removal cookies for logout
    #[must_use]
    pub fn expired_session_cookies(&self) -> Vec<Cookie<'static>> {
        vec![
            self.expired_cookie(SESSION_COOKIE_NAME, "/"),
            self.expired_cookie(CSRF_COOKIE_NAME, "/"),
        ]
    }

    #[must_use]
    pub fn expired_login_state_cookie(&self) -> Cookie<'static> {
        self.expired_cookie(LOGIN_STATE_COOKIE_NAME, LOGIN_STATE_COOKIE_PATH)
    }

    fn expired_cookie(&self, name: &str, path: &str) -> Cookie<'static> {
        let mut cookie = self.build_cookie(
            name,
            String::new(),
            CookieOptions {
                path: path.to_string(),
                same_site: None,
                max_age: Duration::ZERO,
                ..Default::default()
            },
        );
        cookie.make_removal();
        cookie
    }

    /// Decode the session cookie of a request.
    ///
    /// `Ok(None)` means no cookie was sent.
    ///
    /// # Errors
    ///
    /// Returns the [`DecodeError`] of an unreadable cookie
    pub fn read_session_payload(
        &self,
        req: &HttpRequest,
    ) -> Result<Option<SessionPayload>, DecodeError> {
        req.cookie(SESSION_COOKIE_NAME)
            .map(|cookie| self.codec.decode(cookie.value()))
            .transpose()
    }

    /// Decode the login-state cookie of a request, if present and intact
    #[must_use]
    pub fn read_login_state(&self, req: &HttpRequest) -> Option<LoginState> {
        let cookie = req.cookie(LOGIN_STATE_COOKIE_NAME)?;
        match self.codec.decode(cookie.value()) {
            Ok(state) => Some(state),
            Err(e) => {
                log::debug!("Discarding unreadable login state cookie: {e}");
                None
            }
        }
    }
}

/// Strip the gateway's own cookies from a `Cookie` header before it is forwarded upstream
#[must_use]
pub fn filter_gateway_cookies(cookie_str: &str) -> Option<String> {
    let filtered_cookies: Vec<&str> = cookie_str
        .split(';')
        .map(str::trim)
        .filter(|cookie| {
            let name = cookie.split_once('=').map_or(*cookie, |(name, _)| name).trim();
            !cookie.is_empty()
                && name != SESSION_COOKIE_NAME
                && name != CSRF_COOKIE_NAME
                && name != LOGIN_STATE_COOKIE_NAME
        })
        .collect();

    if filtered_cookies.is_empty() {
        None
    } else {
        Some(filtered_cookies.join("; "))
    }
}
