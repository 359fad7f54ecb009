//! Cross-site request forgery guards
//!
//! A guard decides whether a state-changing request that carries a valid
//! session must be blocked. Requests without a session are never blocked.
//! Guards are built once per process in a [`CsrfRegistry`] and handed to
//! routes by strategy name at startup.

mod double_submit;
mod samesite;

pub use double_submit::DoubleSubmitCookieGuard;
pub use samesite::{should_block_based_on_origin_header, SameSiteStrictCookieGuard};

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use actix_web::http::header;
use actix_web::HttpRequest;
use url::Url;

use crate::session::{Session, CSRF_COOKIE_NAME};
use crate::settings::ConfigurationError;

/// Header a client echoes the CSRF token in
pub const CSRF_HEADER_NAME: &str = "X-CSRF-TOKEN";

/// Query or form parameter fallback for the CSRF token
pub const CSRF_PARAMETER_NAME: &str = "CSRFToken";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

fn find_parameter(encoded: &[u8]) -> Option<String> {
    url::form_urlencoded::parse(encoded)
        .find(|(key, _)| key == CSRF_PARAMETER_NAME)
        .map(|(_, value)| value.into_owned())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CsrfStrategy {
    None,
    DoubleSubmitCookie,
    SameSiteStrictCookie,
}

impl CsrfStrategy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::DoubleSubmitCookie => "double-submit-cookie",
            Self::SameSiteStrictCookie => "samesite-strict-cookie",
        }
    }
}

impl fmt::Display for CsrfStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CsrfStrategy {
    type Err = ConfigurationError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "none" => Ok(Self::None),
            "double-submit-cookie" => Ok(Self::DoubleSubmitCookie),
            "samesite-strict-cookie" => Ok(Self::SameSiteStrictCookie),
            other => Err(ConfigurationError::UnknownCsrfStrategy(other.to_string())),
        }
    }
}

/// Everything a guard may look at for one request
#[derive(Debug, Default)]
pub struct CsrfRequestContext<'a> {
    pub session: Option<&'a Session>,
    pub header_token: Option<&'a str>,
    pub parameter_token: Option<String>,
    pub cookie_token: Option<String>,
    pub origin: Option<&'a str>,
    pub referer: Option<&'a str>,
}

impl<'a> CsrfRequestContext<'a> {
    #[must_use]
    pub fn from_request(req: &'a HttpRequest, session: Option<&'a Session>) -> Self {
        let header_value = |name: &str| req.headers().get(name).and_then(|v| v.to_str().ok());

        Self {
            session,
            header_token: header_value(CSRF_HEADER_NAME),
            parameter_token: find_parameter(req.query_string().as_bytes()),
            cookie_token: req
                .cookie(CSRF_COOKIE_NAME)
                .map(|cookie| cookie.value().to_owned()),
            origin: header_value(header::ORIGIN.as_str()),
            referer: header_value(header::REFERER.as_str()),
        }
    }

    /// Fall back to a `CSRFToken` field of a form-encoded body when the query has none
    #[must_use]
    pub fn with_form_body(mut self, req: &HttpRequest, body: &[u8]) -> Self {
        let is_form = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE));

        if self.parameter_token.is_none() && is_form {
            self.parameter_token = find_parameter(body);
        }
        self
    }
}

pub trait CsrfGuard: Send + Sync {
    fn strategy(&self) -> CsrfStrategy;

    /// `true` if the request must be rejected as a forgery
    fn should_block(&self, context: &CsrfRequestContext<'_>) -> bool;
}

/// Never blocks
#[derive(Debug, Default)]
pub struct NoCsrfGuard;

impl CsrfGuard for NoCsrfGuard {
    fn strategy(&self) -> CsrfStrategy {
        CsrfStrategy::None
    }

    fn should_block(&self, _context: &CsrfRequestContext<'_>) -> bool {
        false
    }
}

/// One constructed guard per strategy
#[derive(Clone)]
pub struct CsrfRegistry {
    none: Arc<dyn CsrfGuard>,
    double_submit: Arc<dyn CsrfGuard>,
    samesite_strict: Arc<dyn CsrfGuard>,
}

impl CsrfRegistry {
    /// `base_url` is the gateway's own public origin, used by the origin check
    #[must_use]
    pub fn new(base_url: &Url) -> Self {
        Self {
            none: Arc::new(NoCsrfGuard),
            double_submit: Arc::new(DoubleSubmitCookieGuard),
            samesite_strict: Arc::new(SameSiteStrictCookieGuard::new(base_url.clone())),
        }
    }

    #[must_use]
    pub fn guard(&self, strategy: CsrfStrategy) -> Arc<dyn CsrfGuard> {
        match strategy {
            CsrfStrategy::None => Arc::clone(&self.none),
            CsrfStrategy::DoubleSubmitCookie => Arc::clone(&self.double_submit),
            CsrfStrategy::SameSiteStrictCookie => Arc::clone(&self.samesite_strict),
        }
    }

    /// Look up a guard by its configured name
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::UnknownCsrfStrategy`] for an unknown name
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn CsrfGuard>, ConfigurationError> {
        Ok(self.guard(name.parse()?))
    }
}
