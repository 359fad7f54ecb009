use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use actix_web::http::header::{HeaderMap, HeaderName, HeaderValue};
use actix_web::http::Method;

use crate::csrf::CsrfGuard;
use crate::settings::{ConfigurationError, SessionSettings};

/// Marker value in `response_headers` that strips the header instead of setting it
pub const REMOVE_HEADER_MARKER: &str = "<<remove>>";

/// A response header rewrite applied to every response of a route
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseHeaderRule {
    Set(HeaderName, HeaderValue),
    Remove(HeaderName),
}

impl ResponseHeaderRule {
    /// Parse one `name = value` entry; [`REMOVE_HEADER_MARKER`] yields a removal
    ///
    /// # Errors
    ///
    /// Returns a message if the name or value is not a valid header
    pub fn parse(name: &str, value: &str) -> Result<Self, String> {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| format!("invalid response header name '{name}'"))?;
        if value == REMOVE_HEADER_MARKER {
            return Ok(Self::Remove(header_name));
        }
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| format!("invalid value for response header '{name}'"))?;
        Ok(Self::Set(header_name, header_value))
    }

    pub fn apply(&self, headers: &mut HeaderMap) {
        match self {
            Self::Set(name, value) => {
                headers.insert(name.clone(), value.clone());
            }
            Self::Remove(name) => {
                headers.remove(name.clone());
            }
        }
    }
}

/// Per-route security requirements, resolved once at startup
#[derive(Clone)]
pub struct SecurityPolicy {
    pub csrf_guard: Arc<dyn CsrfGuard>,
    pub allow_anonymous: bool,
    /// Lifetime of a newly issued or renewed session, in seconds
    pub session_duration: u64,
    /// Renew when fewer seconds than this remain; 0 disables renewal
    pub renew_when_less_than: u64,
    /// Methods that never go through the CSRF check
    pub csrf_safe_methods: Vec<Method>,
    /// Methods the route accepts at all; anything else is answered with 405
    pub allowed_methods: Vec<Method>,
    pub response_headers: Vec<ResponseHeaderRule>,
}

impl fmt::Debug for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityPolicy")
            .field("csrf_strategy", &self.csrf_guard.strategy())
            .field("allow_anonymous", &self.allow_anonymous)
            .field("session_duration", &self.session_duration)
            .field("renew_when_less_than", &self.renew_when_less_than)
            .field("csrf_safe_methods", &self.csrf_safe_methods)
            .field("allowed_methods", &self.allowed_methods)
            .field("response_headers", &self.response_headers)
            .finish()
    }
}

impl SecurityPolicy {
    #[must_use]
    pub fn new(csrf_guard: Arc<dyn CsrfGuard>, session: &SessionSettings) -> Self {
        Self {
            csrf_guard,
            allow_anonymous: false,
            session_duration: session.duration_seconds,
            renew_when_less_than: session.renew_when_less_than_seconds,
            csrf_safe_methods: vec![Method::GET, Method::HEAD, Method::OPTIONS],
            allowed_methods: vec![
                Method::GET,
                Method::HEAD,
                Method::OPTIONS,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
            ],
            response_headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn allow_anonymous(mut self, allow: bool) -> Self {
        self.allow_anonymous = allow;
        self
    }

    #[must_use]
    pub fn with_safe_methods(mut self, methods: Vec<Method>) -> Self {
        self.csrf_safe_methods = methods;
        self
    }

    #[must_use]
    pub fn with_allowed_methods(mut self, methods: Vec<Method>) -> Self {
        self.allowed_methods = methods;
        self
    }

    #[must_use]
    pub fn with_response_headers(mut self, rules: Vec<ResponseHeaderRule>) -> Self {
        self.response_headers = rules;
        self
    }

    #[must_use]
    pub fn is_safe_method(&self, method: &Method) -> bool {
        self.csrf_safe_methods.contains(method)
    }

    #[must_use]
    pub fn is_allowed_method(&self, method: &Method) -> bool {
        self.allowed_methods.contains(method)
    }

    /// Apply the route's response header rules, in configuration order
    pub fn apply_response_headers(&self, headers: &mut HeaderMap) {
        for rule in &self.response_headers {
            rule.apply(headers);
        }
    }

    #[must_use]
    pub fn session_duration_secs(&self) -> i64 {
        i64::try_from(self.session_duration).unwrap_or(i64::MAX)
    }

    /// Whether a session with `remaining_seconds` left is due for renewal
    #[must_use]
    pub fn should_renew(&self, remaining_seconds: i64) -> bool {
        let threshold = i64::try_from(self.renew_when_less_than).unwrap_or(i64::MAX);
        threshold > 0 && remaining_seconds < threshold
    }
}

/// What to do with a session whose revocation status cannot be determined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RevocationFailurePolicy {
    /// Treat the session as anonymous
    #[default]
    FailClosed,
    /// Keep the session
    FailOpen,
}

impl RevocationFailurePolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FailClosed => "fail-closed",
            Self::FailOpen => "fail-open",
        }
    }
}

impl fmt::Display for RevocationFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RevocationFailurePolicy {
    type Err = ConfigurationError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "fail-closed" => Ok(Self::FailClosed),
            "fail-open" => Ok(Self::FailOpen),
            other => Err(ConfigurationError::Invalid(vec![format!(
                "unknown revocation failure policy '{other}'"
            )])),
        }
    }
}
