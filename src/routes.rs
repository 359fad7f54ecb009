//! Route table mapping request paths to upstreams and security policies

use actix_web::http::Method;
use thiserror::Error;
use url::Url;

use crate::authentication::{ResponseHeaderRule, SecurityPolicy};
use crate::csrf::CsrfRegistry;
use crate::settings::{ConfigurationError, TollgateSettings};

/// Host used only to run request paths through the URL parser
const NORMALIZATION_BASE: &str = "http://tollgate.invalid/";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathRejection {
    #[error("encoded path separator in request path")]
    EncodedSeparator,
    #[error("request path cannot be parsed")]
    Malformed,
}

/// Canonical form of a request path, as the upstream will resolve it.
///
/// Percent-escaped unreserved characters are decoded, then backslashes and
/// `.`/`..` segments are resolved the way the URL parser does. Routing and the
/// upstream URL must both use the result. Escaped `/` and `\` are rejected
/// because an upstream may decode them into separators.
///
/// # Errors
///
/// Returns a [`PathRejection`] for escaped separators or an unparseable path
pub fn normalize_path(path: &str) -> Result<String, PathRejection> {
    let bytes = path.as_bytes();
    let mut decoded = String::with_capacity(path.len());
    let mut i = 0;

    while i < bytes.len() {
        let escaped = (bytes[i] == b'%')
            .then(|| path.get(i + 1..i + 3))
            .flatten()
            .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
            .and_then(|hex| u8::from_str_radix(hex, 16).ok());

        match escaped {
            Some(b'/' | b'\\') => return Err(PathRejection::EncodedSeparator),
            Some(byte) if byte.is_ascii_alphanumeric() || b"-._~".contains(&byte) => {
                decoded.push(char::from(byte));
                i += 3;
            }
            _ => {
                let ch = path[i..].chars().next().ok_or(PathRejection::Malformed)?;
                decoded.push(ch);
                i += ch.len_utf8();
            }
        }
    }

    let mut url = Url::parse(NORMALIZATION_BASE).map_err(|_| PathRejection::Malformed)?;
    url.set_path(&decoded);
    Ok(url.path().to_string())
}

#[derive(Debug, Clone)]
pub struct GatewayRoute {
    pub name: String,
    pub path_prefix: String,
    pub upstream: Url,
    pub policy: SecurityPolicy,
}

impl GatewayRoute {
    /// Whether `path` falls under this route's prefix on a segment boundary
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        let prefix = self.path_prefix.as_str();
        if prefix == "/" {
            return true;
        }
        match path.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/'),
            None => false,
        }
    }

    /// Upstream URL for a normalized request path and raw query string
    ///
    /// # Errors
    ///
    /// Returns an error if the joined URL cannot be parsed
    pub fn upstream_url(&self, path: &str, query: &str) -> Result<Url, url::ParseError> {
        let base = self.upstream.as_str().trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}{path}"))?;
        if !query.is_empty() {
            url.set_query(Some(query));
        }
        Ok(url)
    }
}

fn profile_error(profile: &str, error: impl std::fmt::Display) -> ConfigurationError {
    ConfigurationError::Invalid(vec![format!("security profile '{profile}': {error}")])
}

/// Routes ordered by descending prefix length so the first match is the longest
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<GatewayRoute>,
}

impl RouteTable {
    #[must_use]
    pub fn new(mut routes: Vec<GatewayRoute>) -> Self {
        routes.sort_by(|a, b| b.path_prefix.len().cmp(&a.path_prefix.len()));
        Self { routes }
    }

    /// Resolve every `[[routes]]` entry against its security profile
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] for an unknown profile, an unknown CSRF
    /// strategy or an unparseable upstream URL
    pub fn from_settings(
        settings: &TollgateSettings,
        registry: &CsrfRegistry,
    ) -> Result<Self, ConfigurationError> {
        let mut routes = Vec::with_capacity(settings.routes.len());

        for route in &settings.routes {
            let profile = settings
                .get_security_profile(&route.security_profile)
                .ok_or_else(|| ConfigurationError::UnknownSecurityProfile {
                    route: route.name.clone(),
                    profile: route.security_profile.clone(),
                })?;

            let upstream = Url::parse(&route.upstream_url).map_err(|_| {
                ConfigurationError::InvalidUpstreamUrl {
                    route: route.name.clone(),
                    url: route.upstream_url.clone(),
                }
            })?;

            let parse_methods = |methods: &[String]| {
                methods
                    .iter()
                    .map(|m| {
                        Method::from_bytes(m.as_bytes())
                            .map_err(|e| profile_error(&profile.name, e))
                    })
                    .collect::<Result<Vec<_>, _>>()
            };
            let response_headers = profile
                .response_headers
                .iter()
                .map(|(name, value)| {
                    ResponseHeaderRule::parse(name, value)
                        .map_err(|e| profile_error(&profile.name, e))
                })
                .collect::<Result<Vec<_>, _>>()?;

            let policy = SecurityPolicy::new(
                registry.resolve(&profile.csrf_protection)?,
                &settings.session,
            )
            .allow_anonymous(route.allow_anonymous)
            .with_safe_methods(parse_methods(&profile.csrf_safe_methods)?)
            .with_allowed_methods(parse_methods(&profile.allowed_methods)?)
            .with_response_headers(response_headers);

            log::info!(
                "   └─ {} {} -> {} ({}{})",
                route.name,
                route.path_prefix,
                upstream,
                profile.csrf_protection,
                if route.allow_anonymous { ", anonymous allowed" } else { "" }
            );

            routes.push(GatewayRoute {
                name: route.name.clone(),
                path_prefix: route.path_prefix.clone(),
                upstream,
                policy,
            });
        }

        Ok(Self::new(routes))
    }

    #[must_use]
    pub fn match_path(&self, path: &str) -> Option<&GatewayRoute> {
        self.routes.iter().find(|route| route.matches(path))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
