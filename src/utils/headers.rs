//! Header forwarding between the client and upstream services

use actix_web::http::header::HeaderValue;
use actix_web::{HttpRequest, HttpResponseBuilder};
use reqwest::RequestBuilder;

use crate::session::{filter_gateway_cookies, Session};

/// Identity header set for authenticated requests
pub const AUTH_USER_HEADER: &str = "X-Auth-Request-User";

/// Login provider header set for authenticated requests
pub const AUTH_PROVIDER_HEADER: &str = "X-Auth-Request-Provider";

/// Check if a header is a hop-by-hop header that should not be forwarded
///
/// Based on RFC 2616 Section 13.5.1
#[must_use]
pub fn is_hop_by_hop_header(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Headers a client could use to impersonate someone upstream
fn is_identity_header(name: &str) -> bool {
    name.starts_with("x-auth-request-")
}

/// Request forwarding policy
#[derive(Debug, Clone)]
pub struct RequestHeaderProcessor {
    pub skip_hop_by_hop: bool,
    /// Remove the gateway's own cookies from the forwarded `Cookie` header
    pub filter_gateway_cookies: bool,
}

impl Default for RequestHeaderProcessor {
    fn default() -> Self {
        Self {
            skip_hop_by_hop: true,
            filter_gateway_cookies: true,
        }
    }
}

impl RequestHeaderProcessor {
    #[must_use]
    pub fn for_proxy() -> Self {
        Self::default()
    }

    /// Copy client headers onto an upstream request.
    ///
    /// `Host` and any client-supplied `X-Auth-Request-*` headers are never
    /// forwarded; identity headers come from [`Self::add_identity_headers`] only.
    pub fn forward_request_headers(
        &self,
        req: &HttpRequest,
        mut request_builder: RequestBuilder,
    ) -> RequestBuilder {
        for (name, value) in req.headers() {
            let name_str = name.as_str().to_lowercase();

            if self.should_skip_header(&name_str) {
                continue;
            }

            if name_str == "cookie" {
                request_builder = self.process_cookie_header(value, request_builder);
                continue;
            }

            if let Ok(value_str) = value.to_str() {
                request_builder = request_builder.header(name.as_str(), value_str);
            }
        }

        request_builder
    }

    fn should_skip_header(&self, name_str: &str) -> bool {
        name_str == "host"
            || is_identity_header(name_str)
            || (self.skip_hop_by_hop && is_hop_by_hop_header(name_str))
    }

    fn process_cookie_header(
        &self,
        value: &HeaderValue,
        request_builder: RequestBuilder,
    ) -> RequestBuilder {
        let Ok(cookie_str) = value.to_str() else {
            return request_builder;
        };

        if !self.filter_gateway_cookies {
            return request_builder.header("cookie", cookie_str);
        }
        match filter_gateway_cookies(cookie_str) {
            Some(filtered) => request_builder.header("cookie", filtered),
            None => request_builder,
        }
    }

    /// Assert the authenticated identity to the upstream
    #[must_use]
    pub fn add_identity_headers(
        request_builder: RequestBuilder,
        session: Option<&Session>,
    ) -> RequestBuilder {
        match session {
            Some(session) => request_builder
                .header(AUTH_USER_HEADER, session.user().id.as_str())
                .header(AUTH_PROVIDER_HEADER, session.provider()),
            None => request_builder,
        }
    }
}

/// Response forwarding policy
#[derive(Debug, Clone)]
pub struct ResponseHeaderProcessor {
    pub skip_hop_by_hop: bool,
}

impl Default for ResponseHeaderProcessor {
    fn default() -> Self {
        Self {
            skip_hop_by_hop: true,
        }
    }
}

impl ResponseHeaderProcessor {
    #[must_use]
    pub fn for_proxy() -> Self {
        Self::default()
    }

    /// Copy upstream response headers onto the client response, keeping repeated headers
    pub fn forward_response_headers(
        &self,
        upstream_response: &reqwest::Response,
        response_builder: &mut HttpResponseBuilder,
    ) {
        for (name, value) in upstream_response.headers() {
            let name_str = name.as_str().to_lowercase();

            // Content-Length is recomputed from the forwarded body
            if name_str == "content-length"
                || (self.skip_hop_by_hop && is_hop_by_hop_header(&name_str))
            {
                continue;
            }

            if let Ok(value_str) = value.to_str() {
                response_builder.append_header((name.as_str(), value_str));
            }
        }
    }
}
