//! HTTP response helpers
//!
//! Error bodies are generic on purpose: they never say why a session was
//! rejected. Common bodies are serialised once and reused.

use actix_web::{cookie::Cookie, http::header, HttpResponse};
use serde_json::{json, Value};

static CACHED_RESPONSES: std::sync::LazyLock<CachedResponses> =
    std::sync::LazyLock::new(CachedResponses::new);

/// Pre-serialised bodies for the common error responses
struct CachedResponses {
    unauthorized: String,
    not_found: String,
    method_not_allowed: String,
    server_error: String,
    bad_gateway: String,
    invalid_request: String,
}

impl CachedResponses {
    fn new() -> Self {
        Self {
            unauthorized: Self::create_json(
                "unauthorized",
                "Authentication is required to access this resource",
            ),
            not_found: Self::create_json("not_found", "No route matches the requested path"),
            method_not_allowed: Self::create_json(
                "method_not_allowed",
                "The request method is not allowed for this route",
            ),
            server_error: Self::create_json("server_error", "An internal server error occurred"),
            bad_gateway: Self::create_json("bad_gateway", "Failed to connect to upstream server"),
            invalid_request: Self::create_json(
                "invalid_request",
                "The request is malformed or invalid",
            ),
        }
    }

    fn create_json(error: &str, description: &str) -> String {
        json!({
            "error": error,
            "error_description": description
        })
        .to_string()
    }

    fn respond(mut builder: actix_web::HttpResponseBuilder, body: &str) -> HttpResponse {
        builder
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .body(body.to_owned())
    }
}

/// Error response kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorType {
    BadRequest,
    Unauthorized,
    NotFound,
    MethodNotAllowed,
    InternalServerError,
    BadGateway,
}

/// Unified response builder
pub struct ResponseBuilder;

impl ResponseBuilder {
    #[must_use]
    pub fn bad_request() -> ErrorResponseBuilder {
        ErrorResponseBuilder::new(ErrorType::BadRequest)
    }

    /// 401 with a body that never discloses the reason
    #[must_use]
    pub fn unauthorized() -> ErrorResponseBuilder {
        ErrorResponseBuilder::new(ErrorType::Unauthorized)
    }

    #[must_use]
    pub fn not_found() -> ErrorResponseBuilder {
        ErrorResponseBuilder::new(ErrorType::NotFound)
    }

    #[must_use]
    pub fn method_not_allowed() -> ErrorResponseBuilder {
        ErrorResponseBuilder::new(ErrorType::MethodNotAllowed)
    }

    #[must_use]
    pub fn internal_server_error() -> ErrorResponseBuilder {
        ErrorResponseBuilder::new(ErrorType::InternalServerError)
    }

    #[must_use]
    pub fn bad_gateway() -> ErrorResponseBuilder {
        ErrorResponseBuilder::new(ErrorType::BadGateway)
    }

    /// 302 Found
    #[must_use]
    pub fn redirect(location: &str) -> RedirectBuilder {
        RedirectBuilder::new(location)
    }

    /// 200 with a JSON body and optional cookies
    #[must_use]
    pub fn ok() -> JsonResponseBuilder {
        JsonResponseBuilder::default()
    }
}

/// Builder for error responses
pub struct ErrorResponseBuilder {
    error_type: ErrorType,
    error_code: Option<String>,
    message: Option<String>,
}

impl ErrorResponseBuilder {
    fn new(error_type: ErrorType) -> Self {
        Self {
            error_type,
            error_code: None,
            message: None,
        }
    }

    #[must_use]
    pub fn with_error_code(mut self, code: &str) -> Self {
        self.error_code = Some(code.to_string());
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    #[must_use]
    pub fn build(self) -> HttpResponse {
        if self.error_code.is_none() && self.message.is_none() {
            return self.build_cached_response();
        }
        self.build_custom_response()
    }

    fn status(&self) -> actix_web::HttpResponseBuilder {
        match self.error_type {
            ErrorType::BadRequest => HttpResponse::BadRequest(),
            ErrorType::Unauthorized => HttpResponse::Unauthorized(),
            ErrorType::NotFound => HttpResponse::NotFound(),
            ErrorType::MethodNotAllowed => HttpResponse::MethodNotAllowed(),
            ErrorType::InternalServerError => HttpResponse::InternalServerError(),
            ErrorType::BadGateway => HttpResponse::BadGateway(),
        }
    }

    fn build_cached_response(&self) -> HttpResponse {
        let body = match self.error_type {
            ErrorType::BadRequest => &CACHED_RESPONSES.invalid_request,
            ErrorType::Unauthorized => &CACHED_RESPONSES.unauthorized,
            ErrorType::NotFound => &CACHED_RESPONSES.not_found,
            ErrorType::MethodNotAllowed => &CACHED_RESPONSES.method_not_allowed,
            ErrorType::InternalServerError => &CACHED_RESPONSES.server_error,
            ErrorType::BadGateway => &CACHED_RESPONSES.bad_gateway,
        };
        CachedResponses::respond(self.status(), body)
    }

    fn build_custom_response(self) -> HttpResponse {
        let mut json_body = json!({});
        json_body["error"] = Value::String(
            self.error_code
                .clone()
                .unwrap_or_else(|| self.default_error_code().to_string()),
        );
        json_body["error_description"] = Value::String(
            self.message
                .clone()
                .unwrap_or_else(|| self.default_message().to_string()),
        );

        self.status()
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .json(json_body)
    }

    fn default_error_code(&self) -> &'static str {
        match self.error_type {
            ErrorType::BadRequest => "invalid_request",
            ErrorType::Unauthorized => "unauthorized",
            ErrorType::NotFound => "not_found",
            ErrorType::MethodNotAllowed => "method_not_allowed",
            ErrorType::InternalServerError => "server_error",
            ErrorType::BadGateway => "bad_gateway",
        }
    }

    fn default_message(&self) -> &'static str {
        match self.error_type {
            ErrorType::BadRequest => "The request is malformed or invalid",
            ErrorType::Unauthorized => "Authentication is required to access this resource",
            ErrorType::NotFound => "No route matches the requested path",
            ErrorType::MethodNotAllowed => "The request method is not allowed for this route",
            ErrorType::InternalServerError => "An internal server error occurred",
            ErrorType::BadGateway => "Failed to connect to upstream server",
        }
    }
}

/// Builder for redirect responses
pub struct RedirectBuilder {
    location: String,
    cookies: Vec<Cookie<'static>>,
}

impl RedirectBuilder {
    fn new(location: &str) -> Self {
        Self {
            location: location.to_string(),
            cookies: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_cookies(mut self, mut cookies: Vec<Cookie<'static>>) -> Self {
        self.cookies.append(&mut cookies);
        self
    }

    #[must_use]
    pub fn build(self) -> HttpResponse {
        let mut builder = HttpResponse::Found();
        for cookie in self.cookies {
            builder.cookie(cookie);
        }
        builder
            .insert_header((header::LOCATION, self.location))
            .finish()
    }
}

/// Builder for JSON responses
#[derive(Default)]
pub struct JsonResponseBuilder {
    cookies: Vec<Cookie<'static>>,
}

impl JsonResponseBuilder {
    #[must_use]
    pub fn with_cookies(mut self, mut cookies: Vec<Cookie<'static>>) -> Self {
        self.cookies.append(&mut cookies);
        self
    }

    #[must_use]
    pub fn json<T: serde::Serialize>(self, data: &T) -> HttpResponse {
        let mut builder = HttpResponse::Ok();
        for cookie in self.cookies {
            builder.cookie(cookie);
        }
        builder.json(data)
    }
}
