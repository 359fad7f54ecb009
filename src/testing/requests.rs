//! HTTP request builder for testing guards, the pipeline and handlers

use actix_web::cookie::Cookie;
use actix_web::http::Method;
use actix_web::{test, HttpRequest};

/// Builder for creating HTTP requests for testing
pub struct RequestBuilder {
    method: Method,
    uri: String,
    headers: Vec<(String, String)>,
    cookies: Vec<Cookie<'static>>,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestBuilder {
    /// A `GET /` request with no headers or cookies
    #[must_use]
    pub fn new() -> Self {
        Self {
            method: Method::GET,
            uri: "/".to_string(),
            headers: Vec::new(),
            cookies: Vec::new(),
        }
    }

    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Path and optional query string
    #[must_use]
    pub fn uri(mut self, uri: &str) -> Self {
        self.uri = uri.to_string();
        self
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    #[must_use]
    pub fn with_cookie(mut self, cookie: Cookie<'static>) -> Self {
        self.cookies.push(cookie);
        self
    }

    /// Add every cookie in `cookies` by name and value, ignoring attributes
    #[must_use]
    pub fn with_cookies<'a>(
        mut self,
        cookies: impl IntoIterator<Item = &'a Cookie<'static>>,
    ) -> Self {
        for cookie in cookies {
            self.cookies
                .push(Cookie::new(cookie.name().to_owned(), cookie.value().to_owned()));
        }
        self
    }

    /// Build an `HttpRequest` for calling guards and the pipeline directly
    #[must_use]
    pub fn build(self) -> HttpRequest {
        self.into_test_request().to_http_request()
    }

    /// The underlying actix test request, for `test::call_service`
    #[must_use]
    pub fn into_test_request(self) -> test::TestRequest {
        let mut req = test::TestRequest::default()
            .method(self.method)
            .uri(&self.uri);

        for (name, value) in self.headers {
            req = req.insert_header((name, value));
        }

        for cookie in self.cookies {
            req = req.cookie(cookie);
        }

        req
    }
}
