//! Assertion helpers for responses and cookies

use actix_web::cookie::{time::Duration, Cookie};
use actix_web::http::header;
use actix_web::HttpResponse;

/// Assert that an HTTP response has the expected status code
///
/// # Panics
///
/// Panics if the response status does not match the expected status code.
pub fn assert_status(response: &HttpResponse, expected_status: u16) {
    assert_eq!(
        response.status().as_u16(),
        expected_status,
        "Expected status {expected_status}, got {}",
        response.status()
    );
}

/// Assert that a response sets `name` with a non-empty value and return it
///
/// # Panics
///
/// Panics if the cookie is missing or is a removal cookie.
#[must_use]
pub fn assert_cookie_set(response: &HttpResponse, name: &str) -> Cookie<'static> {
    let cookie = response
        .cookies()
        .find(|c| c.name() == name)
        .unwrap_or_else(|| panic!("Expected response to set cookie '{name}'"));
    assert!(
        !cookie.value().is_empty(),
        "Expected cookie '{name}' to carry a value"
    );
    cookie.into_owned()
}

/// Assert that a response clears `name`
///
/// # Panics
///
/// Panics if the cookie is not set with an empty value and zero Max-Age.
pub fn assert_cookie_removed(response: &HttpResponse, name: &str) {
    let cookie = response
        .cookies()
        .find(|c| c.name() == name)
        .unwrap_or_else(|| panic!("Expected response to clear cookie '{name}'"));
    assert_eq!(cookie.value(), "", "Cookie '{name}' should be emptied");
    assert_eq!(
        cookie.max_age(),
        Some(Duration::ZERO),
        "Cookie '{name}' should expire immediately"
    );
}

/// Assert that a response does not touch `name`
///
/// # Panics
///
/// Panics if the response sets the cookie.
pub fn assert_no_cookie(response: &HttpResponse, name: &str) {
    assert!(
        response.cookies().all(|c| c.name() != name),
        "Expected no '{name}' cookie on the response"
    );
}

/// Assert a redirect to `expected_location`
///
/// # Panics
///
/// Panics if the response is not a 302 or points elsewhere.
pub fn assert_redirect(response: &HttpResponse, expected_location: &str) {
    assert_status(response, 302);
    let location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert_eq!(location, expected_location, "Unexpected redirect target");
}
