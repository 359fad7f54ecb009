use log::info;
use url::Url;

use super::{CsrfGuard, CsrfRequestContext, CsrfStrategy};
use crate::utils::crypto::constant_time_eq;

/// The CSRF token travels in a `SameSite=Strict` cookie that browsers withhold
/// on cross-site requests. Requests whose `Origin`/`Referer` name another
/// origin than the gateway are blocked as well.
#[derive(Debug, Clone)]
pub struct SameSiteStrictCookieGuard {
    base_url: Url,
}

impl SameSiteStrictCookieGuard {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self { base_url }
    }
}

impl CsrfGuard for SameSiteStrictCookieGuard {
    fn strategy(&self) -> CsrfStrategy {
        CsrfStrategy::SameSiteStrictCookie
    }

    fn should_block(&self, context: &CsrfRequestContext<'_>) -> bool {
        let Some(session) = context.session else {
            return false;
        };

        let Some(cookie_token) = context.cookie_token.as_deref() else {
            info!("Blocked request for session {}: CSRF cookie missing", session.id());
            return true;
        };

        if should_block_based_on_origin_header(context.origin, context.referer, &self.base_url) {
            info!("Blocked request for session {}: cross-origin request", session.id());
            return true;
        }

        if !constant_time_eq(cookie_token, session.csrf_token()) {
            info!("Blocked request for session {}: CSRF cookie mismatch", session.id());
            return true;
        }

        false
    }
}

/// Whether `Origin` (or `Referer` when `Origin` is absent or `"null"`) names
/// an origin other than `target`.
///
/// Missing or unparseable headers never block.
#[must_use]
pub fn should_block_based_on_origin_header(
    origin: Option<&str>,
    referer: Option<&str>,
    target: &Url,
) -> bool {
    fn present(value: Option<&str>) -> Option<&str> {
        value.filter(|v| !v.is_empty() && *v != "null")
    }

    let Some(claimed) = present(origin).or_else(|| present(referer)) else {
        return false;
    };

    let Ok(claimed) = Url::parse(claimed) else {
        return false;
    };

    claimed.scheme() != target.scheme()
        || claimed.host_str() != target.host_str()
        || claimed.port_or_known_default() != target.port_or_known_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestFixtures;

    fn guard() -> SameSiteStrictCookieGuard {
        SameSiteStrictCookieGuard::new(TestFixtures::base_url())
    }

    #[test]
    fn test_same_origin_with_cookie_is_allowed() {
        let session = TestFixtures::session();
        let context = CsrfRequestContext {
            session: Some(&session),
            cookie_token: Some(session.csrf_token().to_string()),
            origin: Some("https://gateway.example.com"),
            ..Default::default()
        };
        assert!(!guard().should_block(&context));
    }

    #[test]
    fn test_missing_headers_with_cookie_is_allowed() {
        let session = TestFixtures::session();
        let context = CsrfRequestContext {
            session: Some(&session),
            cookie_token: Some(session.csrf_token().to_string()),
            ..Default::default()
        };
        assert!(!guard().should_block(&context));
    }

    #[test]
    fn test_cross_origin_is_blocked() {
        let session = TestFixtures::session();
        let context = CsrfRequestContext {
            session: Some(&session),
            cookie_token: Some(session.csrf_token().to_string()),
            origin: Some("https://evil.example.org"),
            ..Default::default()
        };
        assert!(guard().should_block(&context));
    }

    #[test]
    fn test_missing_or_wrong_cookie_is_blocked() {
        let session = TestFixtures::session();
        let missing = CsrfRequestContext {
            session: Some(&session),
            ..Default::default()
        };
        assert!(guard().should_block(&missing));

        let wrong = CsrfRequestContext {
            session: Some(&session),
            cookie_token: Some("stale".to_string()),
            ..Default::default()
        };
        assert!(guard().should_block(&wrong));
    }

    #[test]
    fn test_anonymous_request_is_never_blocked() {
        let context = CsrfRequestContext {
            origin: Some("https://evil.example.org"),
            ..Default::default()
        };
        assert!(!guard().should_block(&context));
    }

    #[test]
    fn test_origin_header_rules() {
        let target = TestFixtures::base_url();

        assert!(!should_block_based_on_origin_header(None, None, &target));
        assert!(!should_block_based_on_origin_header(
            Some("https://gateway.example.com"),
            None,
            &target
        ));
        assert!(!should_block_based_on_origin_header(
            Some("https://gateway.example.com:443"),
            None,
            &target
        ));
        assert!(should_block_based_on_origin_header(
            Some("http://gateway.example.com"),
            None,
            &target
        ));
        assert!(should_block_based_on_origin_header(
            Some("https://gateway.example.com:8443"),
            None,
            &target
        ));
        assert!(should_block_based_on_origin_header(
            Some("https://attacker.example.net"),
            Some("https://gateway.example.com/page"),
            &target
        ));
    }

    #[test]
    fn test_null_origin_falls_back_to_referer() {
        let target = TestFixtures::base_url();

        assert!(!should_block_based_on_origin_header(
            Some("null"),
            Some("https://gateway.example.com/app/page"),
            &target
        ));
        assert!(should_block_based_on_origin_header(
            Some("null"),
            Some("https://attacker.example.net/form"),
            &target
        ));
        assert!(!should_block_based_on_origin_header(Some("null"), Some("null"), &target));
    }

    #[test]
    fn test_unparseable_origin_does_not_block() {
        let target = TestFixtures::base_url();
        assert!(!should_block_based_on_origin_header(
            Some("not a url"),
            None,
            &target
        ));
    }
}
