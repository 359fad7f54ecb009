use log::info;

use super::{CsrfGuard, CsrfRequestContext, CsrfStrategy};
use crate::utils::crypto::constant_time_eq;

/// The client echoes the session's CSRF token in the `X-CSRF-TOKEN` header,
/// or in the `CSRFToken` query parameter when the header is absent.
#[derive(Debug, Default)]
pub struct DoubleSubmitCookieGuard;

impl CsrfGuard for DoubleSubmitCookieGuard {
    fn strategy(&self) -> CsrfStrategy {
        CsrfStrategy::DoubleSubmitCookie
    }

    fn should_block(&self, context: &CsrfRequestContext<'_>) -> bool {
        let Some(session) = context.session else {
            return false;
        };

        let presented = context
            .header_token
            .or(context.parameter_token.as_deref());

        match presented {
            Some(token) if constant_time_eq(token, session.csrf_token()) => false,
            Some(_) => {
                info!("Blocked request for session {}: CSRF token mismatch", session.id());
                true
            }
            None => {
                info!("Blocked request for session {}: CSRF token missing", session.id());
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestFixtures;

    #[test]
    fn test_matching_header_token_is_allowed() {
        let session = TestFixtures::session();
        let context = CsrfRequestContext {
            session: Some(&session),
            header_token: Some(session.csrf_token()),
            ..Default::default()
        };
        assert!(!DoubleSubmitCookieGuard.should_block(&context));
    }

    #[test]
    fn test_matching_parameter_token_is_allowed() {
        let session = TestFixtures::session();
        let context = CsrfRequestContext {
            session: Some(&session),
            parameter_token: Some(session.csrf_token().to_string()),
            ..Default::default()
        };
        assert!(!DoubleSubmitCookieGuard.should_block(&context));
    }

    #[test]
    fn test_header_takes_precedence_over_parameter() {
        let session = TestFixtures::session();
        let context = CsrfRequestContext {
            session: Some(&session),
            header_token: Some("wrong"),
            parameter_token: Some(session.csrf_token().to_string()),
            ..Default::default()
        };
        assert!(DoubleSubmitCookieGuard.should_block(&context));
    }

    #[test]
    fn test_missing_token_is_blocked() {
        let session = TestFixtures::session();
        let context = CsrfRequestContext {
            session: Some(&session),
            ..Default::default()
        };
        assert!(DoubleSubmitCookieGuard.should_block(&context));
    }

    #[test]
    fn test_wrong_token_is_blocked() {
        let session = TestFixtures::session();
        let context = CsrfRequestContext {
            session: Some(&session),
            header_token: Some("not-the-token"),
            ..Default::default()
        };
        assert!(DoubleSubmitCookieGuard.should_block(&context));
    }

    #[test]
    fn test_anonymous_request_is_never_blocked() {
        let without_token = CsrfRequestContext::default();
        assert!(!DoubleSubmitCookieGuard.should_block(&without_token));

        let with_token = CsrfRequestContext {
            header_token: Some("anything"),
            ..Default::default()
        };
        assert!(!DoubleSubmitCookieGuard.should_block(&with_token));
    }
}
