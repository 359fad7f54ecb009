//! Stateless session model
//!
//! A [`Session`] is derived fresh on every request from the decrypted cookie
//! payload and the injected clock. Nothing here is persisted.
//!
//! - [`cookie`] - Cookie names, attributes and the encrypted cookie factory

pub mod cookie;

pub use cookie::{
    filter_gateway_cookies, CookieFactory, CookieOptions, CSRF_COOKIE_NAME,
    LOGIN_STATE_COOKIE_NAME, SESSION_COOKIE_NAME,
};

use crate::models::{SessionPayload, UserModel};

/// Read-only view of an authenticated session for the current request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: String,
    provider: String,
    user: UserModel,
    expires_at: i64,
    remaining_seconds: i64,
    csrf_token: String,
}

impl Session {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    #[must_use]
    pub fn user(&self) -> &UserModel {
        &self.user
    }

    /// Absolute expiry in epoch seconds
    #[must_use]
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// Seconds left at the time the session was derived; always positive
    #[must_use]
    pub fn remaining_seconds(&self) -> i64 {
        self.remaining_seconds
    }

    #[must_use]
    pub fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    /// Payload for a renewed cookie: same identity, id and CSRF token, new expiry
    #[must_use]
    pub fn renewed_payload(&self, expires_at: i64) -> SessionPayload {
        SessionPayload {
            id: self.id.clone(),
            provider: self.provider.clone(),
            expires_at,
            user: self.user.clone(),
            csrf_token: self.csrf_token.clone(),
        }
    }
}

/// Derive the runtime session from a decoded payload.
///
/// Returns `None` for a missing payload or when no lifetime remains at `now`.
#[must_use]
pub fn derive_session(payload: Option<SessionPayload>, now: i64) -> Option<Session> {
    let payload = payload?;
    let remaining_seconds = payload.expires_at.saturating_sub(now);
    if remaining_seconds <= 0 {
        return None;
    }

    Some(Session {
        id: payload.id,
        provider: payload.provider,
        user: payload.user,
        expires_at: payload.expires_at,
        remaining_seconds,
        csrf_token: payload.csrf_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestFixtures;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_absent_payload_yields_no_session() {
        assert!(derive_session(None, NOW).is_none());
    }

    #[test]
    fn test_expiry_boundary() {
        let expired_now = TestFixtures::session_payload(NOW);
        assert!(derive_session(Some(expired_now), NOW).is_none());

        let expired_past = TestFixtures::session_payload(NOW - 10);
        assert!(derive_session(Some(expired_past), NOW).is_none());

        let one_second_left = TestFixtures::session_payload(NOW + 1);
        let session = derive_session(Some(one_second_left), NOW).unwrap();
        assert_eq!(session.remaining_seconds(), 1);
        assert_eq!(session.expires_at(), NOW + 1);
    }

    #[test]
    fn test_session_carries_payload_fields() {
        let payload = TestFixtures::session_payload(NOW + 600);
        let session = derive_session(Some(payload.clone()), NOW).unwrap();

        assert_eq!(session.id(), payload.id);
        assert_eq!(session.provider(), payload.provider);
        assert_eq!(session.user(), &payload.user);
        assert_eq!(session.csrf_token(), payload.csrf_token);
        assert_eq!(session.remaining_seconds(), 600);
    }

    #[test]
    fn test_renewed_payload_keeps_identity() {
        let payload = TestFixtures::session_payload(NOW + 60);
        let session = derive_session(Some(payload.clone()), NOW).unwrap();
        let renewed = session.renewed_payload(NOW + 3600);

        assert_eq!(renewed.expires_at, NOW + 3600);
        assert_eq!(renewed.id, payload.id);
        assert_eq!(renewed.user, payload.user);
        assert_eq!(renewed.csrf_token, payload.csrf_token);
    }
}
