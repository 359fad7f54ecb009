use std::sync::Arc;
use std::time::Duration;

use actix_web::cookie::Cookie;
use actix_web::HttpRequest;
use log::{debug, error, info, warn};

use super::policy::{RevocationFailurePolicy, SecurityPolicy};
use crate::clock::Clock;
use crate::csrf::{CsrfGuard, CsrfRequestContext};
use crate::models::{SessionPayload, UserModel};
use crate::revocation::{RevocationError, RevocationStore};
use crate::session::{derive_session, CookieFactory, Session};
use crate::utils::crypto::{generate_csrf_token, generate_session_id};

/// Why a request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The route requires a session and none survived
    Unauthenticated,
    /// A CSRF guard flagged the request
    CsrfBlocked,
}

/// Trust decision for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Anonymous,
    Authenticated(Session),
    Rejected(RejectReason),
}

impl AuthOutcome {
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::Authenticated(session) => Some(session),
            Self::Anonymous | Self::Rejected(_) => None,
        }
    }

    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

/// Outcome plus the cookies to set on the response
#[derive(Debug)]
pub struct AuthDecision {
    pub outcome: AuthOutcome,
    pub cookies: Vec<Cookie<'static>>,
}

impl AuthDecision {
    fn without_cookies(outcome: AuthOutcome) -> Self {
        Self {
            outcome,
            cookies: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub enum LogoutOutcome {
    /// The logout request failed its CSRF check; nothing was revoked
    Rejected,
    LoggedOut {
        /// Removal cookies for the session and CSRF cookies
        cookies: Vec<Cookie<'static>>,
        /// Whether a live session was written to the revocation store
        revoked: bool,
    },
}

/// Per-request authentication: decode, derive, revocation check, access
/// policy, CSRF check and renewal, in that order.
#[derive(Clone)]
pub struct AuthenticationPipeline {
    cookies: CookieFactory,
    clock: Arc<dyn Clock>,
    revocation: Arc<dyn RevocationStore>,
    revocation_timeout: Duration,
    failure_policy: RevocationFailurePolicy,
    logout_guard: Arc<dyn CsrfGuard>,
}

impl AuthenticationPipeline {
    #[must_use]
    pub fn new(
        cookies: CookieFactory,
        clock: Arc<dyn Clock>,
        revocation: Arc<dyn RevocationStore>,
        logout_guard: Arc<dyn CsrfGuard>,
    ) -> Self {
        Self {
            cookies,
            clock,
            revocation,
            revocation_timeout: Duration::from_millis(250),
            failure_policy: RevocationFailurePolicy::default(),
            logout_guard,
        }
    }

    #[must_use]
    pub fn with_revocation_timeout(mut self, timeout: Duration) -> Self {
        self.revocation_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_failure_policy(mut self, policy: RevocationFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    #[must_use]
    pub fn cookie_factory(&self) -> &CookieFactory {
        &self.cookies
    }

    #[must_use]
    pub fn revocation_store(&self) -> &Arc<dyn RevocationStore> {
        &self.revocation
    }

    /// Decide how to treat `req` under `policy`
    pub async fn authenticate(&self, req: &HttpRequest, policy: &SecurityPolicy) -> AuthDecision {
        self.authenticate_with_body(req, &[], policy).await
    }

    /// Like [`Self::authenticate`], also accepting the CSRF token from a
    /// form-encoded `body`
    pub async fn authenticate_with_body(
        &self,
        req: &HttpRequest,
        body: &[u8],
        policy: &SecurityPolicy,
    ) -> AuthDecision {
        let now = self.clock.now();
        let session = self.current_session(req, now).await;

        let Some(session) = session else {
            if policy.allow_anonymous {
                return AuthDecision::without_cookies(AuthOutcome::Anonymous);
            }
            debug!("Rejecting anonymous request to {}", req.path());
            return AuthDecision::without_cookies(AuthOutcome::Rejected(
                RejectReason::Unauthenticated,
            ));
        };

        if !policy.is_safe_method(req.method()) {
            let context =
                CsrfRequestContext::from_request(req, Some(&session)).with_form_body(req, body);
            if policy.csrf_guard.should_block(&context) {
                info!(
                    "{} rejected {} {} for session {}",
                    policy.csrf_guard.strategy(),
                    req.method(),
                    req.path(),
                    session.id()
                );
                return AuthDecision::without_cookies(AuthOutcome::Rejected(
                    RejectReason::CsrfBlocked,
                ));
            }
        }

        if policy.should_renew(session.remaining_seconds()) {
            return self.renew(session, policy, now);
        }

        AuthDecision::without_cookies(AuthOutcome::Authenticated(session))
    }

    /// Stages 1 to 3: a session that decodes, has lifetime left and is not revoked
    async fn current_session(&self, req: &HttpRequest, now: i64) -> Option<Session> {
        let payload = match self.cookies.read_session_payload(req) {
            Ok(payload) => payload,
            Err(e) => {
                debug!("Ignoring unreadable session cookie: {e}");
                None
            }
        };

        let session = derive_session(payload, now)?;
        self.check_revocation(session).await
    }

    async fn check_revocation(&self, session: Session) -> Option<Session> {
        let lookup = tokio::time::timeout(
            self.revocation_timeout,
            self.revocation.is_invalidated(session.id()),
        )
        .await
        .unwrap_or(Err(RevocationError::Timeout(self.revocation_timeout)));

        match lookup {
            Ok(false) => Some(session),
            Ok(true) => {
                debug!("Session {} has been revoked", session.id());
                None
            }
            Err(e) => match self.failure_policy {
                RevocationFailurePolicy::FailClosed => {
                    error!(
                        "Revocation lookup for session {} failed ({e}), {}: treating as anonymous",
                        session.id(),
                        self.failure_policy
                    );
                    None
                }
                RevocationFailurePolicy::FailOpen => {
                    error!(
                        "Revocation lookup for session {} failed ({e}), {}: keeping session",
                        session.id(),
                        self.failure_policy
                    );
                    Some(session)
                }
            },
        }
    }

    fn renew(&self, session: Session, policy: &SecurityPolicy, now: i64) -> AuthDecision {
        let duration = policy.session_duration_secs();
        let payload = session.renewed_payload(now.saturating_add(duration));

        let session_cookie = match self.cookies.create_session_cookie(&payload, duration) {
            Ok(cookie) => cookie,
            Err(e) => {
                error!("Failed to renew session {}: {e}", session.id());
                return AuthDecision::without_cookies(AuthOutcome::Authenticated(session));
            }
        };
        let csrf_cookie = self.cookies.create_csrf_cookie(&payload.csrf_token, duration);
        debug!(
            "Renewed session {} with {}s remaining",
            session.id(),
            session.remaining_seconds()
        );

        let renewed = derive_session(Some(payload), now).unwrap_or(session);
        AuthDecision {
            outcome: AuthOutcome::Authenticated(renewed),
            cookies: vec![session_cookie, csrf_cookie],
        }
    }

    /// Revoke the caller's session and clear its cookies.
    ///
    /// A session-bearing request must pass the logout CSRF guard; a rejected
    /// logout leaves the session untouched. Callers without a live session
    /// just get their cookies cleared.
    pub async fn logout(&self, req: &HttpRequest) -> LogoutOutcome {
        self.logout_with_body(req, &[]).await
    }

    /// [`Self::logout`] for a request whose form-encoded `body` may carry the CSRF token
    pub async fn logout_with_body(&self, req: &HttpRequest, body: &[u8]) -> LogoutOutcome {
        let now = self.clock.now();
        let cookies = self.cookies.expired_session_cookies();

        let Some(session) = self.current_session(req, now).await else {
            return LogoutOutcome::LoggedOut {
                cookies,
                revoked: false,
            };
        };

        let context =
            CsrfRequestContext::from_request(req, Some(&session)).with_form_body(req, body);
        if self.logout_guard.should_block(&context) {
            info!(
                "{} rejected logout for session {}",
                self.logout_guard.strategy(),
                session.id()
            );
            return LogoutOutcome::Rejected;
        }

        let ttl = u64::try_from(session.remaining_seconds()).unwrap_or_default();
        let revoked = match tokio::time::timeout(
            self.revocation_timeout,
            self.revocation.invalidate(session.id(), ttl),
        )
        .await
        .unwrap_or(Err(RevocationError::Timeout(self.revocation_timeout)))
        {
            Ok(()) => {
                info!("Session {} logged out", session.id());
                true
            }
            Err(e) => {
                error!(
                    "Failed to revoke session {}: {e}; its cookie stays valid until expiry",
                    session.id()
                );
                false
            }
        };

        LogoutOutcome::LoggedOut { cookies, revoked }
    }

    /// Mint a session for a freshly authenticated user.
    ///
    /// Returns the runtime session and the session and CSRF cookies to set.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be encrypted
    pub fn issue_session(
        &self,
        provider: &str,
        user: UserModel,
        policy: &SecurityPolicy,
    ) -> anyhow::Result<(Session, Vec<Cookie<'static>>)> {
        let now = self.clock.now();
        let duration = policy.session_duration_secs();
        let payload = SessionPayload {
            id: generate_session_id(),
            provider: provider.to_owned(),
            expires_at: now.saturating_add(duration),
            user,
            csrf_token: generate_csrf_token(),
        };

        let cookies = vec![
            self.cookies.create_session_cookie(&payload, duration)?,
            self.cookies.create_csrf_cookie(&payload.csrf_token, duration),
        ];

        let session = derive_session(Some(payload), now)
            .ok_or_else(|| anyhow::anyhow!("session duration must be positive"))?;
        if session.remaining_seconds() < 60 {
            warn!(
                "Issued session {} lives only {}s",
                session.id(),
                session.remaining_seconds()
            );
        }
        debug!("Issued session {} for provider {provider}", session.id());

        Ok((session, cookies))
    }
}
