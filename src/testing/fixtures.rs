//! Test fixtures providing pre-built test objects

use std::sync::Arc;

use url::Url;

use super::constants::{
    TEST_BASE_URL, TEST_CSRF_TOKEN, TEST_EMAIL, TEST_ENCRYPTION_KEY, TEST_NOW, TEST_PROVIDER,
    TEST_RETURN_HOST, TEST_SESSION_ID, TEST_USER_ID,
};
use crate::authentication::{AuthenticationServiceFactory, GatewayServices};
use crate::clock::Clock;
use crate::models::{SessionPayload, UserModel};
use crate::revocation::{FilterSizing, RevocationLedger, RevocationStore};
use crate::session::{derive_session, CookieFactory, Session};
use crate::settings::{
    ApplicationSettings, LogoutSettings, RevocationSettings, RouteSettings,
    SecurityProfileSettings, SessionSettings, TollgateSettings,
};
use crate::utils::crypto::{encode_key, CookieCodec};

/// Central fixture provider for all test data
pub struct TestFixtures;

impl TestFixtures {
    #[must_use]
    pub fn codec() -> CookieCodec {
        CookieCodec::new(TEST_ENCRYPTION_KEY)
    }

    #[must_use]
    pub fn cookie_factory(secure: bool) -> CookieFactory {
        CookieFactory::new(Self::codec(), secure)
    }

    #[must_use]
    pub fn base_url() -> Url {
        Url::parse(TEST_BASE_URL).unwrap_or_else(|e| panic!("invalid test base URL: {e}"))
    }

    #[must_use]
    pub fn user() -> UserModel {
        UserModel::new(TEST_USER_ID).with_mapping("email", TEST_EMAIL)
    }

    /// Payload with fixed id, user and CSRF token
    #[must_use]
    pub fn session_payload(expires_at: i64) -> SessionPayload {
        SessionPayload {
            id: TEST_SESSION_ID.to_string(),
            provider: TEST_PROVIDER.to_string(),
            expires_at,
            user: Self::user(),
            csrf_token: TEST_CSRF_TOKEN.to_string(),
        }
    }

    /// A session with an hour left at [`TEST_NOW`]
    #[must_use]
    pub fn session() -> Session {
        derive_session(Some(Self::session_payload(TEST_NOW + 3600)), TEST_NOW)
            .unwrap_or_else(|| panic!("fixture session should be live"))
    }

    /// Valid settings with two routes under `/api`, an in-memory revocation
    /// store and the test encryption key
    #[must_use]
    pub fn settings() -> TollgateSettings {
        TollgateSettings {
            application: ApplicationSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
                base_url: TEST_BASE_URL.to_string(),
            },
            session: SessionSettings {
                secret: encode_key(TEST_ENCRYPTION_KEY),
                ..Default::default()
            },
            revocation: RevocationSettings {
                backend: "memory".to_string(),
                ..Default::default()
            },
            logout: LogoutSettings {
                redirect_url: "/signed-out".to_string(),
                allowed_return_hosts: vec![TEST_RETURN_HOST.to_string()],
                ..Default::default()
            },
            security_profiles: vec![
                SecurityProfileSettings::new("api", "double-submit-cookie"),
                SecurityProfileSettings::new("public", "none"),
            ],
            routes: vec![
                RouteSettings {
                    name: "api".to_string(),
                    path_prefix: "/api".to_string(),
                    upstream_url: "http://backend.internal:8000".to_string(),
                    security_profile: "api".to_string(),
                    allow_anonymous: false,
                },
                RouteSettings {
                    name: "public-api".to_string(),
                    path_prefix: "/api/public".to_string(),
                    upstream_url: "http://backend.internal:8000".to_string(),
                    security_profile: "public".to_string(),
                    allow_anonymous: true,
                },
            ],
            ..Default::default()
        }
    }

    /// In-memory revocation ledger driven by `clock`
    #[must_use]
    pub fn revocation_ledger(clock: Arc<dyn Clock>) -> RevocationLedger {
        RevocationLedger::in_memory(clock, FilterSizing::default())
            .unwrap_or_else(|e| panic!("in-memory ledger: {e}"))
    }

    /// Services built from `settings` around `clock` and `revocation`
    #[must_use]
    pub fn services_with(
        settings: &TollgateSettings,
        clock: Arc<dyn Clock>,
        revocation: Arc<dyn RevocationStore>,
    ) -> GatewayServices {
        AuthenticationServiceFactory::create_with(settings, clock, revocation)
            .unwrap_or_else(|e| panic!("test services: {e:#}"))
    }

    /// Services built from [`Self::settings`] with an in-memory ledger
    #[must_use]
    pub fn services(clock: Arc<dyn Clock>) -> GatewayServices {
        let ledger = Self::revocation_ledger(Arc::clone(&clock));
        Self::services_with(&Self::settings(), clock, Arc::new(ledger))
    }
}
