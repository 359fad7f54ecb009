//! Service factory wiring the authentication pipeline from settings

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use super::{AuthenticationPipeline, RevocationFailurePolicy, SecurityPolicy};
use crate::clock::{Clock, SystemClock};
use crate::csrf::{CsrfRegistry, NoCsrfGuard};
use crate::revocation::{FilterSizing, RevocationLedger, RevocationStore};
use crate::routes::RouteTable;
use crate::session::CookieFactory;
use crate::settings::{resolve_encryption_key, TollgateSettings};
use crate::utils::crypto::CookieCodec;

/// Everything the HTTP layer needs, built once at startup
#[derive(Clone)]
pub struct GatewayServices {
    pub pipeline: AuthenticationPipeline,
    pub routes: Arc<RouteTable>,
    pub revocation: Arc<dyn RevocationStore>,
    /// Policy of the gateway's own `/auth/session` endpoint
    pub session_policy: SecurityPolicy,
}

/// Builds [`GatewayServices`] from validated settings
pub struct AuthenticationServiceFactory;

impl AuthenticationServiceFactory {
    /// Build every service with the system clock and the configured revocation backend
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid, the key cannot be
    /// resolved or the revocation store cannot be opened
    pub fn create(settings: &TollgateSettings) -> anyhow::Result<GatewayServices> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let revocation = Self::open_revocation_store(settings, Arc::clone(&clock))?;
        Self::create_with(settings, clock, revocation)
    }

    /// Build every service around an existing clock and revocation store
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid or the key cannot be resolved
    pub fn create_with(
        settings: &TollgateSettings,
        clock: Arc<dyn Clock>,
        revocation: Arc<dyn RevocationStore>,
    ) -> anyhow::Result<GatewayServices> {
        log::info!("🏭 Starting authentication service factory...");
        settings.validate()?;

        let base_url = settings.base_url()?;
        let key = resolve_encryption_key(&settings.session)?;
        let cookies = CookieFactory::new(CookieCodec::new(&key), base_url.scheme() == "https");
        log::info!("🔐 Cookie codec initialised (dir/A256GCM)");

        let registry = CsrfRegistry::new(&base_url);
        let logout_guard = registry.resolve(&settings.logout.csrf_protection)?;
        log::info!(
            "🛡️ Logout protected by {}",
            settings.logout.csrf_protection
        );

        let failure_policy: RevocationFailurePolicy = settings.revocation.failure_policy.parse()?;
        let pipeline =
            AuthenticationPipeline::new(cookies, clock, Arc::clone(&revocation), logout_guard)
                .with_revocation_timeout(Duration::from_millis(
                    settings.revocation.lookup_timeout_ms,
                ))
                .with_failure_policy(failure_policy);
        log::info!(
            "✅ Authentication pipeline configured (revocation timeout {}ms, {failure_policy})",
            settings.revocation.lookup_timeout_ms
        );

        log::info!("🧭 Registering {} routes", settings.routes.len());
        let routes = RouteTable::from_settings(settings, &registry)?;
        if routes.is_empty() {
            log::warn!("⚠️  No routes configured - every proxied request will answer 404");
        }

        let session_policy =
            SecurityPolicy::new(Arc::new(NoCsrfGuard), &settings.session).allow_anonymous(true);

        log::info!("🏭 Authentication service factory completed successfully");
        Ok(GatewayServices {
            pipeline,
            routes: Arc::new(routes),
            revocation,
            session_policy,
        })
    }

    /// Open the revocation backend named in `[revocation]`
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unknown or cannot be opened
    pub fn open_revocation_store(
        settings: &TollgateSettings,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Arc<dyn RevocationStore>> {
        let sizing = FilterSizing {
            expected_insertions: settings.revocation.expected_insertions,
            false_positive_rate: settings.revocation.false_positive_rate,
        };

        let ledger = match settings.revocation.backend.as_str() {
            "persistent" => {
                let path = Path::new(&settings.revocation.path);
                RevocationLedger::open(path, clock, sizing).with_context(|| {
                    format!("Failed to open revocation ledger at {}", path.display())
                })?
            }
            "memory" => {
                log::warn!("⚠️  In-memory revocation store: logouts are forgotten on restart");
                RevocationLedger::in_memory(clock, sizing)
                    .context("Failed to create in-memory revocation store")?
            }
            other => anyhow::bail!("Unknown revocation backend '{other}'"),
        };

        Ok(Arc::new(ledger))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::settings::ConfigurationError;
    use crate::testing::TestFixtures;

    #[tokio::test]
    async fn test_create_from_test_settings() {
        let settings = TestFixtures::settings();
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::starting_now());
        let store = AuthenticationServiceFactory::open_revocation_store(&settings, clock.clone())
            .unwrap();

        let services = AuthenticationServiceFactory::create_with(&settings, clock, store).unwrap();
        assert_eq!(services.routes.len(), 2);
        assert!(services.pipeline.cookie_factory().is_secure());
        assert!(services.session_policy.allow_anonymous);
    }

    #[tokio::test]
    async fn test_unknown_logout_strategy_is_fatal() {
        let mut settings = TestFixtures::settings();
        settings.logout.csrf_protection = "samesite".to_string();
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::starting_now());
        let store = AuthenticationServiceFactory::open_revocation_store(&settings, clock.clone())
            .unwrap();

        let err = AuthenticationServiceFactory::create_with(&settings, clock, store)
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<ConfigurationError>(),
            Some(ConfigurationError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_persistent_backend_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = TestFixtures::settings();
        settings.revocation.backend = "persistent".to_string();
        settings.revocation.path = dir
            .path()
            .join("data")
            .join("revocation.redb")
            .to_string_lossy()
            .into_owned();

        let store =
            AuthenticationServiceFactory::open_revocation_store(&settings, Arc::new(SystemClock))
                .unwrap();
        assert!(dir.path().join("data").join("revocation.redb").exists());
        store.close().await.unwrap();
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let mut settings = TestFixtures::settings();
        settings.revocation.backend = "redis".to_string();
        assert!(AuthenticationServiceFactory::open_revocation_store(
            &settings,
            Arc::new(SystemClock)
        )
        .is_err());
    }
}
