use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::utils::crypto::{decode_key, encode_key, generate_key, ENCRYPTION_KEY_SIZE};

/// Fatal problems detected while turning settings into runtime objects
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("unknown CSRF protection strategy '{0}'")]
    UnknownCsrfStrategy(String),
    #[error("route '{route}' references unknown security profile '{profile}'")]
    UnknownSecurityProfile { route: String, profile: String },
    #[error("invalid base URL '{0}': must be an absolute http or https URL")]
    InvalidBaseUrl(String),
    #[error("route '{route}' has an invalid upstream URL '{url}'")]
    InvalidUpstreamUrl { route: String, url: String },
    #[error("invalid session encryption key: {0}")]
    InvalidKey(String),
    #[error("invalid configuration:\n  - {}", .0.join("\n  - "))]
    Invalid(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TollgateSettings {
    pub application: ApplicationSettings,
    pub session: SessionSettings,
    pub revocation: RevocationSettings,
    pub logout: LogoutSettings,
    pub logging: LoggingSettings,
    pub security_profiles: Vec<SecurityProfileSettings>,
    pub routes: Vec<RouteSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    /// Public base URL of the gateway; decides cookie security and is the CSRF origin
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub duration_seconds: u64,
    /// Renew when fewer seconds than this remain. 0 disables renewal.
    pub renew_when_less_than_seconds: u64,
    /// Base64 encoded 32-byte key
    pub secret: String,
    /// Read the key from here, or generate and persist one if the file is missing
    pub key_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RevocationSettings {
    /// `persistent` or `memory`
    pub backend: String,
    pub path: String,
    pub cleanup_interval_seconds: u64,
    pub lookup_timeout_ms: u64,
    /// `fail-closed` or `fail-open`
    pub failure_policy: String,
    pub expected_insertions: usize,
    pub false_positive_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogoutSettings {
    pub csrf_protection: String,
    pub redirect_url: String,
    pub allowed_return_hosts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityProfileSettings {
    pub name: String,
    #[serde(default = "default_csrf_protection")]
    pub csrf_protection: String,
    #[serde(default = "default_csrf_safe_methods")]
    pub csrf_safe_methods: Vec<String>,
    /// Methods the routes of this profile accept; others get 405
    #[serde(default = "default_allowed_methods")]
    pub allowed_methods: Vec<String>,
    /// Headers set on every response, or removed when the value is `<<remove>>`
    #[serde(default)]
    pub response_headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteSettings {
    pub name: String,
    pub path_prefix: String,
    pub upstream_url: String,
    pub security_profile: String,
    #[serde(default)]
    pub allow_anonymous: bool,
}

fn default_csrf_protection() -> String {
    "double-submit-cookie".to_string()
}

fn default_csrf_safe_methods() -> Vec<String> {
    ["GET", "HEAD", "OPTIONS"].map(String::from).to_vec()
}

fn default_allowed_methods() -> Vec<String> {
    ["GET", "HEAD", "OPTIONS", "POST", "PUT", "PATCH", "DELETE"]
        .map(String::from)
        .to_vec()
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            base_url: "http://localhost:8080".to_string(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            duration_seconds: 3600,
            renew_when_less_than_seconds: 300,
            secret: String::new(), // Generated if neither secret nor key_file is set
            key_file: None,
        }
    }
}

impl Default for RevocationSettings {
    fn default() -> Self {
        Self {
            backend: "persistent".to_string(),
            path: "revocation.redb".to_string(),
            cleanup_interval_seconds: 300,
            lookup_timeout_ms: 250,
            failure_policy: "fail-closed".to_string(),
            expected_insertions: 100_000,
            false_positive_rate: 0.001,
        }
    }
}

impl Default for LogoutSettings {
    fn default() -> Self {
        Self {
            csrf_protection: "samesite-strict-cookie".to_string(),
            redirect_url: "/".to_string(),
            allowed_return_hosts: Vec::new(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl SecurityProfileSettings {
    #[must_use]
    pub fn new(name: &str, csrf_protection: &str) -> Self {
        Self {
            name: name.to_string(),
            csrf_protection: csrf_protection.to_string(),
            csrf_safe_methods: default_csrf_safe_methods(),
            allowed_methods: default_allowed_methods(),
            response_headers: BTreeMap::new(),
        }
    }
}

impl TollgateSettings {
    /// Load settings from configuration files and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Logger initialization fails
    /// - A settings file cannot be read or parsed
    pub fn load() -> anyhow::Result<Self> {
        Self::initialize_environment()?;

        let mut settings = Self::load_base_settings()?;
        Self::apply_env_overrides(&mut settings);

        Ok(settings)
    }

    /// Load `.env` and initialize logging
    fn initialize_environment() -> anyhow::Result<()> {
        Self::load_env_file();
        env_logger::try_init()?;
        Ok(())
    }

    /// Settings are loaded with the following priority (highest to lowest):
    /// 1. Environment variables (applied separately after loading base settings)
    /// 2. Settings.toml in `TOLLGATE_SECRETS_DIR` (if specified and exists)
    /// 3. Settings.toml in current directory (if exists)
    /// 4. Default settings
    fn load_base_settings() -> anyhow::Result<Self> {
        let mut settings = Self::default();

        let default_config_path = Path::new("Settings.toml");
        if default_config_path.exists() {
            settings = Self::from_file(default_config_path)?;
            log::info!(
                "✓ Loaded base settings from {}",
                default_config_path.display()
            );
        }

        if let Ok(secrets_dir) = std::env::var("TOLLGATE_SECRETS_DIR") {
            let secrets_path = Path::new(&secrets_dir).join("Settings.toml");
            if secrets_path.exists() {
                settings = Self::from_file(&secrets_path)?;
                log::info!("✓ Overriding settings from {}", secrets_path.display());
            } else {
                log::info!(
                    "ℹ TOLLGATE_SECRETS_DIR set but no Settings.toml found at: {}",
                    secrets_path.display()
                );
            }
        }

        Ok(settings)
    }

    /// Parse a TOML settings file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid settings TOML
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context as _;

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        basic_toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn apply_env_overrides(settings: &mut Self) {
        Self::apply_application_env_overrides(&mut settings.application);
        Self::apply_session_env_overrides(&mut settings.session);
        Self::apply_revocation_env_overrides(&mut settings.revocation);
        Self::apply_logging_env_overrides(&mut settings.logging);
    }

    fn apply_application_env_overrides(app_settings: &mut ApplicationSettings) {
        if let Ok(host) = std::env::var("HOST") {
            app_settings.host = host;
        }
        if let Ok(port_str) = std::env::var("PORT") {
            if let Ok(port) = port_str.parse::<u16>() {
                app_settings.port = port;
            }
        }
        if let Ok(base_url) = std::env::var("BASE_URL") {
            app_settings.base_url = base_url;
        }
    }

    pub fn apply_session_env_overrides(session_settings: &mut SessionSettings) {
        Self::apply_numeric_env_override(
            "SESSION_DURATION_SECONDS",
            &mut session_settings.duration_seconds,
        );
        Self::apply_numeric_env_override(
            "SESSION_RENEW_WHEN_LESS_THAN_SECONDS",
            &mut session_settings.renew_when_less_than_seconds,
        );
        if let Ok(secret) = std::env::var("SESSION_SECRET") {
            if !secret.is_empty() {
                session_settings.secret = secret;
            }
        }
        if let Ok(key_file) = std::env::var("SESSION_KEY_FILE") {
            if !key_file.is_empty() {
                session_settings.key_file = Some(key_file);
            }
        }
    }

    pub fn apply_revocation_env_overrides(revocation_settings: &mut RevocationSettings) {
        if let Ok(backend) = std::env::var("REVOCATION_BACKEND") {
            revocation_settings.backend = backend;
        }
        if let Ok(path) = std::env::var("REVOCATION_PATH") {
            revocation_settings.path = path;
        }
        if let Ok(policy) = std::env::var("REVOCATION_FAILURE_POLICY") {
            revocation_settings.failure_policy = policy;
        }
        Self::apply_numeric_env_override(
            "REVOCATION_TIMEOUT_MS",
            &mut revocation_settings.lookup_timeout_ms,
        );
    }

    fn apply_numeric_env_override(env_var: &str, target: &mut u64) {
        if let Ok(value_str) = std::env::var(env_var) {
            if let Ok(value) = value_str.parse::<u64>() {
                *target = value;
            }
        }
    }

    fn apply_logging_env_overrides(logging_settings: &mut LoggingSettings) {
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            logging_settings.level = log_level;
        }
    }

    /// Load environment variables from .env file
    fn load_env_file() {
        if let Ok(contents) = fs::read_to_string(".env") {
            for line in contents.lines() {
                if let Some((key, value)) = line.split_once('=') {
                    std::env::set_var(key.trim(), value.trim());
                }
            }
        }
    }

    /// Get the bind address for the server
    #[must_use]
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }

    /// Parsed public base URL
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidBaseUrl`] unless the URL is absolute
    /// http(s) with a host
    pub fn base_url(&self) -> Result<Url, ConfigurationError> {
        let invalid = || ConfigurationError::InvalidBaseUrl(self.application.base_url.clone());
        let url = Url::parse(&self.application.base_url).map_err(|_| invalid())?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(invalid());
        }
        Ok(url)
    }

    #[must_use]
    pub fn get_security_profile(&self, name: &str) -> Option<&SecurityProfileSettings> {
        self.security_profiles.iter().find(|p| p.name == name)
    }

    /// Check everything that can be checked without building runtime objects
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::Invalid`] listing every problem found
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut errors = Vec::new();

        match self.base_url() {
            Ok(url) if url.scheme() == "http" => log::warn!(
                "⚠️  Base URL {} is not https: cookies will not be marked Secure",
                self.application.base_url
            ),
            Ok(_) => {}
            Err(e) => errors.push(e.to_string()),
        }

        if self.session.duration_seconds < 60 {
            errors.push("session.duration_seconds must be at least 60".to_string());
        }
        if self.session.renew_when_less_than_seconds >= self.session.duration_seconds {
            errors.push(
                "session.renew_when_less_than_seconds must be smaller than session.duration_seconds"
                    .to_string(),
            );
        }

        if !matches!(self.revocation.backend.as_str(), "persistent" | "memory") {
            errors.push(format!(
                "revocation.backend must be 'persistent' or 'memory', got '{}'",
                self.revocation.backend
            ));
        }
        if !matches!(
            self.revocation.failure_policy.as_str(),
            "fail-closed" | "fail-open"
        ) {
            errors.push(format!(
                "revocation.failure_policy must be 'fail-closed' or 'fail-open', got '{}'",
                self.revocation.failure_policy
            ));
        }
        if !(self.revocation.false_positive_rate > 0.0 && self.revocation.false_positive_rate < 1.0)
        {
            errors.push("revocation.false_positive_rate must be between 0 and 1".to_string());
        }

        if let Err(e) = self
            .logout
            .csrf_protection
            .parse::<crate::csrf::CsrfStrategy>()
        {
            errors.push(format!("logout: {e}"));
        }

        for profile in &self.security_profiles {
            if let Err(e) = profile.csrf_protection.parse::<crate::csrf::CsrfStrategy>() {
                errors.push(format!("security profile '{}': {e}", profile.name));
            }
            for method in profile.csrf_safe_methods.iter().chain(&profile.allowed_methods) {
                if actix_web::http::Method::from_bytes(method.as_bytes()).is_err() {
                    errors.push(format!(
                        "security profile '{}': invalid HTTP method '{method}'",
                        profile.name
                    ));
                }
            }
            if profile.allowed_methods.is_empty() {
                errors.push(format!(
                    "security profile '{}': allowed_methods must not be empty",
                    profile.name
                ));
            }
            for (name, value) in &profile.response_headers {
                if let Err(e) = crate::authentication::ResponseHeaderRule::parse(name, value) {
                    errors.push(format!("security profile '{}': {e}", profile.name));
                }
            }
        }

        for route in &self.routes {
            if self.get_security_profile(&route.security_profile).is_none() {
                errors.push(
                    ConfigurationError::UnknownSecurityProfile {
                        route: route.name.clone(),
                        profile: route.security_profile.clone(),
                    }
                    .to_string(),
                );
            }
            if Url::parse(&route.upstream_url).is_err() {
                errors.push(
                    ConfigurationError::InvalidUpstreamUrl {
                        route: route.name.clone(),
                        url: route.upstream_url.clone(),
                    }
                    .to_string(),
                );
            }
            if !route.path_prefix.starts_with('/') {
                errors.push(format!(
                    "route '{}': path_prefix must start with '/'",
                    route.name
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigurationError::Invalid(errors))
        }
    }
}

/// Produce the cookie encryption key.
///
/// An explicit `secret` wins. Otherwise `key_file` is read, or created with a
/// fresh key when it does not exist. With neither, an ephemeral key is
/// generated and every restart invalidates all sessions.
///
/// # Errors
///
/// Returns [`ConfigurationError::InvalidKey`] if the configured key cannot be
/// decoded or the key file cannot be read or written
pub fn resolve_encryption_key(
    session: &SessionSettings,
) -> Result<[u8; ENCRYPTION_KEY_SIZE], ConfigurationError> {
    let invalid = |e: &dyn std::fmt::Display| ConfigurationError::InvalidKey(e.to_string());

    if !session.secret.is_empty() {
        return decode_key(&session.secret).map_err(|e| invalid(&e));
    }

    if let Some(key_file) = &session.key_file {
        let path = Path::new(key_file);
        if path.exists() {
            let encoded = fs::read_to_string(path).map_err(|e| invalid(&e))?;
            log::info!("🔑 Session key loaded from {}", path.display());
            return decode_key(&encoded).map_err(|e| invalid(&e));
        }

        let key = generate_key();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| invalid(&e))?;
        }
        fs::write(path, encode_key(&key)).map_err(|e| invalid(&e))?;
        log::info!("🔑 Generated new session key at {}", path.display());
        return Ok(key);
    }

    log::warn!("⚠️  WARNING: Using an auto-generated session key");
    log::warn!("🔒 Set SESSION_SECRET or session.key_file so sessions survive restarts");
    Ok(generate_key())
}
