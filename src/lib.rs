#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the tollgate application
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod authentication;
pub mod clock;
pub mod csrf;
pub mod handlers;
pub mod models;
pub mod revocation;
pub mod routes;
pub mod session;
pub mod settings;
pub mod utils;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use authentication::{
    AuthOutcome, AuthenticationPipeline, AuthenticationServiceFactory, GatewayServices,
    SecurityPolicy,
};
pub use handlers::{health, logout, proxy_upstream, session_info};
pub use session::Session;
pub use settings::TollgateSettings;
