//! Testing utilities shared by unit and integration tests
//!
//! - [`fixtures`] - Pre-built keys, payloads, sessions, settings and services
//! - [`requests`] - HTTP request builder for exercising guards and the pipeline
//! - [`assertions`] - Response and cookie assertions
//! - [`mock`] - Misbehaving revocation stores
//!
//! ```rust,ignore
//! use tollgate::testing::{RequestBuilder, TestFixtures};
//!
//! let factory = TestFixtures::cookie_factory(true);
//! let cookie = factory.create_session_cookie(&TestFixtures::session_payload(i64::MAX), 3600)?;
//! let req = RequestBuilder::new().uri("/api/orders").with_cookie(cookie).build();
//! ```

pub mod assertions;
pub mod fixtures;
pub mod mock;
pub mod requests;

pub use assertions::*;
pub use fixtures::TestFixtures;
pub use mock::{FailingRevocationStore, SlowRevocationStore};
pub use requests::RequestBuilder;

/// Common test constants
pub mod constants {
    /// Cookie encryption key used by every fixture
    pub const TEST_ENCRYPTION_KEY: &[u8; 32] = b"tollgate-test-key-32-bytes-long!";

    /// Fixed "now" for fixtures built without a clock
    pub const TEST_NOW: i64 = 1_700_000_000;

    pub const TEST_BASE_URL: &str = "https://gateway.example.com";

    pub const TEST_SESSION_ID: &str = "7f1d2a9e-3c4b-4e8f-9a61-0b5c2d7e8f90";

    pub const TEST_CSRF_TOKEN: &str = "q8VJ3fZp1mXr0bT7cK2wLs9YhN4dE6uA";

    pub const TEST_USER_ID: &str = "alice";

    pub const TEST_EMAIL: &str = "alice@example.com";

    pub const TEST_PROVIDER: &str = "local";

    /// Host accepted as a logout `returnUrl` target
    pub const TEST_RETURN_HOST: &str = "app.example.com";
}
