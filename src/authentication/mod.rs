//! Request authentication: per-route policy, the decision pipeline and the
//! factory that wires both from settings.

pub mod factory;
pub mod pipeline;
pub mod policy;

pub use factory::{AuthenticationServiceFactory, GatewayServices};
pub use pipeline::{
    AuthDecision, AuthOutcome, AuthenticationPipeline, LogoutOutcome, RejectReason,
};
pub use policy::{
    ResponseHeaderRule, RevocationFailurePolicy, SecurityPolicy, REMOVE_HEADER_MARKER,
};
