//! waypoint login gateway.
//!
//! Authenticates browser users against an external OIDC identity
//! provider, persists session records across the redirect round-trip,
//! and maps provider claims into internal profiles for role-based
//! access downstream.

pub mod app;
pub mod auth;
pub mod config;

pub use app::build_router;
pub use config::{CallbackVariant, OidcSettings, ServerConfig, SessionConfig};
