//! Sessions, token sets, and identity mapping for the waypoint login gateway.
//!
//! This crate provides:
//! - Session records and the [`SessionStore`] persistence seam
//! - Validated token sets from the provider's token endpoint
//! - The claims mapper from raw provider claims to a [`UserProfile`]
//! - Error types for the authentication flow
//!
//! # Session Lifecycle
//!
//! A [`SessionRecord`] is created when a login is initiated, with a one-time
//! `state` binding the browser's attempt to its callback. A successful
//! callback attaches the authenticated identity exactly once; after the
//! record's expiry passes it is treated as absent on read.
//!
//! # Example
//!
//! ```
//! use waypoint_platform_access::{
//!     SessionId, SessionRecord, TokenSet, map_profile, ProviderClaims,
//! };
//! use chrono::Duration;
//!
//! // Created at login initiation...
//! let mut record = SessionRecord::new(
//!     SessionId::generate(),
//!     "state-abc".to_string(),
//!     Duration::minutes(60),
//! );
//! assert!(record.matches_state("state-abc"));
//! assert!(!record.is_expired());
//!
//! // ...and bound to an identity exactly once by a successful callback.
//! let claims: ProviderClaims = serde_json::from_value(serde_json::json!({
//!     "sub": "user-123",
//!     "name": "Test User",
//! }))
//! .unwrap();
//! let profile = map_profile(&claims).unwrap();
//! record
//!     .attach_identity(
//!         profile.uid.clone(),
//!         profile,
//!         "cis2",
//!         TokenSet::new("access-token"),
//!     )
//!     .unwrap();
//! assert_eq!(record.user_id(), Some("user-123"));
//! ```

pub mod claims;
pub mod error;
pub mod session;
pub mod store;
pub mod user;

// Re-export main types at crate root
pub use claims::{ProviderClaims, map_profile};
pub use error::{SchemaError, SessionError, StoreError};
pub use session::{SessionId, SessionRecord, TokenSet};
pub use store::{MemorySessionStore, SessionStore};
pub use user::{OrgMembership, RbacRole, UserOrg, UserProfile};
