//! HTTP application assembly.

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::auth::{self, AppState};
use crate::config::CallbackVariant;

/// Builds the HTTP router for the configured callback variant.
///
/// The callback route is mounted at `/auth/callback` (cookie-PKCE) or
/// `/api/auth/callback` (store-backed); everything else is shared.
pub fn build_router(state: Arc<AppState>) -> Router {
    let router = Router::new()
        .route("/auth/login", get(auth::login))
        .route("/auth/logout", get(auth::logout))
        .route("/api/jwks", get(auth::jwks))
        .route("/api/user-info", get(auth::user_info));

    let router = match state.variant {
        CallbackVariant::CookiePkce => {
            router.route("/auth/callback", get(auth::pkce_callback))
        }
        CallbackVariant::StoreBacked => {
            router.route("/api/auth/callback", get(auth::store_callback))
        }
    };

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
