use std::sync::Arc;

use axum::extract::FromRef;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use common_auth::{AuthorizationGate, EdgeCodec, JwtCodec, SessionCookieStore};
use reqwest::Client;

use crate::authn::AuthenticationService;
use crate::config::AuthConfig;
use crate::handlers::{
    admin_login, customer_login, customer_signup, debug_session, health, identity_callback,
    logout, metrics_endpoint, refresh, refresh_method_not_allowed,
};
use crate::identity::IdentityProviders;
use crate::metrics::AuthMetrics;
use crate::middleware::gate_middleware;
use crate::proxy;
use crate::store::PrincipalStore;

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthenticationService>,
    pub gate: Arc<AuthorizationGate<EdgeCodec>>,
    pub cookies: SessionCookieStore,
    pub config: Arc<AuthConfig>,
    pub identity: Arc<IdentityProviders>,
    pub http_client: Client,
    pub metrics: Arc<AuthMetrics>,
}

impl FromRef<AppState> for Arc<AuthConfig> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Arc<AuthMetrics> {
    fn from_ref(state: &AppState) -> Self {
        state.metrics.clone()
    }
}

impl FromRef<AppState> for SessionCookieStore {
    fn from_ref(state: &AppState) -> Self {
        state.cookies
    }
}

impl AppState {
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn PrincipalStore>,
        identity: IdentityProviders,
        metrics: AuthMetrics,
        http_client: Client,
    ) -> Self {
        let jwt = Arc::new(JwtCodec::new(config.codec.clone()));
        let auth = AuthenticationService::new(store, jwt)
            .with_renewal_lookup_timeout(config.renewal_lookup_timeout)
            .with_refresh_rotation(config.rotate_refresh_tokens);
        let gate = AuthorizationGate::new(EdgeCodec::new(config.codec.clone()));

        Self {
            auth: Arc::new(auth),
            gate: Arc::new(gate),
            cookies: SessionCookieStore::new(config.cookies),
            config: Arc::new(config),
            identity: Arc::new(identity),
            http_client,
            metrics: Arc::new(metrics),
        }
    }
}

/// Full router: auth endpoints, then the gate in front of the upstream proxy.
pub fn build_router(state: AppState) -> Router {
    let downstream = Router::new().fallback(proxy::forward);
    build_router_with(state, downstream)
}

/// Same as [`build_router`] but with `downstream` behind the gate instead of
/// the proxy.
pub fn build_router_with(state: AppState, downstream: Router<AppState>) -> Router {
    let gated = downstream
        .layer(middleware::from_fn_with_state(state.clone(), gate_middleware))
        .with_state(state.clone());

    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route(
            "/api/auth/refresh",
            post(refresh).get(refresh_method_not_allowed),
        )
        .route("/api/auth/admin/login", post(admin_login))
        .route("/api/auth/login", post(customer_login))
        .route("/api/auth/signup", post(customer_signup))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/debug", get(debug_session))
        .route("/auth/:provider/callback", get(identity_callback))
        .with_state(state)
        .fallback_service(gated)
}
