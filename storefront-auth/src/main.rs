use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderValue, Method,
};
use reqwest::Client;
use sqlx::PgPool;
use storefront_auth::config::load_auth_config;
use storefront_auth::identity::{IdentityProviders, KakaoExchange};
use storefront_auth::metrics::AuthMetrics;
use storefront_auth::store::{InMemoryPrincipalStore, PgPrincipalStore, PrincipalStore};
use storefront_auth::{build_router, AppState};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_auth_config()?;

    let store: Arc<dyn PrincipalStore> = match &config.database_url {
        Some(url) => {
            let pool = PgPool::connect(url)
                .await
                .context("Failed to connect to DATABASE_URL")?;
            Arc::new(PgPrincipalStore::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set; using an empty in-memory principal store");
            Arc::new(InMemoryPrincipalStore::new())
        }
    };

    let http_client = Client::builder()
        .build()
        .context("Failed to build HTTP client")?;

    let mut identity = IdentityProviders::new();
    if let Some(client_id) = &config.kakao_client_id {
        identity = identity.register(
            "kakao",
            Arc::new(KakaoExchange::new(
                http_client.clone(),
                client_id.clone(),
                config.kakao_client_secret.clone(),
            )),
        );
    }

    if config.upstream_url.is_none() {
        warn!("UPSTREAM_URL not set; admitted page requests will return 404");
    }

    let allowed_origin = HeaderValue::from_str(&config.public_base_url)
        .context("PUBLIC_BASE_URL is not a valid origin")?;
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list([allowed_origin]))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE])
        .allow_credentials(true);

    let metrics = AuthMetrics::new()?;
    let state = AppState::new(config, store, identity, metrics, http_client);
    let app = build_router(state).layer(cors);

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8085);
    let ip: std::net::IpAddr = host.parse()?;
    let addr = SocketAddr::from((ip, port));

    info!(%addr, "starting storefront-auth");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
