pub mod app;
pub mod authn;
pub mod config;
pub mod handlers;
pub mod identity;
pub mod metrics;
pub mod middleware;
pub mod password;
pub mod proxy;
pub mod store;

pub use app::{build_router, build_router_with, AppState};
