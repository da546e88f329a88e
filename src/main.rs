mod backend;
mod config;
mod middleware;
mod models;
mod routes;
mod services;
mod session;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{delete, get, post, put},
    Router,
};
use tokio::sync::watch;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use backend::Backend;
use config::Config;
use session::SessionRegistry;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub backend: Backend,
    pub config: Arc<Config>,
    pub sessions: SessionRegistry,
    pub pending: watch::Receiver<i64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env()?);
    let backend = Backend::new(&config)?;
    info!(backend = %config.backend_url, "hosted backend client ready");

    let pending = services::pending::spawn_pending_counter(backend.clone());

    let state = AppState {
        backend,
        config: config.clone(),
        sessions: SessionRegistry::new(),
        pending,
    };

    // CORS: the deployed storefront origin plus localhost for
    // development.
    let cors_origin = {
        let base = config.app_base_url.clone();
        AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            let o = match origin.to_str() {
                Ok(s) => s,
                Err(_) => return false,
            };
            if o.starts_with("http://localhost") || o.starts_with("http://127.0.0.1") {
                return true;
            }
            o == base
        })
    };
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ]))
        .allow_credentials(true)
        .allow_origin(cors_origin);

    let app = Router::new()
        .route("/health", get(routes::health::health))
        // Auth
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/logout", post(routes::auth::logout))
        .route("/auth/me", get(routes::auth::me))
        .route("/auth/guard", get(routes::auth::guard_check))
        // Public catalog
        .route("/mobil", get(routes::catalog::list))
        .route("/mobil/{id}", get(routes::catalog::detail))
        // Customer storefront
        .route("/sewa/{id}", post(routes::sewa::create))
        .route("/pesanan", get(routes::pesanan::list_own))
        .route("/pesanan/pending-count", get(routes::pesanan::pending_count))
        .route("/pesanan/{id}/batal", post(routes::pesanan::cancel))
        .route("/profil", get(routes::profil::get))
        .route("/profil", put(routes::profil::update))
        // Staff order desk
        .route("/pesanan-petugas", get(routes::pesanan::list_for_staff))
        // Back office
        .route("/dashboard/mobil", post(routes::mobil::create))
        .route("/dashboard/mobil/{id}", put(routes::mobil::update))
        .route("/dashboard/mobil/{id}", delete(routes::mobil::delete))
        .route("/dashboard/pelanggan", get(routes::pelanggan::list))
        .route(
            "/dashboard/pelanggan/{id}",
            delete(routes::pelanggan::delete),
        )
        .route("/dashboard/transaksi", get(routes::transaksi::list))
        .route(
            "/dashboard/transaksi/{id}/status",
            put(routes::transaksi::update_status),
        )
        .route(
            "/dashboard/transaksi/{id}",
            delete(routes::transaksi::delete),
        )
        .route(
            "/dashboard/pending-count",
            get(routes::transaksi::pending_count),
        )
        .route("/dashboard/users", get(routes::users::list))
        .route("/dashboard/users", post(routes::users::create))
        .route("/dashboard/users/{id}", put(routes::users::update))
        .route("/dashboard/users/{id}", delete(routes::users::delete))
        .route("/dashboard/laporan", get(routes::laporan::report))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
