//! Syndication hub HTTP server: partner ingest, public hosted-feed serving,
//! and thin admin routes over the catalog-set and delivery services.
//! Grounded on the teacher's `rootsignal-api/src/main.rs` (Arc<AppState>,
//! tower-http trace/security layers, `Config::*_from_env` + `log_redacted`).

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use axum::routing::{get, post};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hub_common::Config;

mod auth;
mod error;
mod routes;
mod state;

use state::AppState;

async fn health() -> &'static str {
    "ok"
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("hub=info".parse()?))
        .init();

    info!("hub-api starting...");

    let config = Config::api_from_env();
    config.log_redacted();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    let host = config.web_host.clone();
    let port = config.web_port;

    let state = Arc::new(AppState::new(pool, config)?);

    let app = Router::new()
        .route("/", get(health))
        .route(
            "/v1/ingest/{partner_key}/listings/{source_listing_id}",
            post(routes::ingest::ingest_listing),
        )
        .route("/v1/feeds/{partner}/{destination_ext}", get(routes::feeds::get_feed))
        .route(
            "/v1/admin/catalog-sets",
            post(routes::admin::create_catalog_set),
        )
        .route(
            "/v1/admin/catalog-sets/{id}/items",
            post(routes::admin::add_catalog_set_item),
        )
        .route(
            "/v1/admin/catalog-sets/{id}/preview",
            post(routes::admin::preview_catalog_set),
        )
        .route(
            "/v1/admin/catalog-sets/{id}/submit",
            post(routes::admin::submit_catalog_set),
        )
        .route(
            "/v1/admin/catalog-sets/{id}/reject",
            post(routes::admin::reject_catalog_set),
        )
        .route(
            "/v1/admin/catalog-sets/{id}/activate",
            post(routes::admin::activate_catalog_set),
        )
        .route(
            "/v1/admin/catalog-sets/{id}/rollback",
            post(routes::admin::rollback_catalog_set),
        )
        .route(
            "/v1/partners/{partner_id}/deliveries",
            get(routes::admin::list_partner_deliveries),
        )
        .with_state(state)
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        );

    let addr = format!("{host}:{port}");
    info!("hub-api listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
