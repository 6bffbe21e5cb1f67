//! HTTP surface of the dispatcher.
//!
//! # Routes
//!
//! ## Cron (require `Authorization: Bearer <cron_secret>`)
//! - `GET /api/cron/daily/{subject_id}` - send today's issue and advance the sequence
//! - `GET /api/cron/issues/{issue_id}/send` - send one issue, sequence untouched
//! - `GET /api/cron/campaigns/{campaign_id}/send` - send a campaign once per user
//!
//! ## Public
//! - `GET /api/health`
//! - `GET|POST /api/unsubscribe?token=..`
//! - `POST /api/subscriptions`

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tokio::net::TcpListener;

use crate::config::Settings;
use crate::db::{apply_schema, establish_connection_pool};
use crate::delivery::Dispatcher;
use crate::delivery::provider;
use crate::delivery::request_builder::{RequestBuilder, TemplatePersonalizer};
use crate::errors::Error;
use crate::repository::DieselRepository;
use crate::unsubscribe::UnsubscribeLinks;

pub mod auth;
pub mod error_response;
pub mod routes;
pub mod state;

pub use error_response::ApiResponse;
pub use state::AppState;

pub fn create_router(state: AppState) -> Router {
    let cron = Router::new()
        .route("/daily/{subject_id}", get(routes::run_daily))
        .route("/issues/{issue_id}/send", get(routes::send_issue))
        .route("/campaigns/{campaign_id}/send", get(routes::send_campaign))
        .route_layer(middleware::from_fn_with_state(
            state.cron_secret.clone(),
            auth::require_cron_secret,
        ));

    Router::new()
        .route("/api/health", get(routes::health))
        .route(
            "/api/unsubscribe",
            get(routes::unsubscribe).post(routes::unsubscribe),
        )
        .route("/api/subscriptions", post(routes::subscribe))
        .nest("/api/cron", cron)
        .with_state(state)
}

/// Wires the pool, provider and dispatcher from `settings` into an
/// [`AppState`].
pub fn build_state(settings: &Settings) -> Result<AppState, Error> {
    let pool = establish_connection_pool(&settings.database_url)?;
    apply_schema(&pool)?;
    let repo = Arc::new(DieselRepository::new(pool));

    let provider = provider::from_settings(&settings.provider)?;
    let links = UnsubscribeLinks::new(&settings.base_url, &settings.unsubscribe_secret);
    let builder = RequestBuilder::new(
        settings.sender.from_header(),
        settings.sender.reply_to.clone(),
        links.clone(),
    );
    let template = TemplatePersonalizer::new(&settings.base_url, links.clone());

    let dispatcher = Dispatcher::new(
        repo,
        provider,
        builder,
        template,
        settings.batch_config(),
        settings.page_size,
    );

    Ok(AppState::new(
        Arc::new(dispatcher),
        links,
        &settings.cron_secret,
    ))
}

/// Binds `settings.bind_address` and serves until the process exits.
pub async fn serve(settings: Settings) -> Result<(), Error> {
    let state = build_state(&settings)?;
    let listener = TcpListener::bind(&settings.bind_address).await?;
    log::info!("Listening on {}", settings.bind_address);

    axum::serve(listener, create_router(state)).await?;
    Ok(())
}
