mod handlers;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use axum::{
  Router,
  routing::{get, post},
};
use tower::ServiceBuilder;
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{
  cors::{Any, CorsLayer},
  trace::TraceLayer,
};

use crate::{prelude::*, state::AppState};

pub struct Plugin;

#[async_trait]
impl super::Plugin for Plugin {
  async fn start(&self, app: Arc<AppState>) -> anyhow::Result<()> {
    let governor_conf = Arc::new(
      GovernorConfigBuilder::default()
        .per_second(app.config.rate_limit_per_second)
        .burst_size(app.config.rate_limit_burst)
        .finish()
        .context("Failed to build rate limiter config")?,
    );

    let governor_limiter = governor_conf.limiter().clone();

    tokio::spawn(async move {
      loop {
        tokio::time::sleep(Duration::from_secs(60)).await;
        governor_limiter.retain_recent();
      }
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], app.config.port));

    let router = router(app)
      .layer(
        ServiceBuilder::new()
          .layer(TraceLayer::new_for_http())
          .layer(GovernorLayer::new(governor_conf))
          .layer(
            CorsLayer::new()
              .allow_origin(Any)
              .allow_methods(Any)
              .allow_headers(Any),
          ),
      )
      .into_make_service_with_connect_info::<SocketAddr>();

    let listener = tokio::net::TcpListener::bind(addr)
      .await
      .with_context(|| format!("Failed to bind {addr}"))?;

    info!("HTTP Server listening on {addr}");

    tokio::spawn(async move {
      if let Err(err) = axum::serve(listener, router).await {
        error!("HTTP server stopped: {err}");
      }
    });

    Ok(())
  }
}

/// All routes, without the listener-level layers.
pub fn router(app: Arc<AppState>) -> Router {
  let admin = Router::<Arc<AppState>>::new()
    .route("/rates", get(handlers::rates).post(handlers::set_rates))
    .route("/rates/history", get(handlers::rate_history))
    .route("/sales", get(handlers::list_sales))
    .route("/withdrawals", get(handlers::list_withdrawals))
    .route("/withdrawals/{id}/resolve", post(handlers::resolve_withdrawal))
    .route("/transfers/{id}/approve", post(handlers::approve_transfer))
    .route("/ledger/{id}/reverse", post(handlers::reverse_entry))
    .route("/users/{id}/status", post(handlers::set_user_status))
    .route("/summary", get(handlers::summary))
    .route("/audit", get(handlers::audit));

  Router::new()
    .route("/health", get(handlers::health))
    .route("/api/users", post(handlers::register))
    .route("/api/users/{id}", get(handlers::user))
    .route("/api/users/{id}/balance", get(handlers::balance))
    .route("/api/users/{id}/ledger", get(handlers::ledger))
    .route("/api/users/{id}/referrals", get(handlers::referrals))
    .route("/api/users/{id}/transfers", get(handlers::user_transfers))
    .route("/api/users/{id}/withdrawals", get(handlers::user_withdrawals))
    .route("/api/users/{id}/sales", get(handlers::user_sales))
    .route("/api/sales", post(handlers::record_sale))
    .route("/api/sales/{id}", get(handlers::sale))
    .route("/api/sales/{id}/complete", post(handlers::complete_sale))
    .route("/api/sales/{id}/cancel", post(handlers::cancel_sale))
    .route("/api/sales/{id}/refund", post(handlers::refund_sale))
    .route("/api/transfers", post(handlers::transfer))
    .route("/api/transfers/{id}/cancel", post(handlers::cancel_transfer))
    .route("/api/withdrawals", post(handlers::request_withdrawal))
    .nest("/api/admin", admin)
    .with_state(app)
}
