//! Router assembly and serving.

use std::io;
use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::fleet::{FleetCatalog, FleetHealth};
use crate::panics::PanicAggregator;
use crate::store::DocumentSession;

/// Application state injected into handlers.
pub struct AppState<S: DocumentSession> {
    pub aggregator: Arc<PanicAggregator>,
    pub health: Arc<FleetHealth<S>>,
    pub catalog: Arc<FleetCatalog>,
}

// Derived Clone would require `S: Clone`.
impl<S: DocumentSession> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            aggregator: self.aggregator.clone(),
            health: self.health.clone(),
            catalog: self.catalog.clone(),
        }
    }
}

pub fn router<S: DocumentSession>(state: AppState<S>) -> Router {
    Router::new()
        .route(
            "/panic",
            post(handlers::report_panic::<S>).get(handlers::panic_digest::<S>),
        )
        .route(
            "/maintenance",
            get(handlers::maintenance_status::<S>).put(handlers::set_maintenance::<S>),
        )
        .route("/catalog/refresh", post(handlers::refresh_catalog::<S>))
        .route("/hosts", put(handlers::update_host::<S>))
        .route("/hosts/summary", get(handlers::host_summary::<S>))
        .route("/restart", post(handlers::restart::<S>))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve `app` until `shutdown` fires, then drain in-flight requests.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "HTTP trigger listener starting");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    tracing::info!("HTTP trigger listener stopped");
    Ok(())
}
