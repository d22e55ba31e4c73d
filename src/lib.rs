//! Job Tracker: turns a stream of recruiting emails into job applications
//! with a status history.

pub mod api;
pub mod config;
pub mod error;
pub mod store;
pub mod tracker;

use std::sync::Arc;

use crate::api::{AppState, HeaderIdentityResolver};
use crate::config::ServerConfig;
use crate::error::Error;
use crate::store::{Database, LibSqlBackend};
use crate::tracker::Tracker;

/// Open the configured database and assemble the HTTP router.
pub async fn build_app(config: &ServerConfig) -> error::Result<axum::Router> {
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&config.db_path).await?);
    Ok(api::router(AppState {
        tracker: Arc::new(Tracker::new(Arc::clone(&db), config.recency_window())),
        identity: Arc::new(HeaderIdentityResolver::new(
            config.identity_header.clone(),
            db,
        )),
    }))
}

/// Build the app, bind the configured address and serve until shutdown.
pub async fn serve(config: &ServerConfig) -> error::Result<()> {
    let app = build_app(config).await?;

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| Error::Io { addr, source })?;
    tracing::info!(
        %addr,
        identity_header = %config.identity_header,
        recency_days = config.recency_days,
        "Job tracker API listening"
    );

    axum::serve(listener, app)
        .await
        .map_err(|source| Error::Io { addr, source })
}
