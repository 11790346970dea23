pub mod auth;
pub mod favorites;
pub mod images;
pub mod likes;
pub mod middleware;
pub mod recipes;
pub mod routes;

use std::sync::Arc;

use axum::http::StatusCode;
use tracing::error;

use larder_db::Database;
use crate::favorites::FavoritesLocks;
use larder_gateway::dispatcher::Dispatcher;
use larder_storage::BlobStorage;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub storage: BlobStorage,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
    pub favorites_locks: FavoritesLocks,
}

/// Run a blocking DB call off the async runtime, logging and mapping any
/// failure to a 500.
pub(crate) async fn run_db<F, T>(state: &AppState, f: F) -> Result<T, StatusCode>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("DB error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}
