use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use larder_types::api::{Claims, FavoritesResponse};
use larder_types::events::GatewayEvent;

use crate::{AppState, run_db};

/// Per-user write locks for favorites documents.
///
/// A mutation and its snapshot push happen under the same lock, so gateway
/// connections receive snapshots in commit order.
#[derive(Default)]
pub struct FavoritesLocks {
    users: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl FavoritesLocks {
    pub async fn lock(&self, user_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = self
            .users
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(user_id)
            .or_default()
            .clone();
        lock.lock_owned().await
    }
}

/// GET /users/{user_id}/favorites: 404 until the document exists.
pub async fn get_favorites(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    check_owner(user_id, &claims)?;

    let uid = user_id.to_string();
    let favorites = run_db(&state, move |db| db.get_favorites(&uid))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(FavoritesResponse { favorites }))
}

/// PUT /users/{user_id}/favorites: create the document if absent.
pub async fn ensure_favorites(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    check_owner(user_id, &claims)?;

    let _write = state.favorites_locks.lock(user_id).await;
    let uid = user_id.to_string();
    let favorites = run_db(&state, move |db| db.ensure_favorites(&uid)).await?;

    push_snapshot(&state, user_id, Some(favorites.clone())).await;
    Ok(Json(FavoritesResponse { favorites }))
}

/// PUT /users/{user_id}/favorites/{recipe_id}
pub async fn add_favorite(
    State(state): State<AppState>,
    Path((user_id, recipe_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    check_owner(user_id, &claims)?;

    let _write = state.favorites_locks.lock(user_id).await;
    let favorites = run_db(&state, move |db| {
        db.add_favorite(&user_id.to_string(), &recipe_id.to_string())
    })
    .await?;

    push_snapshot(&state, user_id, Some(favorites.clone())).await;
    Ok(Json(FavoritesResponse { favorites }))
}

/// DELETE /users/{user_id}/favorites/{recipe_id}
pub async fn remove_favorite(
    State(state): State<AppState>,
    Path((user_id, recipe_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    check_owner(user_id, &claims)?;

    let _write = state.favorites_locks.lock(user_id).await;
    let favorites = run_db(&state, move |db| {
        db.remove_favorite(&user_id.to_string(), &recipe_id.to_string())
    })
    .await?;

    push_snapshot(&state, user_id, favorites.clone()).await;
    Ok(Json(FavoritesResponse {
        favorites: favorites.unwrap_or_default(),
    }))
}

fn check_owner(user_id: Uuid, claims: &Claims) -> Result<(), StatusCode> {
    if user_id == claims.sub {
        Ok(())
    } else {
        Err(StatusCode::FORBIDDEN)
    }
}

/// Push the new document state to every gateway connection of the user.
async fn push_snapshot(state: &AppState, user_id: Uuid, favorites: Option<Vec<Uuid>>) {
    state
        .dispatcher
        .send_to_user(user_id, GatewayEvent::FavoritesSnapshot { user_id, favorites })
        .await;
}
