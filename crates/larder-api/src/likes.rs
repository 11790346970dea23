use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use larder_types::api::{Claims, LikeResponse};

use crate::{AppState, run_db};

/// PUT /recipes/{recipe_id}/likes/{user_id}
pub async fn add_like(
    State(state): State<AppState>,
    Path((recipe_id, user_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    set_like(&state, recipe_id, user_id, &claims, true).await.map(Json)
}

/// DELETE /recipes/{recipe_id}/likes/{user_id}
pub async fn remove_like(
    State(state): State<AppState>,
    Path((recipe_id, user_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    set_like(&state, recipe_id, user_id, &claims, false).await.map(Json)
}

async fn set_like(
    state: &AppState,
    recipe_id: Uuid,
    user_id: Uuid,
    claims: &Claims,
    liked: bool,
) -> Result<LikeResponse, StatusCode> {
    // Users can only like on their own behalf
    if user_id != claims.sub {
        return Err(StatusCode::FORBIDDEN);
    }

    let (like_count, liked_by) = run_db(state, move |db| {
        db.set_like(&recipe_id.to_string(), &user_id.to_string(), liked)
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    Ok(LikeResponse { like_count, liked_by })
}
