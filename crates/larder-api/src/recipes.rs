use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use larder_types::api::{Claims, RecipeListQuery};
use larder_types::models::{Recipe, RecipeFields};

use crate::{AppState, run_db};

/// GET /recipes: newest first, optionally restricted to one owner.
pub async fn list_recipes(
    State(state): State<AppState>,
    Query(query): Query<RecipeListQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let owner = query.owner.map(|id| id.to_string());
    let recipes = run_db(&state, move |db| db.list_recipes(owner.as_deref())).await?;
    Ok(Json(recipes))
}

pub async fn get_recipe(
    State(state): State<AppState>,
    Path(recipe_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let recipe = fetch_recipe(&state, recipe_id).await?;
    Ok(Json(recipe))
}

pub async fn create_recipe(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(fields): Json<RecipeFields>,
) -> Result<impl IntoResponse, StatusCode> {
    fields.validate().map_err(|e| {
        warn!("Rejected recipe from {}: {}", claims.sub, e);
        StatusCode::BAD_REQUEST
    })?;

    let recipe = Recipe::new(Uuid::new_v4(), &claims.user(), fields, Utc::now());
    let recipe_id = recipe.id;
    run_db(&state, move |db| db.insert_recipe(&recipe)).await?;

    info!("{} published recipe {}", claims.sub, recipe_id);
    let stored = fetch_recipe(&state, recipe_id).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

pub async fn update_recipe(
    State(state): State<AppState>,
    Path(recipe_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(fields): Json<RecipeFields>,
) -> Result<impl IntoResponse, StatusCode> {
    fields.validate().map_err(|_| StatusCode::BAD_REQUEST)?;

    let existing = fetch_recipe(&state, recipe_id).await?;
    if existing.owner_id != claims.sub {
        return Err(StatusCode::FORBIDDEN);
    }

    let id = recipe_id.to_string();
    if !run_db(&state, move |db| db.update_recipe_fields(&id, &fields)).await? {
        return Err(StatusCode::NOT_FOUND);
    }

    let stored = fetch_recipe(&state, recipe_id).await?;
    Ok(Json(stored))
}

pub async fn delete_recipe(
    State(state): State<AppState>,
    Path(recipe_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let existing = fetch_recipe(&state, recipe_id).await?;
    if existing.owner_id != claims.sub {
        return Err(StatusCode::FORBIDDEN);
    }

    let id = recipe_id.to_string();
    if !run_db(&state, move |db| db.delete_recipe(&id)).await? {
        return Err(StatusCode::NOT_FOUND);
    }

    info!("{} deleted recipe {}", claims.sub, recipe_id);
    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_recipe(state: &AppState, recipe_id: Uuid) -> Result<Recipe, StatusCode> {
    let id = recipe_id.to_string();
    run_db(state, move |db| db.get_recipe(&id))
        .await?
        .ok_or(StatusCode::NOT_FOUND)
}
