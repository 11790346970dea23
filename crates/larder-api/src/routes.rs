use axum::{
    Router,
    extract::{DefaultBodyLimit, State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use larder_gateway::connection;
use larder_types::validation::MAX_IMAGE_BYTES;

use crate::middleware::require_auth;
use crate::{AppState, auth, favorites, images, likes, recipes};

/// Headroom over the image limit so oversized uploads get a 413 from the
/// handler rather than a bare body-limit rejection.
const BODY_LIMIT: usize = MAX_IMAGE_BYTES + 1024 * 1024;

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/recipes", get(recipes::list_recipes))
        .route("/recipes/{recipe_id}", get(recipes::get_recipe))
        .route("/images/{key}", get(images::download_image))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/recipes", post(recipes::create_recipe))
        .route(
            "/recipes/{recipe_id}",
            put(recipes::update_recipe).delete(recipes::delete_recipe),
        )
        .route(
            "/recipes/{recipe_id}/likes/{user_id}",
            put(likes::add_like).delete(likes::remove_like),
        )
        .route(
            "/users/{user_id}/favorites",
            get(favorites::get_favorites).put(favorites::ensure_favorites),
        )
        .route(
            "/users/{user_id}/favorites/{recipe_id}",
            put(favorites::add_favorite).delete(favorites::remove_favorite),
        )
        .route("/images", post(images::upload_image))
        .route("/images/{key}", axum::routing::delete(images::delete_image))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(
            socket,
            state.dispatcher.clone(),
            state.db.clone(),
            state.jwt_secret.clone(),
        )
    })
}
