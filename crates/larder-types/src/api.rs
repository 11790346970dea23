use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::User;

// -- JWT Claims --

/// JWT claims shared by larder-api (REST middleware) and larder-gateway
/// (WebSocket identify).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub display_name: String,
    pub exp: usize,
}

impl Claims {
    pub fn user(&self) -> User {
        User {
            id: self.sub,
            email: self.email.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

// -- Auth --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Returned by both register and login.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub user: User,
    pub token: String,
}

// -- Recipes --

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RecipeListQuery {
    pub owner: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikeResponse {
    pub like_count: u32,
    pub liked_by: BTreeSet<Uuid>,
}

// -- Favorites --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FavoritesResponse {
    pub favorites: Vec<Uuid>,
}

// -- Images --

#[derive(Debug, Deserialize, Serialize)]
pub struct UploadQuery {
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub key: String,
    pub url: String,
}
