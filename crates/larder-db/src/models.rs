//! Database row types. These map directly to SQLite rows and are
//! converted into larder-types models at the edge of this crate.
use std::collections::BTreeSet;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use larder_types::models::{Recipe, User};
use uuid::Uuid;

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub password: String,
    pub created_at: String,
}

impl UserRow {
    pub fn to_user(&self) -> Result<User> {
        Ok(User {
            id: self.id.parse().with_context(|| format!("corrupt user id '{}'", self.id))?,
            email: self.email.clone(),
            display_name: self.display_name.clone(),
        })
    }
}

pub struct RecipeRow {
    pub id: String,
    pub title: String,
    pub title_lower: String,
    pub description: String,
    pub prep_time_minutes: u32,
    pub difficulty: String,
    pub category: String,
    pub is_vegetarian: bool,
    pub ingredients: String,
    pub steps: String,
    pub image_url: String,
    pub owner_id: String,
    pub owner_display_name: String,
    pub created_at: String,
    pub like_count: u32,
}

impl RecipeRow {
    pub fn into_recipe(self, liked_by: BTreeSet<Uuid>) -> Result<Recipe> {
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .with_context(|| format!("corrupt created_at '{}' on recipe '{}'", self.created_at, self.id))?
            .with_timezone(&Utc);

        Ok(Recipe {
            id: self.id.parse().with_context(|| format!("corrupt recipe id '{}'", self.id))?,
            title: self.title,
            title_lower: self.title_lower,
            description: self.description,
            prep_time_minutes: self.prep_time_minutes,
            difficulty: self.difficulty.parse()?,
            category: self.category.parse()?,
            is_vegetarian: self.is_vegetarian,
            ingredients: serde_json::from_str(&self.ingredients)?,
            steps: serde_json::from_str(&self.steps)?,
            image_url: self.image_url,
            owner_id: self
                .owner_id
                .parse()
                .with_context(|| format!("corrupt owner_id '{}'", self.owner_id))?,
            owner_display_name: self.owner_display_name,
            created_at: Some(created_at),
            like_count: self.like_count,
            liked_by,
        })
    }
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}
