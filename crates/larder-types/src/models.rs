use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
}

impl User {
    /// Name shown as a recipe's author. Falls back to the email when the
    /// profile has no display name.
    pub fn author_name(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.email
        } else {
            &self.display_name
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    #[default]
    Breakfast,
    Lunch,
    Dinner,
    Dessert,
    Snack,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Breakfast,
        Category::Lunch,
        Category::Dinner,
        Category::Dessert,
        Category::Snack,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Breakfast => "Breakfast",
            Self::Lunch => "Lunch",
            Self::Dinner => "Dinner",
            Self::Dessert => "Dessert",
            Self::Snack => "Snack",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "Easy",
            Self::Medium => "Medium",
            Self::Hard => "Hard",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a stored or submitted enum label is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown label '{0}'")]
pub struct UnknownLabel(pub String);

impl FromStr for Category {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownLabel(s.to_string()))
    }
}

impl FromStr for Difficulty {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| UnknownLabel(s.to_string()))
    }
}

/// A published recipe as stored in the `recipes` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: Uuid,
    pub title: String,
    pub title_lower: String,
    pub description: String,
    pub prep_time_minutes: u32,
    pub difficulty: Difficulty,
    pub category: Category,
    pub is_vegetarian: bool,
    pub ingredients: Vec<String>,
    pub steps: Vec<String>,
    pub image_url: String,
    pub owner_id: Uuid,
    /// Snapshot of the author's name at creation time.
    pub owner_display_name: String,
    /// Server-assigned. `None` while a write is still pending.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub like_count: u32,
    #[serde(default)]
    pub liked_by: BTreeSet<Uuid>,
}

impl Recipe {
    /// Build a freshly created recipe: no likes, owner fields fixed.
    pub fn new(id: Uuid, owner: &User, fields: RecipeFields, created_at: DateTime<Utc>) -> Self {
        let fields = fields.normalized();
        Self {
            id,
            title_lower: fields.title.to_lowercase(),
            title: fields.title,
            description: fields.description,
            prep_time_minutes: fields.prep_time_minutes,
            difficulty: fields.difficulty,
            category: fields.category,
            is_vegetarian: fields.is_vegetarian,
            ingredients: fields.ingredients,
            steps: fields.steps,
            image_url: fields.image_url,
            owner_id: owner.id,
            owner_display_name: owner.author_name().to_string(),
            created_at: Some(created_at),
            like_count: 0,
            liked_by: BTreeSet::new(),
        }
    }

    /// Replace the editable fields. Owner, creation time and likes are kept.
    pub fn apply_fields(&mut self, fields: RecipeFields) {
        let fields = fields.normalized();
        self.title_lower = fields.title.to_lowercase();
        self.title = fields.title;
        self.description = fields.description;
        self.prep_time_minutes = fields.prep_time_minutes;
        self.difficulty = fields.difficulty;
        self.category = fields.category;
        self.is_vegetarian = fields.is_vegetarian;
        self.ingredients = fields.ingredients;
        self.steps = fields.steps;
        self.image_url = fields.image_url;
    }

    pub fn fields(&self) -> RecipeFields {
        RecipeFields {
            title: self.title.clone(),
            description: self.description.clone(),
            prep_time_minutes: self.prep_time_minutes,
            difficulty: self.difficulty,
            category: self.category,
            is_vegetarian: self.is_vegetarian,
            ingredients: self.ingredients.clone(),
            steps: self.steps.clone(),
            image_url: self.image_url.clone(),
        }
    }

    pub fn is_liked_by(&self, user_id: Uuid) -> bool {
        self.liked_by.contains(&user_id)
    }

    /// Add or remove `user_id` from the likers. The count always tracks the
    /// set size. Returns whether anything changed.
    pub fn set_liked(&mut self, user_id: Uuid, liked: bool) -> bool {
        let changed = if liked {
            self.liked_by.insert(user_id)
        } else {
            self.liked_by.remove(&user_id)
        };
        self.like_count = self.liked_by.len() as u32;
        changed
    }
}

/// The owner-editable part of a recipe, as submitted on create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecipeFields {
    pub title: String,
    pub description: String,
    pub prep_time_minutes: u32,
    pub difficulty: Difficulty,
    pub category: Category,
    pub is_vegetarian: bool,
    pub ingredients: Vec<String>,
    pub steps: Vec<String>,
    pub image_url: String,
}

impl RecipeFields {
    /// Trim every free-text field.
    pub fn normalized(self) -> Self {
        Self {
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            ingredients: self.ingredients.iter().map(|i| i.trim().to_string()).collect(),
            steps: self.steps.iter().map(|s| s.trim().to_string()).collect(),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> User {
        User {
            id: Uuid::new_v4(),
            email: "ana@example.com".into(),
            display_name: String::new(),
        }
    }

    fn fields() -> RecipeFields {
        RecipeFields {
            title: "  Shakshuka ".into(),
            description: "Eggs in sauce".into(),
            prep_time_minutes: 25,
            difficulty: Difficulty::Easy,
            category: Category::Breakfast,
            is_vegetarian: true,
            ingredients: vec![" eggs".into(), "tomatoes ".into()],
            steps: vec!["Simmer".into()],
            image_url: "/images/1_a.png".into(),
        }
    }

    #[test]
    fn new_recipe_starts_without_likes() {
        let owner = owner();
        let recipe = Recipe::new(Uuid::new_v4(), &owner, fields(), Utc::now());
        assert_eq!(recipe.title, "Shakshuka");
        assert_eq!(recipe.title_lower, "shakshuka");
        assert_eq!(recipe.ingredients, vec!["eggs", "tomatoes"]);
        assert_eq!(recipe.owner_display_name, "ana@example.com");
        assert_eq!(recipe.like_count, 0);
        assert!(recipe.liked_by.is_empty());
    }

    #[test]
    fn like_count_tracks_likers() {
        let mut recipe = Recipe::new(Uuid::new_v4(), &owner(), fields(), Utc::now());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert!(recipe.set_liked(a, true));
        assert!(!recipe.set_liked(a, true));
        assert!(recipe.set_liked(b, true));
        assert_eq!(recipe.like_count, 2);

        assert!(recipe.set_liked(a, false));
        assert!(!recipe.set_liked(a, false));
        assert_eq!(recipe.like_count, 1);
        assert_eq!(recipe.like_count as usize, recipe.liked_by.len());
    }

    #[test]
    fn apply_fields_keeps_owner_and_likes() {
        let owner = owner();
        let mut recipe = Recipe::new(Uuid::new_v4(), &owner, fields(), Utc::now());
        recipe.set_liked(Uuid::new_v4(), true);
        let created = recipe.created_at;

        let mut edited = fields();
        edited.title = "Green Shakshuka".into();
        recipe.apply_fields(edited);

        assert_eq!(recipe.title_lower, "green shakshuka");
        assert_eq!(recipe.owner_id, owner.id);
        assert_eq!(recipe.created_at, created);
        assert_eq!(recipe.like_count, 1);
    }

    #[test]
    fn labels_round_trip_through_from_str() {
        for c in Category::ALL {
            assert_eq!(c.as_str().parse::<Category>(), Ok(c));
        }
        assert_eq!(
            "Brunch".parse::<Category>().unwrap_err().to_string(),
            "unknown label 'Brunch'"
        );
        assert_eq!("Hard".parse::<Difficulty>(), Ok(Difficulty::Hard));
    }
}
