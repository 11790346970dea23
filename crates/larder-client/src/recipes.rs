use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::try_join_all;
use tracing::{info, warn};
use uuid::Uuid;

use larder_types::models::{Category, Difficulty, Recipe, RecipeFields, User};
use larder_types::validation::{ValidationError, validate_image, validate_recipe_text};

use crate::backend::{BlobStore, DocumentStore};
use crate::error::{Error, LOGIN_PROMPT, Result};
use crate::session::SessionStore;

/// A picked file that has not been uploaded yet.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageUpload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum DraftImage {
    #[default]
    None,
    /// Already stored; kept as is on submit.
    Existing(String),
    New(ImageUpload),
}

/// Form state for a recipe being created or edited.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeDraft {
    pub title: String,
    pub description: String,
    /// `None` while the field is empty.
    pub prep_time_minutes: Option<u32>,
    pub difficulty: Difficulty,
    pub category: Category,
    pub is_vegetarian: bool,
    pub ingredients: Vec<String>,
    pub steps: Vec<String>,
    pub image: DraftImage,
}

impl Default for RecipeDraft {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            prep_time_minutes: None,
            difficulty: Difficulty::default(),
            category: Category::default(),
            is_vegetarian: false,
            ingredients: vec![String::new()],
            steps: vec![String::new()],
            image: DraftImage::None,
        }
    }
}

impl RecipeDraft {
    /// Edit-form state for an existing recipe.
    pub fn from_recipe(recipe: &Recipe) -> Self {
        Self {
            title: recipe.title.clone(),
            description: recipe.description.clone(),
            prep_time_minutes: Some(recipe.prep_time_minutes),
            difficulty: recipe.difficulty,
            category: recipe.category,
            is_vegetarian: recipe.is_vegetarian,
            ingredients: recipe.ingredients.clone(),
            steps: recipe.steps.clone(),
            image: if recipe.image_url.is_empty() {
                DraftImage::None
            } else {
                DraftImage::Existing(recipe.image_url.clone())
            },
        }
    }

    pub fn add_ingredient(&mut self) {
        self.ingredients.push(String::new());
    }

    /// The last remaining row cannot be removed.
    pub fn remove_ingredient(&mut self, index: usize) {
        if self.ingredients.len() > 1 && index < self.ingredients.len() {
            self.ingredients.remove(index);
        }
    }

    pub fn add_step(&mut self) {
        self.steps.push(String::new());
    }

    /// The last remaining row cannot be removed.
    pub fn remove_step(&mut self, index: usize) {
        if self.steps.len() > 1 && index < self.steps.len() {
            self.steps.remove(index);
        }
    }

    /// Attach a newly picked file after checking type and size.
    pub fn set_image(&mut self, upload: ImageUpload) -> std::result::Result<(), ValidationError> {
        validate_image(&upload.content_type, upload.bytes.len())?;
        self.image = DraftImage::New(upload);
        Ok(())
    }

    pub fn clear_image(&mut self) {
        self.image = DraftImage::None;
    }

    /// Checks run before anything is sent to the backend.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.prep_time_minutes.is_none() {
            return Err(ValidationError::MissingRequiredField);
        }
        validate_recipe_text(&self.title, &self.description, &self.ingredients, &self.steps)?;
        match &self.image {
            DraftImage::None => Err(ValidationError::MissingImage),
            DraftImage::Existing(url) if url.trim().is_empty() => Err(ValidationError::MissingImage),
            DraftImage::Existing(_) => Ok(()),
            DraftImage::New(upload) => validate_image(&upload.content_type, upload.bytes.len()),
        }
    }

    fn into_fields(self, image_url: String) -> RecipeFields {
        RecipeFields {
            title: self.title,
            description: self.description,
            prep_time_minutes: self.prep_time_minutes.unwrap_or_default(),
            difficulty: self.difficulty,
            category: self.category,
            is_vegetarian: self.is_vegetarian,
            ingredients: self.ingredients,
            steps: self.steps,
            image_url,
        }
        .normalized()
    }
}

/// Reads and writes the `recipes` collection. Nothing is cached.
#[derive(Clone)]
pub struct RecipeRepository {
    docs: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    session: SessionStore,
}

impl RecipeRepository {
    pub fn new(docs: Arc<dyn DocumentStore>, blobs: Arc<dyn BlobStore>, session: SessionStore) -> Self {
        Self {
            docs,
            blobs,
            session,
        }
    }

    /// Validate, upload a new image if there is one, then write the recipe.
    /// A failed upload aborts before anything is written.
    pub async fn create(&self, draft: RecipeDraft) -> Result<Recipe> {
        draft.validate()?;
        let user = self.require_user()?;

        let (draft, image_url) = self.resolve_image(draft).await?;
        let recipe = self.docs.create_recipe(draft.into_fields(image_url)).await?;
        info!("{} created recipe {}", user.id, recipe.id);
        Ok(recipe)
    }

    pub async fn update(&self, id: Uuid, draft: RecipeDraft) -> Result<Recipe> {
        draft.validate()?;
        let user = self.require_user()?;
        self.owned_by(id, &user).await?;

        let (draft, image_url) = self.resolve_image(draft).await?;
        let recipe = self.docs.update_recipe(id, draft.into_fields(image_url)).await?;
        info!("{} updated recipe {}", user.id, id);
        Ok(recipe)
    }

    /// Delete the recipe, then try to delete its image. A failed image
    /// delete is logged and otherwise ignored.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let user = self.require_user()?;
        let recipe = self.owned_by(id, &user).await?;

        self.docs.delete_recipe(id).await?;
        info!("{} deleted recipe {}", user.id, id);

        if !recipe.image_url.is_empty() {
            if let Err(e) = self.blobs.delete(&recipe.image_url).await {
                warn!("Failed to delete image {}: {}", recipe.image_url, e);
            }
        }
        Ok(())
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Recipe> {
        self.docs.get_recipe(id).await?.ok_or(Error::NotFound)
    }

    pub async fn list_all(&self) -> Result<Vec<Recipe>> {
        self.docs.list_recipes().await
    }

    pub async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Recipe>> {
        self.docs.list_recipes_by_owner(owner_id).await
    }

    /// Fetch recipes in the order given. Ids whose recipe is gone are skipped.
    pub async fn list_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Recipe>> {
        let fetched = try_join_all(ids.iter().map(|id| self.docs.get_recipe(*id))).await?;
        Ok(fetched.into_iter().flatten().collect())
    }

    /// Draft for the edit form. Only the owner may load it.
    pub async fn load_for_edit(&self, id: Uuid) -> Result<RecipeDraft> {
        let user = self.require_user()?;
        let recipe = self.owned_by(id, &user).await?;
        Ok(RecipeDraft::from_recipe(&recipe))
    }

    fn require_user(&self) -> Result<User> {
        self.session
            .current_user()
            .ok_or(Error::NotAuthenticated(LOGIN_PROMPT))
    }

    async fn owned_by(&self, id: Uuid, user: &User) -> Result<Recipe> {
        let recipe = self.get_by_id(id).await?;
        if recipe.owner_id != user.id {
            return Err(Error::Permission);
        }
        Ok(recipe)
    }

    async fn resolve_image(&self, mut draft: RecipeDraft) -> Result<(RecipeDraft, String)> {
        let url = match std::mem::take(&mut draft.image) {
            DraftImage::New(upload) => {
                let stored = self
                    .blobs
                    .upload(&upload.filename, &upload.content_type, upload.bytes)
                    .await?;
                stored.url
            }
            DraftImage::Existing(url) => url,
            DraftImage::None => return Err(ValidationError::MissingImage.into()),
        };
        Ok((draft, url))
    }
}
