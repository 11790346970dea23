//! In-process backend. Sessions created with [`MemoryBackend::connect`]
//! share one data set, which lets tests play several users or tabs at once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use larder_types::api::{LikeResponse, UploadResponse};
use larder_types::models::{Recipe, RecipeFields, User};
use larder_types::validation::{ValidationError, validate_image, validate_registration};

use crate::backend::{AuthProvider, BlobStore, DocumentStore, Watch};
use crate::error::{AuthError, Error, LOGIN_PROMPT, Result};

type FavoritesSender = mpsc::UnboundedSender<Option<Vec<Uuid>>>;

#[derive(Default)]
struct Shared {
    accounts: Vec<Account>,
    /// Insertion order; listings sort by `created_at`.
    recipes: Vec<Recipe>,
    favorites: HashMap<Uuid, Vec<Uuid>>,
    watchers: HashMap<Uuid, Vec<FavoritesSender>>,
    blobs: HashMap<String, Bytes>,
    last_created: Option<DateTime<Utc>>,
    fail_uploads: bool,
    fail_blob_deletes: bool,
}

struct Account {
    user: User,
    password: String,
}

impl Shared {
    /// Strictly increasing creation times, so ordering is deterministic.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_created {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_created = Some(ts);
        ts
    }

    fn recipe_mut(&mut self, id: Uuid) -> Option<&mut Recipe> {
        self.recipes.iter_mut().find(|r| r.id == id)
    }

    fn notify_favorites(&mut self, user_id: Uuid) {
        let snapshot = self.favorites.get(&user_id).cloned();
        if let Some(senders) = self.watchers.get_mut(&user_id) {
            senders.retain(|tx| tx.send(snapshot.clone()).is_ok());
        }
    }
}

pub struct MemoryBackend {
    shared: Arc<Mutex<Shared>>,
    current: Mutex<Option<User>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared::default())),
            current: Mutex::new(None),
        }
    }

    /// A second, signed-out session over the same data.
    pub fn connect(&self) -> Arc<Self> {
        Arc::new(Self {
            shared: self.shared.clone(),
            current: Mutex::new(None),
        })
    }

    /// Make every upload fail until switched off again.
    pub fn fail_uploads(&self, fail: bool) {
        self.state().fail_uploads = fail;
    }

    /// Make every blob delete fail until switched off again.
    pub fn fail_blob_deletes(&self, fail: bool) {
        self.state().fail_blob_deletes = fail;
    }

    pub fn has_blob(&self, url: &str) -> bool {
        self.state().blobs.contains_key(url)
    }

    pub fn blob_count(&self) -> usize {
        self.state().blobs.len()
    }

    /// Live favorites subscriptions for `user_id` that are still open.
    pub fn favorites_watchers(&self, user_id: Uuid) -> usize {
        self.state()
            .watchers
            .get(&user_id)
            .map_or(0, |senders| senders.iter().filter(|tx| !tx.is_closed()).count())
    }

    fn state(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn signed_in(&self) -> Result<User> {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(Error::NotAuthenticated(LOGIN_PROMPT))
    }

    fn set_current(&self, user: Option<User>) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = user;
    }

    /// Only the owning user may touch a favorites document.
    fn require_user(&self, user_id: Uuid) -> Result<()> {
        if self.signed_in()?.id == user_id {
            Ok(())
        } else {
            Err(Error::Permission)
        }
    }

    fn require_owner(&self, shared: &Shared, id: Uuid) -> Result<()> {
        let user = self.signed_in()?;
        let recipe = shared
            .recipes
            .iter()
            .find(|r| r.id == id)
            .ok_or(Error::NotFound)?;
        if recipe.owner_id != user.id {
            return Err(Error::Permission);
        }
        Ok(())
    }
}

fn newest_first(mut recipes: Vec<Recipe>) -> Vec<Recipe> {
    recipes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    recipes
}

#[async_trait]
impl AuthProvider for MemoryBackend {
    async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> Result<User> {
        validate_registration(email, password, display_name).map_err(|e| match e {
            ValidationError::WeakPassword => Error::Auth(AuthError::WeakPassword),
            other => Error::Validation(other),
        })?;

        let user = {
            let mut shared = self.state();
            if shared
                .accounts
                .iter()
                .any(|a| a.user.email.eq_ignore_ascii_case(email))
            {
                return Err(AuthError::EmailAlreadyInUse.into());
            }
            let user = User {
                id: Uuid::new_v4(),
                email: email.to_string(),
                display_name: display_name.to_string(),
            };
            shared.accounts.push(Account {
                user: user.clone(),
                password: password.to_string(),
            });
            user
        };

        self.set_current(Some(user.clone()));
        Ok(user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<User> {
        let user = self
            .state()
            .accounts
            .iter()
            .find(|a| a.user.email.eq_ignore_ascii_case(email) && a.password == password)
            .map(|a| a.user.clone())
            .ok_or(AuthError::InvalidCredential)?;

        self.set_current(Some(user.clone()));
        Ok(user)
    }

    async fn sign_out(&self) -> Result<()> {
        self.set_current(None);
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryBackend {
    async fn create_recipe(&self, fields: RecipeFields) -> Result<Recipe> {
        let owner = self.signed_in()?;
        fields.validate()?;

        let mut shared = self.state();
        let created_at = shared.next_timestamp();
        let recipe = Recipe::new(Uuid::new_v4(), &owner, fields, created_at);
        shared.recipes.push(recipe.clone());
        Ok(recipe)
    }

    async fn update_recipe(&self, id: Uuid, fields: RecipeFields) -> Result<Recipe> {
        fields.validate()?;

        let mut shared = self.state();
        self.require_owner(&shared, id)?;
        let recipe = shared.recipe_mut(id).ok_or(Error::NotFound)?;
        recipe.apply_fields(fields);
        Ok(recipe.clone())
    }

    async fn delete_recipe(&self, id: Uuid) -> Result<()> {
        let mut shared = self.state();
        self.require_owner(&shared, id)?;
        shared.recipes.retain(|r| r.id != id);
        Ok(())
    }

    async fn get_recipe(&self, id: Uuid) -> Result<Option<Recipe>> {
        Ok(self.state().recipes.iter().find(|r| r.id == id).cloned())
    }

    async fn list_recipes(&self) -> Result<Vec<Recipe>> {
        Ok(newest_first(self.state().recipes.clone()))
    }

    async fn list_recipes_by_owner(&self, owner_id: Uuid) -> Result<Vec<Recipe>> {
        let mine = self
            .state()
            .recipes
            .iter()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        Ok(newest_first(mine))
    }

    async fn set_like(&self, recipe_id: Uuid, user_id: Uuid, liked: bool) -> Result<LikeResponse> {
        if self.signed_in()?.id != user_id {
            return Err(Error::Permission);
        }
        // Let other tasks run as they would during a real round trip
        tokio::task::yield_now().await;

        let mut shared = self.state();
        let recipe = shared.recipe_mut(recipe_id).ok_or(Error::NotFound)?;
        recipe.set_liked(user_id, liked);
        Ok(LikeResponse {
            like_count: recipe.like_count,
            liked_by: recipe.liked_by.clone(),
        })
    }

    async fn get_favorites(&self, user_id: Uuid) -> Result<Option<Vec<Uuid>>> {
        Ok(self.state().favorites.get(&user_id).cloned())
    }

    async fn create_favorites(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        self.require_user(user_id)?;

        let mut shared = self.state();
        if let Some(existing) = shared.favorites.get(&user_id) {
            return Ok(existing.clone());
        }
        shared.favorites.insert(user_id, Vec::new());
        shared.notify_favorites(user_id);
        Ok(Vec::new())
    }

    async fn add_favorite(&self, user_id: Uuid, recipe_id: Uuid) -> Result<Vec<Uuid>> {
        self.require_user(user_id)?;

        let mut shared = self.state();
        let ids = shared.favorites.entry(user_id).or_default();
        if !ids.contains(&recipe_id) {
            ids.push(recipe_id);
        }
        let ids = ids.clone();
        shared.notify_favorites(user_id);
        Ok(ids)
    }

    async fn remove_favorite(&self, user_id: Uuid, recipe_id: Uuid) -> Result<Vec<Uuid>> {
        self.require_user(user_id)?;

        let mut shared = self.state();
        let Some(ids) = shared.favorites.get_mut(&user_id) else {
            return Ok(Vec::new());
        };
        ids.retain(|id| *id != recipe_id);
        let ids = ids.clone();
        shared.notify_favorites(user_id);
        Ok(ids)
    }

    async fn watch_favorites(&self, user_id: Uuid) -> Result<Watch<Option<Vec<Uuid>>>> {
        self.require_user(user_id)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut shared = self.state();
        // Current state first, like a freshly opened live query
        let _ = tx.send(shared.favorites.get(&user_id).cloned());
        shared.watchers.entry(user_id).or_default().push(tx);
        debug!("Favorites watch opened for {}", user_id);
        Ok(Watch::new(rx))
    }
}

#[async_trait]
impl BlobStore for MemoryBackend {
    async fn upload(
        &self,
        filename: &str,
        content_type: &str,
        bytes: Bytes,
    ) -> Result<UploadResponse> {
        self.signed_in()?;
        validate_image(content_type, bytes.len())?;

        let mut shared = self.state();
        if shared.fail_uploads {
            return Err(Error::transient("upload rejected"));
        }
        let uploaded_at = shared.next_timestamp();
        let key = format!("{}_{}", uploaded_at.timestamp_micros(), filename);
        let url = format!("memory://images/{}", key);
        shared.blobs.insert(url.clone(), bytes);
        Ok(UploadResponse { key, url })
    }

    async fn delete(&self, url: &str) -> Result<()> {
        let mut shared = self.state();
        if shared.fail_blob_deletes {
            return Err(Error::transient("blob delete rejected"));
        }
        shared.blobs.remove(url);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_types::models::{Category, Difficulty};

    fn fields() -> RecipeFields {
        RecipeFields {
            title: "Dal".into(),
            description: "Lentils".into(),
            prep_time_minutes: 40,
            difficulty: Difficulty::Easy,
            category: Category::Dinner,
            is_vegetarian: true,
            ingredients: vec!["lentils".into()],
            steps: vec!["Simmer".into()],
            image_url: "memory://images/1_dal.png".into(),
        }
    }

    #[tokio::test]
    async fn only_the_owner_can_edit() {
        let backend = MemoryBackend::new();
        backend
            .sign_up("ana@example.com", "secret1", "Ana")
            .await
            .unwrap();
        let recipe = backend.create_recipe(fields()).await.unwrap();

        let other = backend.connect();
        other
            .sign_up("bo@example.com", "secret2", "Bo")
            .await
            .unwrap();
        assert_eq!(
            other.update_recipe(recipe.id, fields()).await.unwrap_err(),
            Error::Permission
        );
        assert_eq!(
            other.delete_recipe(recipe.id).await.unwrap_err(),
            Error::Permission
        );
    }

    #[tokio::test]
    async fn listing_is_newest_first() {
        let backend = MemoryBackend::new();
        backend
            .sign_up("ana@example.com", "secret1", "Ana")
            .await
            .unwrap();
        let first = backend.create_recipe(fields()).await.unwrap();
        let second = backend.create_recipe(fields()).await.unwrap();

        let ids: Vec<Uuid> = backend
            .list_recipes()
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn watch_starts_with_current_state() {
        let backend = MemoryBackend::new();
        let user = backend
            .sign_up("ana@example.com", "secret1", "Ana")
            .await
            .unwrap();

        let mut watch = backend.watch_favorites(user.id).await.unwrap();
        assert_eq!(watch.next().await, Some(None));

        let recipe = Uuid::new_v4();
        backend.add_favorite(user.id, recipe).await.unwrap();
        assert_eq!(watch.next().await, Some(Some(vec![recipe])));

        drop(watch);
        assert_eq!(backend.favorites_watchers(user.id), 0);
    }

    #[tokio::test]
    async fn deleting_a_missing_blob_succeeds() {
        let backend = MemoryBackend::new();
        backend.delete("memory://images/nope.png").await.unwrap();
    }
}
