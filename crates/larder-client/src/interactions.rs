use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;
use uuid::Uuid;

use larder_types::models::Recipe;

use crate::backend::DocumentStore;
use crate::error::{Error, Result};
use crate::favorites::FavoritesStore;
use crate::session::SessionStore;

pub const LIKE_LOGIN_PROMPT: &str = "Please log in to like recipes.";
pub const FAVORITE_LOGIN_PROMPT: &str = "Please log in to save favorites.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeOutcome {
    Liked,
    Unliked,
    /// A previous toggle was still in flight.
    Suppressed,
}

/// Like button state for one displayed recipe.
///
/// The local copy changes immediately and is reverted if the write fails.
/// Presses while a write is pending are ignored.
pub struct LikeToggle {
    docs: Arc<dyn DocumentStore>,
    session: SessionStore,
    recipe: Mutex<Recipe>,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when the toggle settles.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl LikeToggle {
    pub fn new(docs: Arc<dyn DocumentStore>, session: SessionStore, recipe: Recipe) -> Self {
        Self {
            docs,
            session,
            recipe: Mutex::new(recipe),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn recipe(&self) -> Recipe {
        self.lock().clone()
    }

    pub fn is_liked(&self) -> bool {
        self.session
            .current_user()
            .is_some_and(|u| self.lock().is_liked_by(u.id))
    }

    pub fn is_pending(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn toggle(&self) -> Result<LikeOutcome> {
        let user = self
            .session
            .current_user()
            .ok_or(Error::NotAuthenticated(LIKE_LOGIN_PROMPT))?;

        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Ok(LikeOutcome::Suppressed);
        }
        let _guard = InFlight(&self.in_flight);

        let (recipe_id, liked, before) = {
            let mut recipe = self.lock();
            let before = (recipe.like_count, recipe.liked_by.clone());
            let liked = !recipe.is_liked_by(user.id);
            recipe.set_liked(user.id, liked);
            (recipe.id, liked, before)
        };

        match self.docs.set_like(recipe_id, user.id, liked).await {
            Ok(stored) => {
                let mut recipe = self.lock();
                recipe.like_count = stored.like_count;
                recipe.liked_by = stored.liked_by;
                Ok(if liked {
                    LikeOutcome::Liked
                } else {
                    LikeOutcome::Unliked
                })
            }
            Err(e) => {
                warn!("Failed to update like on {}: {}", recipe_id, e);
                let mut recipe = self.lock();
                (recipe.like_count, recipe.liked_by) = before;
                Err(e)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Recipe> {
        self.recipe.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavoriteOutcome {
    Added,
    Removed,
}

/// Save or unsave a recipe for the signed-in user.
pub async fn toggle_favorite(
    session: &SessionStore,
    favorites: &FavoritesStore,
    recipe_id: Uuid,
) -> Result<FavoriteOutcome> {
    if session.current_user().is_none() {
        return Err(Error::NotAuthenticated(FAVORITE_LOGIN_PROMPT));
    }

    if favorites.is_favorite(recipe_id) {
        favorites.remove(recipe_id).await?;
        Ok(FavoriteOutcome::Removed)
    } else {
        favorites.add(recipe_id).await?;
        Ok(FavoriteOutcome::Added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::AuthProvider;
    use crate::memory::MemoryBackend;
    use larder_types::models::{Category, Difficulty, RecipeFields};

    fn fields() -> RecipeFields {
        RecipeFields {
            title: "Soup".into(),
            description: "Warm".into(),
            prep_time_minutes: 15,
            difficulty: Difficulty::Easy,
            category: Category::Lunch,
            is_vegetarian: true,
            ingredients: vec!["water".into()],
            steps: vec!["Boil".into()],
            image_url: "memory://images/soup.png".into(),
        }
    }

    async fn published() -> (Arc<MemoryBackend>, Recipe) {
        let backend = Arc::new(MemoryBackend::new());
        backend
            .sign_up("owner@example.com", "secret1", "Owner")
            .await
            .unwrap();
        let recipe = backend.create_recipe(fields()).await.unwrap();
        (backend, recipe)
    }

    #[tokio::test]
    async fn like_requires_a_user() {
        let (backend, recipe) = published().await;
        let viewer = backend.connect();
        let toggle = LikeToggle::new(viewer.clone(), SessionStore::new(viewer), recipe);

        let err = toggle.toggle().await.unwrap_err();
        assert_eq!(err.user_message(), "Please log in to like recipes.");
        assert_eq!(toggle.recipe().like_count, 0);
    }

    #[tokio::test]
    async fn count_always_matches_likers() {
        let (backend, recipe) = published().await;

        let mut toggles = Vec::new();
        for email in ["a@example.com", "b@example.com", "c@example.com"] {
            let tab = backend.connect();
            let session = SessionStore::new(tab.clone());
            session.signup(email, "secret1", "User").await.unwrap();
            toggles.push(LikeToggle::new(tab, session, recipe.clone()));
        }

        for step in [0, 1, 2, 0, 1, 0] {
            toggles[step].toggle().await.unwrap();
            let stored = backend.get_recipe(recipe.id).await.unwrap().unwrap();
            assert_eq!(stored.like_count as usize, stored.liked_by.len());
            let local = toggles[step].recipe();
            assert_eq!(local.like_count as usize, local.liked_by.len());
        }

        let stored = backend.get_recipe(recipe.id).await.unwrap().unwrap();
        // a toggled three times, b twice, c once
        assert_eq!(stored.like_count, 2);
    }

    #[tokio::test]
    async fn double_press_is_suppressed() {
        let (backend, recipe) = published().await;
        let tab = backend.connect();
        let session = SessionStore::new(tab.clone());
        session.signup("fan@example.com", "secret1", "Fan").await.unwrap();
        let toggle = LikeToggle::new(tab, session, recipe.clone());

        let (first, second) = tokio::join!(toggle.toggle(), toggle.toggle());
        assert_eq!(first.unwrap(), LikeOutcome::Liked);
        assert_eq!(second.unwrap(), LikeOutcome::Suppressed);
        assert!(!toggle.is_pending());
        assert!(toggle.is_liked());

        let stored = backend.get_recipe(recipe.id).await.unwrap().unwrap();
        assert_eq!(stored.like_count, 1);
    }

    #[tokio::test]
    async fn failed_write_reverts_local_state() {
        let (backend, recipe) = published().await;
        let tab = backend.connect();
        let session = SessionStore::new(tab.clone());
        session.signup("fan@example.com", "secret1", "Fan").await.unwrap();

        // Recipe vanished before the like landed
        backend.delete_recipe(recipe.id).await.unwrap();
        let toggle = LikeToggle::new(tab, session, recipe);

        assert_eq!(toggle.toggle().await.unwrap_err(), Error::NotFound);
        assert_eq!(toggle.recipe().like_count, 0);
        assert!(toggle.recipe().liked_by.is_empty());
        assert!(!toggle.is_pending());
    }

    #[tokio::test]
    async fn favorite_toggle_flips_membership() {
        let backend = Arc::new(MemoryBackend::new());
        let session = SessionStore::new(backend.clone());
        let favorites = FavoritesStore::new(backend.clone());
        let recipe_id = Uuid::new_v4();

        let err = toggle_favorite(&session, &favorites, recipe_id)
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "Please log in to save favorites.");

        let user = session
            .signup("ana@example.com", "secret1", "Ana")
            .await
            .unwrap();
        favorites.attach(Some(&user)).await.unwrap();

        assert_eq!(
            toggle_favorite(&session, &favorites, recipe_id).await.unwrap(),
            FavoriteOutcome::Added
        );
        assert!(favorites.is_favorite(recipe_id));
        assert_eq!(
            toggle_favorite(&session, &favorites, recipe_id).await.unwrap(),
            FavoriteOutcome::Removed
        );
        assert!(!favorites.is_favorite(recipe_id));
    }
}
