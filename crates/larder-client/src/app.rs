use std::sync::Mutex;

use tracing::info;
use uuid::Uuid;

use larder_types::models::Recipe;

use crate::backend::Backend;
use crate::error::{Error, LOGIN_PROMPT, Result};
use crate::favorites::FavoritesStore;
use crate::feed::FeedViewModel;
use crate::interactions::{self, FavoriteOutcome, LikeToggle};
use crate::recipes::RecipeRepository;
use crate::routes::Route;
use crate::session::SessionStore;
use crate::subscription::Subscription;
use crate::theme::ThemeStore;

/// Application root: builds every store from one [`Backend`] and owns the
/// session-to-favorites wiring between [`Larder::init`] and
/// [`Larder::dispose`].
pub struct Larder {
    backend: Backend,
    session: SessionStore,
    favorites: FavoritesStore,
    recipes: RecipeRepository,
    theme: ThemeStore,
    follower: Mutex<Option<Subscription>>,
}

impl Larder {
    pub fn new(backend: Backend) -> Self {
        let session = SessionStore::new(backend.auth.clone());
        let favorites = FavoritesStore::new(backend.docs.clone());
        let recipes = RecipeRepository::new(backend.docs.clone(), backend.blobs.clone(), session.clone());
        Self {
            backend,
            session,
            favorites,
            recipes,
            theme: ThemeStore::default(),
            follower: Mutex::new(None),
        }
    }

    /// Start keeping favorites in step with the signed-in user.
    pub fn init(&self) {
        let mut follower = self.follower.lock().unwrap_or_else(|e| e.into_inner());
        if follower.is_none() {
            *follower = Some(self.favorites.follow(&self.session));
            info!("Larder client started");
        }
    }

    /// Stop every live subscription. Safe to call more than once.
    pub fn dispose(&self) {
        let follower = self.follower.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(follower) = follower {
            follower.unsubscribe();
            info!("Larder client stopped");
        }
        self.favorites.detach();
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn favorites(&self) -> &FavoritesStore {
        &self.favorites
    }

    pub fn recipes(&self) -> &RecipeRepository {
        &self.recipes
    }

    pub fn theme(&self) -> &ThemeStore {
        &self.theme
    }

    /// Resolve a requested route against the current session.
    pub fn navigate(&self, route: Route) -> Route {
        route.guard(self.session.current_user().as_ref())
    }

    /// Load the feed, newest first.
    pub async fn feed(&self) -> Result<FeedViewModel> {
        Ok(FeedViewModel::new(self.recipes.list_all().await?))
    }

    /// The signed-in user's own recipes, newest first.
    pub async fn dashboard(&self) -> Result<Vec<Recipe>> {
        let user = self
            .session
            .current_user()
            .ok_or(Error::NotAuthenticated(LOGIN_PROMPT))?;
        self.recipes.list_by_owner(user.id).await
    }

    /// Recipes on the favorites list that still exist.
    pub async fn favorite_recipes(&self) -> Result<Vec<Recipe>> {
        if self.session.current_user().is_none() {
            return Err(Error::NotAuthenticated(LOGIN_PROMPT));
        }
        self.recipes.list_by_ids(&self.favorites.favorites()).await
    }

    pub fn like_toggle(&self, recipe: Recipe) -> LikeToggle {
        LikeToggle::new(self.backend.docs.clone(), self.session.clone(), recipe)
    }

    pub async fn toggle_favorite(&self, recipe_id: Uuid) -> Result<FavoriteOutcome> {
        interactions::toggle_favorite(&self.session, &self.favorites, recipe_id).await
    }
}

impl Drop for Larder {
    fn drop(&mut self) {
        self.dispose();
    }
}
