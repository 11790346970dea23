use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use larder_types::api::{LikeResponse, UploadResponse};
use larder_types::models::{Recipe, RecipeFields, User};

use crate::error::Result;

/// Email/password identity provider.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> Result<User>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<User>;
    async fn sign_out(&self) -> Result<()>;
}

/// The `recipes` and `users` collections.
///
/// Writes act as the user most recently signed in through the same backend;
/// owner fields and timestamps are assigned by the store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create_recipe(&self, fields: RecipeFields) -> Result<Recipe>;
    async fn update_recipe(&self, id: Uuid, fields: RecipeFields) -> Result<Recipe>;
    async fn delete_recipe(&self, id: Uuid) -> Result<()>;
    async fn get_recipe(&self, id: Uuid) -> Result<Option<Recipe>>;
    /// Newest first.
    async fn list_recipes(&self) -> Result<Vec<Recipe>>;
    /// Newest first.
    async fn list_recipes_by_owner(&self, owner_id: Uuid) -> Result<Vec<Recipe>>;

    /// Add or remove `user_id` from the recipe's likers, adjusting the
    /// counter in the same write.
    async fn set_like(&self, recipe_id: Uuid, user_id: Uuid, liked: bool) -> Result<LikeResponse>;

    /// `None` when the user has no favorites document yet.
    async fn get_favorites(&self, user_id: Uuid) -> Result<Option<Vec<Uuid>>>;
    /// Create an empty document unless one exists. Returns its content.
    async fn create_favorites(&self, user_id: Uuid) -> Result<Vec<Uuid>>;
    async fn add_favorite(&self, user_id: Uuid, recipe_id: Uuid) -> Result<Vec<Uuid>>;
    async fn remove_favorite(&self, user_id: Uuid, recipe_id: Uuid) -> Result<Vec<Uuid>>;

    /// Live view of a favorites document. The current state is delivered
    /// first, then every change.
    async fn watch_favorites(&self, user_id: Uuid) -> Result<Watch<Option<Vec<Uuid>>>>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, filename: &str, content_type: &str, bytes: Bytes)
    -> Result<UploadResponse>;
    /// Deleting an object that is already gone succeeds.
    async fn delete(&self, url: &str) -> Result<()>;
}

/// The three services a [`crate::Larder`] is built from.
#[derive(Clone)]
pub struct Backend {
    pub auth: Arc<dyn AuthProvider>,
    pub docs: Arc<dyn DocumentStore>,
    pub blobs: Arc<dyn BlobStore>,
}

impl Backend {
    /// Use one object for all three services.
    pub fn shared<B>(backend: Arc<B>) -> Self
    where
        B: AuthProvider + DocumentStore + BlobStore + 'static,
    {
        Self {
            auth: backend.clone(),
            docs: backend.clone(),
            blobs: backend,
        }
    }
}

/// Receiving end of a live subscription. Dropping it stops the feed.
pub struct Watch<T> {
    rx: mpsc::UnboundedReceiver<T>,
    task: Option<JoinHandle<()>>,
}

impl<T> Watch<T> {
    pub fn new(rx: mpsc::UnboundedReceiver<T>) -> Self {
        Self { rx, task: None }
    }

    /// A watch fed by `task`, which is aborted when the watch is dropped.
    pub fn with_task(rx: mpsc::UnboundedReceiver<T>, task: JoinHandle<()>) -> Self {
        Self {
            rx,
            task: Some(task),
        }
    }

    /// Next update, or `None` once the source has gone away.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}

impl<T> Drop for Watch<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
