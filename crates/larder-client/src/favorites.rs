use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use larder_types::models::User;

use crate::backend::DocumentStore;
use crate::error::Result;
use crate::session::SessionStore;
use crate::subscription::Subscription;

/// Live set of recipe ids the signed-in user has saved.
///
/// While a user is attached, a backend subscription keeps the local list in
/// step with the user's favorites document. A missing document is created
/// empty the first time it is seen.
#[derive(Clone)]
pub struct FavoritesStore {
    inner: Arc<FavoritesInner>,
}

struct FavoritesInner {
    docs: Arc<dyn DocumentStore>,
    favorites: watch::Sender<Vec<Uuid>>,
    attached: Mutex<Attached>,
}

#[derive(Default)]
struct Attached {
    user_id: Option<Uuid>,
    live: Option<Subscription>,
}

impl FavoritesInner {
    fn attached(&self) -> MutexGuard<'_, Attached> {
        self.attached.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn user_id(&self) -> Option<Uuid> {
        self.attached().user_id
    }

    /// Apply a list only if it still belongs to the attached user.
    fn publish(&self, user_id: Uuid, favorites: Vec<Uuid>) {
        if self.user_id() == Some(user_id) {
            self.favorites.send_replace(favorites);
        }
    }
}

impl FavoritesStore {
    pub fn new(docs: Arc<dyn DocumentStore>) -> Self {
        let (favorites, _) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(FavoritesInner {
                docs,
                favorites,
                attached: Mutex::new(Attached::default()),
            }),
        }
    }

    /// Switch to `user`, or to the signed-out state for `None`. The previous
    /// subscription is torn down first.
    pub async fn attach(&self, user: Option<&User>) -> Result<()> {
        self.detach();
        let Some(user) = user else {
            return Ok(());
        };
        let user_id = user.id;

        let mut watch = self.inner.docs.watch_favorites(user_id).await?;

        // Hold the lock until the listener is stored so its first publish
        // already sees the new user
        let mut attached = self.inner.attached();
        let weak: Weak<FavoritesInner> = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            while let Some(snapshot) = watch.next().await {
                let Some(inner) = weak.upgrade() else { break };
                match snapshot {
                    Some(ids) => inner.publish(user_id, ids),
                    None => {
                        debug!("No favorites document for {}, creating it", user_id);
                        match inner.docs.create_favorites(user_id).await {
                            Ok(ids) => inner.publish(user_id, ids),
                            Err(e) => warn!("Failed to create favorites for {}: {}", user_id, e),
                        }
                    }
                }
            }
        });

        attached.user_id = Some(user_id);
        attached.live = Some(Subscription::new(task));
        drop(attached);
        info!("Favorites following {}", user_id);
        Ok(())
    }

    /// Drop the live subscription and clear local state.
    pub fn detach(&self) {
        let previous = std::mem::take(&mut *self.inner.attached());
        if let Some(live) = previous.live {
            live.unsubscribe();
        }
        if previous.user_id.is_some() {
            self.inner.favorites.send_replace(Vec::new());
        }
    }

    /// Re-attach whenever the session's user changes. The returned handle
    /// stops following when dropped.
    pub fn follow(&self, session: &SessionStore) -> Subscription {
        let mut users = session.subscribe();
        let store = self.clone();
        Subscription::new(tokio::spawn(async move {
            loop {
                let user = users.borrow_and_update().clone();
                if let Err(e) = store.attach(user.as_ref()).await {
                    warn!("Failed to subscribe to favorites: {}", e);
                }
                if users.changed().await.is_err() {
                    break;
                }
            }
        }))
    }

    /// Save a recipe. Without a user this does nothing.
    pub async fn add(&self, recipe_id: Uuid) -> Result<()> {
        let Some(user_id) = self.inner.user_id() else {
            return Ok(());
        };
        let ids = self.inner.docs.add_favorite(user_id, recipe_id).await?;
        self.inner.publish(user_id, ids);
        Ok(())
    }

    /// Unsave a recipe. Without a user this does nothing.
    pub async fn remove(&self, recipe_id: Uuid) -> Result<()> {
        let Some(user_id) = self.inner.user_id() else {
            return Ok(());
        };
        let ids = self.inner.docs.remove_favorite(user_id, recipe_id).await?;
        self.inner.publish(user_id, ids);
        Ok(())
    }

    pub fn is_favorite(&self, recipe_id: Uuid) -> bool {
        self.inner.favorites.borrow().contains(&recipe_id)
    }

    pub fn favorites(&self) -> Vec<Uuid> {
        self.inner.favorites.borrow().clone()
    }

    pub fn changes(&self) -> watch::Receiver<Vec<Uuid>> {
        self.inner.favorites.subscribe()
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.inner.user_id()
    }

    pub fn is_live(&self) -> bool {
        self.inner
            .attached()
            .live
            .as_ref()
            .is_some_and(Subscription::is_active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::backend::AuthProvider;
    use crate::memory::MemoryBackend;

    async fn wait_for(store: &FavoritesStore, pred: impl FnMut(&Vec<Uuid>) -> bool) {
        let mut rx = store.changes();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(pred))
            .await
            .expect("favorites never reached the expected state")
            .unwrap();
    }

    async fn signed_in() -> (Arc<MemoryBackend>, User) {
        let backend = Arc::new(MemoryBackend::new());
        let user = backend
            .sign_up("ana@example.com", "secret1", "Ana")
            .await
            .unwrap();
        (backend, user)
    }

    #[tokio::test]
    async fn attach_creates_missing_document() {
        let (backend, user) = signed_in().await;
        assert_eq!(backend.get_favorites(user.id).await.unwrap(), None);

        let store = FavoritesStore::new(backend.clone());
        store.attach(Some(&user)).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while backend.get_favorites(user.id).await.unwrap().is_none() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert!(store.favorites().is_empty());
        assert!(store.is_live());
    }

    #[tokio::test]
    async fn add_and_remove_are_idempotent() {
        let (backend, user) = signed_in().await;
        let store = FavoritesStore::new(backend.clone());
        store.attach(Some(&user)).await.unwrap();

        let recipe = Uuid::new_v4();
        store.add(recipe).await.unwrap();
        store.add(recipe).await.unwrap();
        assert_eq!(store.favorites(), vec![recipe]);
        assert!(store.is_favorite(recipe));

        store.remove(Uuid::new_v4()).await.unwrap();
        assert_eq!(store.favorites(), vec![recipe]);

        store.remove(recipe).await.unwrap();
        store.remove(recipe).await.unwrap();
        assert!(store.favorites().is_empty());
    }

    #[tokio::test]
    async fn mutations_without_user_are_no_ops() {
        let backend = Arc::new(MemoryBackend::new());
        let store = FavoritesStore::new(backend);
        store.add(Uuid::new_v4()).await.unwrap();
        store.remove(Uuid::new_v4()).await.unwrap();
        assert!(store.favorites().is_empty());
        assert!(!store.is_live());
    }

    #[tokio::test]
    async fn pushes_from_another_session_arrive() {
        let (backend, user) = signed_in().await;
        let store = FavoritesStore::new(backend.clone());
        store.attach(Some(&user)).await.unwrap();

        let other_tab = backend.connect();
        other_tab.sign_in("ana@example.com", "secret1").await.unwrap();
        let recipe = Uuid::new_v4();
        other_tab.add_favorite(user.id, recipe).await.unwrap();

        wait_for(&store, |ids| ids.contains(&recipe)).await;
    }

    #[tokio::test]
    async fn detach_tears_down_the_subscription() {
        let (backend, user) = signed_in().await;
        let store = FavoritesStore::new(backend.clone());
        store.attach(Some(&user)).await.unwrap();
        store.add(Uuid::new_v4()).await.unwrap();
        assert_eq!(backend.favorites_watchers(user.id), 1);

        store.detach();
        assert!(store.favorites().is_empty());
        assert_eq!(store.user_id(), None);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(backend.favorites_watchers(user.id), 0);
    }

    #[tokio::test]
    async fn follow_tracks_login_and_logout() {
        let backend = Arc::new(MemoryBackend::new());
        let session = SessionStore::new(backend.clone());
        let store = FavoritesStore::new(backend.clone());
        let _follow = store.follow(&session);

        let user = session
            .signup("ana@example.com", "secret1", "Ana")
            .await
            .unwrap();
        let recipe = Uuid::new_v4();
        backend.add_favorite(user.id, recipe).await.unwrap();
        wait_for(&store, |ids| ids == &vec![recipe]).await;
        assert_eq!(store.user_id(), Some(user.id));

        session.logout().await.unwrap();
        wait_for(&store, |ids| ids.is_empty()).await;
        tokio::time::timeout(Duration::from_secs(2), async {
            while store.user_id().is_some() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }
}
