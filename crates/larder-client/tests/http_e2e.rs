//! Drives a real server on a loopback port through `HttpBackend`.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use uuid::Uuid;

use larder_api::favorites::FavoritesLocks;
use larder_api::{AppState, AppStateInner, routes};
use larder_client::interactions::LikeOutcome;
use larder_client::{
    AuthError, Backend, DocumentStore, DraftImage, Error, HttpBackend, ImageUpload, Larder,
    RecipeDraft,
};
use larder_db::Database;
use larder_gateway::dispatcher::Dispatcher;
use larder_storage::BlobStorage;
use larder_types::models::Category;

async fn spawn_server() -> String {
    let image_dir = std::env::temp_dir().join(format!("larder_e2e_{}", Uuid::new_v4()));
    let state: AppState = Arc::new(AppStateInner {
        db: Arc::new(Database::open_in_memory().unwrap()),
        storage: BlobStorage::new(image_dir).await.unwrap(),
        jwt_secret: "e2e-secret".into(),
        dispatcher: Dispatcher::new(),
        favorites_locks: FavoritesLocks::default(),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, routes::router(state)).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client(base_url: &str) -> (Arc<HttpBackend>, Larder) {
    let backend = Arc::new(HttpBackend::new(base_url));
    let app = Larder::new(Backend::shared(backend.clone()));
    app.init();
    (backend, app)
}

async fn attached(app: &Larder) {
    let user_id = app.session().current_user().map(|u| u.id);
    tokio::time::timeout(Duration::from_secs(5), async {
        while app.favorites().user_id() != user_id || !app.favorites().is_live() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("favorites never attached");
}

async fn wait_for_favorites(app: &Larder, pred: impl FnMut(&Vec<Uuid>) -> bool) {
    let mut rx = app.favorites().changes();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
        .await
        .expect("favorites did not update")
        .unwrap();
}

fn soup() -> RecipeDraft {
    RecipeDraft {
        title: "Miso Soup".into(),
        description: "Quick and warming".into(),
        prep_time_minutes: Some(30),
        category: Category::Dinner,
        ingredients: vec!["miso".into(), "tofu".into()],
        steps: vec!["Whisk miso into hot dashi".into()],
        image: DraftImage::New(ImageUpload {
            filename: "miso soup.png".into(),
            content_type: "image/png".into(),
            bytes: Bytes::from_static(b"\x89PNG\r\n\x1a\n"),
        }),
        ..RecipeDraft::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn auth_errors_come_back_typed() {
    let base = spawn_server().await;
    let (_, app) = client(&base);

    app.session()
        .signup("ana@example.com", "secret1", "Ana")
        .await
        .unwrap();
    app.session().logout().await.unwrap();

    let (_, other) = client(&base);
    assert_eq!(
        other
            .session()
            .signup("ana@example.com", "secret2", "Ana Again")
            .await
            .unwrap_err(),
        Error::Auth(AuthError::EmailAlreadyInUse)
    );
    assert_eq!(
        other
            .session()
            .login("ana@example.com", "not-it")
            .await
            .unwrap_err(),
        Error::Auth(AuthError::InvalidCredential)
    );
    let user = other.session().login("ana@example.com", "secret1").await.unwrap();
    assert_eq!(user.display_name, "Ana");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn recipe_lifecycle_over_http() {
    let base = spawn_server().await;

    let (_, ana) = client(&base);
    ana.session()
        .signup("ana@example.com", "secret1", "Ana")
        .await
        .unwrap();
    attached(&ana).await;

    let recipe = ana.recipes().create(soup()).await.unwrap();
    assert_eq!(recipe.like_count, 0);
    assert_eq!(recipe.title_lower, "miso soup");
    assert!(recipe.image_url.starts_with("/images/"));

    let image = reqwest::get(format!("{}{}", base, recipe.image_url))
        .await
        .unwrap();
    assert_eq!(image.status(), reqwest::StatusCode::OK);

    let mut feed = ana.feed().await.unwrap();
    feed.toggle_category(Category::Dinner);
    assert_eq!(feed.visible().len(), 1);
    assert_eq!(ana.dashboard().await.unwrap()[0].id, recipe.id);

    // Second user likes, saves, then unlikes
    let (bo_backend, bo) = client(&base);
    let bo_user = bo
        .session()
        .signup("bo@example.com", "secret2", "Bo")
        .await
        .unwrap();
    attached(&bo).await;

    let toggle = bo.like_toggle(bo.recipes().get_by_id(recipe.id).await.unwrap());
    assert_eq!(toggle.toggle().await.unwrap(), LikeOutcome::Liked);
    let stored = ana.recipes().get_by_id(recipe.id).await.unwrap();
    assert_eq!(stored.like_count, 1);
    assert!(stored.liked_by.contains(&bo_user.id));

    assert_eq!(toggle.toggle().await.unwrap(), LikeOutcome::Unliked);
    let stored = ana.recipes().get_by_id(recipe.id).await.unwrap();
    assert_eq!(stored.like_count, 0);
    assert!(stored.liked_by.is_empty());

    // The server refuses edits from anyone but the owner
    assert_eq!(
        bo_backend
            .update_recipe(recipe.id, stored.fields())
            .await
            .unwrap_err(),
        Error::Permission
    );

    bo.toggle_favorite(recipe.id).await.unwrap();
    wait_for_favorites(&bo, |ids| ids.contains(&recipe.id)).await;
    assert_eq!(bo.favorite_recipes().await.unwrap().len(), 1);

    ana.recipes().delete(recipe.id).await.unwrap();
    assert!(bo.feed().await.unwrap().visible().is_empty());
    assert!(bo.favorite_recipes().await.unwrap().is_empty());

    let image = reqwest::get(format!("{}{}", base, recipe.image_url))
        .await
        .unwrap();
    assert_eq!(image.status(), reqwest::StatusCode::NOT_FOUND);

    ana.dispose();
    bo.dispose();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn favorites_push_across_sessions() {
    let base = spawn_server().await;

    let (_, phone) = client(&base);
    phone
        .session()
        .signup("ana@example.com", "secret1", "Ana")
        .await
        .unwrap();
    attached(&phone).await;

    let (_, laptop) = client(&base);
    laptop
        .session()
        .login("ana@example.com", "secret1")
        .await
        .unwrap();
    attached(&laptop).await;

    let saved = Uuid::new_v4();
    laptop.favorites().add(saved).await.unwrap();
    wait_for_favorites(&phone, |ids| ids == &vec![saved]).await;

    laptop.favorites().remove(saved).await.unwrap();
    wait_for_favorites(&phone, |ids| ids.is_empty()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_signups_for_one_email_get_a_conflict() {
    use larder_client::AuthProvider;

    let base = spawn_server().await;
    let backends: Vec<HttpBackend> = (0..4).map(|_| HttpBackend::new(&base)).collect();

    let results = futures_util::future::join_all(
        backends
            .iter()
            .map(|b| b.sign_up("race@example.com", "secret1", "Racer")),
    )
    .await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.into_iter().filter_map(|r| r.err()) {
        assert_eq!(err, Error::Auth(AuthError::EmailAlreadyInUse));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_pushed_favorites_match_the_stored_document() {
    use larder_client::AuthProvider;

    let base = spawn_server().await;
    let phone = HttpBackend::new(&base);
    let laptop = HttpBackend::new(&base);
    let user = phone
        .sign_up("ana@example.com", "secret1", "Ana")
        .await
        .unwrap();
    laptop.sign_in("ana@example.com", "secret1").await.unwrap();
    phone.create_favorites(user.id).await.unwrap();

    let mut watch = phone.watch_favorites(user.id).await.unwrap();
    assert_eq!(watch.next().await, Some(Some(Vec::new())));

    let ids: Vec<Uuid> = (0..12).map(|_| Uuid::new_v4()).collect();
    let writes = ids.iter().enumerate().map(|(i, id)| {
        let (phone, laptop, user_id) = (&phone, &laptop, user.id);
        async move {
            let tab = if i % 2 == 0 { phone } else { laptop };
            tab.add_favorite(user_id, *id).await.unwrap();
            if i % 3 == 0 {
                tab.remove_favorite(user_id, *id).await.unwrap();
            }
        }
    });
    futures_util::future::join_all(writes).await;

    let stored = phone.get_favorites(user.id).await.unwrap();

    let mut last = None;
    while let Ok(Some(snapshot)) =
        tokio::time::timeout(Duration::from_millis(300), watch.next()).await
    {
        last = Some(snapshot);
    }
    assert_eq!(last, Some(stored));
}
