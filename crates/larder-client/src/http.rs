use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

use larder_types::api::{
    FavoritesResponse, LikeResponse, LoginRequest, RecipeListQuery, RegisterRequest,
    SessionResponse, UploadQuery, UploadResponse,
};
use larder_types::events::{GatewayCommand, GatewayEvent};
use larder_types::models::{Recipe, RecipeFields, User};
use larder_types::validation::ValidationError;

use crate::backend::{AuthProvider, BlobStore, DocumentStore, Watch};
use crate::error::{AuthError, Error, LOGIN_PROMPT, Result};

/// Backend that talks to a Larder server over REST and the WebSocket
/// gateway. The bearer token from the last sign-in is attached to every
/// request.
pub struct HttpBackend {
    client: Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = token;
    }

    fn authed(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.token().ok_or(Error::NotAuthenticated(LOGIN_PROMPT))?;
        Ok(request.bearer_auth(token))
    }

    /// Image URLs handed out by the server are relative to it.
    fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            self.url(url)
        }
    }

    fn gateway_url(&self) -> String {
        let base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.base_url.clone()
        };
        format!("{}/gateway", base)
    }

    async fn session(&self, request: RequestBuilder, bad_status: AuthError) -> Result<User> {
        let response = request
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let response = match response.status() {
            s if s.is_success() => response,
            StatusCode::UNAUTHORIZED => return Err(AuthError::InvalidCredential.into()),
            StatusCode::CONFLICT => return Err(AuthError::EmailAlreadyInUse.into()),
            StatusCode::BAD_REQUEST => return Err(bad_status.into()),
            s => return Err(AuthError::Network(format!("server returned {}", s)).into()),
        };

        let session: SessionResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;
        self.set_token(Some(session.token));
        Ok(session.user)
    }
}

async fn send(request: RequestBuilder) -> Result<Response> {
    let response = request.send().await.map_err(Error::transient)?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(match status {
        StatusCode::UNAUTHORIZED => Error::NotAuthenticated(LOGIN_PROMPT),
        StatusCode::FORBIDDEN => Error::Permission,
        StatusCode::NOT_FOUND => Error::NotFound,
        StatusCode::PAYLOAD_TOO_LARGE => ValidationError::ImageTooLarge.into(),
        StatusCode::UNSUPPORTED_MEDIA_TYPE => ValidationError::NotAnImage.into(),
        s => Error::transient(format!("server returned {}", s)),
    })
}

async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
    send(request).await?.json().await.map_err(Error::transient)
}

/// A 404 means the document does not exist.
fn optional<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(Error::NotFound) => Ok(None),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl AuthProvider for HttpBackend {
    async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> Result<User> {
        let request = self.client.post(self.url("/auth/register")).json(&RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            display_name: display_name.to_string(),
        });
        let user = self.session(request, AuthError::WeakPassword).await?;
        info!("Registered {} with {}", user.id, self.base_url);
        Ok(user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<User> {
        let request = self.client.post(self.url("/auth/login")).json(&LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        });
        self.session(request, AuthError::InvalidCredential).await
    }

    async fn sign_out(&self) -> Result<()> {
        self.set_token(None);
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for HttpBackend {
    async fn create_recipe(&self, fields: RecipeFields) -> Result<Recipe> {
        send_json(self.authed(self.client.post(self.url("/recipes")))?.json(&fields)).await
    }

    async fn update_recipe(&self, id: Uuid, fields: RecipeFields) -> Result<Recipe> {
        let url = self.url(&format!("/recipes/{}", id));
        send_json(self.authed(self.client.put(url))?.json(&fields)).await
    }

    async fn delete_recipe(&self, id: Uuid) -> Result<()> {
        let url = self.url(&format!("/recipes/{}", id));
        send(self.authed(self.client.delete(url))?).await?;
        Ok(())
    }

    async fn get_recipe(&self, id: Uuid) -> Result<Option<Recipe>> {
        let url = self.url(&format!("/recipes/{}", id));
        optional(send_json(self.client.get(url)).await)
    }

    async fn list_recipes(&self) -> Result<Vec<Recipe>> {
        send_json(self.client.get(self.url("/recipes"))).await
    }

    async fn list_recipes_by_owner(&self, owner_id: Uuid) -> Result<Vec<Recipe>> {
        let query = RecipeListQuery {
            owner: Some(owner_id),
        };
        send_json(self.client.get(self.url("/recipes")).query(&query)).await
    }

    async fn set_like(&self, recipe_id: Uuid, user_id: Uuid, liked: bool) -> Result<LikeResponse> {
        let url = self.url(&format!("/recipes/{}/likes/{}", recipe_id, user_id));
        let request = if liked {
            self.client.put(url)
        } else {
            self.client.delete(url)
        };
        send_json(self.authed(request)?).await
    }

    async fn get_favorites(&self, user_id: Uuid) -> Result<Option<Vec<Uuid>>> {
        let url = self.url(&format!("/users/{}/favorites", user_id));
        let doc: Option<FavoritesResponse> =
            optional(send_json(self.authed(self.client.get(url))?).await)?;
        Ok(doc.map(|d| d.favorites))
    }

    async fn create_favorites(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        let url = self.url(&format!("/users/{}/favorites", user_id));
        let doc: FavoritesResponse = send_json(self.authed(self.client.put(url))?).await?;
        Ok(doc.favorites)
    }

    async fn add_favorite(&self, user_id: Uuid, recipe_id: Uuid) -> Result<Vec<Uuid>> {
        let url = self.url(&format!("/users/{}/favorites/{}", user_id, recipe_id));
        let doc: FavoritesResponse = send_json(self.authed(self.client.put(url))?).await?;
        Ok(doc.favorites)
    }

    async fn remove_favorite(&self, user_id: Uuid, recipe_id: Uuid) -> Result<Vec<Uuid>> {
        let url = self.url(&format!("/users/{}/favorites/{}", user_id, recipe_id));
        let doc: FavoritesResponse = send_json(self.authed(self.client.delete(url))?).await?;
        Ok(doc.favorites)
    }

    async fn watch_favorites(&self, user_id: Uuid) -> Result<Watch<Option<Vec<Uuid>>>> {
        let token = self.token().ok_or(Error::NotAuthenticated(LOGIN_PROMPT))?;

        let (mut socket, _) = connect_async(self.gateway_url())
            .await
            .map_err(Error::transient)?;

        let identify = serde_json::to_string(&GatewayCommand::Identify { token })
            .map_err(Error::transient)?;
        socket
            .send(Message::Text(identify.into()))
            .await
            .map_err(Error::transient)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            while let Some(frame) = socket.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("Gateway connection error: {}", e);
                        break;
                    }
                };

                match serde_json::from_str::<GatewayEvent>(text.as_str()) {
                    Ok(GatewayEvent::FavoritesSnapshot {
                        user_id: owner,
                        favorites,
                    }) if owner == user_id => {
                        if tx.send(favorites).is_err() {
                            break;
                        }
                    }
                    Ok(GatewayEvent::Ready { display_name, .. }) => {
                        debug!("Gateway ready for {}", display_name);
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Unreadable gateway event: {}", e),
                }
            }
            debug!("Favorites watch for {} closed", user_id);
        });

        Ok(Watch::with_task(rx, task))
    }
}

#[async_trait]
impl BlobStore for HttpBackend {
    async fn upload(
        &self,
        filename: &str,
        content_type: &str,
        bytes: Bytes,
    ) -> Result<UploadResponse> {
        let request = self
            .client
            .post(self.url("/images"))
            .query(&UploadQuery {
                filename: filename.to_string(),
            })
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes);
        send_json(self.authed(request)?).await
    }

    async fn delete(&self, url: &str) -> Result<()> {
        match send(self.authed(self.client.delete(self.resolve(url)))?).await {
            Ok(_) | Err(Error::NotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
