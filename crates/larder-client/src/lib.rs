//! Client-side synchronization layer for Larder.
//!
//! The stores in this crate keep the signed-in user, that user's live
//! favorites and the derived recipe feed consistent with a backend reached
//! through the traits in [`backend`]. [`HttpBackend`] talks to the Larder
//! server; [`MemoryBackend`] keeps everything in process.

pub mod app;
pub mod backend;
pub mod error;
pub mod favorites;
pub mod feed;
pub mod format;
pub mod http;
pub mod interactions;
pub mod load;
pub mod memory;
pub mod recipes;
pub mod routes;
pub mod session;
pub mod subscription;
pub mod theme;

pub use app::Larder;
pub use backend::{AuthProvider, Backend, BlobStore, DocumentStore, Watch};
pub use error::{AuthError, Error, Result};
pub use favorites::FavoritesStore;
pub use feed::{FeedQuery, FeedViewModel, SortOption};
pub use http::HttpBackend;
pub use memory::MemoryBackend;
pub use recipes::{DraftImage, ImageUpload, RecipeDraft, RecipeRepository};
pub use session::SessionStore;
pub use subscription::Subscription;
pub use theme::{Theme, ThemeStore};
