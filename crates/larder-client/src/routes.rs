use std::fmt;

use uuid::Uuid;

use larder_types::models::User;

/// Pages of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Feed,
    RecipeDetail(Uuid),
    Login,
    Register,
    Dashboard,
    CreateRecipe,
    EditRecipe(Uuid),
    Favorites,
}

impl Route {
    pub fn parse(path: &str) -> Option<Route> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [] => Some(Route::Feed),
            ["recipe", id] => id.parse().ok().map(Route::RecipeDetail),
            ["login"] => Some(Route::Login),
            ["register"] => Some(Route::Register),
            ["dashboard"] => Some(Route::Dashboard),
            ["create-recipe"] => Some(Route::CreateRecipe),
            ["edit-recipe", id] => id.parse().ok().map(Route::EditRecipe),
            ["favorites"] => Some(Route::Favorites),
            _ => None,
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Feed => "/".into(),
            Route::RecipeDetail(id) => format!("/recipe/{}", id),
            Route::Login => "/login".into(),
            Route::Register => "/register".into(),
            Route::Dashboard => "/dashboard".into(),
            Route::CreateRecipe => "/create-recipe".into(),
            Route::EditRecipe(id) => format!("/edit-recipe/{}", id),
            Route::Favorites => "/favorites".into(),
        }
    }

    pub fn requires_auth(&self) -> bool {
        matches!(
            self,
            Route::Dashboard | Route::CreateRecipe | Route::EditRecipe(_) | Route::Favorites
        )
    }

    /// The route to actually show: signed-out visitors of private pages
    /// land on the login page.
    pub fn guard(self, user: Option<&User>) -> Route {
        if self.requires_auth() && user.is_none() {
            Route::Login
        } else {
            self
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}
