use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use larder_types::models::{Category, Difficulty, Recipe};

/// Recipes revealed per "load more".
pub const PAGE_SIZE: usize = 6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOption {
    #[default]
    Newest,
    Oldest,
    MostLiked,
}

/// Search, filter and sort inputs of the feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedQuery {
    pub search: String,
    /// Empty means every category.
    pub categories: BTreeSet<Category>,
    /// Empty means every difficulty.
    pub difficulties: BTreeSet<Difficulty>,
    pub sort: SortOption,
}

impl FeedQuery {
    pub fn matches(&self, recipe: &Recipe) -> bool {
        let term = self.search.to_lowercase();
        let text_match = term.is_empty()
            || recipe.title.to_lowercase().contains(&term)
            || recipe
                .ingredients
                .iter()
                .any(|i| i.to_lowercase().contains(&term));

        text_match
            && (self.categories.is_empty() || self.categories.contains(&recipe.category))
            && (self.difficulties.is_empty() || self.difficulties.contains(&recipe.difficulty))
    }

    pub fn is_filtered(&self) -> bool {
        !self.search.is_empty() || !self.categories.is_empty() || !self.difficulties.is_empty()
    }
}

/// Filter then sort. Ties keep their input order.
pub fn filter_and_sort(recipes: &[Recipe], query: &FeedQuery) -> Vec<Recipe> {
    let mut out: Vec<Recipe> = recipes.iter().filter(|r| query.matches(r)).cloned().collect();
    match query.sort {
        // A missing timestamp sorts as the earliest possible one
        SortOption::Newest => out.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        SortOption::Oldest => out.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        SortOption::MostLiked => out.sort_by(|a, b| b.like_count.cmp(&a.like_count)),
    }
    out
}

/// The browsable feed: a fetched recipe list viewed through a [`FeedQuery`]
/// and a growing page window.
///
/// The filtered list is recomputed only after an input changes.
#[derive(Debug)]
pub struct FeedViewModel {
    recipes: Vec<Recipe>,
    query: FeedQuery,
    visible_count: usize,
    filtered: Option<Vec<Recipe>>,
    computations: usize,
}

impl FeedViewModel {
    pub fn new(recipes: Vec<Recipe>) -> Self {
        Self {
            recipes,
            query: FeedQuery::default(),
            visible_count: PAGE_SIZE,
            filtered: None,
            computations: 0,
        }
    }

    pub fn set_recipes(&mut self, recipes: Vec<Recipe>) {
        self.recipes = recipes;
        self.filtered = None;
    }

    pub fn recipes(&self) -> &[Recipe] {
        &self.recipes
    }

    pub fn query(&self) -> &FeedQuery {
        &self.query
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        let search = search.into();
        if search != self.query.search {
            self.query.search = search;
            self.query_changed();
        }
    }

    pub fn toggle_category(&mut self, category: Category) {
        if !self.query.categories.remove(&category) {
            self.query.categories.insert(category);
        }
        self.query_changed();
    }

    pub fn toggle_difficulty(&mut self, difficulty: Difficulty) {
        if !self.query.difficulties.remove(&difficulty) {
            self.query.difficulties.insert(difficulty);
        }
        self.query_changed();
    }

    pub fn set_sort(&mut self, sort: SortOption) {
        if sort != self.query.sort {
            self.query.sort = sort;
            self.query_changed();
        }
    }

    /// Clear search, category and difficulty filters. The sort order stays.
    pub fn reset_filters(&mut self) {
        self.query = FeedQuery {
            sort: self.query.sort,
            ..FeedQuery::default()
        };
        self.query_changed();
    }

    pub fn load_more(&mut self) {
        self.visible_count += PAGE_SIZE;
    }

    /// The recipes currently on screen.
    pub fn visible(&mut self) -> &[Recipe] {
        let count = self.visible_count;
        let filtered = self.filtered();
        &filtered[..count.min(filtered.len())]
    }

    pub fn visible_count(&mut self) -> usize {
        self.visible_count.min(self.total_filtered())
    }

    pub fn total_filtered(&mut self) -> usize {
        self.filtered().len()
    }

    pub fn has_more(&mut self) -> bool {
        self.visible_count < self.total_filtered()
    }

    fn filtered(&mut self) -> &[Recipe] {
        if self.filtered.is_none() {
            self.computations += 1;
        }
        self.filtered
            .get_or_insert_with(|| filter_and_sort(&self.recipes, &self.query))
    }

    fn query_changed(&mut self) {
        self.filtered = None;
        self.visible_count = PAGE_SIZE;
    }
}
