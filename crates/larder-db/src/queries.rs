use std::collections::{BTreeSet, HashMap};

use anyhow::{Result, anyhow};
use larder_types::models::{Recipe, RecipeFields};
use rusqlite::{Connection, Row};
use uuid::Uuid;

use crate::Database;
use crate::models::{RecipeRow, UserRow, timestamp};

const RECIPE_COLUMNS: &str = "id, title, title_lower, description, prep_time_minutes, difficulty, \
     category, is_vegetarian, ingredients, steps, image_url, owner_id, owner_display_name, \
     created_at, like_count";

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        email: &str,
        display_name: &str,
        password_hash: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, email, display_name, password) VALUES (?1, ?2, ?3, ?4)",
                (id, email, display_name, password_hash),
            );
            // The unique email index is the arbiter when two signups race
            match inserted {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, email, display_name, password, created_at FROM users WHERE email = ?1",
                [email],
                |row| {
                    Ok(UserRow {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        display_name: row.get(2)?,
                        password: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                },
            )
            .optional()
        })
    }

    // -- Recipes --

    pub fn insert_recipe(&self, recipe: &Recipe) -> Result<()> {
        let created_at = timestamp(recipe.created_at.unwrap_or_else(chrono::Utc::now));
        let ingredients = serde_json::to_string(&recipe.ingredients)?;
        let steps = serde_json::to_string(&recipe.steps)?;

        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO recipes ({RECIPE_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, 0)"
                ),
                rusqlite::params![
                    recipe.id.to_string(),
                    recipe.title,
                    recipe.title_lower,
                    recipe.description,
                    recipe.prep_time_minutes,
                    recipe.difficulty.as_str(),
                    recipe.category.as_str(),
                    recipe.is_vegetarian,
                    ingredients,
                    steps,
                    recipe.image_url,
                    recipe.owner_id.to_string(),
                    recipe.owner_display_name,
                    created_at,
                ],
            )?;
            Ok(())
        })
    }

    /// Overwrite the owner-editable columns. Returns false if the recipe is gone.
    pub fn update_recipe_fields(&self, id: &str, fields: &RecipeFields) -> Result<bool> {
        let fields = fields.clone().normalized();
        let ingredients = serde_json::to_string(&fields.ingredients)?;
        let steps = serde_json::to_string(&fields.steps)?;

        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE recipes SET title = ?2, title_lower = ?3, description = ?4,
                    prep_time_minutes = ?5, difficulty = ?6, category = ?7, is_vegetarian = ?8,
                    ingredients = ?9, steps = ?10, image_url = ?11
                 WHERE id = ?1",
                rusqlite::params![
                    id,
                    fields.title,
                    fields.title.to_lowercase(),
                    fields.description,
                    fields.prep_time_minutes,
                    fields.difficulty.as_str(),
                    fields.category.as_str(),
                    fields.is_vegetarian,
                    ingredients,
                    steps,
                    fields.image_url,
                ],
            )?;
            Ok(changed > 0)
        })
    }

    /// Delete a recipe and its likes. Favorites entries pointing at it are
    /// left alone and filtered out by readers.
    pub fn delete_recipe(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM recipes WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    pub fn get_recipe(&self, id: &str) -> Result<Option<Recipe>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = ?1"),
                    [id],
                    recipe_row,
                )
                .optional()?;

            match row {
                Some(row) => {
                    let liked_by = query_likes(conn, &[row.id.clone()])?.remove(&row.id).unwrap_or_default();
                    Ok(Some(row.into_recipe(liked_by)?))
                }
                None => Ok(None),
            }
        })
    }

    /// All recipes (or one owner's), newest first.
    pub fn list_recipes(&self, owner_id: Option<&str>) -> Result<Vec<Recipe>> {
        self.with_conn(|conn| {
            let rows = match owner_id {
                Some(owner) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {RECIPE_COLUMNS} FROM recipes WHERE owner_id = ?1
                         ORDER BY created_at DESC, rowid DESC"
                    ))?;
                    let rows = stmt
                        .query_map([owner], recipe_row)?
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    rows
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {RECIPE_COLUMNS} FROM recipes ORDER BY created_at DESC, rowid DESC"
                    ))?;
                    let rows = stmt
                        .query_map([], recipe_row)?
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    rows
                }
            };

            let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
            let mut likes = query_likes(conn, &ids)?;

            rows.into_iter()
                .map(|row| {
                    let liked_by = likes.remove(&row.id).unwrap_or_default();
                    row.into_recipe(liked_by)
                })
                .collect()
        })
    }

    // -- Likes --

    /// Like or unlike a recipe. The like row and the counter change in one
    /// transaction, so `like_count` always equals the number of likers.
    /// Returns `None` if the recipe does not exist.
    pub fn set_like(
        &self,
        recipe_id: &str,
        user_id: &str,
        liked: bool,
    ) -> Result<Option<(u32, BTreeSet<Uuid>)>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let exists: Option<String> = tx
                .query_row("SELECT id FROM recipes WHERE id = ?1", [recipe_id], |row| row.get(0))
                .optional()?;
            if exists.is_none() {
                return Ok(None);
            }

            let changed = if liked {
                tx.execute(
                    "INSERT OR IGNORE INTO recipe_likes (recipe_id, user_id) VALUES (?1, ?2)",
                    [recipe_id, user_id],
                )?
            } else {
                tx.execute(
                    "DELETE FROM recipe_likes WHERE recipe_id = ?1 AND user_id = ?2",
                    [recipe_id, user_id],
                )?
            };

            if changed > 0 {
                tx.execute(
                    "UPDATE recipes SET like_count =
                        (SELECT COUNT(*) FROM recipe_likes WHERE recipe_id = ?1)
                     WHERE id = ?1",
                    [recipe_id],
                )?;
            }

            let liked_by = query_likes(&tx, &[recipe_id.to_string()])?
                .remove(recipe_id)
                .unwrap_or_default();
            tx.commit()?;

            Ok(Some((liked_by.len() as u32, liked_by)))
        })
    }

    // -- Favorites --

    /// The user's favorites in insertion order, or `None` if the document
    /// has never been created.
    pub fn get_favorites(&self, user_id: &str) -> Result<Option<Vec<Uuid>>> {
        self.with_conn(|conn| query_favorites(conn, user_id))
    }

    /// Create an empty favorites document if none exists.
    pub fn ensure_favorites(&self, user_id: &str) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| {
            conn.execute("INSERT OR IGNORE INTO favorites (user_id) VALUES (?1)", [user_id])?;
            Ok(query_favorites(conn, user_id)?.unwrap_or_default())
        })
    }

    /// Array-add: appends `recipe_id` unless already present.
    pub fn add_favorite(&self, user_id: &str, recipe_id: &str) -> Result<Vec<Uuid>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("INSERT OR IGNORE INTO favorites (user_id) VALUES (?1)", [user_id])?;
            tx.execute(
                "INSERT OR IGNORE INTO favorite_entries (user_id, recipe_id) VALUES (?1, ?2)",
                [user_id, recipe_id],
            )?;
            let favorites = query_favorites(&tx, user_id)?.unwrap_or_default();
            tx.commit()?;
            Ok(favorites)
        })
    }

    /// Array-remove. A missing document stays missing.
    pub fn remove_favorite(&self, user_id: &str, recipe_id: &str) -> Result<Option<Vec<Uuid>>> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM favorite_entries WHERE user_id = ?1 AND recipe_id = ?2",
                [user_id, recipe_id],
            )?;
            query_favorites(conn, user_id)
        })
    }
}

fn recipe_row(row: &Row<'_>) -> rusqlite::Result<RecipeRow> {
    Ok(RecipeRow {
        id: row.get(0)?,
        title: row.get(1)?,
        title_lower: row.get(2)?,
        description: row.get(3)?,
        prep_time_minutes: row.get(4)?,
        difficulty: row.get(5)?,
        category: row.get(6)?,
        is_vegetarian: row.get(7)?,
        ingredients: row.get(8)?,
        steps: row.get(9)?,
        image_url: row.get(10)?,
        owner_id: row.get(11)?,
        owner_display_name: row.get(12)?,
        created_at: row.get(13)?,
        like_count: row.get(14)?,
    })
}

/// Batch-fetch likers for a set of recipe IDs.
fn query_likes(conn: &Connection, recipe_ids: &[String]) -> Result<HashMap<String, BTreeSet<Uuid>>> {
    let mut likes: HashMap<String, BTreeSet<Uuid>> = HashMap::new();
    if recipe_ids.is_empty() {
        return Ok(likes);
    }

    let placeholders: Vec<String> = (1..=recipe_ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT recipe_id, user_id FROM recipe_likes WHERE recipe_id IN ({})",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn rusqlite::types::ToSql> = recipe_ids
        .iter()
        .map(|id| id as &dyn rusqlite::types::ToSql)
        .collect();

    let rows = stmt
        .query_map(params.as_slice(), |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for (recipe_id, user_id) in rows {
        let user_id = user_id
            .parse::<Uuid>()
            .map_err(|e| anyhow!("corrupt like user_id '{}': {}", user_id, e))?;
        likes.entry(recipe_id).or_default().insert(user_id);
    }

    Ok(likes)
}

fn query_favorites(conn: &Connection, user_id: &str) -> Result<Option<Vec<Uuid>>> {
    let exists: Option<String> = conn
        .query_row("SELECT user_id FROM favorites WHERE user_id = ?1", [user_id], |row| row.get(0))
        .optional()?;
    if exists.is_none() {
        return Ok(None);
    }

    let mut stmt =
        conn.prepare("SELECT recipe_id FROM favorite_entries WHERE user_id = ?1 ORDER BY seq")?;
    let ids = stmt
        .query_map([user_id], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let favorites = ids
        .iter()
        .map(|id| id.parse::<Uuid>().map_err(|e| anyhow!("corrupt favorite id '{}': {}", id, e)))
        .collect::<Result<Vec<_>>>()?;

    Ok(Some(favorites))
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use larder_types::models::{Category, Difficulty, User};

    fn user(name: &str) -> User {
        User {
            id: Uuid::new_v4(),
            email: format!("{name}@example.com"),
            display_name: name.to_string(),
        }
    }

    fn fields(title: &str) -> RecipeFields {
        RecipeFields {
            title: title.to_string(),
            description: "desc".into(),
            prep_time_minutes: 30,
            difficulty: Difficulty::Medium,
            category: Category::Dinner,
            is_vegetarian: false,
            ingredients: vec!["rice".into(), "beans".into()],
            steps: vec!["Cook".into()],
            image_url: "/images/1_x.png".into(),
        }
    }

    fn insert(db: &Database, owner: &User, title: &str, age_minutes: i64) -> Recipe {
        let recipe = Recipe::new(
            Uuid::new_v4(),
            owner,
            fields(title),
            Utc::now() - Duration::minutes(age_minutes),
        );
        db.insert_recipe(&recipe).unwrap();
        recipe
    }

    #[test]
    fn recipes_round_trip_and_list_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let ana = user("ana");
        let bo = user("bo");
        let old = insert(&db, &ana, "Old", 60);
        let new = insert(&db, &bo, "New", 1);

        let fetched = db.get_recipe(&old.id.to_string()).unwrap().unwrap();
        assert_eq!(fetched.title, "Old");
        assert_eq!(fetched.ingredients, vec!["rice", "beans"]);
        assert_eq!(fetched.category, Category::Dinner);

        let all = db.list_recipes(None).unwrap();
        assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), vec![new.id, old.id]);

        let mine = db.list_recipes(Some(&ana.id.to_string())).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, old.id);
    }

    #[test]
    fn update_keeps_owner_and_likes() {
        let db = Database::open_in_memory().unwrap();
        let ana = user("ana");
        let recipe = insert(&db, &ana, "Soup", 5);
        let id = recipe.id.to_string();
        db.set_like(&id, &Uuid::new_v4().to_string(), true).unwrap();
        let before = db.get_recipe(&id).unwrap().unwrap();

        assert!(db.update_recipe_fields(&id, &fields("  Better Soup ")).unwrap());
        let updated = db.get_recipe(&id).unwrap().unwrap();
        assert_eq!(updated.title, "Better Soup");
        assert_eq!(updated.title_lower, "better soup");
        assert_eq!(updated.owner_id, ana.id);
        assert_eq!(updated.created_at, before.created_at);
        assert_eq!(updated.like_count, 1);

        assert!(!db.update_recipe_fields(&Uuid::new_v4().to_string(), &fields("x")).unwrap());
    }

    #[test]
    fn likes_keep_count_in_step_with_likers() {
        let db = Database::open_in_memory().unwrap();
        let recipe = insert(&db, &user("ana"), "Tacos", 5);
        let id = recipe.id.to_string();
        let bo = Uuid::new_v4();
        let cy = Uuid::new_v4();

        let (count, _) = db.set_like(&id, &bo.to_string(), true).unwrap().unwrap();
        assert_eq!(count, 1);
        // liking twice counts once
        let (count, _) = db.set_like(&id, &bo.to_string(), true).unwrap().unwrap();
        assert_eq!(count, 1);
        let (count, liked_by) = db.set_like(&id, &cy.to_string(), true).unwrap().unwrap();
        assert_eq!(count, 2);
        assert!(liked_by.contains(&bo) && liked_by.contains(&cy));

        let (count, liked_by) = db.set_like(&id, &bo.to_string(), false).unwrap().unwrap();
        assert_eq!(count, 1);
        assert!(!liked_by.contains(&bo));

        let stored = db.get_recipe(&id).unwrap().unwrap();
        assert_eq!(stored.like_count as usize, stored.liked_by.len());

        assert!(db.set_like(&Uuid::new_v4().to_string(), &bo.to_string(), true).unwrap().is_none());
    }

    #[test]
    fn favorites_are_lazy_and_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let uid = Uuid::new_v4().to_string();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert_eq!(db.get_favorites(&uid).unwrap(), None);
        assert_eq!(db.ensure_favorites(&uid).unwrap(), Vec::<Uuid>::new());
        assert_eq!(db.get_favorites(&uid).unwrap(), Some(vec![]));

        db.add_favorite(&uid, &a.to_string()).unwrap();
        db.add_favorite(&uid, &b.to_string()).unwrap();
        let after = db.add_favorite(&uid, &a.to_string()).unwrap();
        assert_eq!(after, vec![a, b]);

        let after = db.remove_favorite(&uid, &Uuid::new_v4().to_string()).unwrap();
        assert_eq!(after, Some(vec![a, b]));
        let after = db.remove_favorite(&uid, &a.to_string()).unwrap();
        assert_eq!(after, Some(vec![b]));
    }

    #[test]
    fn deleting_a_recipe_leaves_favorites_untouched() {
        let db = Database::open_in_memory().unwrap();
        let recipe = insert(&db, &user("ana"), "Cake", 5);
        let id = recipe.id.to_string();
        let uid = Uuid::new_v4().to_string();
        db.add_favorite(&uid, &id).unwrap();
        db.set_like(&id, &uid, true).unwrap();

        assert!(db.delete_recipe(&id).unwrap());
        assert!(db.get_recipe(&id).unwrap().is_none());
        assert!(!db.delete_recipe(&id).unwrap());
        assert_eq!(db.get_favorites(&uid).unwrap(), Some(vec![recipe.id]));
    }

    #[test]
    fn emails_are_unique_ignoring_case() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.create_user(&Uuid::new_v4().to_string(), "ana@example.com", "Ana", "hash").unwrap());
        assert!(!db.create_user(&Uuid::new_v4().to_string(), "ANA@example.com", "Ana", "hash").unwrap());
        let row = db.get_user_by_email("Ana@Example.com").unwrap().unwrap();
        assert_eq!(row.display_name, "Ana");
    }
}
