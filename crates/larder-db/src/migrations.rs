use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id            TEXT PRIMARY KEY,
                email         TEXT NOT NULL UNIQUE COLLATE NOCASE,
                display_name  TEXT NOT NULL,
                password      TEXT NOT NULL,
                created_at    TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE recipes (
                id                  TEXT PRIMARY KEY,
                title               TEXT NOT NULL,
                title_lower         TEXT NOT NULL,
                description         TEXT NOT NULL,
                prep_time_minutes   INTEGER NOT NULL,
                difficulty          TEXT NOT NULL,
                category            TEXT NOT NULL,
                is_vegetarian       INTEGER NOT NULL DEFAULT 0,
                ingredients         TEXT NOT NULL,
                steps               TEXT NOT NULL,
                image_url           TEXT NOT NULL,
                owner_id            TEXT NOT NULL,
                owner_display_name  TEXT NOT NULL,
                created_at          TEXT NOT NULL,
                like_count          INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_recipes_created ON recipes(created_at);
            CREATE INDEX idx_recipes_owner ON recipes(owner_id, created_at);

            CREATE TABLE recipe_likes (
                recipe_id   TEXT NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL,
                PRIMARY KEY (recipe_id, user_id)
            );

            -- One row per favorites document; entries live in favorite_entries.
            CREATE TABLE favorites (
                user_id     TEXT PRIMARY KEY,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE favorite_entries (
                seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     TEXT NOT NULL REFERENCES favorites(user_id) ON DELETE CASCADE,
                recipe_id   TEXT NOT NULL,
                UNIQUE(user_id, recipe_id)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
