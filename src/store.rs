//! Database bootstrap: create the database if needed, then the social tables.
//! DDL is idempotent so startup is safe to repeat.

use crate::error::AppError;
use sqlx::ConnectOptions;
use sqlx::PgPool;
use std::str::FromStr;

/// One CREATE TABLE per entity. TEXT primary keys (caller-supplied or
/// generated UUIDs), timestamps defaulted by the store, nullable FKs with
/// ON DELETE SET NULL so deleting an owner detaches rather than cascades.
const TABLE_DDL: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        email TEXT,
        first_name TEXT,
        last_name TEXT,
        password TEXT NOT NULL,
        roles TEXT NOT NULL,
        username TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tweets (
        id TEXT PRIMARY KEY,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        comment TEXT,
        content TEXT,
        user_id TEXT REFERENCES users(id) ON DELETE SET NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS likes (
        id TEXT PRIMARY KEY,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        tweet_id TEXT REFERENCES tweets(id) ON DELETE SET NULL,
        user_id TEXT REFERENCES users(id) ON DELETE SET NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS retweets (
        id TEXT PRIMARY KEY,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        tweet_id TEXT REFERENCES tweets(id) ON DELETE SET NULL,
        user_id TEXT REFERENCES users(id) ON DELETE SET NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS followers (
        id TEXT PRIMARY KEY,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        following TEXT,
        follower_id TEXT REFERENCES followers(id) ON DELETE SET NULL
    )
    "#,
];

const INDEX_DDL: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS tweets_user_id_idx ON tweets (user_id)",
    "CREATE INDEX IF NOT EXISTS likes_tweet_id_idx ON likes (tweet_id)",
    "CREATE INDEX IF NOT EXISTS likes_user_id_idx ON likes (user_id)",
    "CREATE INDEX IF NOT EXISTS retweets_tweet_id_idx ON retweets (tweet_id)",
    "CREATE INDEX IF NOT EXISTS retweets_user_id_idx ON retweets (user_id)",
    "CREATE INDEX IF NOT EXISTS followers_follower_id_idx ON followers (follower_id)",
];

/// Create the five social tables and their FK indexes.
pub async fn ensure_tables(pool: &PgPool) -> Result<(), AppError> {
    for ddl in TABLE_DDL.iter().chain(INDEX_DDL) {
        sqlx::query(ddl).execute(pool).await?;
    }
    Ok(())
}

/// Ensure the database in `database_url` exists; create it if not. Connects
/// to the default `postgres` database to run CREATE DATABASE. Call before
/// creating the main pool.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| AppError::BadRequest(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await.map_err(AppError::Db)?;
    let exists: (bool,) =
        sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(&db_name)
            .fetch_one(&mut conn)
            .await
            .map_err(AppError::Db)?;
    if !exists.0 {
        let quoted = quote_ident(&db_name);
        sqlx::query(&format!("CREATE DATABASE {}", quoted))
            .execute(&mut conn)
            .await
            .map_err(AppError::Db)?;
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), AppError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| AppError::BadRequest("DATABASE_URL: no path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    let admin_url = format!("{}postgres", base);
    Ok((admin_url, db_name.to_string()))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_name_is_extracted_from_url() {
        let (admin, name) = parse_db_name_from_url("postgres://localhost:5432/chirp").unwrap();
        assert_eq!(admin, "postgres://localhost:5432/postgres");
        assert_eq!(name, "chirp");
        let (_, name) = parse_db_name_from_url("postgres://localhost/chirp?sslmode=disable").unwrap();
        assert_eq!(name, "chirp");
    }

    #[test]
    fn ddl_covers_every_model_table() {
        let model = crate::schema::social_model();
        for entity in &model.entities {
            assert!(
                TABLE_DDL.iter().any(|d| d.contains(entity.table_name)),
                "missing DDL for {}",
                entity.table_name
            );
        }
    }
}
