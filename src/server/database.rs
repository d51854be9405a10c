use log::{debug, error, info};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

#[derive(Debug, Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

/// Strips the `sqlite:` / `sqlite://` scheme and any query string.
fn file_path_of(database_url: &str) -> &str {
    let path_part = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);
    match path_part.find('?') {
        Some(query_pos) => &path_part[..query_pos],
        None => path_part,
    }
}

impl Database {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let file_path = file_path_of(database_url);
        if file_path.starts_with(":memory:") {
            return Self::connect_in_memory().await;
        }
        debug!("[DB] Database file path: {}", file_path);

        if let Some(parent) = std::path::Path::new(file_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    error!("[DB] Failed to create directory {:?}: {}", parent, e);
                    sqlx::Error::Configuration(Box::new(e))
                })?;
                info!("[DB] Created directory: {:?}", parent);
            }
        }

        // mode=rwc lets SQLite create the file on first use
        let url = if database_url.contains('?') {
            database_url.to_string()
        } else {
            format!("sqlite:{}?mode=rwc", file_path)
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(|e| {
                error!("[DB] SQLite connection failed: {}", e);
                e
            })?;

        info!("[DB] Connected to {}", file_path);
        Ok(Self { pool })
    }

    /// Single-connection in-memory database; the connection is never recycled
    /// so the data lives as long as the pool.
    pub async fn connect_in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        debug!("[DB] Opened in-memory database");
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        // Users
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                username TEXT UNIQUE NOT NULL,
                display_name TEXT NOT NULL DEFAULT '',
                role TEXT NOT NULL DEFAULT 'tenant',
                created_at INTEGER NOT NULL
            );
        "#).execute(&self.pool).await?;

        // Auth
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS auth (
                user_id TEXT PRIMARY KEY,
                password_hash TEXT NOT NULL
            );
        "#).execute(&self.pool).await?;

        // Sessions
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS sessions (
                user_id TEXT NOT NULL,
                session_token TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            );
        "#).execute(&self.pool).await?;

        // Threads, with the last message denormalized for the sidebar
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS threads (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                counterparty_id TEXT NOT NULL,
                listing_id TEXT,
                last_message_body TEXT,
                last_message_at INTEGER,
                last_message_sender TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
        "#).execute(&self.pool).await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_threads_owner ON threads (owner_id)")
            .execute(&self.pool).await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_threads_counterparty ON threads (counterparty_id)")
            .execute(&self.pool).await?;
        // one thread per unordered pair and listing
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_threads_pair ON threads (
                min(owner_id, counterparty_id),
                max(owner_id, counterparty_id),
                COALESCE(listing_id, '')
            )",
        )
        .execute(&self.pool).await?;

        // Messages
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT UNIQUE NOT NULL,
                thread_id TEXT NOT NULL,
                sender_id TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
        "#).execute(&self.pool).await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages (thread_id, created_at)")
            .execute(&self.pool).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_path_strips_scheme_and_query() {
        assert_eq!(file_path_of("sqlite:data/x.db"), "data/x.db");
        assert_eq!(file_path_of("sqlite://data/x.db?mode=rwc"), "data/x.db");
        assert_eq!(file_path_of("plain.db"), "plain.db");
    }

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let db = Database::connect_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        db.migrate().await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM threads")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn threads_are_unique_per_unordered_pair() {
        let db = Database::connect_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        let insert = "INSERT INTO threads (id, owner_id, counterparty_id, listing_id, created_at, updated_at)
                      VALUES (?, ?, ?, ?, 0, 0)";
        sqlx::query(insert).bind("t1").bind("bob").bind("alice").bind(None::<String>)
            .execute(&db.pool).await.unwrap();
        let reversed = sqlx::query(insert).bind("t2").bind("alice").bind("bob").bind(None::<String>)
            .execute(&db.pool).await;
        assert!(reversed.is_err());
        sqlx::query(insert).bind("t3").bind("alice").bind("bob").bind(Some("flat-1"))
            .execute(&db.pool).await.unwrap();
    }

    #[tokio::test]
    async fn connect_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("inbox.db");
        let url = format!("sqlite:{}", path.display());
        let db = Database::connect(&url).await.unwrap();
        db.migrate().await.unwrap();
        assert!(path.exists());
    }
}
