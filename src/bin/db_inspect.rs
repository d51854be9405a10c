use ryd_inbox::server::{BackendConfig, Database};
use sqlx::Row;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = BackendConfig::from_env();
    println!("Connecting to {}", cfg.database_url);
    let db = Database::connect(&cfg.database_url).await?;

    println!("\n-- users --");
    let rows = sqlx::query("SELECT id, username, role, created_at FROM users ORDER BY created_at")
        .fetch_all(&db.pool)
        .await?;
    for r in rows.iter() {
        let id: String = r.try_get("id").unwrap_or_default();
        let username: String = r.try_get("username").unwrap_or_default();
        let role: String = r.try_get("role").unwrap_or_default();
        let created_at: i64 = r.try_get("created_at").unwrap_or(0);
        println!("id={} username={} role={} created_at={}", id, username, role, created_at);
    }

    println!("\n-- threads --");
    let rows = sqlx::query(
        "SELECT id, owner_id, counterparty_id, listing_id, last_message_at, updated_at FROM threads ORDER BY updated_at DESC",
    )
    .fetch_all(&db.pool)
    .await?;
    for r in rows.iter() {
        let row = serde_json::json!({
            "id": r.try_get::<String, _>("id").unwrap_or_default(),
            "owner_id": r.try_get::<String, _>("owner_id").unwrap_or_default(),
            "counterparty_id": r.try_get::<String, _>("counterparty_id").unwrap_or_default(),
            "listing_id": r.try_get::<Option<String>, _>("listing_id").unwrap_or(None),
            "last_message_at": r.try_get::<Option<i64>, _>("last_message_at").unwrap_or(None),
            "updated_at": r.try_get::<i64, _>("updated_at").unwrap_or(0),
        });
        println!("{}", row);
    }

    println!("\n-- messages (last 10) --");
    let rows = sqlx::query("SELECT id, thread_id, sender_id, body, created_at FROM messages ORDER BY seq DESC LIMIT 10")
        .fetch_all(&db.pool)
        .await?;
    for r in rows.iter() {
        let id: String = r.try_get("id").unwrap_or_default();
        let thread_id: String = r.try_get("thread_id").unwrap_or_default();
        let sender_id: String = r.try_get("sender_id").unwrap_or_default();
        let body: String = r.try_get("body").unwrap_or_default();
        let created_at: i64 = r.try_get("created_at").unwrap_or(0);
        println!(
            "id={} thread_id={} sender_id={} body_len={} created_at={}",
            id, thread_id, sender_id, body.len(), created_at
        );
    }

    Ok(())
}
