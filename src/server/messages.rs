use crate::common::{now_millis, BackendError, MessageId, StoredMessage, ThreadId, UserId};
use crate::server::config::BackendConfig;
use crate::server::database::Database;
use crate::server::threads::get_thread;
use log::{debug, info};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

fn message_from_row(row: &SqliteRow) -> StoredMessage {
    StoredMessage {
        id: MessageId::new(row.get::<String, _>("id")),
        thread_id: ThreadId::new(row.get::<String, _>("thread_id")),
        sender_id: UserId::new(row.get::<String, _>("sender_id")),
        body: row.get("body"),
        created_at: row.get("created_at"),
    }
}

/// Stores a message and refreshes the thread's last-message snapshot in the
/// same transaction.
pub async fn create_message(
    db: &Database,
    thread_id: &ThreadId,
    sender_id: &UserId,
    body: &str,
    config: &BackendConfig,
) -> Result<StoredMessage, BackendError> {
    if body.trim().is_empty() {
        return Err(BackendError::InvalidInput("message body is empty".to_string()));
    }
    if body.chars().count() > config.max_message_length {
        return Err(BackendError::InvalidInput(format!(
            "Message too long (max {} chars)",
            config.max_message_length
        )));
    }
    let thread = get_thread(db, thread_id).await?;
    if !thread.involves(sender_id) {
        return Err(BackendError::Unauthorized(format!(
            "user {} is not a participant of thread {}",
            sender_id, thread_id
        )));
    }

    let message = StoredMessage {
        id: MessageId::new(uuid::Uuid::new_v4().to_string()),
        thread_id: thread_id.clone(),
        sender_id: sender_id.clone(),
        body: body.to_string(),
        created_at: now_millis(),
    };

    let mut tx = db.pool.begin().await?;
    sqlx::query("INSERT INTO messages (id, thread_id, sender_id, body, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(message.id.as_str())
        .bind(message.thread_id.as_str())
        .bind(message.sender_id.as_str())
        .bind(&message.body)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        "UPDATE threads
         SET last_message_body = ?, last_message_at = ?, last_message_sender = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(&message.body)
    .bind(message.created_at)
    .bind(message.sender_id.as_str())
    .bind(message.created_at)
    .bind(thread_id.as_str())
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    info!("[MSG] Stored message {} in thread {}", message.id, thread_id);
    Ok(message)
}

/// Messages of a thread, oldest first.
pub async fn list_messages(db: &Database, thread_id: &ThreadId) -> Result<Vec<StoredMessage>, BackendError> {
    let rows = sqlx::query(
        "SELECT id, thread_id, sender_id, body, created_at FROM messages
         WHERE thread_id = ?
         ORDER BY created_at ASC, seq ASC",
    )
    .bind(thread_id.as_str())
    .fetch_all(&db.pool)
    .await?;
    debug!("[MSG] Loaded {} messages for thread {}", rows.len(), thread_id);
    Ok(rows.iter().map(message_from_row).collect())
}
