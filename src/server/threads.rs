use crate::common::{now_millis, BackendError, LastMessage, ListingId, Thread, ThreadId, ThreadSummary, UserId};
use crate::server::database::Database;
use crate::server::users::{profile_from_row, user_exists};
use log::{debug, info};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

const THREAD_COLUMNS: &str = "t.id AS thread_id, t.owner_id, t.counterparty_id, t.listing_id, \
     t.last_message_body, t.last_message_at, t.last_message_sender, t.created_at, t.updated_at";

fn thread_from_row(row: &SqliteRow) -> Thread {
    let body: Option<String> = row.get("last_message_body");
    let sent_at: Option<i64> = row.get("last_message_at");
    let sender: Option<String> = row.get("last_message_sender");
    let last_message = match (body, sent_at, sender) {
        (Some(body), Some(sent_at), Some(sender)) => Some(LastMessage {
            body,
            sent_at,
            sender_id: UserId::new(sender),
        }),
        _ => None,
    };
    Thread {
        id: ThreadId::new(row.get::<String, _>("thread_id")),
        owner_id: UserId::new(row.get::<String, _>("owner_id")),
        counterparty_id: UserId::new(row.get::<String, _>("counterparty_id")),
        listing_id: row.get::<Option<String>, _>("listing_id").map(ListingId::new),
        last_message,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Looks up the thread between two users (in either role) for a listing.
pub async fn find_thread_between(
    db: &Database,
    a: &UserId,
    b: &UserId,
    listing: Option<&ListingId>,
) -> Result<Option<Thread>, BackendError> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM threads t
         WHERE ((t.owner_id = ? AND t.counterparty_id = ?) OR (t.owner_id = ? AND t.counterparty_id = ?))
           AND t.listing_id IS ?
         ORDER BY t.created_at ASC
         LIMIT 1",
        THREAD_COLUMNS
    ))
    .bind(a.as_str())
    .bind(b.as_str())
    .bind(b.as_str())
    .bind(a.as_str())
    .bind(listing.map(|l| l.as_str()))
    .fetch_optional(&db.pool)
    .await?;
    Ok(row.as_ref().map(thread_from_row))
}

/// Creates the thread between `owner` and `counterparty`, or returns the one
/// that already exists for that pair and listing. The unique pair index makes
/// this hold for concurrent callers too: a losing insert is ignored and the
/// winner's row is read back.
pub async fn create_thread(
    db: &Database,
    owner: &UserId,
    counterparty: &UserId,
    listing: Option<&ListingId>,
) -> Result<ThreadId, BackendError> {
    if owner == counterparty {
        return Err(BackendError::InvalidInput("cannot start a thread with yourself".to_string()));
    }
    for user in [owner, counterparty] {
        if !user_exists(db, user).await? {
            return Err(BackendError::NotFound(format!("user {}", user)));
        }
    }
    if let Some(existing) = find_thread_between(db, owner, counterparty, listing).await? {
        debug!("[THREADS] Reusing thread {} for {} <-> {}", existing.id, owner, counterparty);
        return Ok(existing.id);
    }

    let thread_id = ThreadId::new(uuid::Uuid::new_v4().to_string());
    let now = now_millis();
    let inserted = sqlx::query(
        "INSERT INTO threads (id, owner_id, counterparty_id, listing_id, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT DO NOTHING",
    )
    .bind(thread_id.as_str())
    .bind(owner.as_str())
    .bind(counterparty.as_str())
    .bind(listing.map(|l| l.as_str()))
    .bind(now)
    .bind(now)
    .execute(&db.pool)
    .await?;

    if inserted.rows_affected() == 0 {
        let existing = find_thread_between(db, owner, counterparty, listing)
            .await?
            .ok_or_else(|| BackendError::Storage("thread insert ignored but no thread found".to_string()))?;
        debug!("[THREADS] Lost creation race, reusing thread {}", existing.id);
        return Ok(existing.id);
    }
    info!("[THREADS] Created thread {} for {} <-> {}", thread_id, owner, counterparty);
    Ok(thread_id)
}

pub async fn get_thread(db: &Database, thread_id: &ThreadId) -> Result<Thread, BackendError> {
    let row = sqlx::query(&format!("SELECT {} FROM threads t WHERE t.id = ?", THREAD_COLUMNS))
        .bind(thread_id.as_str())
        .fetch_optional(&db.pool)
        .await?;
    row.as_ref()
        .map(thread_from_row)
        .ok_or_else(|| BackendError::NotFound(format!("thread {}", thread_id)))
}

/// Threads `user` takes part in, most recently active first, each with the
/// other participant's profile.
pub async fn list_threads_for_user(db: &Database, user: &UserId) -> Result<Vec<ThreadSummary>, BackendError> {
    let rows = sqlx::query(&format!(
        "SELECT {}, u.id, u.email, u.username, u.display_name, u.role
         FROM threads t
         JOIN users u ON u.id = CASE WHEN t.owner_id = ? THEN t.counterparty_id ELSE t.owner_id END
         WHERE t.owner_id = ? OR t.counterparty_id = ?
         ORDER BY COALESCE(t.last_message_at, t.updated_at) DESC, t.created_at DESC",
        THREAD_COLUMNS
    ))
    .bind(user.as_str())
    .bind(user.as_str())
    .bind(user.as_str())
    .fetch_all(&db.pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| ThreadSummary {
            thread: thread_from_row(row),
            other: profile_from_row(row),
        })
        .collect())
}
