use crate::common::{BackendError, Profile, Role, UserId};
use crate::server::database::Database;
use log::warn;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

pub(crate) const PROFILE_COLUMNS: &str = "id, email, username, display_name, role";

pub(crate) fn profile_from_row(row: &SqliteRow) -> Profile {
    let role: String = row.get("role");
    Profile {
        id: UserId::new(row.get::<String, _>("id")),
        email: row.get("email"),
        username: row.get("username"),
        display_name: row.get("display_name"),
        role: role.parse().unwrap_or_else(|e| {
            warn!("[USERS] {}; treating as tenant", e);
            Role::Tenant
        }),
    }
}

pub async fn get_profile(db: &Database, user_id: &UserId) -> Result<Profile, BackendError> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", PROFILE_COLUMNS))
        .bind(user_id.as_str())
        .fetch_optional(&db.pool)
        .await?;
    match row {
        Some(row) => Ok(profile_from_row(&row)),
        None => Err(BackendError::NotFound(format!("user {}", user_id))),
    }
}

pub async fn user_exists(db: &Database, user_id: &UserId) -> Result<bool, BackendError> {
    let row = sqlx::query("SELECT 1 FROM users WHERE id = ?")
        .bind(user_id.as_str())
        .fetch_optional(&db.pool)
        .await?;
    Ok(row.is_some())
}

/// Case-insensitive substring match on username, display name and email.
pub async fn search_users(db: &Database, query: &str, limit: usize) -> Result<Vec<Profile>, BackendError> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(Vec::new());
    }
    let pattern = format!("%{}%", query.to_lowercase());
    let rows = sqlx::query(&format!(
        "SELECT {} FROM users
         WHERE lower(username) LIKE ? OR lower(display_name) LIKE ? OR lower(email) LIKE ?
         ORDER BY username ASC
         LIMIT ?",
        PROFILE_COLUMNS
    ))
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .bind(limit as i64)
    .fetch_all(&db.pool)
    .await?;
    Ok(rows.iter().map(profile_from_row).collect())
}
