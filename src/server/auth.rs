use crate::common::{now_millis, AuthGrant, BackendError, Profile, SignUp, UserId};
use crate::server::config::BackendConfig;
use crate::server::database::Database;
use crate::server::users::{get_profile, profile_from_row, PROFILE_COLUMNS};
use argon2::{Argon2, password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString}};
use log::{debug, info, warn};
use rand::RngCore;
use sqlx::Row;

fn hash_password(password: &str, salt_length: u32) -> Result<String, BackendError> {
    let mut salt_bytes = vec![0u8; salt_length as usize];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| BackendError::Storage(format!("salt encoding failed: {}", e)))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| BackendError::Storage(format!("password hashing failed: {}", e)))
}

fn verify_password(hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(e) => {
            warn!("[AUTH] Stored password hash is unreadable: {}", e);
            false
        }
    }
}

fn generate_session_token() -> String {
    let uuid = uuid::Uuid::new_v4().to_string();
    let mut random = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut random);
    format!("{}-{:x}", uuid, md5::compute(random))
}

fn validate_sign_up(req: &SignUp) -> Result<(), BackendError> {
    if !req.email.contains('@') {
        return Err(BackendError::InvalidInput("email address is not valid".to_string()));
    }
    if req.username.trim().is_empty() {
        return Err(BackendError::InvalidInput("username is required".to_string()));
    }
    if req.password.len() < 6 {
        return Err(BackendError::InvalidInput("password must be at least 6 characters".to_string()));
    }
    Ok(())
}

/// Replaces every session of `user_id` with a fresh one.
async fn open_session(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    user_id: &UserId,
    config: &BackendConfig,
) -> Result<(String, i64), BackendError> {
    let removed = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(user_id.as_str())
        .execute(&mut **tx)
        .await?;
    if removed.rows_affected() > 0 {
        debug!("[AUTH] Dropped {} old sessions for user {}", removed.rows_affected(), user_id);
    }

    let token = generate_session_token();
    let now = now_millis();
    let expires_at = now + config.session_ttl_millis();
    sqlx::query("INSERT INTO sessions (user_id, session_token, created_at, expires_at) VALUES (?, ?, ?, ?)")
        .bind(user_id.as_str())
        .bind(&token)
        .bind(now)
        .bind(expires_at)
        .execute(&mut **tx)
        .await?;
    Ok((token, expires_at))
}

pub async fn sign_up(db: &Database, req: &SignUp, config: &BackendConfig) -> Result<AuthGrant, BackendError> {
    validate_sign_up(req)?;
    info!("[AUTH] Sign up attempt: {}", req.username);

    let taken = sqlx::query("SELECT username, email FROM users WHERE username = ? OR lower(email) = lower(?)")
        .bind(&req.username)
        .bind(&req.email)
        .fetch_optional(&db.pool)
        .await?;
    if let Some(row) = taken {
        let username: String = row.get("username");
        return Err(if username == req.username {
            BackendError::Conflict("Username is already taken".to_string())
        } else {
            BackendError::Conflict("Email is already registered".to_string())
        });
    }

    let user_id = UserId::new(uuid::Uuid::new_v4().to_string());
    let password_hash = hash_password(&req.password, config.argon2_salt_length)?;
    let mut tx = db.pool.begin().await?;
    sqlx::query("INSERT INTO users (id, email, username, display_name, role, created_at) VALUES (?, ?, ?, ?, ?, ?)")
        .bind(user_id.as_str())
        .bind(&req.email)
        .bind(&req.username)
        .bind(&req.display_name)
        .bind(req.role.as_str())
        .bind(now_millis())
        .execute(&mut *tx)
        .await?;
    sqlx::query("INSERT INTO auth (user_id, password_hash) VALUES (?, ?)")
        .bind(user_id.as_str())
        .bind(&password_hash)
        .execute(&mut *tx)
        .await?;
    let (token, expires_at) = open_session(&mut tx, &user_id, config).await?;
    tx.commit().await?;

    info!("[AUTH] Registered user {} (id={})", req.username, user_id);
    let user = Profile {
        id: user_id,
        email: req.email.clone(),
        username: req.username.clone(),
        display_name: req.display_name.clone(),
        role: req.role,
    };
    Ok(AuthGrant { user, token, expires_at })
}

pub async fn sign_in(db: &Database, email: &str, password: &str, config: &BackendConfig) -> Result<AuthGrant, BackendError> {
    info!("[AUTH] Sign in attempt: {}", email);
    let row = sqlx::query(&format!(
        "SELECT {}, password_hash FROM users JOIN auth ON users.id = auth.user_id WHERE lower(email) = lower(?)",
        PROFILE_COLUMNS
    ))
    .bind(email)
    .fetch_optional(&db.pool)
    .await?;

    let Some(row) = row else {
        info!("[AUTH] Sign in failed for {}: unknown email", email);
        return Err(BackendError::Unauthorized("Invalid login credentials".to_string()));
    };
    let password_hash: String = row.get("password_hash");
    if !verify_password(&password_hash, password) {
        info!("[AUTH] Sign in failed for {}: wrong password", email);
        return Err(BackendError::Unauthorized("Invalid login credentials".to_string()));
    }

    let user = profile_from_row(&row);
    let mut tx = db.pool.begin().await?;
    let (token, expires_at) = open_session(&mut tx, &user.id, config).await?;
    tx.commit().await?;

    info!("[AUTH] Sign in success for {} (id={})", user.username, user.id);
    Ok(AuthGrant { user, token, expires_at })
}

/// Resolves a stored token back into its user, if the session is still valid.
pub async fn resume(db: &Database, session_token: &str) -> Result<AuthGrant, BackendError> {
    let row = sqlx::query("SELECT user_id, expires_at FROM sessions WHERE session_token = ? AND expires_at > ?")
        .bind(session_token)
        .bind(now_millis())
        .fetch_optional(&db.pool)
        .await?;
    let Some(row) = row else {
        debug!("[AUTH] resume: token is invalid or expired");
        return Err(BackendError::Unauthorized("Session expired".to_string()));
    };
    let user_id = UserId::new(row.get::<String, _>("user_id"));
    let expires_at: i64 = row.get("expires_at");
    let user = get_profile(db, &user_id).await?;
    debug!("[AUTH] resume: session valid for user {}", user_id);
    Ok(AuthGrant { user, token: session_token.to_string(), expires_at })
}

pub async fn sign_out(db: &Database, session_token: &str) -> Result<(), BackendError> {
    let res = sqlx::query("DELETE FROM sessions WHERE session_token = ?")
        .bind(session_token)
        .execute(&db.pool)
        .await?;
    if res.rows_affected() == 0 {
        info!("[AUTH] Sign out: session not found");
    } else {
        info!("[AUTH] Sign out completed");
    }
    Ok(())
}

/// Deletes expired sessions. Idempotent, safe to run periodically.
pub async fn cleanup_expired_sessions(db: &Database) -> Result<u64, BackendError> {
    let res = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(now_millis())
        .execute(&db.pool)
        .await?;
    info!("[AUTH] Cleaned up {} expired sessions", res.rows_affected());
    Ok(res.rows_affected())
}
