use crate::common::models::{millis_to_datetime, Session};
use crate::server::config::ServerConfig;
use crate::server::database::Database;
use crate::server::error::{ServiceError, ServiceResult};
use crate::server::users;
use argon2::{password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString}, Argon2};
use chrono::Utc;
use log::{debug, info, warn};
use rand::RngCore;
use sqlx::{Row, SqliteConnection};
use std::sync::Arc;

fn hash_password(password: &str, salt_length: u32) -> ServiceResult<String> {
    // Genera un salt casuale della lunghezza specificata
    let mut salt_bytes = vec![0u8; salt_length as usize];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| ServiceError::PasswordHash(e.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ServiceError::PasswordHash(e.to_string()))
}

fn verify_password(hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed_hash) => Argon2::default().verify_password(password.as_bytes(), &parsed_hash).is_ok(),
        Err(e) => {
            warn!("[AUTH] Stored password hash is malformed: {}", e);
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

async fn open_session(
    conn: &mut SqliteConnection,
    user_id: &str,
    username: &str,
    config: &ServerConfig,
) -> ServiceResult<Session> {
    let token = generate_session_token();
    let now = Utc::now().timestamp_millis();
    let expires = now + 1000 * 60 * 60 * 24 * config.session_expiry_days as i64;
    sqlx::query("INSERT INTO sessions (session_token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)")
        .bind(&token)
        .bind(user_id)
        .bind(now)
        .bind(expires)
        .execute(&mut *conn)
        .await?;
    Ok(Session {
        user_id: user_id.to_string(),
        username: username.to_string(),
        token,
        expires_at: millis_to_datetime(expires),
    })
}

pub async fn register(
    db: Arc<Database>,
    username: &str,
    password: &str,
    email: Option<&str>,
    config: &ServerConfig,
) -> ServiceResult<Session> {
    info!("[AUTH] Register attempt: {}", username);
    if password.is_empty() {
        return Err(ServiceError::Validation("Password is required".into()));
    }
    let password_hash = hash_password(password, config.argon2_salt_length)?;

    let mut tx = db.pool.begin().await?;
    let user = users::insert_user(&mut *tx, username, email).await?;
    sqlx::query("INSERT INTO auth (user_id, password_hash) VALUES (?, ?)")
        .bind(&user.id)
        .bind(&password_hash)
        .execute(&mut *tx)
        .await?;
    let session = open_session(&mut *tx, &user.id, &user.username, config).await?;
    tx.commit().await?;

    info!("[AUTH] Registered user {} (id={})", user.username, user.id);
    Ok(session)
}

pub async fn login(db: Arc<Database>, username: &str, password: &str, config: &ServerConfig) -> ServiceResult<Session> {
    info!("[AUTH] Login attempt: {}", username);
    let row = sqlx::query("SELECT users.id, users.username, password_hash FROM users JOIN auth ON users.id = auth.user_id WHERE username = ?")
        .bind(username.trim())
        .fetch_optional(&db.pool)
        .await?;
    // Stesso errore per utente sconosciuto e password sbagliata
    let Some(row) = row else {
        info!("[AUTH] Login failed for {}: user not found", username);
        return Err(ServiceError::Unauthorized);
    };
    let user_id: String = row.get("id");
    let stored_username: String = row.get("username");
    let password_hash: String = row.get("password_hash");
    if !verify_password(&password_hash, password) {
        info!("[AUTH] Login failed for {}: wrong password", username);
        return Err(ServiceError::Unauthorized);
    }

    let mut conn = db.pool.acquire().await?;
    let session = open_session(&mut *conn, &user_id, &stored_username, config).await?;
    info!("[AUTH] Login success for {} (id={})", stored_username, user_id);
    Ok(session)
}

/// Logout: elimina la sessione. Un token sconosciuto è NotFound.
pub async fn logout(db: Arc<Database>, session_token: &str) -> ServiceResult<()> {
    let res = sqlx::query("DELETE FROM sessions WHERE session_token = ?")
        .bind(session_token)
        .execute(&db.pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(ServiceError::NotFound("Session not found".into()));
    }
    info!("[AUTH] Logout completed (token masked)");
    Ok(())
}

/// Risolve un token nel relativo user id, se valido e non scaduto.
pub async fn validate_session(db: Arc<Database>, session_token: &str) -> ServiceResult<Option<String>> {
    let now = Utc::now().timestamp_millis();
    let user_id = sqlx::query_scalar::<_, String>("SELECT user_id FROM sessions WHERE session_token = ? AND expires_at > ?")
        .bind(session_token)
        .bind(now)
        .fetch_optional(&db.pool)
        .await?;
    match &user_id {
        Some(uid) => debug!("[AUTH] validate_session: token valid for user {}", uid),
        None => debug!("[AUTH] validate_session: token invalid or expired"),
    }
    Ok(user_id)
}

/// Rimuove le sessioni scadute dal DB. Idempotente e sicuro da eseguire periodicamente.
pub async fn cleanup_expired_sessions(db: Arc<Database>) -> ServiceResult<u64> {
    let now = Utc::now().timestamp_millis();
    let res = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(now)
        .execute(&db.pool)
        .await?;
    info!("[AUTH] Cleaned up {} expired sessions", res.rows_affected());
    Ok(res.rows_affected())
}
