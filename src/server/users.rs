use crate::common::models::{millis_to_datetime, User, UserSummary};
use crate::server::database::Database;
use crate::server::error::{is_unique_violation, ServiceError, ServiceResult};
use chrono::Utc;
use log::info;
use sqlx::{Row, SqliteConnection};
use std::sync::Arc;

/// Inserisce la riga `users`; usata sia da `create_user` sia dentro la
/// transazione di registrazione.
pub(crate) async fn insert_user(
    conn: &mut SqliteConnection,
    username: &str,
    email: Option<&str>,
) -> ServiceResult<User> {
    let username = username.trim();
    if username.is_empty() {
        return Err(ServiceError::Validation("Username is required".into()));
    }
    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        username: username.to_string(),
        email: email.map(str::trim).filter(|e| !e.is_empty()).map(str::to_string),
        created_at: Utc::now(),
    };
    let res = sqlx::query("INSERT INTO users (id, username, email, created_at) VALUES (?, ?, ?, ?)")
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.created_at.timestamp_millis())
        .execute(&mut *conn)
        .await;
    match res {
        Ok(_) => Ok(user),
        Err(e) if is_unique_violation(&e) => Err(ServiceError::Conflict("Username already used".into())),
        Err(e) => Err(e.into()),
    }
}

pub async fn create_user(db: Arc<Database>, username: &str, email: Option<&str>) -> ServiceResult<User> {
    let mut conn = db.pool.acquire().await?;
    let user = insert_user(&mut *conn, username, email).await?;
    info!("[USERS] Created user {} (id={})", user.username, user.id);
    Ok(user)
}

pub async fn get_user(db: Arc<Database>, user_id: &str) -> ServiceResult<User> {
    let row = sqlx::query("SELECT id, username, email, created_at FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&db.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("User not found".into()))?;
    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        created_at: millis_to_datetime(row.get("created_at")),
    })
}

pub(crate) fn summary_from_row(row: &sqlx::sqlite::SqliteRow, prefix: &str) -> UserSummary {
    UserSummary {
        id: row.get(format!("{}id", prefix).as_str()),
        username: row.get(format!("{}username", prefix).as_str()),
        email: row.get(format!("{}email", prefix).as_str()),
    }
}
