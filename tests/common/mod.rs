#![allow(dead_code)]

use spesa::common::models::GroupDetails;
use spesa::server::config::ServerConfig;
use spesa::server::database::Database;
use spesa::server::{groups, users};
use std::sync::Arc;

pub async fn setup() -> (Arc<Database>, ServerConfig) {
    let db = Database::connect_in_memory().await.expect("in-memory database");
    (Arc::new(db), ServerConfig::default())
}

pub async fn user(db: &Arc<Database>, name: &str) -> String {
    users::create_user(db.clone(), name, Some(&format!("{}@example.com", name)))
        .await
        .expect("create user")
        .id
}

/// Gruppo creato da `creator` con `others` entrati in ordine via codice invito.
pub async fn group_with(db: &Arc<Database>, config: &ServerConfig, creator: &str, others: &[&str]) -> GroupDetails {
    let group = groups::create_group(db.clone(), config, creator, "Casa", None)
        .await
        .expect("create group");
    for other in others {
        groups::join_group(db.clone(), other, &group.group.invite_code)
            .await
            .expect("join group");
    }
    group
}

pub async fn scalar(db: &Arc<Database>, sql: &str, bind: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(sql)
        .bind(bind)
        .fetch_one(&db.pool)
        .await
        .expect("scalar query")
}

pub async fn member_count(db: &Arc<Database>, group_id: &str) -> i64 {
    scalar(db, "SELECT COUNT(*) FROM group_members WHERE group_id = ?", group_id).await
}

pub async fn group_exists(db: &Arc<Database>, group_id: &str) -> bool {
    scalar(db, "SELECT COUNT(*) FROM groups WHERE id = ?", group_id).await == 1
}

pub async fn creator_of(db: &Arc<Database>, group_id: &str) -> String {
    sqlx::query_scalar::<_, String>("SELECT created_by FROM groups WHERE id = ?")
        .bind(group_id)
        .fetch_one(&db.pool)
        .await
        .expect("creator")
}

pub async fn role_of(db: &Arc<Database>, group_id: &str, user_id: &str) -> Option<String> {
    sqlx::query_scalar::<_, String>("SELECT role FROM group_members WHERE group_id = ? AND user_id = ?")
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(&db.pool)
        .await
        .expect("role")
}

pub async fn set_role(db: &Arc<Database>, group_id: &str, user_id: &str, role: &str) {
    sqlx::query("UPDATE group_members SET role = ? WHERE group_id = ? AND user_id = ?")
        .bind(role)
        .bind(group_id)
        .bind(user_id)
        .execute(&db.pool)
        .await
        .expect("set role");
}
