use crate::common::models::*;
use crate::common::protocol::MAX_GROUP_NAME_LENGTH;
use crate::server::config::ServerConfig;
use crate::server::database::Database;
use crate::server::error::{is_foreign_key_violation, is_unique_violation, ServiceError, ServiceResult};
use crate::server::invite_code::{self, MAX_INVITE_CODE_ATTEMPTS};
use crate::server::users::summary_from_row;
use chrono::Utc;
use log::{info, warn};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

pub(crate) fn parse_role(raw: &str) -> ServiceResult<Role> {
    Role::parse(raw).ok_or_else(|| ServiceError::InvariantViolation(format!("unknown member role '{}'", raw)))
}

pub(crate) async fn group_exists(pool: &SqlitePool, group_id: &str) -> ServiceResult<bool> {
    let row = sqlx::query("SELECT 1 FROM groups WHERE id = ?")
        .bind(group_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

pub(crate) async fn is_member(pool: &SqlitePool, group_id: &str, user_id: &str) -> ServiceResult<bool> {
    let row = sqlx::query("SELECT 1 FROM group_members WHERE group_id = ? AND user_id = ?")
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

/// NotFound se il gruppo non esiste, Forbidden se l'utente non ne fa parte.
pub(crate) async fn require_member(pool: &SqlitePool, group_id: &str, user_id: &str) -> ServiceResult<()> {
    if !group_exists(pool, group_id).await? {
        return Err(ServiceError::NotFound("Group not found".into()));
    }
    if !is_member(pool, group_id, user_id).await? {
        return Err(ServiceError::Forbidden("You are not a member of this group".into()));
    }
    Ok(())
}

/// Carica gruppo, creatore, membri e liste. `None` se il gruppo non esiste.
pub(crate) async fn load_details(pool: &SqlitePool, group_id: &str) -> ServiceResult<Option<GroupDetails>> {
    let row = sqlx::query(
        "SELECT g.id, g.name, g.description, g.invite_code, g.created_by, g.created_at, g.updated_at, \
                u.id AS c_id, u.username AS c_username, u.email AS c_email \
         FROM groups g LEFT JOIN users u ON u.id = g.created_by WHERE g.id = ?",
    )
    .bind(group_id)
    .fetch_optional(pool)
    .await?;
    let Some(row) = row else { return Ok(None) };

    let group = Group {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        invite_code: row.get("invite_code"),
        created_by: row.get("created_by"),
        created_at: millis_to_datetime(row.get("created_at")),
        updated_at: millis_to_datetime(row.get("updated_at")),
    };
    let creator = row
        .get::<Option<String>, _>("c_id")
        .map(|_| summary_from_row(&row, "c_"));

    let member_rows = sqlx::query(
        "SELECT gm.role, gm.joined_at, u.id, u.username, u.email \
         FROM group_members gm JOIN users u ON u.id = gm.user_id \
         WHERE gm.group_id = ? ORDER BY gm.joined_at, gm.id",
    )
    .bind(group_id)
    .fetch_all(pool)
    .await?;
    let members = member_rows
        .iter()
        .map(|r| {
            Ok(MemberInfo {
                user: summary_from_row(r, ""),
                role: parse_role(&r.get::<String, _>("role"))?,
                joined_at: millis_to_datetime(r.get("joined_at")),
            })
        })
        .collect::<ServiceResult<Vec<_>>>()?;

    let shopping_lists = sqlx::query(
        "SELECT id, name, is_completed FROM shopping_lists WHERE group_id = ? \
         ORDER BY is_completed ASC, updated_at DESC",
    )
    .bind(group_id)
    .fetch_all(pool)
    .await?
    .iter()
    .map(|r| ListBrief {
        id: r.get("id"),
        name: r.get("name"),
        is_completed: r.get("is_completed"),
    })
    .collect::<Vec<_>>();

    Ok(Some(GroupDetails {
        group,
        creator,
        member_count: members.len() as i64,
        list_count: shopping_lists.len() as i64,
        members,
        shopping_lists,
    }))
}

fn clean_optional(text: Option<&str>) -> Option<String> {
    text.map(str::trim).filter(|t| !t.is_empty()).map(str::to_string)
}

/// Crea un gruppo e vi inserisce il creatore come ADMIN, nella stessa transazione.
pub async fn create_group(
    db: Arc<Database>,
    config: &ServerConfig,
    creator_id: &str,
    name: &str,
    description: Option<&str>,
) -> ServiceResult<GroupDetails> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ServiceError::Validation("Group name is required".into()));
    }
    if name.chars().count() > MAX_GROUP_NAME_LENGTH {
        return Err(ServiceError::Validation(format!(
            "Group name must be at most {} characters",
            MAX_GROUP_NAME_LENGTH
        )));
    }
    info!("[GROUPS] Create group '{}' by user {}", name, creator_id);

    let group_id = uuid::Uuid::new_v4().to_string();
    let now = Utc::now().timestamp_millis();
    let description = clean_optional(description);

    let mut tx = db.pool.begin().await?;
    let mut attempt = 0;
    loop {
        attempt += 1;
        let code = invite_code::generate(config.invite_code_bytes);
        let res = sqlx::query(
            "INSERT INTO groups (id, name, description, invite_code, created_by, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&group_id)
        .bind(name)
        .bind(&description)
        .bind(&code)
        .bind(creator_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await;
        match res {
            Ok(_) => break,
            Err(e) if is_unique_violation(&e) && attempt < MAX_INVITE_CODE_ATTEMPTS => {
                warn!("[GROUPS] Invite code collision (attempt {}), retrying", attempt);
            }
            Err(e) => return Err(e.into()),
        }
    }

    sqlx::query("INSERT INTO group_members (group_id, user_id, role, joined_at) VALUES (?, ?, ?, ?)")
        .bind(&group_id)
        .bind(creator_id)
        .bind(Role::Admin.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    info!("[GROUPS] Group '{}' created with id {}", name, group_id);

    load_details(&db.pool, &group_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Group not found".into()))
}

/// Ingresso tramite codice invito, sempre con ruolo MEMBER.
pub async fn join_group(db: Arc<Database>, user_id: &str, invite_code: &str) -> ServiceResult<GroupDetails> {
    let code = invite_code::normalize(invite_code)
        .ok_or_else(|| ServiceError::Validation("Invite code is required".into()))?;
    info!("[GROUPS] User {} joins with an invite code", user_id);

    let group_id = sqlx::query_scalar::<_, String>("SELECT id FROM groups WHERE invite_code = ?")
        .bind(code)
        .fetch_optional(&db.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Invalid invite code".into()))?;

    if is_member(&db.pool, &group_id, user_id).await? {
        return Err(ServiceError::Conflict("You are already a member of this group".into()));
    }

    let joined_at = Utc::now().timestamp_millis();
    let res = sqlx::query("INSERT INTO group_members (group_id, user_id, role, joined_at) VALUES (?, ?, ?, ?)")
        .bind(&group_id)
        .bind(user_id)
        .bind(Role::Member.as_str())
        .bind(joined_at)
        .execute(&db.pool)
        .await;
    match res {
        Ok(_) => {}
        // join concorrente dello stesso utente
        Err(e) if is_unique_violation(&e) => {
            return Err(ServiceError::Conflict("You are already a member of this group".into()))
        }
        // gruppo cancellato tra la lookup e l'insert
        Err(e) if is_foreign_key_violation(&e) => {
            return Err(ServiceError::NotFound("Invalid invite code".into()))
        }
        Err(e) => return Err(e.into()),
    }
    info!("[GROUPS] User {} joined group {}", user_id, group_id);

    load_details(&db.pool, &group_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Invalid invite code".into()))
}

/// Gruppi di cui l'utente fa parte, i più recenti per primi.
pub async fn my_groups(db: Arc<Database>, user_id: &str) -> ServiceResult<Vec<GroupDetails>> {
    let ids = sqlx::query_scalar::<_, String>(
        "SELECT g.id FROM groups g JOIN group_members m ON g.id = m.group_id \
         WHERE m.user_id = ? ORDER BY g.updated_at DESC, g.created_at DESC",
    )
    .bind(user_id)
    .fetch_all(&db.pool)
    .await?;

    let mut groups = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(details) = load_details(&db.pool, &id).await? {
            groups.push(details);
        }
    }
    Ok(groups)
}

pub async fn group_details(db: Arc<Database>, user_id: &str, group_id: &str) -> ServiceResult<GroupDetails> {
    require_member(&db.pool, group_id, user_id).await?;
    load_details(&db.pool, group_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Group not found".into()))
}
