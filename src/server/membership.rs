//! Uscita di un membro da un gruppo.
//!
//! La decisione (cancellare il gruppo, trasferire la proprietà o rimuovere
//! solo il membro) e la scelta del successore sono funzioni pure; l'esecuzione
//! avviene in un'unica transazione che prende il lock in scrittura prima di
//! leggere i membri, così conteggio e scritture vedono lo stesso stato.

use crate::common::models::{millis_to_datetime, GroupMember, Role};
use crate::common::protocol::LeaveOutcome;
use crate::server::database::Database;
use crate::server::error::{ServiceError, ServiceResult};
use crate::server::groups::parse_role;
use chrono::Utc;
use log::{info, warn};
use sqlx::sqlite::SqliteQueryResult;
use sqlx::{Row, SqliteConnection};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    DeleteGroup,
    TransferOwnership,
    RemoveMember,
}

pub fn decide_transition(is_creator: bool, is_only_member: bool) -> Transition {
    match (is_creator, is_only_member) {
        (true, true) => Transition::DeleteGroup,
        (true, false) => Transition::TransferOwnership,
        // Il creatore se n'è già andato senza trasferimento: un gruppo senza
        // membri non è valido, quindi va cancellato anche qui.
        (false, true) => Transition::DeleteGroup,
        (false, false) => Transition::RemoveMember,
    }
}

fn role_rank(role: Role) -> u8 {
    match role {
        Role::Admin => 0,
        Role::Member => 1,
    }
}

/// Successore del creatore uscente: prima gli ADMIN, poi il membro con
/// `joined_at` più vecchio, infine la riga inserita per prima.
pub fn select_successor<'a>(members: &'a [GroupMember], departing_user: &str) -> Option<&'a GroupMember> {
    members
        .iter()
        .filter(|m| m.user_id != departing_user)
        .min_by_key(|m| (role_rank(m.role), m.joined_at, m.seq))
}

async fn load_members(conn: &mut SqliteConnection, group_id: &str) -> ServiceResult<Vec<GroupMember>> {
    let rows = sqlx::query("SELECT id, group_id, user_id, role, joined_at FROM group_members WHERE group_id = ?")
        .bind(group_id)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter()
        .map(|r| {
            Ok(GroupMember {
                seq: r.get("id"),
                group_id: r.get("group_id"),
                user_id: r.get("user_id"),
                role: parse_role(&r.get::<String, _>("role"))?,
                joined_at: millis_to_datetime(r.get("joined_at")),
            })
        })
        .collect()
}

/// Membri di un gruppo in ordine di ingresso.
pub async fn group_members(db: Arc<Database>, group_id: &str) -> ServiceResult<Vec<GroupMember>> {
    let mut conn = db.pool.acquire().await?;
    let mut members = load_members(&mut *conn, group_id).await?;
    members.sort_by_key(|m| (m.joined_at, m.seq));
    Ok(members)
}

fn expect_one(res: SqliteQueryResult, step: &str) -> ServiceResult<()> {
    match res.rows_affected() {
        1 => Ok(()),
        n => Err(ServiceError::InvariantViolation(format!("{} affected {} rows, expected 1", step, n))),
    }
}

async fn delete_group(conn: &mut SqliteConnection, group_id: &str) -> ServiceResult<()> {
    let res = sqlx::query("DELETE FROM groups WHERE id = ?")
        .bind(group_id)
        .execute(&mut *conn)
        .await?;
    expect_one(res, "group delete")
}

async fn remove_member(conn: &mut SqliteConnection, group_id: &str, user_id: &str) -> ServiceResult<()> {
    let res = sqlx::query("DELETE FROM group_members WHERE group_id = ? AND user_id = ?")
        .bind(group_id)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    expect_one(res, "membership delete")
}

/// I tre passi del trasferimento; il chiamante li racchiude nella transazione.
async fn transfer_ownership(
    conn: &mut SqliteConnection,
    group_id: &str,
    departing_user: &str,
    successor: &str,
) -> ServiceResult<()> {
    let res = sqlx::query("UPDATE groups SET created_by = ?, updated_at = ? WHERE id = ?")
        .bind(successor)
        .bind(Utc::now().timestamp_millis())
        .bind(group_id)
        .execute(&mut *conn)
        .await?;
    expect_one(res, "creator update")?;

    let res = sqlx::query("UPDATE group_members SET role = ? WHERE group_id = ? AND user_id = ?")
        .bind(Role::Admin.as_str())
        .bind(group_id)
        .bind(successor)
        .execute(&mut *conn)
        .await?;
    expect_one(res, "successor promotion")?;

    remove_member(conn, group_id, departing_user).await
}

pub async fn leave_group(db: Arc<Database>, user_id: &str, group_id: &str) -> ServiceResult<LeaveOutcome> {
    info!("[GROUPS] User {} leaves group {}", user_id, group_id);
    let not_member = || ServiceError::NotFound("You are not a member of this group".into());

    let mut tx = db.pool.begin().await?;

    // Scrittura nulla sulla riga del gruppo: prende il lock prima delle
    // letture senza cambiare l'ordinamento di my_groups
    let touched = sqlx::query("UPDATE groups SET updated_at = updated_at WHERE id = ?")
        .bind(group_id)
        .execute(&mut *tx)
        .await?;
    if touched.rows_affected() == 0 {
        return Err(not_member());
    }

    let created_by = sqlx::query_scalar::<_, String>("SELECT created_by FROM groups WHERE id = ?")
        .bind(group_id)
        .fetch_one(&mut *tx)
        .await?;
    let members = load_members(&mut *tx, group_id).await?;
    if !members.iter().any(|m| m.user_id == user_id) {
        return Err(not_member());
    }

    let is_creator = created_by == user_id;
    let is_only_member = members.len() == 1;

    let outcome = match decide_transition(is_creator, is_only_member) {
        Transition::DeleteGroup => {
            if !is_creator {
                warn!(
                    "[GROUPS] Group {} had a sole non-creator member {} (stale creator {}); deleting it",
                    group_id, user_id, created_by
                );
            }
            delete_group(&mut *tx, group_id).await?;
            LeaveOutcome::GroupDeleted
        }
        Transition::TransferOwnership => {
            let successor = select_successor(&members, user_id)
                .ok_or_else(|| {
                    ServiceError::InvariantViolation(format!(
                        "group {} has {} members but no successor for {}",
                        group_id,
                        members.len(),
                        user_id
                    ))
                })?
                .user_id
                .clone();
            transfer_ownership(&mut *tx, group_id, user_id, &successor).await?;
            LeaveOutcome::OwnershipTransferred { new_owner: successor }
        }
        Transition::RemoveMember => {
            remove_member(&mut *tx, group_id, user_id).await?;
            LeaveOutcome::Left
        }
    };

    tx.commit().await?;
    match &outcome {
        LeaveOutcome::GroupDeleted => info!("[GROUPS] Group {} deleted on leave of {}", group_id, user_id),
        LeaveOutcome::OwnershipTransferred { new_owner } => {
            info!("[GROUPS] Ownership of group {} transferred from {} to {}", group_id, user_id, new_owner)
        }
        LeaveOutcome::Left => info!("[GROUPS] User {} left group {}", user_id, group_id),
    }
    Ok(outcome)
}
