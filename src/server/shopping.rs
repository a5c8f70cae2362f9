use crate::common::models::*;
use crate::common::protocol::DEFAULT_RECENT_LISTS;
use crate::server::database::Database;
use crate::server::error::{ServiceError, ServiceResult};
use crate::server::groups::require_member;
use chrono::Utc;
use log::info;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

const MAX_RECENT_LISTS: i64 = 50;

const ITEM_ORDER: &str = "ORDER BY is_completed ASC, \
     CASE priority WHEN 'HIGH' THEN 2 WHEN 'MEDIUM' THEN 1 ELSE 0 END DESC, \
     created_at DESC";

fn list_not_found() -> ServiceError {
    ServiceError::NotFound("Shopping list not found or you do not have access".into())
}

fn item_not_found() -> ServiceError {
    ServiceError::NotFound("Shopping item not found or you do not have access".into())
}

fn list_from_row(r: &SqliteRow) -> ShoppingList {
    ShoppingList {
        id: r.get("id"),
        group_id: r.get("group_id"),
        name: r.get("name"),
        description: r.get("description"),
        is_completed: r.get("is_completed"),
        created_at: millis_to_datetime(r.get("created_at")),
        updated_at: millis_to_datetime(r.get("updated_at")),
    }
}

fn item_from_row(r: &SqliteRow) -> ShoppingItem {
    let priority: String = r.get("priority");
    ShoppingItem {
        id: r.get("id"),
        list_id: r.get("list_id"),
        name: r.get("name"),
        quantity: r.get("quantity"),
        unit: r.get("unit"),
        notes: r.get("notes"),
        category: r.get("category"),
        is_completed: r.get("is_completed"),
        // CHECK-free column: unknown values read back as the default
        priority: Priority::parse(&priority).unwrap_or_default(),
        estimated_price: r.get("estimated_price"),
        actual_price: r.get("actual_price"),
        created_at: millis_to_datetime(r.get("created_at")),
        updated_at: millis_to_datetime(r.get("updated_at")),
    }
}

/// Quantità non positive diventano 1
fn normalize_quantity(quantity: Option<i64>) -> i64 {
    quantity.filter(|q| *q > 0).unwrap_or(1)
}

fn non_blank(text: Option<&str>) -> Option<String> {
    text.map(str::trim).filter(|t| !t.is_empty()).map(str::to_string)
}

/// Lista visibile all'utente (membro del gruppo proprietario), con nome del gruppo.
async fn accessible_list(pool: &SqlitePool, list_id: &str, user_id: &str) -> ServiceResult<Option<(ShoppingList, String)>> {
    let row = sqlx::query(
        "SELECT l.id, l.group_id, l.name, l.description, l.is_completed, l.created_at, l.updated_at, \
                g.name AS group_name \
         FROM shopping_lists l JOIN groups g ON g.id = l.group_id \
         WHERE l.id = ? AND EXISTS (SELECT 1 FROM group_members m WHERE m.group_id = l.group_id AND m.user_id = ?)",
    )
    .bind(list_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| (list_from_row(&r), r.get("group_name"))))
}

async fn accessible_item(pool: &SqlitePool, item_id: &str, user_id: &str) -> ServiceResult<Option<ShoppingItem>> {
    let row = sqlx::query(
        "SELECT i.* FROM shopping_items i JOIN shopping_lists l ON l.id = i.list_id \
         WHERE i.id = ? AND EXISTS (SELECT 1 FROM group_members m WHERE m.group_id = l.group_id AND m.user_id = ?)",
    )
    .bind(item_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(item_from_row))
}

async fn items_of(pool: &SqlitePool, list_id: &str) -> ServiceResult<Vec<ShoppingItem>> {
    let rows = sqlx::query(&format!("SELECT * FROM shopping_items WHERE list_id = ? {}", ITEM_ORDER))
        .bind(list_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(item_from_row).collect())
}

async fn with_items(pool: &SqlitePool, list: ShoppingList, group_name: String) -> ServiceResult<ListDetails> {
    let items = items_of(pool, &list.id).await?;
    Ok(ListDetails {
        item_count: items.len() as i64,
        completed_item_count: items.iter().filter(|i| i.is_completed).count() as i64,
        list,
        group_name,
        items,
    })
}

async fn group_name(pool: &SqlitePool, group_id: &str) -> ServiceResult<String> {
    sqlx::query_scalar::<_, String>("SELECT name FROM groups WHERE id = ?")
        .bind(group_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Group not found".into()))
}

// ───────────────────────────── Lists ─────────────────────────────

pub async fn create_list(
    db: Arc<Database>,
    user_id: &str,
    group_id: &str,
    name: &str,
    description: Option<&str>,
) -> ServiceResult<ListDetails> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ServiceError::Validation("Shopping list name is required".into()));
    }
    require_member(&db.pool, group_id, user_id).await?;

    let now = Utc::now().timestamp_millis();
    let list = ShoppingList {
        id: uuid::Uuid::new_v4().to_string(),
        group_id: group_id.to_string(),
        name: name.to_string(),
        description: non_blank(description),
        is_completed: false,
        created_at: millis_to_datetime(now),
        updated_at: millis_to_datetime(now),
    };
    sqlx::query(
        "INSERT INTO shopping_lists (id, group_id, name, description, is_completed, created_at, updated_at) \
         VALUES (?, ?, ?, ?, 0, ?, ?)",
    )
    .bind(&list.id)
    .bind(&list.group_id)
    .bind(&list.name)
    .bind(&list.description)
    .bind(now)
    .bind(now)
    .execute(&db.pool)
    .await?;
    info!("[LISTS] List '{}' ({}) created in group {} by {}", list.name, list.id, group_id, user_id);

    let group_name = group_name(&db.pool, group_id).await?;
    with_items(&db.pool, list, group_name).await
}

/// Liste del gruppo: prima quelle aperte, poi per ultimo aggiornamento.
pub async fn group_lists(db: Arc<Database>, user_id: &str, group_id: &str) -> ServiceResult<Vec<ListDetails>> {
    require_member(&db.pool, group_id, user_id).await?;
    let group_name = group_name(&db.pool, group_id).await?;
    let rows = sqlx::query("SELECT * FROM shopping_lists WHERE group_id = ? ORDER BY is_completed ASC, updated_at DESC")
        .bind(group_id)
        .fetch_all(&db.pool)
        .await?;
    let mut lists = Vec::with_capacity(rows.len());
    for row in &rows {
        lists.push(with_items(&db.pool, list_from_row(row), group_name.clone()).await?);
    }
    Ok(lists)
}

pub async fn get_list(db: Arc<Database>, user_id: &str, list_id: &str) -> ServiceResult<ListDetails> {
    let (list, group_name) = accessible_list(&db.pool, list_id, user_id).await?.ok_or_else(list_not_found)?;
    with_items(&db.pool, list, group_name).await
}

pub async fn update_list(db: Arc<Database>, user_id: &str, list_id: &str, changes: &ListChanges) -> ServiceResult<ListDetails> {
    let (mut list, group_name) = accessible_list(&db.pool, list_id, user_id).await?.ok_or_else(list_not_found)?;

    if let Some(name) = non_blank(changes.name.as_deref()) {
        list.name = name;
    }
    if let Some(description) = &changes.description {
        list.description = non_blank(Some(description));
    }
    if let Some(done) = changes.is_completed {
        list.is_completed = done;
    }
    let now = Utc::now().timestamp_millis();
    list.updated_at = millis_to_datetime(now);

    sqlx::query("UPDATE shopping_lists SET name = ?, description = ?, is_completed = ?, updated_at = ? WHERE id = ?")
        .bind(&list.name)
        .bind(&list.description)
        .bind(list.is_completed)
        .bind(now)
        .bind(&list.id)
        .execute(&db.pool)
        .await?;
    info!("[LISTS] List {} updated by {}", list.id, user_id);
    with_items(&db.pool, list, group_name).await
}

/// Cancella la lista; gli articoli seguono per cascade.
pub async fn delete_list(db: Arc<Database>, user_id: &str, list_id: &str) -> ServiceResult<()> {
    accessible_list(&db.pool, list_id, user_id).await?.ok_or_else(list_not_found)?;
    sqlx::query("DELETE FROM shopping_lists WHERE id = ?")
        .bind(list_id)
        .execute(&db.pool)
        .await?;
    info!("[LISTS] List {} deleted by {}", list_id, user_id);
    Ok(())
}

/// Liste aggiornate più di recente in tutti i gruppi dell'utente.
pub async fn recent_lists(db: Arc<Database>, user_id: &str, limit: Option<i64>) -> ServiceResult<Vec<ListDetails>> {
    let limit = limit.filter(|l| *l > 0).unwrap_or(DEFAULT_RECENT_LISTS).min(MAX_RECENT_LISTS);
    let rows = sqlx::query(
        "SELECT l.*, g.name AS group_name FROM shopping_lists l JOIN groups g ON g.id = l.group_id \
         WHERE EXISTS (SELECT 1 FROM group_members m WHERE m.group_id = l.group_id AND m.user_id = ?) \
         ORDER BY l.updated_at DESC LIMIT ?",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(&db.pool)
    .await?;
    let mut lists = Vec::with_capacity(rows.len());
    for row in &rows {
        lists.push(with_items(&db.pool, list_from_row(row), row.get("group_name")).await?);
    }
    Ok(lists)
}

// ───────────────────────────── Items ─────────────────────────────

pub async fn add_item(db: Arc<Database>, user_id: &str, list_id: &str, new: &NewItem) -> ServiceResult<ShoppingItem> {
    let name = new.name.trim();
    if name.is_empty() {
        return Err(ServiceError::Validation("Item name is required".into()));
    }
    accessible_list(&db.pool, list_id, user_id).await?.ok_or_else(list_not_found)?;

    let now = Utc::now().timestamp_millis();
    let item = ShoppingItem {
        id: uuid::Uuid::new_v4().to_string(),
        list_id: list_id.to_string(),
        name: name.to_string(),
        quantity: normalize_quantity(new.quantity),
        unit: non_blank(new.unit.as_deref()),
        notes: non_blank(new.notes.as_deref()),
        category: non_blank(new.category.as_deref()),
        is_completed: false,
        priority: new.priority.unwrap_or_default(),
        estimated_price: new.estimated_price,
        actual_price: None,
        created_at: millis_to_datetime(now),
        updated_at: millis_to_datetime(now),
    };
    sqlx::query(
        "INSERT INTO shopping_items (id, list_id, name, quantity, unit, notes, category, is_completed, priority, \
                                     estimated_price, actual_price, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?, NULL, ?, ?)",
    )
    .bind(&item.id)
    .bind(&item.list_id)
    .bind(&item.name)
    .bind(item.quantity)
    .bind(&item.unit)
    .bind(&item.notes)
    .bind(&item.category)
    .bind(item.priority.as_str())
    .bind(item.estimated_price)
    .bind(now)
    .bind(now)
    .execute(&db.pool)
    .await?;
    info!("[ITEMS] Item '{}' added to list {} by {}", item.name, list_id, user_id);
    Ok(item)
}

pub async fn list_items(db: Arc<Database>, user_id: &str, list_id: &str) -> ServiceResult<Vec<ShoppingItem>> {
    accessible_list(&db.pool, list_id, user_id).await?.ok_or_else(list_not_found)?;
    items_of(&db.pool, list_id).await
}

pub async fn update_item(db: Arc<Database>, user_id: &str, item_id: &str, changes: &ItemChanges) -> ServiceResult<ShoppingItem> {
    let mut item = accessible_item(&db.pool, item_id, user_id).await?.ok_or_else(item_not_found)?;

    if let Some(name) = non_blank(changes.name.as_deref()) {
        item.name = name;
    }
    if changes.quantity.is_some() {
        item.quantity = normalize_quantity(changes.quantity);
    }
    if let Some(unit) = &changes.unit {
        item.unit = non_blank(Some(unit));
    }
    if let Some(notes) = &changes.notes {
        item.notes = non_blank(Some(notes));
    }
    if let Some(category) = &changes.category {
        item.category = non_blank(Some(category));
    }
    if let Some(done) = changes.is_completed {
        item.is_completed = done;
    }
    if let Some(priority) = changes.priority {
        item.priority = priority;
    }
    if let Some(price) = changes.estimated_price {
        item.estimated_price = price;
    }
    if let Some(price) = changes.actual_price {
        item.actual_price = price;
    }
    let now = Utc::now().timestamp_millis();
    item.updated_at = millis_to_datetime(now);

    sqlx::query(
        "UPDATE shopping_items SET name = ?, quantity = ?, unit = ?, notes = ?, category = ?, is_completed = ?, \
                priority = ?, estimated_price = ?, actual_price = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&item.name)
    .bind(item.quantity)
    .bind(&item.unit)
    .bind(&item.notes)
    .bind(&item.category)
    .bind(item.is_completed)
    .bind(item.priority.as_str())
    .bind(item.estimated_price)
    .bind(item.actual_price)
    .bind(now)
    .bind(&item.id)
    .execute(&db.pool)
    .await?;
    info!("[ITEMS] Item {} updated by {}", item.id, user_id);
    Ok(item)
}

pub async fn delete_item(db: Arc<Database>, user_id: &str, item_id: &str) -> ServiceResult<()> {
    accessible_item(&db.pool, item_id, user_id).await?.ok_or_else(item_not_found)?;
    sqlx::query("DELETE FROM shopping_items WHERE id = ?")
        .bind(item_id)
        .execute(&db.pool)
        .await?;
    info!("[ITEMS] Item {} deleted by {}", item_id, user_id);
    Ok(())
}
