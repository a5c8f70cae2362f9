use spesa::server::database::Database;
use spesa::utils::performance::collect_stats;
use sqlx::Row;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let db_path = std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:data/spesa.db".to_string());
    println!("Connecting to {}", db_path);
    let db = Database::connect(&db_path).await?;

    let stats = collect_stats(&db).await;
    println!("{:?}", stats);

    println!("\n-- groups --");
    let rows = sqlx::query(
        "SELECT g.id, g.name, g.created_by, g.invite_code, \
                (SELECT COUNT(*) FROM group_members m WHERE m.group_id = g.id) AS members, \
                (SELECT COUNT(*) FROM group_members m WHERE m.group_id = g.id AND m.user_id = g.created_by) AS creator_is_member \
         FROM groups g ORDER BY g.created_at",
    )
    .fetch_all(&db.pool)
    .await?;
    for r in rows.iter() {
        let id: String = r.try_get("id").unwrap_or_default();
        let name: String = r.try_get("name").unwrap_or_default();
        let created_by: String = r.try_get("created_by").unwrap_or_default();
        let invite_code: String = r.try_get("invite_code").unwrap_or_default();
        let members: i64 = r.try_get("members").unwrap_or(0);
        let creator_is_member: i64 = r.try_get("creator_is_member").unwrap_or(0);
        // un creatore fuori dal gruppo con membri rimasti è uno stato corrotto
        let flag = if members > 0 && creator_is_member == 0 { "  <-- creator not a member" } else { "" };
        println!(
            "id={} name={} created_by={} invite_code={} members={}{}",
            id, name, created_by, invite_code, members, flag
        );
    }

    println!("\n-- group_members --");
    let rows = sqlx::query("SELECT group_id, user_id, role, joined_at FROM group_members ORDER BY group_id, joined_at")
        .fetch_all(&db.pool)
        .await?;
    for r in rows.iter() {
        let group_id: String = r.try_get("group_id").unwrap_or_default();
        let user_id: String = r.try_get("user_id").unwrap_or_default();
        let role: String = r.try_get("role").unwrap_or_default();
        let joined_at: i64 = r.try_get("joined_at").unwrap_or(0);
        println!("group_id={} user_id={} role={} joined_at={}", group_id, user_id, role, joined_at);
    }

    println!("\n-- shopping_lists (last 10) --");
    let rows = sqlx::query(
        "SELECT l.id, l.group_id, l.name, l.is_completed, \
                (SELECT COUNT(*) FROM shopping_items i WHERE i.list_id = l.id) AS items \
         FROM shopping_lists l ORDER BY l.updated_at DESC LIMIT 10",
    )
    .fetch_all(&db.pool)
    .await?;
    for r in rows.iter() {
        let id: String = r.try_get("id").unwrap_or_default();
        let group_id: String = r.try_get("group_id").unwrap_or_default();
        let name: String = r.try_get("name").unwrap_or_default();
        let done: bool = r.try_get("is_completed").unwrap_or(false);
        let items: i64 = r.try_get("items").unwrap_or(0);
        println!("id={} group_id={} name={} completed={} items={}", id, group_id, name, done, items);
    }

    Ok(())
}
