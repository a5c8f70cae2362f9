use crate::server::database::Database;
use chrono::Utc;
use log::{error, info, warn};
use std::{fs::OpenOptions, io::Write, sync::Arc, time::Duration};
use sysinfo::System;
use tokio::time;

/// Conteggi del DB riportati dal logger periodico
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    pub users: i64,
    pub groups: i64,
    pub memberships: i64,
    pub lists: i64,
    pub items: i64,
}

async fn count(db: &Database, table: &str) -> i64 {
    match sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(&db.pool)
        .await
    {
        Ok(count) => count,
        Err(e) => {
            warn!("Failed to count {}: {}", table, e);
            -1
        }
    }
}

pub async fn collect_stats(db: &Database) -> StoreStats {
    StoreStats {
        users: count(db, "users").await,
        groups: count(db, "groups").await,
        memberships: count(db, "group_members").await,
        lists: count(db, "shopping_lists").await,
        items: count(db, "shopping_items").await,
    }
}

/// Logga periodicamente i conteggi del DB e la CPU; se `log_path` è dato
/// scrive anche una riga CSV per campione.
pub async fn start_performance_logger(db: Arc<Database>, log_path: Option<String>, interval: Duration) {
    let mut system = System::new_all();

    let mut file = match &log_path {
        Some(path) => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => Some(f),
            Err(e) => {
                error!("Unable to open performance log file '{}': {}", path, e);
                None
            }
        },
        None => None,
    };

    if let Some(f) = file.as_mut() {
        if f.metadata().map(|m| m.len()).unwrap_or(0) == 0 {
            if let Err(e) = writeln!(f, "timestamp,users,groups,memberships,lists,items,cpu_usage_percent") {
                error!("Failed to write header to performance log: {}", e);
            }
        }
    }

    loop {
        system.refresh_cpu();
        let cpus = system.cpus();
        let cpu_usage = if cpus.is_empty() {
            0.0
        } else {
            cpus.iter().map(|c| c.cpu_usage()).sum::<f32>() / cpus.len() as f32
        };
        let stats = collect_stats(&db).await;

        info!(
            "📊 Stats - Users: {}, Groups: {}, Memberships: {}, Lists: {}, Items: {}, CPU: {:.1}%",
            stats.users, stats.groups, stats.memberships, stats.lists, stats.items, cpu_usage
        );

        if let Some(f) = file.as_mut() {
            let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
            if let Err(e) = writeln!(
                f,
                "{},{},{},{},{},{},{:.1}",
                timestamp, stats.users, stats.groups, stats.memberships, stats.lists, stats.items, cpu_usage
            ) {
                error!("Failed to write to performance log: {}", e);
            } else if let Err(e) = f.flush() {
                error!("Failed to flush performance log: {}", e);
            }
        }

        time::sleep(interval).await;
    }
}
