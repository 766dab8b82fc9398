use super::model::{SubscriptionFields, SubscriptionRecord};
use crate::model::SubscriptionStatus;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

pub type Pool = SqlitePool;

const RECORD_COLUMNS: &str = "id, shop, subscription_id, status, plan_name, price, currency, \
     created_at, updated_at, cancelled_at, trial_ends_at";

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the
/// parent directory exists. Leaves in-memory URLs untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match path_part.strip_prefix("~/") {
        Some(rest) => match std::env::var("HOME") {
            Ok(home) => format!("{}/{}", home.trim_end_matches('/'), rest),
            Err(_) => path_part.to_string(),
        },
        None => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = format!("sqlite://{}", expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn record_from_row(row: &SqliteRow) -> SubscriptionRecord {
    let status: String = row.get("status");
    SubscriptionRecord {
        id: row.get("id"),
        shop: row.get("shop"),
        subscription_id: row
            .try_get::<Option<String>, _>("subscription_id")
            .ok()
            .flatten(),
        status: SubscriptionStatus::parse(&status),
        plan_name: row.get("plan_name"),
        price: row.get("price"),
        currency: row.get("currency"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        cancelled_at: row
            .try_get::<Option<DateTime<Utc>>, _>("cancelled_at")
            .ok()
            .flatten(),
        trial_ends_at: row
            .try_get::<Option<DateTime<Utc>>, _>("trial_ends_at")
            .ok()
            .flatten(),
    }
}

#[instrument(skip_all)]
pub async fn find_by_shop(pool: &Pool, shop: &str) -> Result<Option<SubscriptionRecord>> {
    let row = sqlx::query(&format!(
        "SELECT {RECORD_COLUMNS} FROM subscriptions WHERE shop = ?"
    ))
    .bind(shop)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(record_from_row))
}

/// Lookup by remote subscription id OR shop domain; the lowest-id match wins.
#[instrument(skip_all)]
pub async fn find_by_remote_or_shop(
    pool: &Pool,
    remote_id: Option<&str>,
    shop: &str,
) -> Result<Option<SubscriptionRecord>> {
    let row = sqlx::query(&format!(
        "SELECT {RECORD_COLUMNS} FROM subscriptions \
         WHERE (subscription_id IS NOT NULL AND subscription_id = ?) OR shop = ? \
         ORDER BY id LIMIT 1"
    ))
    .bind(remote_id)
    .bind(shop)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(record_from_row))
}

/// Insert the shop's record or overwrite its mutable fields in place.
#[instrument(skip_all)]
pub async fn upsert_subscription(
    pool: &Pool,
    shop: &str,
    fields: &SubscriptionFields,
) -> Result<SubscriptionRecord> {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO subscriptions (shop, subscription_id, status, plan_name, price, currency, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(shop) DO UPDATE SET \
             subscription_id = excluded.subscription_id, \
             status = excluded.status, \
             plan_name = excluded.plan_name, \
             price = excluded.price, \
             currency = excluded.currency, \
             updated_at = excluded.updated_at",
    )
    .bind(shop)
    .bind(&fields.subscription_id)
    .bind(&fields.status)
    .bind(&fields.plan_name)
    .bind(&fields.price)
    .bind(&fields.currency)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    find_by_shop(pool, shop)
        .await?
        .ok_or_else(|| anyhow!("subscription for {} missing after upsert", shop))
}

#[instrument(skip_all)]
pub async fn create_subscription(
    pool: &Pool,
    shop: &str,
    fields: &SubscriptionFields,
) -> Result<SubscriptionRecord> {
    let now = Utc::now();
    let row = sqlx::query(&format!(
        "INSERT INTO subscriptions (shop, subscription_id, status, plan_name, price, currency, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING {RECORD_COLUMNS}"
    ))
    .bind(shop)
    .bind(&fields.subscription_id)
    .bind(&fields.status)
    .bind(&fields.plan_name)
    .bind(&fields.price)
    .bind(&fields.currency)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(record_from_row(&row))
}

/// Overwrite the stored status, stamping `updated_at`.
#[instrument(skip_all)]
pub async fn set_status(pool: &Pool, shop: &str, status: &str) -> Result<SubscriptionRecord> {
    sqlx::query("UPDATE subscriptions SET status = ?, updated_at = ? WHERE shop = ?")
        .bind(status)
        .bind(Utc::now())
        .bind(shop)
        .execute(pool)
        .await?;
    find_by_shop(pool, shop)
        .await?
        .ok_or_else(|| anyhow!("no subscription record for {}", shop))
}

/// Status overwrite addressed by row id (webhook path, where the record may
/// have been matched by remote id rather than shop).
#[instrument(skip_all)]
pub async fn set_status_by_id(
    pool: &Pool,
    id: i64,
    status: &str,
    cancelled_at: Option<DateTime<Utc>>,
) -> Result<()> {
    sqlx::query("UPDATE subscriptions SET status = ?, updated_at = ?, cancelled_at = ? WHERE id = ?")
        .bind(status)
        .bind(Utc::now())
        .bind(cancelled_at)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Terminal transition: status CANCELLED with `cancelled_at` stamped.
#[instrument(skip_all)]
pub async fn mark_cancelled(pool: &Pool, shop: &str) -> Result<SubscriptionRecord> {
    let now = Utc::now();
    sqlx::query("UPDATE subscriptions SET status = 'CANCELLED', cancelled_at = ?, updated_at = ? WHERE shop = ?")
        .bind(now)
        .bind(now)
        .bind(shop)
        .execute(pool)
        .await?;
    find_by_shop(pool, shop)
        .await?
        .ok_or_else(|| anyhow!("no subscription record for {}", shop))
}
