//! Database entity models used by repositories.
//!
//! Keep these structs focused on the data returned by queries. Business logic
//! should live in higher layers.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::SubscriptionStatus;

/// The one persisted subscription row for a shop.
///
/// Created on the first subscription request (or by a webhook arriving
/// first), mutated by syncs, webhooks, and cancellation. Never hard-deleted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRecord {
    pub id: i64,
    pub shop: String,
    /// Remote billing identifier; absent until the remote side confirmed one.
    pub subscription_id: Option<String>,
    pub status: SubscriptionStatus,
    pub plan_name: String,
    pub price: String,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub trial_ends_at: Option<DateTime<Utc>>,
}

/// Field set written on create/upsert.
#[derive(Debug, Clone)]
pub struct SubscriptionFields {
    pub subscription_id: Option<String>,
    pub status: String,
    pub plan_name: String,
    pub price: String,
    pub currency: String,
}
