//! Subscription reconciliation between the local record and the billing API.
//!
//! The local record moves `NONE -> PENDING -> ACTIVE -> CANCELLED`; a
//! cancelled shop can re-subscribe, which upserts the same row into a fresh
//! cycle. All writes to the record go through this module.

use chrono::Utc;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::db::{self, Pool, SubscriptionFields, SubscriptionRecord};
use crate::error::BillingError;
use crate::shopify::model::UserError;
use crate::shopify::ShopifyAdmin;

/// What a subscription request hands back to the caller: the stored record
/// (when the remote side returned one) and the confirmation URL the merchant
/// must be redirected to.
#[derive(Debug, Clone)]
pub struct SubscriptionHandoff {
    pub record: Option<SubscriptionRecord>,
    pub confirmation_url: Option<String>,
}

/// Normalized content of a subscription webhook notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionEvent {
    pub shop: String,
    pub remote_id: Option<String>,
    pub status: Option<String>,
    pub plan_name: Option<String>,
    pub price: Option<String>,
    pub currency: Option<String>,
}

/// Request a new recurring subscription for the shop.
///
/// Idempotent when the stored record is already ACTIVE: no remote call is
/// made and the existing record is returned without a confirmation URL.
#[instrument(skip_all, fields(shop = %shop))]
pub async fn request_subscription(
    pool: &Pool,
    admin: &dyn ShopifyAdmin,
    shop: &str,
    plan_name: &str,
    price: &str,
    currency: &str,
    trial_days: Option<u32>,
    return_url: &str,
) -> Result<SubscriptionHandoff, BillingError> {
    if let Some(existing) = db::find_by_shop(pool, shop).await? {
        if existing.status.is_active() {
            return Ok(SubscriptionHandoff {
                record: Some(existing),
                confirmation_url: None,
            });
        }
    }

    let charge_name = format!("{} Plan", plan_name);
    let outcome = admin
        .create_recurring_charge(&charge_name, price, currency, return_url, trial_days)
        .await?;
    if !outcome.user_errors.is_empty() {
        return Err(BillingError::Remote(join_messages(&outcome.user_errors)));
    }

    let confirmation_url = outcome.confirmation_url;
    let record = match outcome.subscription {
        Some(remote) => {
            let fields = SubscriptionFields {
                subscription_id: Some(remote.id),
                status: remote.status,
                plan_name: plan_name.to_string(),
                price: price.to_string(),
                currency: currency.to_string(),
            };
            let record = db::upsert_subscription(pool, shop, &fields).await?;
            info!(shop, status = %record.status.as_str(), "stored subscription request");
            Some(record)
        }
        None => {
            warn!(shop, "billing API returned no subscription payload");
            None
        }
    };

    Ok(SubscriptionHandoff {
        record,
        confirmation_url,
    })
}

/// Pull the remote status and overwrite the local record.
///
/// A shop with no stored record syncs to nothing (`Ok(None)`); a missing
/// remote subscription leaves the stored record untouched.
#[instrument(skip_all, fields(shop = %shop))]
pub async fn sync(
    pool: &Pool,
    admin: &dyn ShopifyAdmin,
    shop: &str,
) -> Result<Option<SubscriptionRecord>, BillingError> {
    let Some(existing) = db::find_by_shop(pool, shop).await? else {
        return Ok(None);
    };
    let Some(remote_id) = existing.subscription_id.clone() else {
        return Ok(Some(existing));
    };

    match admin.get_recurring_charge(&remote_id).await? {
        Some(remote) => {
            let updated = db::set_status(pool, shop, &remote.status).await?;
            Ok(Some(updated))
        }
        None => Ok(Some(existing)),
    }
}

/// Cancel the shop's subscription remotely and locally.
#[instrument(skip_all, fields(shop = %shop))]
pub async fn cancel(
    pool: &Pool,
    admin: &dyn ShopifyAdmin,
    shop: &str,
) -> Result<SubscriptionRecord, BillingError> {
    let Some(existing) = db::find_by_shop(pool, shop).await? else {
        return Err(BillingError::NotSubscribed);
    };

    let remote_id = existing.subscription_id.clone().unwrap_or_default();
    let outcome = admin.cancel_recurring_charge(&remote_id).await?;
    if !outcome.user_errors.is_empty() {
        return Err(BillingError::Remote(join_messages(&outcome.user_errors)));
    }

    let record = db::mark_cancelled(pool, shop).await?;
    info!(shop, "subscription cancelled");
    Ok(record)
}

/// Apply a push notification from the billing system.
///
/// Looks up the record by remote id or shop; overwrites status when found,
/// creates a record with best-effort plan details when not.
#[instrument(skip_all, fields(shop = %event.shop))]
pub async fn on_webhook(pool: &Pool, event: &SubscriptionEvent) -> Result<(), BillingError> {
    let existing =
        db::find_by_remote_or_shop(pool, event.remote_id.as_deref(), &event.shop).await?;

    match existing {
        Some(record) => {
            let status = event
                .status
                .clone()
                .unwrap_or_else(|| record.status.as_str().to_string());
            let cancelled_at = if status == "CANCELLED" {
                Some(Utc::now())
            } else {
                record.cancelled_at
            };
            db::set_status_by_id(pool, record.id, &status, cancelled_at).await?;
            info!(%status, "subscription record updated from webhook");
        }
        None => {
            let fields = SubscriptionFields {
                subscription_id: event.remote_id.clone(),
                status: event.status.clone().unwrap_or_else(|| "PENDING".into()),
                plan_name: event.plan_name.clone().unwrap_or_else(|| "Basic".into()),
                price: event.price.clone().unwrap_or_else(|| "0".into()),
                currency: event.currency.clone().unwrap_or_else(|| "USD".into()),
            };
            db::create_subscription(pool, &event.shop, &fields).await?;
            info!("subscription record created from webhook");
        }
    }
    Ok(())
}

/// True iff a record exists for the shop and its status is ACTIVE.
pub async fn is_active(pool: &Pool, shop: &str) -> Result<bool, BillingError> {
    Ok(db::find_by_shop(pool, shop)
        .await?
        .map(|r| r.status.is_active())
        .unwrap_or(false))
}

/// Decode a subscription webhook payload into a [`SubscriptionEvent`].
///
/// The payload mirrors the `appSubscription` object: `id`, `status`, `name`,
/// and recurring line items carrying the plan price. Anything missing is left
/// for `on_webhook` to default.
pub fn parse_webhook_event(shop: &str, payload: &Value) -> Option<SubscriptionEvent> {
    if !payload.is_object() {
        return None;
    }

    let pricing = payload
        .get("lineItems")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(|item| item.get("plan"))
        .and_then(|plan| plan.get("appRecurringPricingDetails"))
        .and_then(|details| details.get("price"));

    Some(SubscriptionEvent {
        shop: shop.to_string(),
        remote_id: payload
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string),
        status: payload
            .get("status")
            .and_then(Value::as_str)
            .map(str::to_string),
        plan_name: payload
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string),
        price: pricing.and_then(|p| p.get("amount")).map(|amount| match amount {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }),
        currency: pricing
            .and_then(|p| p.get("currencyCode"))
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

fn join_messages(errors: &[UserError]) -> String {
    errors
        .iter()
        .map(|e| e.message.clone())
        .collect::<Vec<_>>()
        .join(", ")
}
