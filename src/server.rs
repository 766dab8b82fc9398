//! HTTP surface: admin JSON API plus billing webhook endpoints.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::billing;
use crate::config::Config;
use crate::db::Pool;
use crate::error::{AdjustError, BillingError};
use crate::model::{Direction, Scope};
use crate::pricing;
use crate::shopify::ShopifyAdmin;

/// Per-shop run serialization: two concurrent adjustment runs for one shop
/// queue behind the same async mutex instead of interleaving their batches.
#[derive(Clone, Default)]
pub struct RunLocks {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl RunLocks {
    pub fn for_shop(&self, shop: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().expect("run lock registry poisoned");
        map.entry(shop.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub admin: Arc<dyn ShopifyAdmin>,
    pub cfg: Arc<Config>,
    pub runs: RunLocks,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/prices/adjust", post(adjust_prices))
        .route("/api/catalog/options", get(catalog_options))
        .route(
            "/api/subscription",
            get(get_subscription)
                .post(create_subscription)
                .delete(cancel_subscription),
        )
        .route("/billing/confirm", get(billing_confirm))
        .route("/webhooks/app/subscriptions/create", post(subscription_webhook))
        .route("/webhooks/app/subscriptions/update", post(subscription_webhook))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdjustRequest {
    scope: String,
    percentage: f64,
    direction: Direction,
    #[serde(default)]
    collection_id: Option<String>,
    #[serde(default)]
    tag: Option<String>,
}

fn resolve_scope(req: &AdjustRequest) -> Result<Scope, AdjustError> {
    let invalid = || AdjustError::InvalidScope("Invalid scope or missing parameters".into());
    match req.scope.as_str() {
        "all" => Ok(Scope::All),
        "collection" => req
            .collection_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .map(Scope::Collection)
            .ok_or_else(invalid),
        "tag" => req
            .tag
            .clone()
            .filter(|t| !t.trim().is_empty())
            .map(Scope::Tag)
            .ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

fn adjust_error_response(err: &AdjustError) -> (StatusCode, Json<Value>) {
    let status = match err {
        AdjustError::InvalidScope(_) => StatusCode::BAD_REQUEST,
        AdjustError::NoItemsFound => StatusCode::NOT_FOUND,
        AdjustError::RemoteQuery(_) => StatusCode::BAD_GATEWAY,
    };
    (status, Json(json!({ "error": err.to_string() })))
}

fn billing_error_response(err: &BillingError) -> (StatusCode, Json<Value>) {
    let status = match err {
        BillingError::NotSubscribed => StatusCode::NOT_FOUND,
        BillingError::Remote(_) => StatusCode::BAD_GATEWAY,
        BillingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() })))
}

async fn adjust_prices(
    State(state): State<AppState>,
    Json(req): Json<AdjustRequest>,
) -> (StatusCode, Json<Value>) {
    let shop = state.cfg.shopify.shop.clone();

    match billing::is_active(&state.pool, &shop).await {
        Ok(true) => {}
        Ok(false) => {
            return (
                StatusCode::PAYMENT_REQUIRED,
                Json(json!({ "error": "Active subscription required" })),
            );
        }
        Err(err) => return billing_error_response(&err),
    }

    let Ok(percentage) = Decimal::try_from(req.percentage) else {
        return adjust_error_response(&AdjustError::InvalidScope(
            "Please enter a valid percentage".into(),
        ));
    };
    let scope = match resolve_scope(&req) {
        Ok(scope) => scope,
        Err(err) => return adjust_error_response(&err),
    };

    let lock = state.runs.for_shop(&shop);
    let _run = lock.lock().await;

    match pricing::adjust_prices(state.admin.as_ref(), &scope, percentage, req.direction).await {
        Ok(report) => {
            let mut body = json!({
                "success": true,
                "updatedCount": report.updated_count,
                "totalSeen": report.total_seen,
            });
            if !report.errors.is_empty() {
                body["errors"] = json!(report.errors);
            }
            (StatusCode::OK, Json(body))
        }
        Err(err) => adjust_error_response(&err),
    }
}

/// Scope picker data: collections and the distinct tag set. Unsubscribed
/// shops get empty lists and a flag, mirroring the gated admin screen.
async fn catalog_options(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let shop = &state.cfg.shopify.shop;
    match billing::is_active(&state.pool, shop).await {
        Ok(true) => {}
        Ok(false) => {
            return (
                StatusCode::OK,
                Json(json!({
                    "requiresSubscription": true,
                    "collections": [],
                    "tags": [],
                })),
            );
        }
        Err(err) => return billing_error_response(&err),
    }

    let collections = match state.admin.list_collections().await {
        Ok(collections) => collections,
        Err(err) => {
            return (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": err.to_string() })),
            );
        }
    };
    let tags = match state.admin.list_product_tags().await {
        Ok(tags) => tags,
        Err(err) => {
            return (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": err.to_string() })),
            );
        }
    };

    (
        StatusCode::OK,
        Json(json!({
            "requiresSubscription": false,
            "collections": collections,
            "tags": tags,
        })),
    )
}

async fn get_subscription(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let shop = &state.cfg.shopify.shop;

    // Refresh from the billing API before answering, so a confirmation that
    // happened remotely shows up without waiting for the webhook.
    let record = match billing::sync(&state.pool, state.admin.as_ref(), shop).await {
        Ok(record) => record,
        Err(err) => {
            warn!(?err, "subscription sync failed; serving stored record");
            match crate::db::find_by_shop(&state.pool, shop).await {
                Ok(record) => record,
                Err(err) => {
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({ "error": err.to_string() })),
                    );
                }
            }
        }
    };

    let subscription = record.map(|record| {
        let is_active = record.status.is_active();
        let mut value = serde_json::to_value(&record).unwrap_or(Value::Null);
        value["isActive"] = json!(is_active);
        value
    });
    (StatusCode::OK, Json(json!({ "subscription": subscription })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscribeRequest {
    #[serde(default)]
    plan_name: Option<String>,
    #[serde(default)]
    price: Option<String>,
    #[serde(default)]
    currency: Option<String>,
}

async fn create_subscription(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    // An empty body subscribes with the configured plan defaults.
    let req: SubscribeRequest = if body.is_empty() {
        SubscribeRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(req) => req,
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "Invalid action" })),
                );
            }
        }
    };
    let billing_cfg = &state.cfg.billing;
    let plan_name = req.plan_name.unwrap_or_else(|| billing_cfg.plan_name.clone());
    let price = req.price.unwrap_or_else(|| billing_cfg.price.clone());
    let currency = req.currency.unwrap_or_else(|| billing_cfg.currency.clone());

    let handoff = billing::request_subscription(
        &state.pool,
        state.admin.as_ref(),
        &state.cfg.shopify.shop,
        &plan_name,
        &price,
        &currency,
        billing_cfg.trial_days,
        &state.cfg.billing_return_url(),
    )
    .await;

    match handoff {
        Ok(handoff) => match handoff.confirmation_url {
            Some(url) => (
                StatusCode::OK,
                Json(json!({ "success": true, "confirmationUrl": url })),
            ),
            None => (
                StatusCode::OK,
                Json(json!({ "success": true, "message": "Subscription is already active" })),
            ),
        },
        Err(err) => billing_error_response(&err),
    }
}

async fn cancel_subscription(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match billing::cancel(&state.pool, state.admin.as_ref(), &state.cfg.shopify.shop).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({ "success": true, "message": "Subscription cancelled successfully" })),
        ),
        Err(err) => billing_error_response(&err),
    }
}

/// Confirmation handoff return target: the merchant lands here after
/// approving the charge, so pull the fresh status right away.
async fn billing_confirm(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match billing::sync(&state.pool, state.admin.as_ref(), &state.cfg.shopify.shop).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({ "success": true, "message": "Subscription confirmed successfully!" })),
        ),
        Err(err) => billing_error_response(&err),
    }
}

/// Subscription create/update webhook receiver.
///
/// The sender expects a bare 200 acknowledgement and nothing else, so every
/// internal failure is logged and swallowed.
async fn subscription_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let topic = header_str(&headers, "X-Shopify-Topic").unwrap_or("unknown");
    let shop = header_str(&headers, "X-Shopify-Shop-Domain")
        .unwrap_or(state.cfg.shopify.shop.as_str())
        .to_string();
    info!(topic, %shop, "received subscription webhook");

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(?err, "webhook payload is not valid JSON");
            return StatusCode::OK;
        }
    };

    match billing::parse_webhook_event(&shop, &payload) {
        Some(event) => {
            if let Err(err) = billing::on_webhook(&state.pool, &event).await {
                warn!(?err, "failed to apply subscription webhook");
            }
        }
        None => warn!("webhook payload has no subscription object"),
    }

    StatusCode::OK
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
