//! Typed views over Admin GraphQL response payloads.
//!
//! Remote responses are decoded in two steps: the client returns the raw
//! `data` value, and the extraction functions here map it into typed structs.
//! Absent or malformed payloads collapse to `None`/empty rather than erroring,
//! which is what ends a pagination run early.

use serde::Deserialize;
use serde_json::Value;

use crate::model::Scope;

/// One page of the product listing, with its continuation cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductPage {
    pub products: Vec<ProductNode>,
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProductNode {
    pub id: String,
    #[serde(default, deserialize_with = "variant_nodes")]
    pub variants: Vec<VariantNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VariantNode {
    pub id: String,
    pub price: String,
}

/// Price change for one variant, as submitted to the bulk update mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantPriceUpdate {
    pub id: String,
    pub price: String,
}

/// Field-level error reported by a mutation.
#[derive(Debug, Clone, Deserialize)]
pub struct UserError {
    #[serde(default)]
    pub field: Option<Vec<String>>,
    pub message: String,
}

/// Outcome of one `productVariantsBulkUpdate` call.
#[derive(Debug, Clone, Default)]
pub struct BulkUpdateOutcome {
    pub updated: Vec<VariantNode>,
    pub user_errors: Vec<UserError>,
}

/// Subscription state as the billing API reports it.
#[derive(Debug, Clone)]
pub struct RemoteSubscription {
    pub id: String,
    pub status: String,
    pub line_items: Vec<RecurringLineItem>,
}

/// Recurring pricing details of one subscription line item.
#[derive(Debug, Clone, Default)]
pub struct RecurringLineItem {
    pub price: Option<String>,
    pub currency: Option<String>,
}

/// Outcome of a subscription create/cancel mutation.
#[derive(Debug, Clone, Default)]
pub struct ChargeOutcome {
    pub subscription: Option<RemoteSubscription>,
    pub confirmation_url: Option<String>,
    pub user_errors: Vec<UserError>,
}

/// Collection id/title pair for the scope picker.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, Deserialize)]
pub struct CollectionRef {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    #[serde(rename = "hasNextPage")]
    has_next_page: bool,
    #[serde(rename = "endCursor", default)]
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProductConnection {
    #[serde(rename = "pageInfo")]
    page_info: PageInfo,
    #[serde(default)]
    nodes: Vec<ProductNode>,
}

/// Flatten the nested `variants { nodes [...] }` connection while decoding.
fn variant_nodes<'de, D>(deserializer: D) -> Result<Vec<VariantNode>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct VariantConnection {
        #[serde(default)]
        nodes: Vec<VariantNode>,
    }
    let conn: Option<VariantConnection> = Option::deserialize(deserializer)?;
    Ok(conn.map(|c| c.nodes).unwrap_or_default())
}

/// Extract a product page from a listing response.
///
/// Collection-scoped listings nest the connection under `collection`; the
/// other scopes expose it at `products` directly. Any missing piece yields
/// `None`, the designated end-of-stream signal.
pub fn product_page_from_data(data: &Value, scope: &Scope) -> Option<ProductPage> {
    let connection = match scope {
        Scope::Collection(_) => data.get("collection")?.get("products")?,
        _ => data.get("products")?,
    };
    let conn: ProductConnection = serde_json::from_value(connection.clone()).ok()?;
    Some(ProductPage {
        products: conn.nodes,
        has_next_page: conn.page_info.has_next_page,
        end_cursor: conn.page_info.end_cursor,
    })
}

/// Extract the outcome of a bulk variant price update.
pub fn bulk_update_from_data(data: &Value) -> BulkUpdateOutcome {
    let Some(payload) = data.get("productVariantsBulkUpdate") else {
        return BulkUpdateOutcome::default();
    };
    BulkUpdateOutcome {
        updated: payload
            .get("productVariants")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default(),
        user_errors: user_errors_of(payload),
    }
}

/// Extract the outcome of `appSubscriptionCreate` / `appSubscriptionCancel`.
pub fn charge_outcome_from_data(data: &Value, payload_key: &str) -> ChargeOutcome {
    let Some(payload) = data.get(payload_key) else {
        return ChargeOutcome::default();
    };
    ChargeOutcome {
        subscription: payload
            .get("appSubscription")
            .and_then(remote_subscription_of),
        confirmation_url: payload
            .get("confirmationUrl")
            .and_then(Value::as_str)
            .map(str::to_string),
        user_errors: user_errors_of(payload),
    }
}

/// Extract the subscription from an `appSubscription` status query.
pub fn remote_subscription_from_data(data: &Value) -> Option<RemoteSubscription> {
    data.get("appSubscription").and_then(remote_subscription_of)
}

fn remote_subscription_of(value: &Value) -> Option<RemoteSubscription> {
    let id = value.get("id")?.as_str()?.to_string();
    let status = value.get("status")?.as_str()?.to_string();
    let line_items = value
        .get("lineItems")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| {
                    let pricing = item
                        .get("plan")
                        .and_then(|p| p.get("appRecurringPricingDetails").or(Some(p)))
                        .and_then(|p| p.get("price"));
                    RecurringLineItem {
                        price: pricing
                            .and_then(|p| p.get("amount"))
                            .map(scalar_to_string),
                        currency: pricing
                            .and_then(|p| p.get("currencyCode"))
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    }
                })
                .collect()
        })
        .unwrap_or_default();
    Some(RemoteSubscription {
        id,
        status,
        line_items,
    })
}

/// Extract collection refs from a `collections(first: N)` response.
pub fn collections_from_data(data: &Value) -> Vec<CollectionRef> {
    data.get("collections")
        .and_then(|c| c.get("nodes"))
        .and_then(|n| serde_json::from_value(n.clone()).ok())
        .unwrap_or_default()
}

/// Extract the deduplicated, sorted tag set from a product listing.
pub fn tags_from_data(data: &Value) -> Vec<String> {
    let mut tags = std::collections::BTreeSet::new();
    if let Some(nodes) = data
        .get("products")
        .and_then(|p| p.get("nodes"))
        .and_then(Value::as_array)
    {
        for node in nodes {
            if let Some(node_tags) = node.get("tags").and_then(Value::as_array) {
                for tag in node_tags {
                    if let Some(tag) = tag.as_str() {
                        tags.insert(tag.to_string());
                    }
                }
            }
        }
    }
    tags.into_iter().collect()
}

fn user_errors_of(payload: &Value) -> Vec<UserError> {
    payload
        .get("userErrors")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

/// Decimal amounts may arrive as JSON numbers or strings depending on field.
fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl UserError {
    /// Best-effort display text: message, falling back to the field path.
    pub fn display_text(&self) -> String {
        if !self.message.is_empty() {
            return self.message.clone();
        }
        self.field
            .as_ref()
            .map(|f| f.join("."))
            .unwrap_or_default()
    }
}
