use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::{json, Value};
use std::fmt;
use tracing::{info, warn};

use crate::model::Scope;
use crate::shopify::model::{
    bulk_update_from_data, charge_outcome_from_data, collections_from_data,
    product_page_from_data, remote_subscription_from_data, tags_from_data, BulkUpdateOutcome,
    ChargeOutcome, CollectionRef, ProductPage, RemoteSubscription, VariantPriceUpdate,
};

pub mod model;

/// Products fetched per listing page.
pub const PRODUCT_PAGE_SIZE: u32 = 250;
/// Variants fetched per product within a page.
pub const VARIANT_PAGE_SIZE: u32 = 100;
/// Operations submitted per mutation chunk.
pub const MUTATION_BATCH_SIZE: usize = 10;

const PRODUCTS_QUERY: &str = r#"
query GetProducts($cursor: String) {
  products(first: 250, after: $cursor) {
    pageInfo { hasNextPage endCursor }
    nodes {
      id
      variants(first: 100) { nodes { id price } }
    }
  }
}"#;

const TAGGED_PRODUCTS_QUERY: &str = r#"
query GetTaggedProducts($tag: String!, $cursor: String) {
  products(first: 250, after: $cursor, query: $tag) {
    pageInfo { hasNextPage endCursor }
    nodes {
      id
      variants(first: 100) { nodes { id price } }
    }
  }
}"#;

const COLLECTION_PRODUCTS_QUERY: &str = r#"
query GetCollectionProducts($collectionId: ID!, $cursor: String) {
  collection(id: $collectionId) {
    products(first: 250, after: $cursor) {
      pageInfo { hasNextPage endCursor }
      nodes {
        id
        variants(first: 100) { nodes { id price } }
      }
    }
  }
}"#;

const BULK_UPDATE_MUTATION: &str = r#"
mutation UpdateProductVariants($productId: ID!, $variants: [ProductVariantsBulkInput!]!) {
  productVariantsBulkUpdate(productId: $productId, variants: $variants) {
    productVariants { id price }
    userErrors { field message }
  }
}"#;

const SUBSCRIPTION_CREATE_MUTATION: &str = r#"
mutation CreateSubscription($name: String!, $price: Decimal!, $returnUrl: URL!, $currencyCode: CurrencyCode!, $trialDays: Int) {
  appSubscriptionCreate(
    name: $name
    returnUrl: $returnUrl
    trialDays: $trialDays
    lineItems: [
      {
        plan: {
          appRecurringPricingDetails: {
            price: { amount: $price, currencyCode: $currencyCode }
            interval: EVERY_30_DAYS
          }
        }
      }
    ]
  ) {
    appSubscription { id status currentPeriodEnd }
    confirmationUrl
    userErrors { field message }
  }
}"#;

const SUBSCRIPTION_CANCEL_MUTATION: &str = r#"
mutation CancelSubscription($id: ID!) {
  appSubscriptionCancel(id: $id) {
    appSubscription { id status }
    userErrors { field message }
  }
}"#;

const SUBSCRIPTION_STATUS_QUERY: &str = r#"
query GetSubscription($id: ID!) {
  appSubscription(id: $id) {
    id
    status
    currentPeriodEnd
    lineItems {
      plan {
        ... on AppRecurringPricing {
          price { amount currencyCode }
          interval
        }
      }
    }
  }
}"#;

const COLLECTIONS_QUERY: &str = r#"
{
  collections(first: 250) {
    nodes { id title }
  }
}"#;

const PRODUCT_TAGS_QUERY: &str = r#"
{
  products(first: 250) {
    nodes { tags }
  }
}"#;

/// Admin API surface the catalog, pricing, and billing layers depend on.
///
/// Implemented by [`ShopifyClient`] for production and by recording mocks in
/// tests. All methods return `anyhow::Result`; remote-reported field errors
/// are data, not `Err`.
#[async_trait]
pub trait ShopifyAdmin: Send + Sync {
    /// One page of the product listing for `scope`. `Ok(None)` means the
    /// response carried no usable page and pagination should stop.
    async fn list_products_page(
        &self,
        scope: &Scope,
        cursor: Option<&str>,
    ) -> Result<Option<ProductPage>>;

    async fn bulk_update_variant_prices(
        &self,
        product_id: &str,
        updates: &[VariantPriceUpdate],
    ) -> Result<BulkUpdateOutcome>;

    async fn create_recurring_charge(
        &self,
        name: &str,
        price: &str,
        currency: &str,
        return_url: &str,
        trial_days: Option<u32>,
    ) -> Result<ChargeOutcome>;

    async fn cancel_recurring_charge(&self, id: &str) -> Result<ChargeOutcome>;

    async fn get_recurring_charge(&self, id: &str) -> Result<Option<RemoteSubscription>>;

    async fn list_collections(&self) -> Result<Vec<CollectionRef>>;

    async fn list_product_tags(&self) -> Result<Vec<String>>;
}

#[derive(Clone)]
pub struct ShopifyClient {
    http: Client,
    endpoint: Url,
    access_token: String,
}

impl fmt::Debug for ShopifyClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShopifyClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl ShopifyClient {
    pub fn new(shop: &str, access_token: String, api_version: &str) -> Result<Self> {
        let endpoint = Url::parse(&format!(
            "https://{}/admin/api/{}/graphql.json",
            shop, api_version
        ))
        .context("invalid shop domain or API version")?;
        Ok(Self::with_endpoint(access_token, endpoint))
    }

    pub fn with_endpoint(access_token: String, endpoint: Url) -> Self {
        let http = Client::builder()
            .user_agent("pricebot/0.1")
            .no_proxy()
            .build()
            .expect("reqwest client");
        Self {
            http,
            endpoint,
            access_token,
        }
    }

    pub fn build_request(&self, body: &Value) -> Result<reqwest::Request> {
        self.http
            .post(self.endpoint.clone())
            .header("X-Shopify-Access-Token", &self.access_token)
            .header("Content-Type", "application/json")
            .json(body)
            .build()
            .context("failed to build Admin API request")
    }

    /// Execute a GraphQL request and return its `data` value.
    ///
    /// `Err` covers transport and HTTP-status failures only. A response whose
    /// `data` is missing comes back as `Value::Null`; callers extract what
    /// they need and treat gaps as empty.
    async fn post_graphql(&self, body: Value) -> Result<Value> {
        let request = self.build_request(&body)?;
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach Shopify")?;

        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!("rate limited by Shopify: {}", body);
            return Err(anyhow!("received 429 from Shopify: {}", body));
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!("Shopify API error - Status: {}, Body: {}", status, body);
            return Err(anyhow!("shopify error {}: {}", status, body));
        }

        let mut payload: Value = res
            .json()
            .await
            .context("invalid Shopify response JSON")?;
        if let Some(errors) = payload.get("errors") {
            warn!("Shopify reported top-level errors: {}", errors);
        }
        Ok(payload.get_mut("data").map(Value::take).unwrap_or(Value::Null))
    }
}

#[async_trait]
impl ShopifyAdmin for ShopifyClient {
    async fn list_products_page(
        &self,
        scope: &Scope,
        cursor: Option<&str>,
    ) -> Result<Option<ProductPage>> {
        let body = products_page_request(scope, cursor);
        let data = self.post_graphql(body).await?;
        Ok(product_page_from_data(&data, scope))
    }

    async fn bulk_update_variant_prices(
        &self,
        product_id: &str,
        updates: &[VariantPriceUpdate],
    ) -> Result<BulkUpdateOutcome> {
        let body = bulk_update_request(product_id, updates);
        let data = self.post_graphql(body).await?;
        let outcome = bulk_update_from_data(&data);
        info!(
            product_id,
            updated = outcome.updated.len(),
            user_errors = outcome.user_errors.len(),
            "submitted variant price update"
        );
        Ok(outcome)
    }

    async fn create_recurring_charge(
        &self,
        name: &str,
        price: &str,
        currency: &str,
        return_url: &str,
        trial_days: Option<u32>,
    ) -> Result<ChargeOutcome> {
        let amount: f64 = price
            .trim()
            .parse()
            .with_context(|| format!("invalid plan price: {}", price))?;
        let body = subscription_create_request(name, amount, currency, return_url, trial_days);
        let data = self.post_graphql(body).await?;
        Ok(charge_outcome_from_data(&data, "appSubscriptionCreate"))
    }

    async fn cancel_recurring_charge(&self, id: &str) -> Result<ChargeOutcome> {
        let body = json!({
            "query": SUBSCRIPTION_CANCEL_MUTATION,
            "variables": { "id": id },
        });
        let data = self.post_graphql(body).await?;
        Ok(charge_outcome_from_data(&data, "appSubscriptionCancel"))
    }

    async fn get_recurring_charge(&self, id: &str) -> Result<Option<RemoteSubscription>> {
        let body = json!({
            "query": SUBSCRIPTION_STATUS_QUERY,
            "variables": { "id": id },
        });
        let data = self.post_graphql(body).await?;
        Ok(remote_subscription_from_data(&data))
    }

    async fn list_collections(&self) -> Result<Vec<CollectionRef>> {
        let body = json!({ "query": COLLECTIONS_QUERY });
        let data = self.post_graphql(body).await?;
        Ok(collections_from_data(&data))
    }

    async fn list_product_tags(&self) -> Result<Vec<String>> {
        let body = json!({ "query": PRODUCT_TAGS_QUERY });
        let data = self.post_graphql(body).await?;
        Ok(tags_from_data(&data))
    }
}

/// Build the listing request body for one page of `scope`.
pub fn products_page_request(scope: &Scope, cursor: Option<&str>) -> Value {
    match scope {
        Scope::All => json!({
            "query": PRODUCTS_QUERY,
            "variables": { "cursor": cursor },
        }),
        Scope::Collection(collection_id) => json!({
            "query": COLLECTION_PRODUCTS_QUERY,
            "variables": { "collectionId": collection_id, "cursor": cursor },
        }),
        Scope::Tag(tag) => json!({
            "query": TAGGED_PRODUCTS_QUERY,
            "variables": { "tag": format!("tag:{}", tag), "cursor": cursor },
        }),
    }
}

/// Build the bulk price update body for one product's variants.
pub fn bulk_update_request(product_id: &str, updates: &[VariantPriceUpdate]) -> Value {
    let variants: Vec<Value> = updates
        .iter()
        .map(|u| json!({ "id": u.id, "price": u.price }))
        .collect();
    json!({
        "query": BULK_UPDATE_MUTATION,
        "variables": { "productId": product_id, "variants": variants },
    })
}

/// Build the recurring charge creation body. `trial_days: None` sends an
/// explicit null, which the API treats as no trial.
pub fn subscription_create_request(
    name: &str,
    price: f64,
    currency: &str,
    return_url: &str,
    trial_days: Option<u32>,
) -> Value {
    json!({
        "query": SUBSCRIPTION_CREATE_MUTATION,
        "variables": {
            "name": name,
            "price": price,
            "returnUrl": return_url,
            "currencyCode": currency.to_uppercase(),
            "trialDays": trial_days,
        },
    })
}
