use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;

use pricebot::catalog;
use pricebot::error::AdjustError;
use pricebot::model::{Direction, Scope};
use pricebot::pricing;
use pricebot::shopify::model::{
    BulkUpdateOutcome, ChargeOutcome, CollectionRef, ProductNode, ProductPage, RemoteSubscription,
    UserError, VariantNode, VariantPriceUpdate,
};
use pricebot::shopify::ShopifyAdmin;

/// Admin API double: queued listing pages and bulk-update outcomes, with
/// every call recorded.
#[derive(Clone, Default)]
struct RecordingAdmin {
    pages: Arc<Mutex<VecDeque<Result<Option<ProductPage>>>>>,
    bulk_outcomes: Arc<Mutex<VecDeque<Result<BulkUpdateOutcome>>>>,
    listing_cursors: Arc<Mutex<Vec<Option<String>>>>,
    bulk_calls: Arc<Mutex<Vec<(String, Vec<VariantPriceUpdate>)>>>,
}

impl RecordingAdmin {
    fn with_pages(pages: Vec<Result<Option<ProductPage>>>) -> Self {
        Self {
            pages: Arc::new(Mutex::new(VecDeque::from(pages))),
            ..Default::default()
        }
    }

    async fn queue_bulk(&self, outcomes: Vec<Result<BulkUpdateOutcome>>) {
        *self.bulk_outcomes.lock().await = VecDeque::from(outcomes);
    }

    async fn listing_cursors(&self) -> Vec<Option<String>> {
        self.listing_cursors.lock().await.clone()
    }

    async fn bulk_calls(&self) -> Vec<(String, Vec<VariantPriceUpdate>)> {
        self.bulk_calls.lock().await.clone()
    }
}

#[async_trait]
impl ShopifyAdmin for RecordingAdmin {
    async fn list_products_page(
        &self,
        _scope: &Scope,
        cursor: Option<&str>,
    ) -> Result<Option<ProductPage>> {
        self.listing_cursors
            .lock()
            .await
            .push(cursor.map(str::to_string));
        self.pages
            .lock()
            .await
            .pop_front()
            .unwrap_or(Ok(None))
    }

    async fn bulk_update_variant_prices(
        &self,
        product_id: &str,
        updates: &[VariantPriceUpdate],
    ) -> Result<BulkUpdateOutcome> {
        self.bulk_calls
            .lock()
            .await
            .push((product_id.to_string(), updates.to_vec()));
        self.bulk_outcomes
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(BulkUpdateOutcome::default()))
    }

    async fn create_recurring_charge(
        &self,
        _name: &str,
        _price: &str,
        _currency: &str,
        _return_url: &str,
        _trial_days: Option<u32>,
    ) -> Result<ChargeOutcome> {
        Err(anyhow!("unexpected billing call"))
    }

    async fn cancel_recurring_charge(&self, _id: &str) -> Result<ChargeOutcome> {
        Err(anyhow!("unexpected billing call"))
    }

    async fn get_recurring_charge(&self, _id: &str) -> Result<Option<RemoteSubscription>> {
        Err(anyhow!("unexpected billing call"))
    }

    async fn list_collections(&self) -> Result<Vec<CollectionRef>> {
        Ok(Vec::new())
    }

    async fn list_product_tags(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

fn variant(id: &str, price: &str) -> VariantNode {
    VariantNode {
        id: id.into(),
        price: price.into(),
    }
}

fn product(id: &str, variants: Vec<VariantNode>) -> ProductNode {
    ProductNode {
        id: id.into(),
        variants,
    }
}

fn page(products: Vec<ProductNode>, next: Option<&str>) -> ProductPage {
    ProductPage {
        products,
        has_next_page: next.is_some(),
        end_cursor: next.map(str::to_string),
    }
}

fn pct(p: &str) -> Decimal {
    Decimal::from_str(p).unwrap()
}

#[tokio::test]
async fn pagination_drains_every_page_once() {
    let admin = RecordingAdmin::with_pages(vec![
        Ok(Some(page(
            vec![product("p1", vec![variant("v1", "10.00")])],
            Some("c1"),
        ))),
        Ok(Some(page(
            vec![product("p2", vec![variant("v2", "20.00")])],
            Some("c2"),
        ))),
        Ok(Some(page(
            vec![product("p3", vec![variant("v3", "30.00")])],
            None,
        ))),
    ]);

    let items = catalog::fetch_items(&admin, &Scope::All).await.unwrap();

    let ids: Vec<&str> = items.iter().map(|i| i.variant_id.as_str()).collect();
    assert_eq!(ids, vec!["v1", "v2", "v3"]);
    assert_eq!(
        admin.listing_cursors().await,
        vec![None, Some("c1".to_string()), Some("c2".to_string())]
    );
}

#[tokio::test]
async fn two_page_increase_scenario() {
    let admin = RecordingAdmin::with_pages(vec![
        Ok(Some(page(
            vec![product("p1", vec![variant("v1", "10.00")])],
            Some("c1"),
        ))),
        Ok(Some(page(
            vec![product("p2", vec![variant("v2", "10.00")])],
            None,
        ))),
    ]);

    let report = pricing::adjust_prices(&admin, &Scope::All, pct("10"), Direction::Increase)
        .await
        .unwrap();

    assert_eq!(report.updated_count, 2);
    assert_eq!(report.total_seen, 2);
    assert!(report.errors.is_empty());

    let calls = admin.bulk_calls().await;
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].0, "p1");
    assert_eq!(calls[0].1[0].price, "11.00");
    assert_eq!(calls[1].1[0].price, "11.00");
}

#[tokio::test]
async fn partial_failures_never_abort_the_run() {
    let products: Vec<ProductNode> = (1..=3)
        .map(|i| {
            product(
                &format!("p{}", i),
                vec![variant(&format!("v{}", i), "10.00")],
            )
        })
        .collect();
    let admin = RecordingAdmin::with_pages(vec![Ok(Some(page(products, None)))]);
    admin
        .queue_bulk(vec![
            Ok(BulkUpdateOutcome::default()),
            Ok(BulkUpdateOutcome {
                updated: Vec::new(),
                user_errors: vec![UserError {
                    field: Some(vec!["variants".into(), "0".into(), "price".into()]),
                    message: "Price invalid".into(),
                }],
            }),
            Err(anyhow!("boom")),
        ])
        .await;

    let report = pricing::adjust_prices(&admin, &Scope::All, pct("10"), Direction::Increase)
        .await
        .unwrap();

    // all three operations are submitted; the two failures become messages
    assert_eq!(admin.bulk_calls().await.len(), 3);
    assert_eq!(report.updated_count, 3);
    assert_eq!(report.total_seen, 3);
    assert_eq!(report.errors.len(), 2);
    assert!(report.errors.iter().any(|e| e.contains("Price invalid")));
    assert!(report.errors.iter().any(|e| e.contains("boom")));
}

#[tokio::test]
async fn zero_items_is_a_no_items_error() {
    let admin = RecordingAdmin::with_pages(vec![Ok(Some(page(vec![], None)))]);
    let err = pricing::adjust_prices(&admin, &Scope::All, pct("10"), Direction::Increase)
        .await
        .unwrap_err();
    assert!(matches!(err, AdjustError::NoItemsFound));
    assert!(admin.bulk_calls().await.is_empty());
}

#[tokio::test]
async fn invalid_percentage_fails_before_any_remote_call() {
    let admin = RecordingAdmin::default();
    for bad in ["0", "-5"] {
        let err = pricing::adjust_prices(&admin, &Scope::All, pct(bad), Direction::Increase)
            .await
            .unwrap_err();
        assert!(matches!(err, AdjustError::InvalidScope(_)));
    }
    assert!(admin.listing_cursors().await.is_empty());
    assert!(admin.bulk_calls().await.is_empty());
}

#[tokio::test]
async fn blank_selector_fails_before_any_remote_call() {
    let admin = RecordingAdmin::default();
    let err = pricing::adjust_prices(
        &admin,
        &Scope::Collection("  ".into()),
        pct("10"),
        Direction::Increase,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AdjustError::InvalidScope(_)));
    assert!(admin.listing_cursors().await.is_empty());
}

#[tokio::test]
async fn first_page_transport_error_fails_the_fetch() {
    let admin = RecordingAdmin::with_pages(vec![Err(anyhow!("connection refused"))]);
    let err = catalog::fetch_items(&admin, &Scope::All).await.unwrap_err();
    assert!(matches!(err, AdjustError::RemoteQuery(_)));
}

#[tokio::test]
async fn later_page_transport_error_keeps_partial_results() {
    let admin = RecordingAdmin::with_pages(vec![
        Ok(Some(page(
            vec![product("p1", vec![variant("v1", "10.00")])],
            Some("c1"),
        ))),
        Err(anyhow!("timeout")),
    ]);
    let items = catalog::fetch_items(&admin, &Scope::All).await.unwrap();
    assert_eq!(items.len(), 1);
}

#[tokio::test]
async fn malformed_page_ends_the_stream() {
    let admin = RecordingAdmin::with_pages(vec![
        Ok(Some(page(
            vec![product("p1", vec![variant("v1", "10.00")])],
            Some("c1"),
        ))),
        Ok(None),
    ]);
    let items = catalog::fetch_items(&admin, &Scope::All).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(admin.listing_cursors().await.len(), 2);
}

#[tokio::test]
async fn invalid_prices_count_toward_total_seen_only() {
    let admin = RecordingAdmin::with_pages(vec![Ok(Some(page(
        vec![
            product("p1", vec![variant("v1", "10.00"), variant("v2", "oops")]),
            product("p2", vec![variant("v3", "0.00")]),
        ],
        None,
    )))]);

    let report = pricing::adjust_prices(&admin, &Scope::All, pct("10"), Direction::Increase)
        .await
        .unwrap();

    assert_eq!(report.total_seen, 3);
    assert_eq!(report.updated_count, 1);
    // p2 had no valid updates, so only p1 was submitted
    let calls = admin.bulk_calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "p1");
}
