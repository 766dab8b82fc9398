//! The price mutation pipeline: transform, group, and submit in batches.

use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{info, instrument};

use crate::catalog::{self, CatalogItem};
use crate::error::AdjustError;
use crate::model::{AdjustmentReport, Direction, Scope};
use crate::shopify::model::VariantPriceUpdate;
use crate::shopify::{ShopifyAdmin, MUTATION_BATCH_SIZE};

/// All price changes for one product, submitted as a single bulk mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceOperation {
    pub product_id: String,
    pub variants: Vec<VariantPriceUpdate>,
}

/// Apply the percentage adjustment to one price string.
///
/// Returns `None` when the current price is non-numeric or not strictly
/// positive, or when the adjusted price would drop to zero or below; such
/// variants are skipped. The result always carries exactly two fraction
/// digits, rounded half away from zero at the cent.
pub fn compute_new_price(
    current: &str,
    percentage: Decimal,
    direction: Direction,
) -> Option<String> {
    let price = Decimal::from_str(current.trim()).ok()?;
    if price <= Decimal::ZERO {
        return None;
    }
    let factor = match direction {
        Direction::Increase => Decimal::ONE_HUNDRED + percentage,
        Direction::Decrease => Decimal::ONE_HUNDRED - percentage,
    };
    let adjusted = (price * factor / Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    if adjusted <= Decimal::ZERO {
        return None;
    }
    Some(format!("{:.2}", adjusted))
}

/// Group per-variant updates into one operation per owning product.
///
/// Products whose variants were all skipped are dropped. The second value is
/// the number of variant updates across all operations; it is counted here,
/// before submission.
pub fn build_operations(
    items: &[CatalogItem],
    percentage: Decimal,
    direction: Direction,
) -> (Vec<PriceOperation>, u32) {
    let mut operations: Vec<PriceOperation> = Vec::new();
    let mut by_product: HashMap<String, usize> = HashMap::new();
    let mut updated_count = 0u32;

    for item in items {
        let Some(new_price) = compute_new_price(&item.price, percentage, direction) else {
            continue;
        };
        let idx = *by_product.entry(item.product_id.clone()).or_insert_with(|| {
            operations.push(PriceOperation {
                product_id: item.product_id.clone(),
                variants: Vec::new(),
            });
            operations.len() - 1
        });
        operations[idx].variants.push(VariantPriceUpdate {
            id: item.variant_id.clone(),
            price: new_price,
        });
        updated_count += 1;
    }

    (operations, updated_count)
}

/// Submit operations in fixed-size chunks, sequentially.
///
/// The chunking throttles remote load; it is not a parallelism mechanism.
/// Failures are collected as message text and never abort the run.
pub async fn apply(admin: &dyn ShopifyAdmin, operations: &[PriceOperation]) -> Vec<String> {
    let mut errors = Vec::new();
    for chunk in operations.chunks(MUTATION_BATCH_SIZE) {
        for operation in chunk {
            match admin
                .bulk_update_variant_prices(&operation.product_id, &operation.variants)
                .await
            {
                Ok(outcome) => {
                    errors.extend(outcome.user_errors.iter().map(|e| e.display_text()));
                }
                Err(err) => errors.push(err.to_string()),
            }
        }
    }
    errors
}

/// Run the full adjustment: validate, fetch, transform, submit.
#[instrument(skip_all, fields(scope = scope.as_str(), direction = direction.as_str()))]
pub async fn adjust_prices(
    admin: &dyn ShopifyAdmin,
    scope: &Scope,
    percentage: Decimal,
    direction: Direction,
) -> Result<AdjustmentReport, AdjustError> {
    if percentage <= Decimal::ZERO {
        return Err(AdjustError::InvalidScope(
            "Please enter a valid percentage".into(),
        ));
    }

    let items = catalog::fetch_items(admin, scope).await?;
    if items.is_empty() {
        return Err(AdjustError::NoItemsFound);
    }
    let total_seen = items.len() as u32;

    let (operations, updated_count) = build_operations(&items, percentage, direction);
    let errors = apply(admin, &operations).await;

    info!(
        updated_count,
        total_seen,
        failed = errors.len(),
        "price adjustment finished"
    );
    Ok(AdjustmentReport {
        updated_count,
        total_seen,
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pct(p: &str) -> Decimal {
        Decimal::from_str(p).unwrap()
    }

    fn item(variant: &str, product: &str, price: &str) -> CatalogItem {
        CatalogItem {
            variant_id: variant.into(),
            product_id: product.into(),
            price: price.into(),
        }
    }

    #[test]
    fn increase_and_decrease_round_to_cents() {
        assert_eq!(
            compute_new_price("10.00", pct("10"), Direction::Increase).unwrap(),
            "11.00"
        );
        assert_eq!(
            compute_new_price("10.00", pct("10"), Direction::Decrease).unwrap(),
            "9.00"
        );
        // 19.99 * 1.15 = 22.9885 -> 22.99
        assert_eq!(
            compute_new_price("19.99", pct("15"), Direction::Increase).unwrap(),
            "22.99"
        );
        // midpoint rounds away from zero: 10.05 * 1.10 = 11.055 -> 11.06
        assert_eq!(
            compute_new_price("10.05", pct("10"), Direction::Increase).unwrap(),
            "11.06"
        );
    }

    #[test]
    fn result_always_has_two_fraction_digits() {
        assert_eq!(
            compute_new_price("8", pct("25"), Direction::Increase).unwrap(),
            "10.00"
        );
        assert_eq!(
            compute_new_price("0.10", pct("50"), Direction::Decrease).unwrap(),
            "0.05"
        );
    }

    #[test]
    fn invalid_or_non_positive_prices_are_skipped() {
        assert!(compute_new_price("free", pct("10"), Direction::Increase).is_none());
        assert!(compute_new_price("", pct("10"), Direction::Increase).is_none());
        assert!(compute_new_price("0.00", pct("10"), Direction::Increase).is_none());
        assert!(compute_new_price("-5.00", pct("10"), Direction::Increase).is_none());
        // a full decrease would produce a non-positive price
        assert!(compute_new_price("10.00", pct("100"), Direction::Decrease).is_none());
    }

    #[test]
    fn operations_group_by_product_and_drop_empty() {
        let items = vec![
            item("v1", "p1", "10.00"),
            item("v2", "p1", "bogus"),
            item("v3", "p2", "20.00"),
            item("v4", "p3", "0.00"),
        ];
        let (ops, updated) = build_operations(&items, pct("10"), Direction::Increase);
        assert_eq!(updated, 2);
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].product_id, "p1");
        assert_eq!(ops[0].variants.len(), 1);
        assert_eq!(ops[0].variants[0].price, "11.00");
        assert_eq!(ops[1].product_id, "p2");
        assert_eq!(ops[1].variants[0].price, "22.00");
    }

    #[test]
    fn variant_order_within_product_is_preserved() {
        let items = vec![
            item("v1", "p1", "1.00"),
            item("v2", "p1", "2.00"),
            item("v3", "p1", "3.00"),
        ];
        let (ops, _) = build_operations(&items, pct("10"), Direction::Increase);
        let ids: Vec<&str> = ops[0].variants.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["v1", "v2", "v3"]);
    }
}
