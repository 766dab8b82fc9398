//! Cursor-paginated retrieval of the variants a price adjustment targets.

use tracing::{instrument, warn};

use crate::error::AdjustError;
use crate::model::Scope;
use crate::shopify::ShopifyAdmin;

/// One price-bearing variant with its owning product. Fetched per run,
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    pub variant_id: String,
    pub product_id: String,
    pub price: String,
}

/// Reject collection/tag scopes whose selector is blank, before any remote
/// call is made.
pub fn validate_scope(scope: &Scope) -> Result<(), AdjustError> {
    let missing = match scope {
        Scope::All => false,
        Scope::Collection(id) => id.trim().is_empty(),
        Scope::Tag(tag) => tag.trim().is_empty(),
    };
    if missing {
        return Err(AdjustError::InvalidScope(
            "Invalid scope or missing parameters".into(),
        ));
    }
    Ok(())
}

/// Drain every listing page for `scope` into one item list.
///
/// The loop carries an explicit accumulator and continuation cursor. A page
/// that comes back absent or malformed ends the stream; a transport failure
/// does the same unless it hits the very first page, which fails the whole
/// fetch since nothing was retrieved yet.
#[instrument(skip_all, fields(scope = scope.as_str()))]
pub async fn fetch_items(
    admin: &dyn ShopifyAdmin,
    scope: &Scope,
) -> Result<Vec<CatalogItem>, AdjustError> {
    validate_scope(scope)?;

    let mut items: Vec<CatalogItem> = Vec::new();
    let mut cursor: Option<String> = None;
    let mut first_page = true;

    loop {
        let page = match admin.list_products_page(scope, cursor.as_deref()).await {
            Ok(page) => page,
            Err(err) if first_page => {
                return Err(AdjustError::RemoteQuery(err.to_string()));
            }
            Err(err) => {
                warn!(?err, "product listing page failed; keeping partial results");
                break;
            }
        };
        first_page = false;

        let Some(page) = page else { break };
        for product in page.products {
            for variant in product.variants {
                items.push(CatalogItem {
                    variant_id: variant.id,
                    product_id: product.id.clone(),
                    price: variant.price,
                });
            }
        }

        if !page.has_next_page {
            break;
        }
        // hasNextPage without a cursor cannot make progress; stop rather
        // than refetch the first page.
        match page.end_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    Ok(items)
}
