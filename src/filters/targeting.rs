//! Targeting stage: eliminate creatives whose line-item predicate doesn't
//! match the request's resolved device/geo/custom context.

use crate::catalogue::CatalogueSnapshot;
use crate::models::{Creative, RequestContext};

pub fn apply<'a>(snapshot: &CatalogueSnapshot, input: Vec<&'a Creative>, ctx: &RequestContext) -> Vec<&'a Creative> {
    input
        .into_iter()
        .filter(|creative| {
            snapshot
                .line_item_by_id(&creative.line_item_id)
                .map(|li| li.is_active() && li.targeting.matches(ctx))
                .unwrap_or(false)
        })
        .collect()
}
