//! Pacing stage: eliminate creatives whose line-item pacing controller has
//! exhausted its current allowance.

use crate::catalogue::CatalogueSnapshot;
use crate::models::Creative;
use crate::pacing::PacingRegistry;

pub async fn apply<'a>(
    snapshot: &CatalogueSnapshot,
    input: Vec<&'a Creative>,
    pacing: &PacingRegistry,
    now_secs: i64,
) -> Vec<&'a Creative> {
    let mut survivors = Vec::with_capacity(input.len());
    for creative in input {
        let Some(line_item) = snapshot.line_item_by_id(&creative.line_item_id) else {
            continue;
        };
        if pacing.allow(line_item, now_secs).await {
            survivors.push(creative);
        } else {
            metrics::counter!("pacing_filter_eliminated", 1);
        }
    }
    survivors
}
