//! Size stage: retain creatives whose placement accepts the requested size
//! and whose own declared size matches (0 on either axis = any).

use crate::catalogue::CatalogueSnapshot;
use crate::models::{AdSize, Creative};

pub fn apply<'a>(snapshot: &CatalogueSnapshot, input: Vec<&'a Creative>, requested: AdSize) -> Vec<&'a Creative> {
    input
        .into_iter()
        .filter(|creative| {
            let placement_ok = snapshot
                .placement_by_id(&creative.placement_id)
                .map(|p| p.accepts(requested))
                .unwrap_or(false);
            placement_ok && creative.size.matches_request(requested)
        })
        .collect()
}
