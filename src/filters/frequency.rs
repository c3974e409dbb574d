//! Frequency stage: eliminate creatives whose line-item has already hit its
//! per-user cap within the current window. Skipped entirely when `user_id`
//! is empty.
//!
//! Counter lookups fail open: a counter-store error is logged and treated as
//! "no limit known", consistent with the fail-open policy for the rest of
//! the filtering path.

use std::sync::Arc;

use crate::catalogue::CatalogueSnapshot;
use crate::counters::CounterStore;
use crate::models::Creative;

pub async fn apply<'a>(
    snapshot: &CatalogueSnapshot,
    input: Vec<&'a Creative>,
    counters: &Arc<dyn CounterStore>,
    user_id: &str,
    now_secs: i64,
) -> Vec<&'a Creative> {
    if user_id.is_empty() {
        return input;
    }

    let mut survivors = Vec::with_capacity(input.len());
    for creative in input {
        let Some(line_item) = snapshot.line_item_by_id(&creative.line_item_id) else {
            continue;
        };
        let Some(cap) = line_item.frequency_cap else {
            survivors.push(creative);
            continue;
        };

        let subject = format!("{}:{}", line_item.id, user_id);
        match counters.get(&subject, now_secs, line_item.frequency_window_secs).await {
            Ok(count) if count >= cap as u64 => {
                metrics::counter!("frequency_filter_eliminated", 1);
            }
            Ok(_) => survivors.push(creative),
            Err(err) => {
                tracing::warn!(error = %err, line_item = %line_item.id, "frequency counter lookup failed, failing open");
                survivors.push(creative);
            }
        }
    }
    survivors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::InMemoryCounterStore;
    use crate::models::*;

    fn snapshot_with_cap(cap: Option<u32>) -> crate::catalogue::CatalogueData {
        crate::catalogue::CatalogueData {
            publishers: vec![Publisher {
                id: "pub1".into(),
                placement_ids: vec!["p1".into()],
                require_api_key: false,
            }],
            placements: vec![Placement {
                id: "p1".into(),
                publisher_id: "pub1".into(),
                accepted_formats: vec![],
                line_item_ids: vec!["li1".into()],
            }],
            line_items: vec![LineItem {
                id: "li1".into(),
                campaign_id: "c1".into(),
                publisher_id: "pub1".into(),
                budget_type: BudgetType::Cpm,
                bid: 1.0,
                daily_impression_cap: 10,
                pacing_strategy: PacingStrategy::Asap,
                frequency_cap: cap,
                frequency_window_secs: 86400,
                targeting: TargetingPredicate::default(),
                click_url: String::new(),
                state: LineItemState::Active,
            }],
            campaigns: vec![Campaign {
                id: "c1".into(),
                publisher_id: "pub1".into(),
                budget: 0.0,
                flight_start: 0,
                flight_end: i64::MAX,
                spend: 0.0,
            }],
            creatives: vec![Creative {
                id: "cr1".into(),
                line_item_id: "li1".into(),
                placement_id: "p1".into(),
                render: CreativeRender::RawHtml(String::new()),
                size: AdSize::ANY,
                click_url: String::new(),
            }],
        }
    }

    #[tokio::test]
    async fn empty_user_id_skips_the_stage() {
        let store = crate::catalogue::CatalogueStore::new();
        store.reload_all(snapshot_with_cap(Some(0))).await.unwrap();
        let snapshot = store.current();
        let counters: Arc<dyn CounterStore> = Arc::new(InMemoryCounterStore::new());
        let input = snapshot.by_placement("p1").unwrap();
        let survivors = apply(&snapshot, input, &counters, "", 0).await;
        assert_eq!(survivors.len(), 1);
    }

    #[tokio::test]
    async fn eliminates_once_cap_is_reached() {
        let store = crate::catalogue::CatalogueStore::new();
        store.reload_all(snapshot_with_cap(Some(1))).await.unwrap();
        let snapshot = store.current();
        let counters: Arc<dyn CounterStore> = Arc::new(InMemoryCounterStore::new());

        let input = snapshot.by_placement("p1").unwrap();
        assert_eq!(apply(&snapshot, input, &counters, "u1", 0).await.len(), 1);

        counters.increment("li1:u1", 0, 86400).await.unwrap();
        let input = snapshot.by_placement("p1").unwrap();
        assert_eq!(apply(&snapshot, input, &counters, "u1", 0).await.len(), 0);
    }
}
