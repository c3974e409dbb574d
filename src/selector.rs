//! Selector: ranks the filter cascade's survivors and returns a single
//! winner, or reports why there wasn't one.

use std::sync::Arc;

use crate::catalogue::CatalogueSnapshot;
use crate::counters::CounterStore;
use crate::models::{smoothed_ctr, Creative};
use crate::predictor::{CtrPredictorClient, PredictionRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// Production: score = eCPM * boost, stable lexicographic tie-break.
    RuleBased,
    /// Testing only: uniform draw over survivors.
    Random,
}

pub struct ScoringConfig {
    pub default_ctr: f64,
    pub ctr_weight: f64,
    pub ctr_optimisation_enabled: bool,
}

/// Scores every survivor and returns the winner under `strategy`.
pub async fn select<'a>(
    snapshot: &CatalogueSnapshot,
    survivors: Vec<&'a Creative>,
    counters: &Arc<dyn CounterStore>,
    predictor: &CtrPredictorClient,
    device_type: &str,
    country: &str,
    hour_of_day: u8,
    day_of_week: u8,
    scoring: &ScoringConfig,
    strategy: SelectionStrategy,
) -> Option<(&'a Creative, f64)> {
    if survivors.is_empty() {
        return None;
    }

    match strategy {
        SelectionStrategy::Random => {
            let idx = pseudo_random_index(survivors.len());
            let creative = survivors[idx];
            let price = creative_price(snapshot, creative, 0.0, 1.0);
            Some((creative, price))
        }
        SelectionStrategy::RuleBased => {
            let mut scored = Vec::with_capacity(survivors.len());
            for creative in survivors {
                let Some(line_item) = snapshot.line_item_by_id(&creative.line_item_id) else {
                    continue;
                };
                let (clicks, impressions) = counters.get_ctr_counts(&line_item.id).await.unwrap_or((0, 0));
                let ctr = smoothed_ctr(clicks, impressions, scoring.default_ctr, scoring.ctr_weight);
                let ecpm = line_item.effective_ecpm(ctr);

                let boost = if scoring.ctr_optimisation_enabled {
                    let req = PredictionRequest {
                        line_item_id: &line_item.id,
                        device_type,
                        country,
                        hour_of_day,
                        day_of_week,
                    };
                    predictor.get_prediction(&req).await.boost_multiplier
                } else {
                    1.0
                };

                scored.push((creative, ecpm * boost));
            }

            scored.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.id.cmp(&b.0.id))
            });
            scored.into_iter().next()
        }
    }
}

fn creative_price(snapshot: &CatalogueSnapshot, creative: &Creative, default_ctr: f64, ctr_weight: f64) -> f64 {
    snapshot
        .line_item_by_id(&creative.line_item_id)
        .map(|li| li.effective_ecpm(smoothed_ctr(0, 0, default_ctr, ctr_weight)))
        .unwrap_or(0.0)
}

fn pseudo_random_index(len: usize) -> usize {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.subsec_nanos()).unwrap_or(0);
    nanos as usize % len
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{CatalogueData, CatalogueStore};
    use crate::counters::InMemoryCounterStore;
    use crate::models::*;
    use std::time::Duration;

    fn two_line_item_data() -> CatalogueData {
        CatalogueData {
            publishers: vec![Publisher {
                id: "pub1".into(),
                placement_ids: vec!["p1".into()],
                require_api_key: false,
            }],
            placements: vec![Placement {
                id: "p1".into(),
                publisher_id: "pub1".into(),
                accepted_formats: vec![AdFormat::Banner(AdSize { w: 300, h: 250 })],
                line_item_ids: vec!["li_low".into(), "li_high".into()],
            }],
            line_items: vec![
                LineItem {
                    id: "li_low".into(),
                    campaign_id: "c1".into(),
                    publisher_id: "pub1".into(),
                    budget_type: BudgetType::Cpm,
                    bid: 1.0,
                    daily_impression_cap: 1000,
                    pacing_strategy: PacingStrategy::Asap,
                    frequency_cap: None,
                    frequency_window_secs: 86400,
                    targeting: TargetingPredicate::default(),
                    click_url: String::new(),
                    state: LineItemState::Active,
                },
                LineItem {
                    id: "li_high".into(),
                    campaign_id: "c1".into(),
                    publisher_id: "pub1".into(),
                    budget_type: BudgetType::Cpm,
                    bid: 5.0,
                    daily_impression_cap: 1000,
                    pacing_strategy: PacingStrategy::Asap,
                    frequency_cap: None,
                    frequency_window_secs: 86400,
                    targeting: TargetingPredicate::default(),
                    click_url: String::new(),
                    state: LineItemState::Active,
                },
            ],
            campaigns: vec![Campaign {
                id: "c1".into(),
                publisher_id: "pub1".into(),
                budget: 1000.0,
                flight_start: 0,
                flight_end: i64::MAX,
                spend: 0.0,
            }],
            creatives: vec![
                Creative {
                    id: "cr_low".into(),
                    line_item_id: "li_low".into(),
                    placement_id: "p1".into(),
                    render: CreativeRender::RawHtml(String::new()),
                    size: AdSize { w: 300, h: 250 },
                    click_url: String::new(),
                },
                Creative {
                    id: "cr_high".into(),
                    line_item_id: "li_high".into(),
                    placement_id: "p1".into(),
                    render: CreativeRender::RawHtml(String::new()),
                    size: AdSize { w: 300, h: 250 },
                    click_url: String::new(),
                },
            ],
        }
    }

    #[tokio::test]
    async fn higher_ecpm_wins() {
        let store = CatalogueStore::new();
        store.reload_all(two_line_item_data()).await.unwrap();
        let snapshot = store.current();
        let survivors = snapshot.by_placement("p1").unwrap();
        let counters: Arc<dyn CounterStore> = Arc::new(InMemoryCounterStore::new());
        let predictor = CtrPredictorClient::new(None, Duration::from_millis(200), Duration::from_secs(300));
        let scoring = ScoringConfig {
            default_ctr: 0.5,
            ctr_weight: 2.0,
            ctr_optimisation_enabled: false,
        };

        let (winner, _) = select(
            &snapshot,
            survivors,
            &counters,
            &predictor,
            "desktop",
            "US",
            12,
            2,
            &scoring,
            SelectionStrategy::RuleBased,
        )
        .await
        .unwrap();
        assert_eq!(winner.id, "cr_high");
    }

    #[tokio::test]
    async fn ties_break_lexicographically_on_creative_id() {
        let mut data = two_line_item_data();
        data.line_items[0].bid = 5.0;
        let store = CatalogueStore::new();
        store.reload_all(data).await.unwrap();
        let snapshot = store.current();
        let survivors = snapshot.by_placement("p1").unwrap();
        let counters: Arc<dyn CounterStore> = Arc::new(InMemoryCounterStore::new());
        let predictor = CtrPredictorClient::new(None, Duration::from_millis(200), Duration::from_secs(300));
        let scoring = ScoringConfig {
            default_ctr: 0.5,
            ctr_weight: 2.0,
            ctr_optimisation_enabled: false,
        };

        let (winner, _) = select(
            &snapshot,
            survivors,
            &counters,
            &predictor,
            "desktop",
            "US",
            12,
            2,
            &scoring,
            SelectionStrategy::RuleBased,
        )
        .await
        .unwrap();
        assert_eq!(winner.id, "cr_high");
    }
}
