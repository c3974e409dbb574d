//! The filter cascade: placement lookup, targeting, size, frequency, pacing.
//!
//! Each stage takes the survivors of the previous one and returns a (possibly
//! smaller) set; every stage's output is a subset of its input by
//! construction, never by post-hoc filtering. Stage ordering is fixed —
//! cheapest/most-reducing first, KV-backed stages last.

mod frequency;
mod pacing_stage;
mod size;
mod targeting;

use std::net::IpAddr;
use std::sync::Arc;

use crate::catalogue::CatalogueSnapshot;
use crate::errors::{CatalogueError, NoFillReason};
use crate::models::{AdSize, Creative, RequestContext};
use crate::pacing::PacingRegistry;

/// Everything a single `/ad` request needs to run through the cascade.
pub struct CascadeRequest<'a> {
    pub placement_id: &'a str,
    pub requested_size: AdSize,
    pub context: RequestContext,
    pub user_id: &'a str,
    pub client_ip: Option<IpAddr>,
}

pub struct CascadeOutcome<'a> {
    pub survivors: Vec<&'a Creative>,
    pub no_fill_reason: Option<NoFillReason>,
}

/// Runs the full cascade and returns either survivors or the reason the set
/// became empty. `no_fill_reason` is only meaningful when `survivors` is
/// empty; it distinguishes "filtered out for correctness reasons" from
/// "throttled by pacing".
pub async fn run<'a>(
    snapshot: &'a CatalogueSnapshot,
    counters: &Arc<dyn crate::counters::CounterStore>,
    pacing: &PacingRegistry,
    req: &CascadeRequest<'_>,
    now_secs: i64,
) -> Result<CascadeOutcome<'a>, CatalogueError> {
    let initial = snapshot
        .by_placement(req.placement_id)
        .ok_or_else(|| CatalogueError::UnknownPlacement(req.placement_id.to_string()))?;
    metrics::histogram!("filter_stage_input", initial.len() as f64, "stage" => "placement");

    let after_targeting = targeting::apply(snapshot, initial, &req.context);
    metrics::histogram!("filter_stage_input", after_targeting.len() as f64, "stage" => "targeting");
    if after_targeting.is_empty() {
        return Ok(CascadeOutcome {
            survivors: after_targeting,
            no_fill_reason: Some(NoFillReason::NoEligibleAd),
        });
    }

    let after_size = size::apply(snapshot, after_targeting, req.requested_size);
    metrics::histogram!("filter_stage_input", after_size.len() as f64, "stage" => "size");
    if after_size.is_empty() {
        return Ok(CascadeOutcome {
            survivors: after_size,
            no_fill_reason: Some(NoFillReason::NoEligibleAd),
        });
    }

    let after_frequency = frequency::apply(snapshot, after_size, counters, req.user_id, now_secs).await;
    metrics::histogram!("filter_stage_input", after_frequency.len() as f64, "stage" => "frequency");
    if after_frequency.is_empty() {
        return Ok(CascadeOutcome {
            survivors: after_frequency,
            no_fill_reason: Some(NoFillReason::NoEligibleAd),
        });
    }

    let before_pacing_count = after_frequency.len();
    let after_pacing = pacing_stage::apply(snapshot, after_frequency, pacing, now_secs).await;
    metrics::histogram!("filter_stage_input", after_pacing.len() as f64, "stage" => "pacing");

    let no_fill_reason = if after_pacing.is_empty() {
        if before_pacing_count > 0 {
            Some(NoFillReason::PacingLimitReached)
        } else {
            Some(NoFillReason::NoEligibleAd)
        }
    } else {
        None
    };

    Ok(CascadeOutcome {
        survivors: after_pacing,
        no_fill_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{CatalogueData, CatalogueStore};
    use crate::counters::InMemoryCounterStore;
    use crate::models::*;

    fn base_data() -> CatalogueData {
        CatalogueData {
            publishers: vec![Publisher {
                id: "pub1".into(),
                placement_ids: vec!["p1".into()],
                require_api_key: false,
            }],
            placements: vec![Placement {
                id: "p1".into(),
                publisher_id: "pub1".into(),
                accepted_formats: vec![AdFormat::Banner(AdSize { w: 728, h: 90 })],
                line_item_ids: vec!["li1".into()],
            }],
            line_items: vec![LineItem {
                id: "li1".into(),
                campaign_id: "c1".into(),
                publisher_id: "pub1".into(),
                budget_type: BudgetType::Cpm,
                bid: 2.5,
                daily_impression_cap: 1000,
                pacing_strategy: PacingStrategy::Asap,
                frequency_cap: Some(2),
                frequency_window_secs: 86400,
                targeting: TargetingPredicate::default(),
                click_url: "https://example.com".into(),
                state: LineItemState::Active,
            }],
            campaigns: vec![Campaign {
                id: "c1".into(),
                publisher_id: "pub1".into(),
                budget: 1000.0,
                flight_start: 0,
                flight_end: i64::MAX,
                spend: 0.0,
            }],
            creatives: vec![Creative {
                id: "cr1".into(),
                line_item_id: "li1".into(),
                placement_id: "p1".into(),
                render: CreativeRender::Banner { html: "<div></div>".into() },
                size: AdSize { w: 728, h: 90 },
                click_url: String::new(),
            }],
        }
    }

    #[tokio::test]
    async fn unknown_placement_is_an_error() {
        let store = CatalogueStore::new();
        store.reload_all(base_data()).await.unwrap();
        let snapshot = store.current();
        let counters: Arc<dyn crate::counters::CounterStore> = Arc::new(InMemoryCounterStore::new());
        let pacing = PacingRegistry::new();
        let req = CascadeRequest {
            placement_id: "missing",
            requested_size: AdSize { w: 728, h: 90 },
            context: RequestContext::default(),
            user_id: "u1",
            client_ip: None,
        };
        let err = run(&snapshot, &counters, &pacing, &req, 0).await.unwrap_err();
        assert!(matches!(err, CatalogueError::UnknownPlacement(_)));
    }

    #[tokio::test]
    async fn happy_path_survives_the_full_cascade() {
        let store = CatalogueStore::new();
        store.reload_all(base_data()).await.unwrap();
        let snapshot = store.current();
        let counters: Arc<dyn crate::counters::CounterStore> = Arc::new(InMemoryCounterStore::new());
        let pacing = PacingRegistry::new();
        let req = CascadeRequest {
            placement_id: "p1",
            requested_size: AdSize { w: 728, h: 90 },
            context: RequestContext::default(),
            user_id: "u1",
            client_ip: None,
        };
        let outcome = run(&snapshot, &counters, &pacing, &req, 0).await.unwrap();
        assert_eq!(outcome.survivors.len(), 1);
        assert!(outcome.no_fill_reason.is_none());
    }

    #[tokio::test]
    async fn frequency_cap_exhausts_after_the_configured_count() {
        let store = CatalogueStore::new();
        store.reload_all(base_data()).await.unwrap();
        let snapshot = store.current();
        let counters: Arc<dyn crate::counters::CounterStore> = Arc::new(InMemoryCounterStore::new());
        let pacing = PacingRegistry::new();
        let req = CascadeRequest {
            placement_id: "p1",
            requested_size: AdSize { w: 728, h: 90 },
            context: RequestContext::default(),
            user_id: "u1",
            client_ip: None,
        };

        for _ in 0..2 {
            let outcome = run(&snapshot, &counters, &pacing, &req, 0).await.unwrap();
            assert_eq!(outcome.survivors.len(), 1);
            counters.increment("li1:u1", 0, 86400).await.unwrap();
        }
        let outcome = run(&snapshot, &counters, &pacing, &req, 0).await.unwrap();
        assert_eq!(outcome.survivors.len(), 0);
        assert_eq!(outcome.no_fill_reason, Some(NoFillReason::NoEligibleAd));
    }
}
