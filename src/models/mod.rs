//! Core catalogue entities.
//!
//! These are plain data types; the behaviour that operates on them (the
//! filter cascade, the selector, pacing) lives in their own modules so a
//! reader can find "what a line-item is" separately from "how one gets
//! chosen".

mod targeting;

pub use targeting::{DeviceType, RequestContext, TargetingPredicate};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type PublisherId = String;
pub type PlacementId = String;
pub type LineItemId = String;
pub type CampaignId = String;
pub type CreativeId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetType {
    Cpm,
    Cpc,
    Cpd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PacingStrategy {
    Asap,
    Even,
    Pid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineItemState {
    Active,
    Paused,
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdSize {
    pub w: u32,
    pub h: u32,
}

impl AdSize {
    pub const ANY: AdSize = AdSize { w: 0, h: 0 };

    /// `0` on either axis of the requested size means "any" for that axis.
    pub fn matches_request(&self, requested: AdSize) -> bool {
        let w_ok = requested.w == 0 || requested.w == self.w;
        let h_ok = requested.h == 0 || requested.h == self.h;
        w_ok && h_ok
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdFormat {
    Banner(AdSize),
    Native,
    Video(AdSize),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Publisher {
    pub id: PublisherId,
    pub placement_ids: Vec<PlacementId>,
    pub require_api_key: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Placement {
    pub id: PlacementId,
    pub publisher_id: PublisherId,
    pub accepted_formats: Vec<AdFormat>,
    pub line_item_ids: Vec<LineItemId>,
}

impl Placement {
    pub fn accepts(&self, size: AdSize) -> bool {
        self.accepted_formats.iter().any(|f| match f {
            AdFormat::Banner(s) | AdFormat::Video(s) => s.matches_request(size),
            AdFormat::Native => size == AdSize::ANY,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub publisher_id: PublisherId,
    pub budget: f64,
    pub flight_start: i64,
    pub flight_end: i64,
    pub spend: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub campaign_id: CampaignId,
    pub publisher_id: PublisherId,
    pub budget_type: BudgetType,
    /// eCPM for CPM line-items, the raw CPC bid for CPC line-items. Use
    /// [`LineItem::effective_ecpm`] to read a comparable eCPM.
    pub bid: f64,
    pub daily_impression_cap: u64,
    pub pacing_strategy: PacingStrategy,
    pub frequency_cap: Option<u32>,
    pub frequency_window_secs: u64,
    pub targeting: TargetingPredicate,
    pub click_url: String,
    pub state: LineItemState,
}

impl LineItem {
    pub fn is_active(&self) -> bool {
        self.state == LineItemState::Active
    }

    /// eCPM used by the selector. For CPM line-items this is `bid` as-is;
    /// for CPC it is derived from smoothed CTR: `eCPM = CPC * CTR * 1000`.
    /// CPD line-items are treated like CPM for ranking purposes (their bid
    /// is already an effective eCPM proxy).
    pub fn effective_ecpm(&self, smoothed_ctr: f64) -> f64 {
        match self.budget_type {
            BudgetType::Cpc => self.bid * smoothed_ctr * 1000.0,
            BudgetType::Cpm | BudgetType::Cpd => self.bid,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CreativeRender {
    Banner { html: String },
    Native { fields: HashMap<String, String> },
    RawHtml(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Creative {
    pub id: CreativeId,
    pub line_item_id: LineItemId,
    pub placement_id: PlacementId,
    pub render: CreativeRender,
    pub size: AdSize,
    /// Empty means "inherit from line-item" at URL-selection time.
    pub click_url: String,
}

/// Smoothed click-through-rate: `(clicks + defaultCTR*weight) / (impressions + weight)`.
pub fn smoothed_ctr(clicks: u64, impressions: u64, default_ctr: f64, weight: f64) -> f64 {
    (clicks as f64 + default_ctr * weight) / (impressions as f64 + weight)
}
