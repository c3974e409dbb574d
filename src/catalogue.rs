//! In-memory catalogue snapshot with atomic reload.
//!
//! Lock-free reads via `ArcSwap`: a reload builds the entire new snapshot
//! off to the side, validates it, then publishes it with a single `.store()`.
//! Readers that already hold a `.load()` keep seeing a fully-consistent old
//! snapshot; the next `.load()` sees the fully-consistent new one.

use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

use crate::errors::CatalogueError;
use crate::models::{Campaign, Creative, CreativeId, LineItem, LineItemId, Placement, PlacementId, Publisher, PublisherId};

/// Raw data handed to `reload`, as would be loaded from the (out-of-scope)
/// SQL/columnar persistence layer.
#[derive(Debug, Clone, Default)]
pub struct CatalogueData {
    pub publishers: Vec<Publisher>,
    pub placements: Vec<Placement>,
    pub line_items: Vec<LineItem>,
    pub campaigns: Vec<Campaign>,
    pub creatives: Vec<Creative>,
}

/// Minimal interface to whatever rebuilds catalogue data; production backs
/// this with SQL/columnar storage, which is out of scope here.
#[async_trait::async_trait]
pub trait CatalogueSource: Send + Sync {
    async fn load(&self) -> Result<CatalogueData, CatalogueError>;
}

/// In-memory source seeded directly with data; used by `/reload` in this
/// crate and by tests.
pub struct StaticCatalogueSource {
    data: AsyncMutex<CatalogueData>,
}

impl StaticCatalogueSource {
    pub fn new(data: CatalogueData) -> Self {
        Self {
            data: AsyncMutex::new(data),
        }
    }

    pub async fn set(&self, data: CatalogueData) {
        *self.data.lock().await = data;
    }
}

#[async_trait::async_trait]
impl CatalogueSource for StaticCatalogueSource {
    async fn load(&self) -> Result<CatalogueData, CatalogueError> {
        Ok(self.data.lock().await.clone())
    }
}

/// A fully built, immutable, cross-referenced view of the catalogue.
#[derive(Debug, Default)]
pub struct CatalogueSnapshot {
    publishers: HashMap<PublisherId, Publisher>,
    placements: HashMap<PlacementId, Placement>,
    line_items: HashMap<LineItemId, LineItem>,
    campaigns: HashMap<String, Campaign>,
    creatives: HashMap<CreativeId, Creative>,
    creatives_by_placement: HashMap<PlacementId, Vec<CreativeId>>,
}

impl CatalogueSnapshot {
    fn build(data: CatalogueData) -> Result<Self, CatalogueError> {
        let publishers: HashMap<_, _> = data.publishers.into_iter().map(|p| (p.id.clone(), p)).collect();
        let placements: HashMap<_, _> = data.placements.into_iter().map(|p| (p.id.clone(), p)).collect();
        let line_items: HashMap<_, _> = data.line_items.into_iter().map(|l| (l.id.clone(), l)).collect();
        let campaigns: HashMap<_, _> = data.campaigns.into_iter().map(|c| (c.id.clone(), c)).collect();
        let creatives: HashMap<_, _> = data.creatives.into_iter().map(|c| (c.id.clone(), c)).collect();

        let mut creatives_by_placement: HashMap<PlacementId, Vec<CreativeId>> = HashMap::new();
        for creative in creatives.values() {
            let line_item = line_items.get(&creative.line_item_id).ok_or_else(|| {
                CatalogueError::Invalid(format!(
                    "creative {} references unknown line-item {}",
                    creative.id, creative.line_item_id
                ))
            })?;
            if !campaigns.contains_key(&line_item.campaign_id) {
                return Err(CatalogueError::Invalid(format!(
                    "line-item {} references unknown campaign {}",
                    line_item.id, line_item.campaign_id
                )));
            }
            if !publishers.contains_key(&line_item.publisher_id) {
                return Err(CatalogueError::Invalid(format!(
                    "line-item {} references unknown publisher {}",
                    line_item.id, line_item.publisher_id
                )));
            }
            if !placements.contains_key(&creative.placement_id) {
                return Err(CatalogueError::Invalid(format!(
                    "creative {} references unknown placement {}",
                    creative.id, creative.placement_id
                )));
            }
            creatives_by_placement
                .entry(creative.placement_id.clone())
                .or_default()
                .push(creative.id.clone());
        }

        Ok(Self {
            publishers,
            placements,
            line_items,
            campaigns,
            creatives,
            creatives_by_placement,
        })
    }

    pub fn by_placement(&self, placement_id: &str) -> Option<Vec<&Creative>> {
        let ids = self.creatives_by_placement.get(placement_id)?;
        Some(ids.iter().filter_map(|id| self.creatives.get(id)).collect())
    }

    pub fn creative_by_id(&self, id: &str) -> Option<&Creative> {
        self.creatives.get(id)
    }

    pub fn publisher_by_id(&self, id: &str) -> Option<&Publisher> {
        self.publishers.get(id)
    }

    pub fn placement_by_id(&self, id: &str) -> Option<&Placement> {
        self.placements.get(id)
    }

    pub fn line_item_by_id(&self, id: &str) -> Option<&LineItem> {
        self.line_items.get(id)
    }

    pub fn campaign_by_id(&self, id: &str) -> Option<&Campaign> {
        self.campaigns.get(id)
    }

    pub fn all_publisher_ids(&self) -> Vec<&PublisherId> {
        self.publishers.keys().collect()
    }
}

/// Holds the current snapshot behind a lock-free pointer swap.
pub struct CatalogueStore {
    current: ArcSwap<CatalogueSnapshot>,
    reload_lock: AsyncMutex<()>,
}

impl Default for CatalogueStore {
    fn default() -> Self {
        Self {
            current: ArcSwap::from_pointee(CatalogueSnapshot::default()),
            reload_lock: AsyncMutex::new(()),
        }
    }
}

impl CatalogueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock-free read of the current snapshot.
    pub fn current(&self) -> Arc<CatalogueSnapshot> {
        self.current.load_full()
    }

    /// Build a full new snapshot and publish it atomically. Concurrent
    /// callers of `reload` are serialised by `reload_lock`; concurrent
    /// readers are never blocked, at any point in the reload.
    pub async fn reload_all(&self, data: CatalogueData) -> Result<(), CatalogueError> {
        let _guard = self.reload_lock.lock().await;
        let snapshot = CatalogueSnapshot::build(data)?;
        self.current.store(Arc::new(snapshot));
        Ok(())
    }

    /// Apply freshly-computed eCPMs (e.g. after a CTR recompute) without a
    /// full reload. Still goes through the same build-then-swap path so
    /// readers never see a half-updated snapshot.
    pub async fn update_ecpm_bulk(&self, updates: &HashMap<LineItemId, f64>) -> Result<(), CatalogueError> {
        let _guard = self.reload_lock.lock().await;
        let current = self.current.load_full();

        let mut publishers: Vec<_> = current.publishers.values().cloned().collect();
        let mut placements: Vec<_> = current.placements.values().cloned().collect();
        let mut line_items: Vec<_> = current.line_items.values().cloned().collect();
        let campaigns: Vec<_> = current.campaigns.values().cloned().collect();
        let creatives: Vec<_> = current.creatives.values().cloned().collect();

        for li in line_items.iter_mut() {
            if let Some(new_bid) = updates.get(&li.id) {
                li.bid = *new_bid;
            }
        }
        publishers.sort_by(|a, b| a.id.cmp(&b.id));
        placements.sort_by(|a, b| a.id.cmp(&b.id));

        let snapshot = CatalogueSnapshot::build(CatalogueData {
            publishers,
            placements,
            line_items,
            campaigns,
            creatives,
        })?;
        self.current.store(Arc::new(snapshot));
        Ok(())
    }
}
