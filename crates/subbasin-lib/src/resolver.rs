//! Main-river determination by proxy/river intersection scoring

use crate::cache::MainRiverMap;
use crate::config::ScoringMode;
use crate::diagnostics::{Diagnostics, Stage};
use crate::geometry::ProxyShape;
use crate::layers::{ProxyLayer, RiverLayer, SubbasinId};
use crate::quadtree::{Quadtree, SpatialIndex};
use smallvec::SmallVec;

/// Accumulated score per river name, in first-seen order
type Scores<'r> = SmallVec<[(&'r str, f64); 8]>;

/// Assigns each sub-basin the river that dominates the intersection with its proxy line
#[derive(Debug)]
pub struct MainRiverResolver<'r> {
    rivers: &'r RiverLayer,
    /// Built once over the river lines
    index: Quadtree,
    scoring: ScoringMode,
    results: MainRiverMap,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<'r> MainRiverResolver<'r> {
    pub fn new(rivers: &'r RiverLayer, scoring: ScoringMode) -> Self {
        let index = Quadtree::from_geometries(rivers.rivers().iter().map(|r| &r.geometry));
        tracing::debug!(
            "Indexed {} river lines (depth {})",
            index.len(),
            index.depth()
        );
        Self {
            rivers,
            index,
            scoring,
            results: MainRiverMap::new(),
        }
    }

    /// Use a previously computed map instead of scoring
    pub fn with_results(mut self, results: MainRiverMap) -> Self {
        self.results = results;
        self
    }

    /// Score every proxy line and store the dominant river per sub-basin.
    ///
    /// Proxies are buffered by `proxy_buffer` first. A proxy that cannot be buffered, or a
    /// (proxy, river) pair whose intersection fails, is skipped with a diagnostic.
    pub fn resolve_all(&mut self, proxies: &ProxyLayer, proxy_buffer: f64) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();
        let mut results = MainRiverMap::new();

        for proxy in proxies.lines() {
            let shape = match ProxyShape::new(&proxy.geometry, proxy_buffer) {
                Ok(shape) => shape,
                Err(e) => {
                    diagnostics.record(Stage::Resolve, format!("subbasin {}", proxy.subbasin), e);
                    continue;
                }
            };

            match self.dominant_river(proxy.subbasin, &shape, &mut diagnostics) {
                Some(river) => {
                    tracing::debug!("Main river for subbasin {}: {}", proxy.subbasin, river);
                    results.insert(proxy.subbasin, river.to_string());
                }
                None => {
                    tracing::debug!("No intersecting rivers for subbasin {}", proxy.subbasin);
                }
            }
        }

        tracing::info!(
            "Resolved main rivers for {} of {} proxy lines",
            results.len(),
            proxies.len()
        );
        self.results = results;
        diagnostics
    }

    /// Dominant river for one proxy shape.
    ///
    /// Candidates come from the index in river input order; on equal scores the first
    /// candidate wins.
    pub fn dominant_river(
        &self,
        subbasin: SubbasinId,
        shape: &ProxyShape,
        diagnostics: &mut Diagnostics,
    ) -> Option<&'r str> {
        let bbox = shape.bounding_rect()?;
        let rivers: &'r RiverLayer = self.rivers;
        let mut scores: Scores<'r> = SmallVec::new();

        for id in self.index.query(bbox) {
            let river = &rivers.rivers()[id];
            if river.name.is_empty() || !shape.intersects(&river.geometry) {
                continue;
            }
            let score = match shape.intersection(&river.geometry) {
                Ok(intersection) => intersection.score(self.scoring),
                Err(e) => {
                    diagnostics.record(
                        Stage::Resolve,
                        format!("subbasin {subbasin} / river {:?}", river.name),
                        e,
                    );
                    continue;
                }
            };
            match scores.iter_mut().find(|(name, _)| *name == river.name) {
                Some((_, total)) => *total += score,
                None => scores.push((river.name.as_str(), score)),
            }
        }

        let mut best: Option<(&'r str, f64)> = None;
        for (name, score) in scores {
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((name, score));
            }
        }
        best.map(|(name, _)| name)
    }

    /// Main river of a sub-basin, if one was found
    pub fn resolve(&self, subbasin: SubbasinId) -> Option<&str> {
        self.results.get(&subbasin).map(String::as_str)
    }

    #[inline]
    pub fn results(&self) -> &MainRiverMap {
        &self.results
    }

    pub fn into_results(self) -> MainRiverMap {
        self.results
    }
}
