//! Pipeline configuration
//!
//! Every stage receives the parts of [`PipelineConfig`] it needs explicitly, so stages can be
//! exercised in memory without touching the filesystem.

use crate::hierarchy::DEFAULT_TERMINAL_SINKS;
use crate::naming::NamingRules;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Input and output locations
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LayerPaths {
    /// River lines used for intersection scoring and source points
    pub rivers: PathBuf,
    /// River network table with name and "flows into" properties
    pub river_network: PathBuf,
    /// Sub-basin polygons
    pub subbasins: PathBuf,
    /// Reach lines associated one-to-one with sub-basins
    pub proxy_lines: PathBuf,
    /// Persisted main-river cache (two-column CSV). `None` disables persistence.
    pub main_river_cache: Option<PathBuf>,
    /// Output GeoJSON file, or a directory to receive a timestamped file
    pub output: PathBuf,
}

/// Property names read from and written to the feature collections
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PropertyNames {
    /// River name in the river line layer
    pub river_name: String,
    /// River name in the river network layer
    pub network_name: String,
    /// Downstream reference in the river network layer
    pub network_flow_to: String,
    /// Sub-basin identifier in both the sub-basin and the proxy line layers
    pub subbasin_id: String,
    /// Output: assigned main river (dropped unless `keep_main_river`)
    pub main_river: String,
    /// Output: display name
    pub display_name: String,
    /// Output: fragment index
    pub fragment: String,
    /// Output: immediate downstream river; further levels are suffixed `2..N`
    pub flow_to: String,
}

impl Default for PropertyNames {
    fn default() -> Self {
        Self {
            river_name: "name_ua".to_string(),
            network_name: "NAME_UKR".to_string(),
            network_flow_to: "FLOW_TO".to_string(),
            subbasin_id: "Subbasin".to_string(),
            main_river: "MainRiver".to_string(),
            display_name: "Name_UA".to_string(),
            fragment: "Fragment".to_string(),
            flow_to: "FlowTo".to_string(),
        }
    }
}

/// How an intersection between a proxy and a river is turned into a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ScoringMode {
    /// Number of intersection parts (points, lines, parts of multi-lines)
    #[default]
    Count,
    /// Accumulated length of the intersecting line parts. Kept as an alternate; not used by the
    /// default pipeline.
    Length,
}

/// Geometric tolerances, all in units of the rivers' CRS
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GeometryParams {
    /// Buffer applied to proxy lines before scoring (0 keeps them as lines)
    pub proxy_buffer: f64,
    /// Buffer applied to the sub-basin working copy (negative shrinks)
    pub subbasin_buffer: f64,
    /// Simplification tolerance for the sub-basin working copy
    pub simplify_tolerance: f64,
    /// Tolerance used when repairing invalid polygons (simplify, then buffer by its negation)
    pub repair_tolerance: f64,
    /// Scoring applied to proxy/river intersections
    pub scoring: ScoringMode,
}

impl Default for GeometryParams {
    fn default() -> Self {
        Self {
            proxy_buffer: 25.0,
            subbasin_buffer: -300.0,
            simplify_tolerance: 20.0,
            repair_tolerance: 0.01,
            scoring: ScoringMode::Count,
        }
    }
}

/// Configuration for a full pipeline run
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PipelineConfig {
    pub paths: LayerPaths,
    pub properties: PropertyNames,
    pub geometry: GeometryParams,
    pub naming: NamingRules,
    /// Downstream names at which hierarchy traversal stops
    pub terminal_sinks: Vec<String>,
    /// River label marking unnamed watercourses; each such sub-basin is its own group
    pub unnamed_label: String,
    /// Fill `FlowTo`, `FlowTo2`.. from the river network
    pub hierarchy_columns: bool,
    /// Keep the `MainRiver` property in the export
    pub keep_main_river: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            paths: LayerPaths::default(),
            properties: PropertyNames::default(),
            geometry: GeometryParams::default(),
            naming: NamingRules::default(),
            terminal_sinks: DEFAULT_TERMINAL_SINKS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            unnamed_label: "Без назви".to_string(),
            hierarchy_columns: true,
            keep_main_river: false,
        }
    }
}
