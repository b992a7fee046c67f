//! Subbasin Library - Main-river assignment for watershed sub-basins
//!
//! This library assigns each drainage sub-basin polygon to its governing river, builds the
//! downstream flow hierarchy of the river network, and splits river reaches spanning several
//! sub-basins into ordered fragments. The output feeds hydrological model set-up.
//!
//! # Architecture
//!
//! - **[`RiverLayer`] / [`SubbasinLayer`] / [`ProxyLayer`]**: immutable input layers loaded from GeoJSON
//! - **[`Quadtree`]**: bounding-box spatial index behind the [`SpatialIndex`] trait
//! - **[`MainRiverResolver`]**: intersection scoring between proxy reach lines and rivers
//! - **[`RiverHierarchy`]**: downstream chains built from the "flows into" relation
//! - **[`fragment_subbasins`]**: distance-to-source ordering of sub-basins sharing a river
//! - **[`NamingRules`]**: display names for rivers
//! - **[`Pipeline`]**: runs every stage in order from a [`PipelineConfig`]
//!
//! # Failure model
//!
//! Per-item geometric problems never abort a stage: they are recorded as [`Diagnostic`]s and
//! the stage continues. Load errors (unreadable files, missing properties, unsupported CRS)
//! are returned as [`DataError`] and abort the run.

mod cache;
mod config;
pub mod crs;
mod diagnostics;
mod export;
mod fragment;
pub mod geometry;
mod hierarchy;
mod layers;
mod naming;
mod pipeline;
mod quadtree;
mod resolver;

// Public API exports
pub use cache::{MainRiverMap, load_main_river_cache, save_main_river_cache};
pub use config::{GeometryParams, LayerPaths, PipelineConfig, PropertyNames, ScoringMode};
pub use crs::Crs;
pub use diagnostics::{Diagnostic, Diagnostics, Stage};
pub use export::{ExportColumns, export_subbasins, output_file_path, to_feature_collection};
pub use fragment::{GroupKey, fragment_subbasins, group_by_main_river};
pub use hierarchy::{DEFAULT_TERMINAL_SINKS, HierarchyKey, RiverHierarchy};
pub use layers::{
    ProxyLayer, ProxyLine, River, RiverLayer, RiverLink, RiverNetwork, Subbasin, SubbasinId,
    SubbasinLayer,
};
pub use naming::{NamingRules, normalize_apostrophes};
pub use pipeline::{Layers, Pipeline, RunReport};
pub use quadtree::{Quadtree, SpatialIndex};
pub use resolver::MainRiverResolver;

/// Error types for the library
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid geometry: {0}")]
    GeometryInvalid(String),

    #[error("Topology error: {0}")]
    Topology(String),

    #[error("No river named {name:?}")]
    LookupMiss { name: String },

    #[error("Cache format error: {reason}")]
    CacheFormat { reason: String },

    #[error("Feature {index} of {layer} is missing property {property:?}")]
    MissingProperty {
        layer: String,
        index: usize,
        property: String,
    },

    #[error("Invalid feature {index} of {layer}: {reason}")]
    InvalidFeature {
        layer: String,
        index: usize,
        reason: String,
    },

    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),
}

pub type Result<T> = std::result::Result<T, DataError>;
