//! GeoJSON export of the annotated sub-basins

use crate::config::PropertyNames;
use crate::crs::{self, Crs};
use crate::layers::{Subbasin, SubbasinLayer};
use crate::Result;
use chrono::NaiveTime;
use geojson::{Feature, FeatureCollection, JsonObject, JsonValue};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Columns written next to the passthrough properties
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportColumns {
    /// Keep the main-river column
    pub keep_main_river: bool,
    /// Number of `FlowTo2..` columns, i.e. the longest downstream chain
    pub flow_to_depth: usize,
}

/// Resolve the output file: a directory receives `subbasins_update_name_<HH_MM_SS>.geojson`
pub fn output_file_path(output: &Path, now: NaiveTime) -> PathBuf {
    if output.is_dir() {
        output.join(format!(
            "subbasins_update_name_{}.geojson",
            now.format("%H_%M_%S")
        ))
    } else {
        output.to_path_buf()
    }
}

/// Write the sub-basins as a GeoJSON feature collection in EPSG:4326
pub fn export_subbasins(
    layer: &SubbasinLayer,
    names: &PropertyNames,
    columns: ExportColumns,
    path: &Path,
) -> Result<()> {
    let collection = to_feature_collection(layer, names, columns);
    let file = std::fs::File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &collection)?;
    writer.flush()?;
    tracing::info!(
        "Exported {} subbasins to {}",
        collection.features.len(),
        path.display()
    );
    Ok(())
}

/// Build the output collection, reprojecting working geometries to EPSG:4326
pub fn to_feature_collection(
    layer: &SubbasinLayer,
    names: &PropertyNames,
    columns: ExportColumns,
) -> FeatureCollection {
    let features = layer
        .subbasins()
        .iter()
        .map(|subbasin| {
            let mut geometry = subbasin.working.clone();
            crs::reproject(&mut geometry, layer.crs, Crs::Wgs84);
            Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(&geometry))),
                id: None,
                properties: Some(output_properties(subbasin, names, columns)),
                foreign_members: None,
            }
        })
        .collect();

    let mut members = JsonObject::new();
    members.insert("crs".to_string(), Crs::Wgs84.to_geojson_member());

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: Some(members),
    }
}

/// Passthrough properties plus the derived columns (null when unset)
fn output_properties(
    subbasin: &Subbasin,
    names: &PropertyNames,
    columns: ExportColumns,
) -> JsonObject {
    let mut properties = subbasin.properties.clone();

    properties.insert(names.display_name.clone(), optional_string(&subbasin.display_name));
    properties.insert(names.flow_to.clone(), optional_string(&subbasin.flow_to));
    properties.insert(
        names.fragment.clone(),
        subbasin.fragment.map_or(JsonValue::Null, JsonValue::from),
    );

    for level in 0..columns.flow_to_depth {
        let value = subbasin
            .downstream
            .get(level)
            .map_or(JsonValue::Null, |river| JsonValue::from(river.as_str()));
        properties.insert(format!("{}{}", names.flow_to, level + 2), value);
    }

    if columns.keep_main_river {
        properties.insert(names.main_river.clone(), optional_string(&subbasin.main_river));
    } else {
        properties.remove(&names.main_river);
    }

    properties
}

fn optional_string(value: &Option<String>) -> JsonValue {
    value.as_deref().map_or(JsonValue::Null, JsonValue::from)
}
