//! Input layers: rivers, river network, sub-basins and their proxy reach lines
//!
//! Layers are read from GeoJSON feature collections. Rivers, the network and proxy lines are
//! immutable after load; sub-basins carry an immutable original geometry next to a working
//! copy and the derived attributes filled in by the pipeline stages.

use crate::crs::{self, Crs};
use crate::diagnostics::{Diagnostics, Stage};
use crate::{DataError, Result};
use geo::{Centroid, Geometry, LineString, MultiLineString, MultiPolygon, Point};
use geojson::{Feature, FeatureCollection, JsonObject};
use serde_json::Value as JsonValue;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Identifier shared by a sub-basin polygon and its proxy reach line
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SubbasinId(pub i64);

impl fmt::Display for SubbasinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SubbasinId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim().parse().map(SubbasinId)
    }
}

impl SubbasinId {
    /// Read an identifier from a JSON property (integer, integral float or numeric string)
    fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.is_finite())
                    .map(|f| f as i64)
            }),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
        .map(SubbasinId)
    }
}

/// A river line with its name
#[derive(Debug, Clone)]
pub struct River {
    pub name: String,
    pub geometry: MultiLineString<f64>,
}

impl River {
    pub fn new(name: impl Into<String>, geometry: MultiLineString<f64>) -> Self {
        Self {
            name: name.into(),
            geometry,
        }
    }

    /// First vertex of the first part
    pub fn source(&self) -> Option<Point<f64>> {
        self.geometry
            .0
            .first()
            .and_then(|line| line.0.first())
            .map(|c| Point::from(*c))
    }

    /// Last vertex of the first part
    pub fn mouth(&self) -> Option<Point<f64>> {
        self.geometry
            .0
            .first()
            .and_then(|line| line.0.last())
            .map(|c| Point::from(*c))
    }
}

/// River lines in input order
#[derive(Debug, Clone, Default)]
pub struct RiverLayer {
    pub crs: Crs,
    rivers: Vec<River>,
}

impl RiverLayer {
    pub fn new(crs: Crs, rivers: Vec<River>) -> Self {
        Self { crs, rivers }
    }

    /// Load river lines from a GeoJSON file
    pub fn load(path: &Path, name_property: &str, diagnostics: &mut Diagnostics) -> Result<Self> {
        let collection = read_feature_collection(path)?;
        Self::from_feature_collection(collection, name_property, diagnostics)
    }

    /// Build the layer from a parsed feature collection.
    ///
    /// Features without a usable line geometry are skipped with a diagnostic; features
    /// without a name are kept under an empty name and never chosen as a main river.
    pub fn from_feature_collection(
        collection: FeatureCollection,
        name_property: &str,
        diagnostics: &mut Diagnostics,
    ) -> Result<Self> {
        let crs = Crs::from_geojson_members(collection.foreign_members.as_ref())?;
        require_property(&collection, "rivers", name_property)?;

        let mut rivers = Vec::with_capacity(collection.features.len());
        for (index, feature) in collection.features.iter().enumerate() {
            let name = property_string(feature, name_property).unwrap_or_default();
            match feature_lines(feature, "rivers", index) {
                Ok(geometry) => rivers.push(River::new(name, geometry)),
                Err(e) => diagnostics.record(Stage::Load, format!("river {name:?}"), e),
            }
        }

        tracing::info!("Loaded {} rivers ({})", rivers.len(), crs);
        Ok(Self { crs, rivers })
    }

    #[inline]
    pub fn rivers(&self) -> &[River] {
        &self.rivers
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rivers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rivers.is_empty()
    }

    /// First river carrying exactly this name
    pub fn find(&self, name: &str) -> Option<&River> {
        self.rivers.iter().find(|r| r.name == name)
    }
}

/// One row of the river network: a river and the river (or sink) it flows into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiverLink {
    pub name: Option<String>,
    pub flow_to: Option<String>,
}

impl RiverLink {
    pub fn new(name: &str, flow_to: &str) -> Self {
        Self {
            name: non_empty(name),
            flow_to: non_empty(flow_to),
        }
    }
}

/// The "flows into" relation between rivers, in input order
#[derive(Debug, Clone, Default)]
pub struct RiverNetwork {
    links: Vec<RiverLink>,
}

impl RiverNetwork {
    pub fn new(links: Vec<RiverLink>) -> Self {
        Self { links }
    }

    /// Load the network table from a GeoJSON file (geometries are ignored)
    pub fn load(path: &Path, name_property: &str, flow_to_property: &str) -> Result<Self> {
        let collection = read_feature_collection(path)?;
        Self::from_feature_collection(&collection, name_property, flow_to_property)
    }

    pub fn from_feature_collection(
        collection: &FeatureCollection,
        name_property: &str,
        flow_to_property: &str,
    ) -> Result<Self> {
        require_property(collection, "river network", name_property)?;
        require_property(collection, "river network", flow_to_property)?;

        let links: Vec<RiverLink> = collection
            .features
            .iter()
            .map(|feature| RiverLink {
                name: property_string(feature, name_property),
                flow_to: property_string(feature, flow_to_property),
            })
            .collect();

        tracing::info!("Loaded {} river network rows", links.len());
        Ok(Self { links })
    }

    #[inline]
    pub fn links(&self) -> &[RiverLink] {
        &self.links
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// A sub-basin polygon with its derived attributes
#[derive(Debug, Clone)]
pub struct Subbasin {
    pub id: SubbasinId,
    /// Geometry as loaded, never modified
    original: MultiPolygon<f64>,
    /// Centroid of `original`, kept in the CRS of the working copy
    original_centroid: Option<Point<f64>>,
    /// Working copy used by the geometric stages
    pub working: MultiPolygon<f64>,
    /// Passthrough properties of the input feature
    pub properties: JsonObject,
    pub main_river: Option<String>,
    pub display_name: Option<String>,
    pub fragment: Option<u32>,
    /// Immediate downstream river of the main river
    pub flow_to: Option<String>,
    /// Rivers further downstream of `flow_to`
    pub downstream: Vec<String>,
}

impl Subbasin {
    pub fn new(id: SubbasinId, geometry: MultiPolygon<f64>, properties: JsonObject) -> Self {
        Self {
            id,
            working: geometry.clone(),
            original_centroid: geometry.centroid(),
            original: geometry,
            properties,
            main_river: None,
            display_name: None,
            fragment: None,
            flow_to: None,
            downstream: Vec::new(),
        }
    }

    /// The geometry as loaded
    #[inline]
    pub fn original(&self) -> &MultiPolygon<f64> {
        &self.original
    }

    /// Centroid of the working copy, or of the original geometry when the working copy is
    /// empty. Both are in the CRS of the working copy.
    pub fn reference_point(&self) -> Option<Point<f64>> {
        self.working.centroid().or(self.original_centroid)
    }
}

/// Sub-basin polygons in input order
#[derive(Debug, Clone, Default)]
pub struct SubbasinLayer {
    /// CRS of the working copies
    pub crs: Crs,
    /// CRS of the original geometries
    source_crs: Crs,
    subbasins: Vec<Subbasin>,
}

impl SubbasinLayer {
    pub fn new(crs: Crs, subbasins: Vec<Subbasin>) -> Self {
        Self {
            crs,
            source_crs: crs,
            subbasins,
        }
    }

    /// Load sub-basin polygons from a GeoJSON file
    pub fn load(path: &Path, id_property: &str, diagnostics: &mut Diagnostics) -> Result<Self> {
        let collection = read_feature_collection(path)?;
        Self::from_feature_collection(collection, id_property, diagnostics)
    }

    /// Build the layer from a parsed feature collection.
    ///
    /// A feature without an identifier aborts the load; a feature without a polygon geometry
    /// is skipped with a diagnostic.
    pub fn from_feature_collection(
        collection: FeatureCollection,
        id_property: &str,
        diagnostics: &mut Diagnostics,
    ) -> Result<Self> {
        let crs = Crs::from_geojson_members(collection.foreign_members.as_ref())?;

        let mut subbasins = Vec::with_capacity(collection.features.len());
        for (index, feature) in collection.features.into_iter().enumerate() {
            let id = feature_id(&feature, "subbasins", index, id_property)?;
            match feature_polygons(&feature, "subbasins", index) {
                Ok(geometry) => {
                    let properties = feature.properties.unwrap_or_default();
                    subbasins.push(Subbasin::new(id, geometry, properties));
                }
                Err(e) => diagnostics.record(Stage::Load, format!("subbasin {id}"), e),
            }
        }

        tracing::info!("Loaded {} subbasins ({})", subbasins.len(), crs);
        Ok(Self::new(crs, subbasins))
    }

    #[inline]
    pub fn subbasins(&self) -> &[Subbasin] {
        &self.subbasins
    }

    #[inline]
    pub fn subbasins_mut(&mut self) -> &mut [Subbasin] {
        &mut self.subbasins
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.subbasins.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.subbasins.is_empty()
    }

    /// Reproject the working copies; originals stay in their source CRS
    pub fn reproject(&mut self, to: Crs) {
        if self.crs == to {
            return;
        }
        tracing::info!("Reprojecting subbasins from {} to {}", self.crs, to);
        for subbasin in &mut self.subbasins {
            crs::reproject(&mut subbasin.working, self.crs, to);
            if let Some(centroid) = &mut subbasin.original_centroid {
                crs::reproject(centroid, self.crs, to);
            }
        }
        self.crs = to;
    }

    /// Replace every working copy with the original geometry
    pub fn restore_original_geometry(&mut self) {
        for subbasin in &mut self.subbasins {
            subbasin.working = subbasin.original.clone();
            subbasin.original_centroid = subbasin.original.centroid();
        }
        self.crs = self.source_crs;
    }
}

/// A reach line standing in for one sub-basin during scoring
#[derive(Debug, Clone)]
pub struct ProxyLine {
    pub subbasin: SubbasinId,
    pub geometry: MultiLineString<f64>,
}

/// Proxy reach lines in input order
#[derive(Debug, Clone, Default)]
pub struct ProxyLayer {
    pub crs: Crs,
    lines: Vec<ProxyLine>,
}

impl ProxyLayer {
    pub fn new(crs: Crs, lines: Vec<ProxyLine>) -> Self {
        Self { crs, lines }
    }

    /// Load proxy reach lines from a GeoJSON file
    pub fn load(path: &Path, id_property: &str, diagnostics: &mut Diagnostics) -> Result<Self> {
        let collection = read_feature_collection(path)?;
        Self::from_feature_collection(&collection, id_property, diagnostics)
    }

    pub fn from_feature_collection(
        collection: &FeatureCollection,
        id_property: &str,
        diagnostics: &mut Diagnostics,
    ) -> Result<Self> {
        let crs = Crs::from_geojson_members(collection.foreign_members.as_ref())?;

        let mut lines = Vec::with_capacity(collection.features.len());
        for (index, feature) in collection.features.iter().enumerate() {
            let subbasin = feature_id(feature, "proxy lines", index, id_property)?;
            match feature_lines(feature, "proxy lines", index) {
                Ok(geometry) => lines.push(ProxyLine { subbasin, geometry }),
                Err(e) => diagnostics.record(Stage::Load, format!("proxy line {subbasin}"), e),
            }
        }

        tracing::info!("Loaded {} proxy lines ({})", lines.len(), crs);
        Ok(Self { crs, lines })
    }

    #[inline]
    pub fn lines(&self) -> &[ProxyLine] {
        &self.lines
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn reproject(&mut self, to: Crs) {
        if self.crs == to {
            return;
        }
        tracing::info!("Reprojecting proxy lines from {} to {}", self.crs, to);
        for line in &mut self.lines {
            crs::reproject(&mut line.geometry, self.crs, to);
        }
        self.crs = to;
    }
}

/// Read and parse a GeoJSON feature collection
pub(crate) fn read_feature_collection(path: &Path) -> Result<FeatureCollection> {
    let text = std::fs::read_to_string(path)?;
    Ok(FeatureCollection::from_str(&text)?)
}

/// Treat `""` and the literal `"None"` as missing
fn non_empty(value: &str) -> Option<String> {
    match value {
        "" | "None" => None,
        other => Some(other.to_string()),
    }
}

fn property_string(feature: &Feature, property: &str) -> Option<String> {
    match feature.property(property)? {
        JsonValue::String(s) => non_empty(s),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Fail when a non-empty collection has no feature carrying `property` at all
fn require_property(collection: &FeatureCollection, layer: &str, property: &str) -> Result<()> {
    if collection.features.is_empty()
        || collection
            .features
            .iter()
            .any(|f| f.contains_property(property))
    {
        return Ok(());
    }
    Err(DataError::MissingProperty {
        layer: layer.to_string(),
        index: 0,
        property: property.to_string(),
    })
}

fn feature_id(feature: &Feature, layer: &str, index: usize, property: &str) -> Result<SubbasinId> {
    let value = feature
        .property(property)
        .ok_or_else(|| DataError::MissingProperty {
            layer: layer.to_string(),
            index,
            property: property.to_string(),
        })?;
    SubbasinId::from_json(value).ok_or_else(|| DataError::InvalidFeature {
        layer: layer.to_string(),
        index,
        reason: format!("{property} is not an integer identifier: {value}"),
    })
}

fn feature_geometry(feature: &Feature, layer: &str, index: usize) -> Result<Geometry<f64>> {
    let geometry = feature
        .geometry
        .as_ref()
        .ok_or_else(|| DataError::InvalidFeature {
            layer: layer.to_string(),
            index,
            reason: "feature has no geometry".to_string(),
        })?;
    Geometry::<f64>::try_from(&geometry.value).map_err(|e| DataError::InvalidFeature {
        layer: layer.to_string(),
        index,
        reason: e.to_string(),
    })
}

fn feature_lines(feature: &Feature, layer: &str, index: usize) -> Result<MultiLineString<f64>> {
    match feature_geometry(feature, layer, index)? {
        Geometry::LineString(line) => Ok(MultiLineString::new(vec![line])),
        Geometry::MultiLineString(lines) => Ok(lines),
        Geometry::Line(line) => Ok(MultiLineString::new(vec![LineString::from(line)])),
        other => Err(DataError::InvalidFeature {
            layer: layer.to_string(),
            index,
            reason: format!("expected a line geometry, found {}", geometry_kind(&other)),
        }),
    }
}

fn feature_polygons(feature: &Feature, layer: &str, index: usize) -> Result<MultiPolygon<f64>> {
    match feature_geometry(feature, layer, index)? {
        Geometry::Polygon(polygon) => Ok(MultiPolygon::new(vec![polygon])),
        Geometry::MultiPolygon(polygons) => Ok(polygons),
        other => Err(DataError::InvalidFeature {
            layer: layer.to_string(),
            index,
            reason: format!("expected a polygon geometry, found {}", geometry_kind(&other)),
        }),
    }
}

fn geometry_kind(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RIVERS: &str = r#"{
        "type": "FeatureCollection",
        "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::3857" } },
        "features": [
            { "type": "Feature", "properties": { "name_ua": "Рось" },
              "geometry": { "type": "LineString", "coordinates": [[0, 0], [10, 0]] } },
            { "type": "Feature", "properties": { "name_ua": "Дніпро" },
              "geometry": { "type": "MultiLineString",
                            "coordinates": [[[5, 5], [5, 10]], [[20, 20], [30, 30]]] } },
            { "type": "Feature", "properties": { "name_ua": "Точка" },
              "geometry": { "type": "Point", "coordinates": [1, 1] } }
        ]
    }"#;

    const SUBBASINS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            { "type": "Feature", "properties": { "Subbasin": 1, "Area": 12.5 },
              "geometry": { "type": "Polygon",
                            "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 1], [0, 0]]] } },
            { "type": "Feature", "properties": { "Subbasin": "2" },
              "geometry": { "type": "Polygon",
                            "coordinates": [[[1, 0], [2, 0], [2, 1], [1, 1], [1, 0]]] } },
            { "type": "Feature", "properties": { "Subbasin": 3.0 }, "geometry": null }
        ]
    }"#;

    #[test]
    fn test_load_rivers() {
        let collection = FeatureCollection::from_str(RIVERS).unwrap();
        let mut diagnostics = Diagnostics::new();
        let layer =
            RiverLayer::from_feature_collection(collection, "name_ua", &mut diagnostics).unwrap();

        assert_eq!(layer.crs, Crs::WebMercator);
        assert_eq!(layer.len(), 2);
        assert_eq!(diagnostics.count_for(Stage::Load), 1);

        let dnipro = layer.find("Дніпро").unwrap();
        assert_eq!(dnipro.geometry.0.len(), 2);
        assert_eq!(dnipro.source(), Some(Point::new(5.0, 5.0)));
        assert_eq!(dnipro.mouth(), Some(Point::new(5.0, 10.0)));
        assert!(layer.find("Десна").is_none());
    }

    #[test]
    fn test_missing_name_property_is_fatal() {
        let collection = FeatureCollection::from_str(RIVERS).unwrap();
        let mut diagnostics = Diagnostics::new();
        let result = RiverLayer::from_feature_collection(collection, "NAME", &mut diagnostics);
        assert!(matches!(result, Err(DataError::MissingProperty { .. })));
    }

    #[test]
    fn test_load_subbasins() {
        let collection = FeatureCollection::from_str(SUBBASINS).unwrap();
        let mut diagnostics = Diagnostics::new();
        let layer =
            SubbasinLayer::from_feature_collection(collection, "Subbasin", &mut diagnostics)
                .unwrap();

        assert_eq!(layer.crs, Crs::Wgs84);
        assert_eq!(layer.len(), 2);
        assert_eq!(layer.subbasins()[0].id, SubbasinId(1));
        assert_eq!(layer.subbasins()[1].id, SubbasinId(2));
        assert!(layer.subbasins()[0].properties.contains_key("Area"));
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_reproject_keeps_original() {
        let collection = FeatureCollection::from_str(SUBBASINS).unwrap();
        let mut diagnostics = Diagnostics::new();
        let mut layer =
            SubbasinLayer::from_feature_collection(collection, "Subbasin", &mut diagnostics)
                .unwrap();

        layer.reproject(Crs::WebMercator);
        let subbasin = &layer.subbasins()[0];
        assert_ne!(&subbasin.working, subbasin.original());

        layer.restore_original_geometry();
        assert_eq!(layer.crs, Crs::Wgs84);
        let subbasin = &layer.subbasins()[0];
        assert_eq!(&subbasin.working, subbasin.original());
    }

    #[test]
    fn test_reference_point_follows_working_crs() {
        let square = geo::Rect::new((30.0, 50.0), (30.01, 50.01)).to_polygon();
        let subbasin = Subbasin::new(
            SubbasinId(1),
            MultiPolygon::new(vec![square]),
            JsonObject::new(),
        );
        let mut layer = SubbasinLayer::new(Crs::Wgs84, vec![subbasin]);
        layer.reproject(Crs::WebMercator);
        let projected = layer.subbasins()[0].reference_point().unwrap();

        // Empty working copy, as after a large negative buffer
        layer.subbasins_mut()[0].working = MultiPolygon::new(vec![]);
        let fallback = layer.subbasins()[0].reference_point().unwrap();
        assert!((fallback.x() - projected.x()).abs() < 1.0);
        assert!((fallback.y() - projected.y()).abs() < 1.0);
        assert!(fallback.x() > 3_000_000.0);

        layer.restore_original_geometry();
        let restored = layer.subbasins()[0].reference_point().unwrap();
        assert!((restored.x() - 30.005).abs() < 1e-9);
        assert!((restored.y() - 50.005).abs() < 1e-9);
    }

    #[test]
    fn test_network_links() {
        let text = r#"{
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "properties": { "NAME_UKR": "Рось", "FLOW_TO": "Дніпро" },
                  "geometry": null },
                { "type": "Feature", "properties": { "NAME_UKR": "Дніпро", "FLOW_TO": "Чорне море" },
                  "geometry": null },
                { "type": "Feature", "properties": { "NAME_UKR": "Струмок", "FLOW_TO": null },
                  "geometry": null }
            ]
        }"#;
        let collection = FeatureCollection::from_str(text).unwrap();
        let network =
            RiverNetwork::from_feature_collection(&collection, "NAME_UKR", "FLOW_TO").unwrap();

        assert_eq!(network.len(), 3);
        assert_eq!(network.links()[0], RiverLink::new("Рось", "Дніпро"));
        assert_eq!(network.links()[2].flow_to, None);
    }

    #[test]
    fn test_subbasin_id_parsing() {
        assert_eq!("42".parse::<SubbasinId>().unwrap(), SubbasinId(42));
        assert_eq!(
            SubbasinId::from_json(&serde_json::json!(7.0)),
            Some(SubbasinId(7))
        );
        assert_eq!(SubbasinId::from_json(&serde_json::json!(7.5)), None);
        assert_eq!(SubbasinId::from_json(&serde_json::json!(null)), None);
    }
}
