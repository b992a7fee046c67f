//! Coordinate reference systems and reprojection between them
//!
//! Supported systems are geographic WGS84 (EPSG:4326), spherical Web Mercator (EPSG:3857) and
//! the WGS84 UTM zones (EPSG:32601-32660 north, EPSG:32701-32760 south). Any other system is
//! rejected at load time with [`DataError::UnsupportedCrs`]. Reprojection always passes
//! through lon/lat.

use crate::{DataError, Result};
use geo::{Coord, MapCoordsInPlace};
use serde_json::Value as JsonValue;
use std::fmt;

/// Half the extent of the Web Mercator plane in meters
const MERCATOR_HALF_EXTENT: f64 = 20037508.34;

/// Latitudes beyond this are clamped before projecting
const MAX_MERCATOR_LATITUDE: f64 = 85.05112878;

const METERS_PER_DEGREE: f64 = MERCATOR_HALF_EXTENT / 180.0;
const METERS_PER_RADIAN: f64 = MERCATOR_HALF_EXTENT / std::f64::consts::PI;

// WGS84 ellipsoid and the UTM grid
const WGS84_A: f64 = 6378137.0;
const WGS84_F: f64 = 1.0 / 298.257223563;
const UTM_SCALE: f64 = 0.9996;
const UTM_FALSE_EASTING: f64 = 500_000.0;
const UTM_FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// A coordinate reference system understood by the loader and the writer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Crs {
    /// Geographic WGS84, lon/lat in degrees (EPSG:4326)
    #[default]
    Wgs84,
    /// Spherical Web Mercator in meters (EPSG:3857)
    WebMercator,
    /// WGS84 UTM zone `1..=60` in meters (EPSG:326xx north, 327xx south)
    Utm { zone: u8, north: bool },
}

impl Crs {
    /// EPSG code of this system
    pub fn epsg(self) -> u32 {
        match self {
            Crs::Wgs84 => 4326,
            Crs::WebMercator => 3857,
            Crs::Utm { zone, north: true } => 32600 + u32::from(zone),
            Crs::Utm { zone, north: false } => 32700 + u32::from(zone),
        }
    }

    /// Map an EPSG code to a supported system
    pub fn from_epsg(code: u32) -> Result<Self> {
        match code {
            4326 | 4979 => Ok(Crs::Wgs84),
            3857 | 900913 | 102100 => Ok(Crs::WebMercator),
            32601..=32660 => Ok(Crs::Utm {
                zone: (code - 32600) as u8,
                north: true,
            }),
            32701..=32760 => Ok(Crs::Utm {
                zone: (code - 32700) as u8,
                north: false,
            }),
            other => Err(DataError::UnsupportedCrs(format!("EPSG:{other}"))),
        }
    }

    /// Parse a CRS name such as `EPSG:3857`, `urn:ogc:def:crs:EPSG::4326` or
    /// `urn:ogc:def:crs:OGC:1.3:CRS84`
    pub fn parse(name: &str) -> Result<Self> {
        let trimmed = name.trim();
        if trimmed.ends_with("CRS84") {
            return Ok(Crs::Wgs84);
        }
        let code = trimmed
            .rsplit(':')
            .next()
            .and_then(|tail| tail.parse::<u32>().ok())
            .ok_or_else(|| DataError::UnsupportedCrs(trimmed.to_string()))?;
        Self::from_epsg(code)
    }

    /// Read the legacy `crs` member of a GeoJSON object.
    ///
    /// RFC 7946 removed the member and fixed the CRS to WGS84, so a missing member means WGS84.
    pub fn from_geojson_members(members: Option<&geojson::JsonObject>) -> Result<Self> {
        let Some(crs) = members.and_then(|m| m.get("crs")) else {
            return Ok(Crs::Wgs84);
        };
        match crs
            .get("properties")
            .and_then(|p| p.get("name"))
            .and_then(JsonValue::as_str)
        {
            Some(name) => Self::parse(name),
            None => Err(DataError::UnsupportedCrs(crs.to_string())),
        }
    }

    /// Build the legacy `crs` member announcing this system
    pub fn to_geojson_member(self) -> JsonValue {
        serde_json::json!({
            "type": "name",
            "properties": { "name": format!("urn:ogc:def:crs:EPSG::{}", self.epsg()) }
        })
    }

    /// Convert a coordinate in this system to lon/lat degrees
    fn to_lonlat(self, c: Coord<f64>) -> Coord<f64> {
        match self {
            Crs::Wgs84 => c,
            Crs::WebMercator => unproject(c),
            Crs::Utm { zone, north } => TransverseMercator::utm(zone, north).inverse(c),
        }
    }

    /// Convert a lon/lat coordinate in degrees to this system
    fn project_lonlat(self, c: Coord<f64>) -> Coord<f64> {
        match self {
            Crs::Wgs84 => c,
            Crs::WebMercator => project(c),
            Crs::Utm { zone, north } => TransverseMercator::utm(zone, north).forward(c),
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

/// Project a lon/lat coordinate (degrees) onto the Web Mercator plane (meters)
#[inline(always)]
fn project(lonlat: Coord<f64>) -> Coord<f64> {
    let lat = lonlat
        .y
        .clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE)
        .to_radians();
    Coord {
        x: lonlat.x * METERS_PER_DEGREE,
        y: (lat.tan() + lat.cos().recip()).ln() * METERS_PER_RADIAN,
    }
}

/// Inverse of [`project`]
#[inline(always)]
fn unproject(xy: Coord<f64>) -> Coord<f64> {
    let lat = std::f64::consts::FRAC_PI_2 - 2.0 * (-xy.y / METERS_PER_RADIAN).exp().atan();
    Coord {
        x: xy.x / METERS_PER_DEGREE,
        y: lat.to_degrees(),
    }
}

/// Transverse Mercator on the WGS84 ellipsoid, Krüger series to third order in `n`
///
/// Agrees with PROJ to a fraction of a millimeter inside a UTM zone.
#[derive(Debug, Clone, Copy)]
struct TransverseMercator {
    /// Central meridian in radians
    lon0: f64,
    false_northing: f64,
    /// Rectifying radius times the scale factor
    k0_a: f64,
    n: f64,
    alpha: [f64; 3],
    beta: [f64; 3],
    delta: [f64; 3],
}

impl TransverseMercator {
    fn utm(zone: u8, north: bool) -> Self {
        let n = WGS84_F / (2.0 - WGS84_F);
        let (n2, n3) = (n * n, n * n * n);
        let rectifying = WGS84_A / (1.0 + n) * (1.0 + n2 / 4.0 + n2 * n2 / 64.0);
        Self {
            lon0: (f64::from(zone) * 6.0 - 183.0).to_radians(),
            false_northing: if north { 0.0 } else { UTM_FALSE_NORTHING_SOUTH },
            k0_a: UTM_SCALE * rectifying,
            n,
            alpha: [
                n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0,
                13.0 * n2 / 48.0 - 3.0 * n3 / 5.0,
                61.0 * n3 / 240.0,
            ],
            beta: [
                n / 2.0 - 2.0 * n2 / 3.0 + 37.0 * n3 / 96.0,
                n2 / 48.0 + n3 / 15.0,
                17.0 * n3 / 480.0,
            ],
            delta: [
                2.0 * n - 2.0 * n2 / 3.0 - 2.0 * n3,
                7.0 * n2 / 3.0 - 8.0 * n3 / 5.0,
                56.0 * n3 / 15.0,
            ],
        }
    }

    /// lon/lat degrees to easting/northing meters
    fn forward(&self, lonlat: Coord<f64>) -> Coord<f64> {
        let lat = lonlat.y.to_radians();
        let dlon = lonlat.x.to_radians() - self.lon0;
        let e = 2.0 * self.n.sqrt() / (1.0 + self.n);
        let t = (lat.sin().atanh() - e * (e * lat.sin()).atanh()).sinh();
        let xi = t.atan2(dlon.cos());
        let eta = (dlon.sin() / (1.0 + t * t).sqrt()).atanh();

        let (mut x, mut y) = (eta, xi);
        for (j, alpha) in (1u32..).zip(self.alpha) {
            let k = 2.0 * f64::from(j);
            x += alpha * (k * xi).cos() * (k * eta).sinh();
            y += alpha * (k * xi).sin() * (k * eta).cosh();
        }
        Coord {
            x: UTM_FALSE_EASTING + self.k0_a * x,
            y: self.false_northing + self.k0_a * y,
        }
    }

    /// Easting/northing meters to lon/lat degrees
    fn inverse(&self, xy: Coord<f64>) -> Coord<f64> {
        let xi = (xy.y - self.false_northing) / self.k0_a;
        let eta = (xy.x - UTM_FALSE_EASTING) / self.k0_a;

        let (mut xi_p, mut eta_p) = (xi, eta);
        for (j, beta) in (1u32..).zip(self.beta) {
            let k = 2.0 * f64::from(j);
            xi_p -= beta * (k * xi).sin() * (k * eta).cosh();
            eta_p -= beta * (k * xi).cos() * (k * eta).sinh();
        }
        let chi = (xi_p.sin() / eta_p.cosh()).asin();
        let mut lat = chi;
        for (j, delta) in (1u32..).zip(self.delta) {
            lat += delta * (2.0 * f64::from(j) * chi).sin();
        }
        let dlon = eta_p.sinh().atan2(xi_p.cos());
        Coord {
            x: (self.lon0 + dlon).to_degrees(),
            y: lat.to_degrees(),
        }
    }
}

/// Reproject a geometry in place from `from` to `to`
///
/// Equal systems are a no-op.
pub fn reproject<G: MapCoordsInPlace<f64>>(geometry: &mut G, from: Crs, to: Crs) {
    if from == to {
        return;
    }
    geometry.map_coords_in_place(move |c| to.project_lonlat(from.to_lonlat(c)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, line_string};

    #[test]
    fn test_projection_origin_and_inverse() {
        let origin = project(Coord { x: 0.0, y: 0.0 });
        assert!(origin.x.abs() < 0.01 && origin.y.abs() < 0.01);

        // Kyiv
        let lonlat = Coord { x: 30.5234, y: 50.4501 };
        let back = unproject(project(lonlat));
        assert!((back.x - lonlat.x).abs() < 1e-6);
        assert!((back.y - lonlat.y).abs() < 1e-6);

        let edge = project(Coord { x: 180.0, y: 89.9 });
        assert!((edge.x - MERCATOR_HALF_EXTENT).abs() < 0.01);
        assert!(edge.y < MERCATOR_HALF_EXTENT + 1.0);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(Crs::parse("EPSG:3857").unwrap(), Crs::WebMercator);
        assert_eq!(Crs::parse("urn:ogc:def:crs:EPSG::4326").unwrap(), Crs::Wgs84);
        assert_eq!(
            Crs::parse("urn:ogc:def:crs:OGC:1.3:CRS84").unwrap(),
            Crs::Wgs84
        );
        assert_eq!(
            Crs::parse("urn:ogc:def:crs:EPSG::32636").unwrap(),
            Crs::Utm { zone: 36, north: true }
        );
        assert_eq!(
            Crs::parse("EPSG:32718").unwrap(),
            Crs::Utm { zone: 18, north: false }
        );
        assert!(matches!(
            Crs::parse("EPSG:2154"),
            Err(DataError::UnsupportedCrs(_))
        ));
        assert!(Crs::parse("EPSG:32661").is_err());
        assert!(Crs::parse("garbage").is_err());
    }

    #[test]
    fn test_geojson_member_roundtrip() {
        let mut members = geojson::JsonObject::new();
        members.insert("crs".to_string(), Crs::WebMercator.to_geojson_member());
        assert_eq!(
            Crs::from_geojson_members(Some(&members)).unwrap(),
            Crs::WebMercator
        );
        let utm = Crs::Utm { zone: 36, north: true };
        members.insert("crs".to_string(), utm.to_geojson_member());
        assert_eq!(Crs::from_geojson_members(Some(&members)).unwrap(), utm);
        assert_eq!(utm.to_string(), "EPSG:32636");
        assert_eq!(Crs::from_geojson_members(None).unwrap(), Crs::Wgs84);
    }

    #[test]
    fn test_reproject_line() {
        let mut line: LineString<f64> = line_string![(x: 30.0, y: 50.0), (x: 31.0, y: 51.0)];
        let original = line.clone();
        reproject(&mut line, Crs::Wgs84, Crs::WebMercator);
        assert!(line.0[0].x > 3_000_000.0);

        reproject(&mut line, Crs::WebMercator, Crs::Wgs84);
        for (a, b) in line.coords().zip(original.coords()) {
            assert!((a.x - b.x).abs() < 1e-9);
            assert!((a.y - b.y).abs() < 1e-9);
        }
    }

    #[test]
    fn test_utm_zone_51n_reference_points() {
        // lon, lat, easting, northing computed with PROJ for EPSG:32651
        let reference = [
            (121.880356, 29.887703, 391888.0637264130, 3306868.4563851040),
            (121.430427, 28.637151, 346582.4108433011, 3168793.409367069),
            (121.880772, 31.491324, 393700.3650201835, 3484597.440826551),
            (122.625275, 30.246954, 463948.3333072607, 3346209.757229396),
        ];
        let tm = TransverseMercator::utm(51, true);
        for (lon, lat, easting, northing) in reference {
            let xy = tm.forward(Coord { x: lon, y: lat });
            assert!((xy.x - easting).abs() < 0.01, "easting {} vs {easting}", xy.x);
            assert!((xy.y - northing).abs() < 0.01, "northing {} vs {northing}", xy.y);

            let back = tm.inverse(Coord { x: easting, y: northing });
            assert!((back.x - lon).abs() < 1e-7);
            assert!((back.y - lat).abs() < 1e-7);
        }
    }

    #[test]
    fn test_utm_central_meridian_and_south() {
        // On the central meridian of zone 36 the easting is the false easting
        let north = TransverseMercator::utm(36, true).forward(Coord { x: 33.0, y: 0.0 });
        assert!((north.x - UTM_FALSE_EASTING).abs() < 1e-6);
        assert!(north.y.abs() < 1e-6);

        let lonlat = Coord { x: -74.5, y: -33.4 };
        let south = TransverseMercator::utm(18, false);
        let xy = south.forward(lonlat);
        assert!(xy.y > 6_000_000.0 && xy.y < UTM_FALSE_NORTHING_SOUTH);
        let back = south.inverse(xy);
        assert!((back.x - lonlat.x).abs() < 1e-7);
        assert!((back.y - lonlat.y).abs() < 1e-7);
    }

    #[test]
    fn test_reproject_between_utm_and_web_mercator() {
        let utm = Crs::Utm { zone: 36, north: true };
        // Kyiv
        let mut line: LineString<f64> =
            line_string![(x: 30.5234, y: 50.4501), (x: 30.6, y: 50.5)];
        let original = line.clone();

        reproject(&mut line, Crs::Wgs84, utm);
        assert!(line.0[0].x > 300_000.0 && line.0[0].x < 500_000.0);
        assert!(line.0[0].y > 5_500_000.0 && line.0[0].y < 5_600_000.0);

        reproject(&mut line, utm, Crs::WebMercator);
        let mut expected = original.clone();
        reproject(&mut expected, Crs::Wgs84, Crs::WebMercator);
        for (a, b) in line.coords().zip(expected.coords()) {
            assert!((a.x - b.x).abs() < 0.01);
            assert!((a.y - b.y).abs() < 0.01);
        }

        reproject(&mut line, Crs::WebMercator, utm);
        reproject(&mut line, utm, Crs::Wgs84);
        for (a, b) in line.coords().zip(original.coords()) {
            assert!((a.x - b.x).abs() < 1e-7);
            assert!((a.y - b.y).abs() < 1e-7);
        }
    }
}
