//! Geometric helpers: proxy shapes, intersection scoring and working-copy repair

use crate::config::ScoringMode;
use crate::{DataError, Result};
use geo::algorithm::line_intersection::{LineIntersection, line_intersection};
use geo::{
    BooleanOps, BoundingRect, Buffer, Coord, CoordsIter, HasDimensions, Intersects, Line,
    LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Rect, Simplify, Validation,
};

/// Result of intersecting a proxy with a river line, classified for scoring
#[derive(Debug, Clone, PartialEq)]
pub enum Intersection {
    Empty,
    Point(Point<f64>),
    Line(LineString<f64>),
    MultiPoint(MultiPoint<f64>),
    MultiLine(MultiLineString<f64>),
    Collection(Vec<Intersection>),
}

impl Intersection {
    fn from_lines(mut lines: Vec<LineString<f64>>) -> Self {
        match lines.len() {
            0 => Intersection::Empty,
            1 => Intersection::Line(lines.remove(0)),
            _ => Intersection::MultiLine(MultiLineString::new(lines)),
        }
    }

    fn from_points(mut points: Vec<Point<f64>>) -> Self {
        match points.len() {
            0 => Intersection::Empty,
            1 => Intersection::Point(points.remove(0)),
            _ => Intersection::MultiPoint(MultiPoint::new(points)),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Intersection::Empty => true,
            Intersection::Collection(parts) => parts.iter().all(Intersection::is_empty),
            _ => false,
        }
    }

    /// Number of intersection parts.
    ///
    /// A point or a single line counts once, a multi-line once per part and a collection is
    /// the sum of its members. Bare multi-points do not count.
    pub fn count(&self) -> usize {
        match self {
            Intersection::Empty | Intersection::MultiPoint(_) => 0,
            Intersection::Point(_) | Intersection::Line(_) => 1,
            Intersection::MultiLine(lines) => lines.0.len(),
            Intersection::Collection(parts) => parts.iter().map(Intersection::count).sum(),
        }
    }

    /// Accumulated planar length of the line parts
    pub fn length(&self) -> f64 {
        match self {
            Intersection::Empty | Intersection::Point(_) | Intersection::MultiPoint(_) => 0.0,
            Intersection::Line(line) => line_length(line),
            Intersection::MultiLine(lines) => lines.iter().map(line_length).sum(),
            Intersection::Collection(parts) => parts.iter().map(Intersection::length).sum(),
        }
    }

    pub fn score(&self, mode: ScoringMode) -> f64 {
        match mode {
            ScoringMode::Count => self.count() as f64,
            ScoringMode::Length => self.length(),
        }
    }
}

/// A proxy reach line as used for scoring: the raw lines or their buffered area
#[derive(Debug, Clone)]
pub enum ProxyShape {
    Lines(MultiLineString<f64>),
    Area(MultiPolygon<f64>),
}

impl ProxyShape {
    /// Buffer the lines by `distance`; a non-positive distance keeps the lines
    pub fn new(lines: &MultiLineString<f64>, distance: f64) -> Result<Self> {
        ensure_usable(lines, "proxy line")?;
        if distance <= 0.0 {
            return Ok(ProxyShape::Lines(lines.clone()));
        }
        let area = lines.buffer(distance);
        if area.is_empty() {
            return Err(DataError::Topology(format!(
                "buffering proxy line by {distance} produced an empty area"
            )));
        }
        Ok(ProxyShape::Area(area))
    }

    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        match self {
            ProxyShape::Lines(lines) => lines.bounding_rect(),
            ProxyShape::Area(area) => area.bounding_rect(),
        }
    }

    /// Precise intersection predicate
    pub fn intersects(&self, river: &MultiLineString<f64>) -> bool {
        match self {
            ProxyShape::Lines(lines) => lines.intersects(river),
            ProxyShape::Area(area) => area.intersects(river),
        }
    }

    /// Compute and classify the intersection with a river line
    pub fn intersection(&self, river: &MultiLineString<f64>) -> Result<Intersection> {
        ensure_usable(river, "river line")?;
        match self {
            ProxyShape::Area(area) => {
                let clipped = area.clip(river, false);
                let parts: Vec<LineString<f64>> = clipped
                    .0
                    .into_iter()
                    .filter(|line| line.0.len() >= 2)
                    .collect();
                Ok(Intersection::from_lines(parts))
            }
            ProxyShape::Lines(lines) => Ok(line_line_intersection(lines, river)),
        }
    }
}

/// Pairwise segment intersection of two multi-lines.
///
/// Collinear overlaps are joined when consecutive; crossing points that coincide with each
/// other or with an overlap end are dropped.
fn line_line_intersection(a: &MultiLineString<f64>, b: &MultiLineString<f64>) -> Intersection {
    let mut points: Vec<Coord<f64>> = Vec::new();
    let mut overlaps: Vec<LineString<f64>> = Vec::new();

    for seg_a in a.iter().flat_map(|l| l.lines()) {
        for seg_b in b.iter().flat_map(|l| l.lines()) {
            match line_intersection(seg_a, seg_b) {
                Some(LineIntersection::SinglePoint { intersection, .. }) => {
                    if !points.contains(&intersection) {
                        points.push(intersection);
                    }
                }
                Some(LineIntersection::Collinear { intersection }) => {
                    push_overlap(&mut overlaps, intersection);
                }
                None => {}
            }
        }
    }

    points.retain(|p| {
        !overlaps
            .iter()
            .any(|line| line.0.first() == Some(p) || line.0.last() == Some(p))
    });

    let points = Intersection::from_points(points.into_iter().map(Point::from).collect());
    let lines = Intersection::from_lines(overlaps);
    match (points.is_empty(), lines.is_empty()) {
        (true, _) => lines,
        (false, true) => points,
        (false, false) => Intersection::Collection(vec![points, lines]),
    }
}

fn push_overlap(overlaps: &mut Vec<LineString<f64>>, segment: Line<f64>) {
    if segment.start == segment.end {
        return;
    }
    if let Some(last) = overlaps.last_mut() {
        let (first, end) = (last.0[0], last.0[last.0.len() - 1]);
        if end == segment.start {
            last.0.push(segment.end);
            return;
        }
        if end == segment.end {
            last.0.push(segment.start);
            return;
        }
        if first == segment.end {
            last.0.insert(0, segment.start);
            return;
        }
        if first == segment.start {
            last.0.insert(0, segment.end);
            return;
        }
    }
    overlaps.push(LineString::from(segment));
}

fn line_length(line: &LineString<f64>) -> f64 {
    line.lines().map(|l| l.dx().hypot(l.dy())).sum()
}

/// Reject empty geometries and geometries with non-finite coordinates
fn ensure_usable(lines: &MultiLineString<f64>, what: &str) -> Result<()> {
    if lines.is_empty() {
        return Err(DataError::Topology(format!("{what} is empty")));
    }
    if !lines.coords_iter().all(|c| c.x.is_finite() && c.y.is_finite()) {
        return Err(DataError::Topology(format!(
            "{what} has non-finite coordinates"
        )));
    }
    Ok(())
}

/// Make a polygon valid: simplify by `tolerance`, else shrink by `tolerance`.
///
/// Valid input is returned unchanged.
pub fn repair(polygon: &MultiPolygon<f64>, tolerance: f64) -> Result<MultiPolygon<f64>> {
    if polygon.is_valid() {
        return Ok(polygon.clone());
    }

    let simplified = polygon.simplify(tolerance);
    if simplified.is_valid() && !simplified.is_empty() {
        tracing::debug!("Repaired polygon by simplification");
        return Ok(simplified);
    }

    let shrunk = polygon.buffer(-tolerance);
    if shrunk.is_valid() && !shrunk.is_empty() {
        tracing::debug!("Repaired polygon by negative buffer");
        return Ok(shrunk);
    }

    Err(DataError::GeometryInvalid(format!(
        "polygon stays invalid after simplify and buffer by {tolerance}"
    )))
}

/// Repair, buffer and simplify a working copy
pub fn optimize(
    polygon: &MultiPolygon<f64>,
    buffer: f64,
    simplify_tolerance: f64,
    repair_tolerance: f64,
) -> Result<MultiPolygon<f64>> {
    let repaired = repair(polygon, repair_tolerance)?;
    let buffered = if buffer != 0.0 {
        repaired.buffer(buffer)
    } else {
        repaired
    };
    if simplify_tolerance > 0.0 {
        Ok(buffered.simplify(simplify_tolerance))
    } else {
        Ok(buffered)
    }
}

/// Planar distance between two points
#[inline]
pub fn distance(a: Point<f64>, b: Point<f64>) -> f64 {
    (a.x() - b.x()).hypot(a.y() - b.y())
}
