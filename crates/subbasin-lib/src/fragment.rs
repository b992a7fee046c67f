//! Distance-ordered fragmentation of sub-basins sharing a main river
//!
//! Sub-basins are grouped by main river in input order. Within a group of two or more, the
//! sub-basin whose centroid is closest to the river's source gets fragment 1, the next one 2,
//! and so on. Single-member groups get no fragment index.

use crate::DataError;
use crate::diagnostics::{Diagnostics, Stage};
use crate::geometry::distance;
use crate::layers::{RiverLayer, Subbasin};
use std::collections::HashMap;
use std::fmt;

/// Grouping key: the main river, plus a serial for each unnamed-river sub-basin
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey {
    pub river: String,
    /// `Some(n)` for the n-th sub-basin (1-based) assigned to the unnamed label
    pub unnamed_serial: Option<usize>,
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unnamed_serial {
            Some(n) => write!(f, "{}_{}", self.river, n),
            None => f.write_str(&self.river),
        }
    }
}

/// Group sub-basin positions by main river, in order of first appearance.
///
/// Sub-basins without a main river are left out; each sub-basin whose river is
/// `unnamed_label` forms its own group.
pub fn group_by_main_river(
    subbasins: &[Subbasin],
    unnamed_label: &str,
) -> Vec<(GroupKey, Vec<usize>)> {
    let mut groups: Vec<(GroupKey, Vec<usize>)> = Vec::new();
    let mut positions: HashMap<GroupKey, usize> = HashMap::new();
    let mut unnamed = 0;

    for (index, subbasin) in subbasins.iter().enumerate() {
        let river = match subbasin.main_river.as_deref() {
            None | Some("") | Some("None") => continue,
            Some(river) => river,
        };

        let key = if river == unnamed_label {
            unnamed += 1;
            GroupKey {
                river: river.to_string(),
                unnamed_serial: Some(unnamed),
            }
        } else {
            GroupKey {
                river: river.to_string(),
                unnamed_serial: None,
            }
        };

        match positions.get(&key) {
            Some(&position) => groups[position].1.push(index),
            None => {
                positions.insert(key.clone(), groups.len());
                groups.push((key, vec![index]));
            }
        }
    }

    groups
}

/// Assign fragment indices to every group of sub-basins sharing a main river.
///
/// A group whose river has no line in `rivers` is skipped with a diagnostic and its fragment
/// indices are cleared.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn fragment_subbasins(
    subbasins: &mut [Subbasin],
    rivers: &RiverLayer,
    unnamed_label: &str,
) -> Diagnostics {
    let mut diagnostics = Diagnostics::new();
    let groups = group_by_main_river(subbasins, unnamed_label);
    let mut fragmented = 0;

    for (key, members) in &groups {
        if members.len() < 2 {
            clear(subbasins, members);
            continue;
        }

        let Some(river) = rivers.find(&key.river) else {
            clear(subbasins, members);
            diagnostics.record(
                Stage::Fragment,
                format!("group {key}"),
                DataError::LookupMiss {
                    name: key.river.clone(),
                },
            );
            continue;
        };
        let Some(source) = river.source() else {
            clear(subbasins, members);
            diagnostics.record(
                Stage::Fragment,
                format!("group {key}"),
                DataError::GeometryInvalid(format!("river {:?} has no vertices", key.river)),
            );
            continue;
        };

        let mut ordered: Vec<(usize, f64)> = members
            .iter()
            .map(|&index| {
                let subbasin = &subbasins[index];
                let d = subbasin
                    .reference_point()
                    .map_or(f64::INFINITY, |centroid| distance(centroid, source));
                (index, d)
            })
            .collect();
        // Stable: equal distances keep input order
        ordered.sort_by(|a, b| a.1.total_cmp(&b.1));

        for (fragment, (index, d)) in (1u32..).zip(ordered) {
            tracing::debug!(
                "Subbasin {} of {}: fragment {} ({:.1} from source)",
                subbasins[index].id,
                key,
                fragment,
                d
            );
            subbasins[index].fragment = Some(fragment);
        }
        fragmented += 1;
    }

    tracing::info!(
        "Fragmented {} of {} main-river groups",
        fragmented,
        groups.len()
    );
    diagnostics
}

fn clear(subbasins: &mut [Subbasin], members: &[usize]) {
    for &index in members {
        subbasins[index].fragment = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::Crs;
    use crate::layers::{River, SubbasinId};
    use geo::{MultiLineString, MultiPolygon, line_string, polygon};
    use geojson::JsonObject;

    /// Unit square with its lower-left corner at (x, y)
    fn subbasin(id: i64, x: f64, y: f64, river: Option<&str>) -> Subbasin {
        let square = MultiPolygon::new(vec![polygon![
            (x: x, y: y),
            (x: x + 1.0, y: y),
            (x: x + 1.0, y: y + 1.0),
            (x: x, y: y + 1.0),
            (x: x, y: y),
        ]]);
        let mut subbasin = Subbasin::new(SubbasinId(id), square, JsonObject::new());
        subbasin.main_river = river.map(str::to_string);
        subbasin
    }

    fn rivers() -> RiverLayer {
        RiverLayer::new(
            Crs::WebMercator,
            vec![
                River::new(
                    "Рось",
                    MultiLineString::new(vec![line_string![(x: 0.0, y: 0.0), (x: 100.0, y: 0.0)]]),
                ),
                River::new(
                    "Без назви",
                    MultiLineString::new(vec![line_string![(x: 0.0, y: 50.0), (x: 1.0, y: 50.0)]]),
                ),
            ],
        )
    }

    #[test]
    fn test_fragments_follow_distance() {
        let mut subbasins = vec![
            subbasin(1, 30.0, 0.0, Some("Рось")),
            subbasin(2, 10.0, 0.0, Some("Рось")),
            subbasin(3, 50.0, 0.0, Some("Рось")),
            subbasin(4, 20.0, 0.0, Some("Рось")),
        ];
        let diagnostics = fragment_subbasins(&mut subbasins, &rivers(), "Без назви");

        assert!(diagnostics.is_empty());
        let fragments: Vec<Option<u32>> = subbasins.iter().map(|s| s.fragment).collect();
        assert_eq!(fragments, vec![Some(3), Some(1), Some(4), Some(2)]);
    }

    #[test]
    fn test_singleton_and_missing_rivers() {
        let mut subbasins = vec![
            subbasin(1, 0.0, 0.0, Some("Рось")),
            subbasin(2, 5.0, 0.0, None),
            subbasin(3, 5.0, 0.0, Some("None")),
        ];
        subbasins[0].fragment = Some(9);
        let diagnostics = fragment_subbasins(&mut subbasins, &rivers(), "Без назви");

        assert!(diagnostics.is_empty());
        assert!(subbasins.iter().all(|s| s.fragment.is_none()));
    }

    #[test]
    fn test_unnamed_rivers_are_singletons() {
        let subbasins = vec![
            subbasin(1, 0.0, 0.0, Some("Без назви")),
            subbasin(2, 1.0, 0.0, Some("Рось")),
            subbasin(3, 2.0, 0.0, Some("Без назви")),
            subbasin(4, 3.0, 0.0, Some("Рось")),
        ];
        let groups = group_by_main_river(&subbasins, "Без назви");
        let keys: Vec<String> = groups.iter().map(|(key, _)| key.to_string()).collect();
        assert_eq!(keys, vec!["Без назви_1", "Рось", "Без назви_2"]);
        assert_eq!(groups[1].1, vec![1, 3]);

        let mut subbasins = subbasins;
        fragment_subbasins(&mut subbasins, &rivers(), "Без назви");
        assert_eq!(subbasins[0].fragment, None);
        assert_eq!(subbasins[2].fragment, None);
        assert_eq!(subbasins[1].fragment, Some(1));
        assert_eq!(subbasins[3].fragment, Some(2));
    }

    #[test]
    fn test_unknown_river_is_skipped() {
        let mut subbasins = vec![
            subbasin(1, 0.0, 0.0, Some("Інгул")),
            subbasin(2, 5.0, 0.0, Some("Інгул")),
        ];
        subbasins[1].fragment = Some(2);
        let diagnostics = fragment_subbasins(&mut subbasins, &rivers(), "Без назви");

        assert_eq!(diagnostics.count_for(Stage::Fragment), 1);
        assert!(subbasins.iter().all(|s| s.fragment.is_none()));
    }

    #[test]
    fn test_empty_working_copy_uses_original() {
        let mut subbasins = vec![
            subbasin(1, 40.0, 0.0, Some("Рось")),
            subbasin(2, 20.0, 0.0, Some("Рось")),
        ];
        subbasins[1].working = MultiPolygon::new(vec![]);
        fragment_subbasins(&mut subbasins, &rivers(), "Без назви");

        assert_eq!(subbasins[1].fragment, Some(1));
        assert_eq!(subbasins[0].fragment, Some(2));
    }

    #[test]
    fn test_equal_distances_keep_input_order() {
        // Same footprint, same distance to the source
        let mut subbasins = vec![
            subbasin(1, 10.0, 2.0, Some("Рось")),
            subbasin(2, 10.0, 2.0, Some("Рось")),
        ];
        fragment_subbasins(&mut subbasins, &rivers(), "Без назви");
        assert_eq!(subbasins[0].fragment, Some(1));
        assert_eq!(subbasins[1].fragment, Some(2));
    }
}
