//! Persisted main-river map
//!
//! The map is stored as a two-column CSV file with the header `Subbasin,MainRiver`. Loading is
//! all-or-nothing: any schema or row problem yields [`DataError::CacheFormat`] and no partial map.

use crate::layers::SubbasinId;
use crate::{DataError, Result};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;

/// Sub-basin id -> main river name
pub type MainRiverMap = BTreeMap<SubbasinId, String>;

const HEADER: [&str; 2] = ["Subbasin", "MainRiver"];

/// Write the map to a CSV file, replacing any existing file
pub fn save_main_river_cache(path: &Path, map: &MainRiverMap) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_main_river_cache(file, map)?;
    tracing::info!("Saved {} main rivers to {}", map.len(), path.display());
    Ok(())
}

/// Read the map from a CSV file
pub fn load_main_river_cache(path: &Path) -> Result<MainRiverMap> {
    let file = std::fs::File::open(path)?;
    let map = read_main_river_cache(file)?;
    tracing::info!("Loaded {} main rivers from {}", map.len(), path.display());
    Ok(map)
}

pub(crate) fn write_main_river_cache<W: Write>(writer: W, map: &MainRiverMap) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(HEADER)?;
    for (id, river) in map {
        csv.write_record([id.to_string().as_str(), river.as_str()])?;
    }
    csv.flush()?;
    Ok(())
}

pub(crate) fn read_main_river_cache<R: Read>(reader: R) -> Result<MainRiverMap> {
    let mut csv = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);

    let headers = csv.headers().map_err(cache_format)?;
    if headers.iter().collect::<Vec<_>>() != HEADER {
        return Err(DataError::CacheFormat {
            reason: format!(
                "expected header {}, found {}",
                HEADER.join(","),
                headers.iter().collect::<Vec<_>>().join(",")
            ),
        });
    }

    let mut map = MainRiverMap::new();
    for (row, record) in csv.records().enumerate() {
        let record = record.map_err(cache_format)?;
        let (Some(id), Some(river)) = (record.get(0), record.get(1)) else {
            return Err(DataError::CacheFormat {
                reason: format!("row {} has {} fields", row + 1, record.len()),
            });
        };
        let id: SubbasinId = id.parse().map_err(|_| DataError::CacheFormat {
            reason: format!("row {}: {id:?} is not an integer sub-basin id", row + 1),
        })?;
        if river.is_empty() {
            return Err(DataError::CacheFormat {
                reason: format!("row {}: empty river name for sub-basin {id}", row + 1),
            });
        }
        map.insert(id, river.to_string());
    }
    Ok(map)
}

fn cache_format(error: csv::Error) -> DataError {
    DataError::CacheFormat {
        reason: error.to_string(),
    }
}
