use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::parser::records::Record;

/// One row of the station coordinates CSV (`name,lat,long`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StationCoord {
    pub name: String,
    pub lat: f64,
    #[serde(alias = "lon", alias = "lng")]
    pub long: f64,
}

pub fn read_station_coords<R: Read>(reader: R) -> Result<Vec<StationCoord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    rdr.deserialize()
        .enumerate()
        .map(|(i, row)| row.with_context(|| format!("Bad station row {}", i + 1)))
        .collect()
}

pub fn load_station_coords(path: &Path) -> Result<Vec<StationCoord>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    read_station_coords(file)
}

#[derive(Debug, Serialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    kind: &'static str,
    pub features: Vec<Feature>,
}

#[derive(Debug, Serialize)]
pub struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
    pub properties: StationProperties,
    pub geometry: Point,
}

#[derive(Debug, Serialize)]
pub struct StationProperties {
    /// `station-<name>`, the key the map layers select on.
    #[serde(rename = "NAME")]
    pub key: String,
    pub station: String,
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "precipBuckets")]
    pub precip_buckets: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct Point {
    #[serde(rename = "type")]
    kind: &'static str,
    /// `[long, lat]`, rounded to 2 decimal places.
    pub coordinates: [f64; 2],
}

pub struct GeoExport {
    pub collection: FeatureCollection,
    /// Ids of records that no station row matched.
    pub unmatched: Vec<String>,
}

/// One Point feature per station row, in CSV order. A station matches a
/// record by trimmed id first, then by trimmed name; stations without a
/// record keep null precipitation.
pub fn station_features(records: &[Record], stations: &[StationCoord]) -> GeoExport {
    let mut by_key: HashMap<&str, &Record> = HashMap::new();
    for record in records {
        by_key.entry(record.id.trim()).or_insert(record);
    }
    for record in records {
        by_key.entry(record.name.trim()).or_insert(record);
    }

    let mut matched: HashSet<&str> = HashSet::new();
    let features = stations
        .iter()
        .map(|station| {
            let record = by_key.get(station.name.as_str()).copied();
            if let Some(r) = record {
                matched.insert(r.id.as_str());
            }
            Feature {
                kind: "Feature",
                properties: StationProperties {
                    key: format!("station-{}", station.name),
                    station: station.name.clone(),
                    id: record.map(|r| r.id.clone()),
                    name: record.map(|r| r.name.clone()),
                    precip_buckets: record.map(|r| r.precip_buckets.clone()),
                },
                geometry: Point {
                    kind: "Point",
                    coordinates: [round2(station.long), round2(station.lat)],
                },
            }
        })
        .collect();

    let unmatched = records
        .iter()
        .filter(|r| !matched.contains(r.id.as_str()))
        .map(|r| r.id.clone())
        .collect();

    GeoExport {
        collection: FeatureCollection {
            kind: "FeatureCollection",
            features,
        },
        unmatched,
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
