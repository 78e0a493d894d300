//! Flat-file exports
//!
//! Raw HTML snapshots, GeoJSON point layers and plain JSON dumps of
//! harvested records.

use crate::config::StorageConfig;
use crate::record::Record;
use crate::storage::traits::StorageResult;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Writes records and page snapshots to disk
#[derive(Debug, Clone, Default)]
pub struct FileExporter {
    raw_html_dir: Option<PathBuf>,
    geojson_dir: Option<PathBuf>,
}

impl FileExporter {
    pub fn new(raw_html_dir: Option<PathBuf>, geojson_dir: Option<PathBuf>) -> Self {
        Self {
            raw_html_dir,
            geojson_dir,
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.raw_html_dir.clone(), config.geojson_dir.clone())
    }

    pub fn snapshots_enabled(&self) -> bool {
        self.raw_html_dir.is_some()
    }

    pub fn geojson_enabled(&self) -> bool {
        self.geojson_dir.is_some()
    }

    /// Saves a page as `<raw-html-dir>/<identifier>.html`
    ///
    /// Returns `Ok(None)` when snapshots are not configured.
    pub fn save_html(&self, identifier: &str, html: &str) -> StorageResult<Option<PathBuf>> {
        let Some(dir) = &self.raw_html_dir else {
            return Ok(None);
        };
        std::fs::create_dir_all(dir)?;
        let target = dir.join(format!("{identifier}.html"));
        std::fs::write(&target, html)?;
        Ok(Some(target))
    }

    /// Saves point records as `<geojson-dir>/<name>.geojson`
    ///
    /// Records without numeric `longitude` and `latitude` fields are left
    /// out. Returns `Ok(None)` when GeoJSON export is not configured.
    pub fn save_geojson(&self, name: &str, records: &[Record]) -> StorageResult<Option<PathBuf>> {
        let Some(dir) = &self.geojson_dir else {
            return Ok(None);
        };
        std::fs::create_dir_all(dir)?;
        let target = dir.join(format!("{name}.geojson"));
        let collection = to_feature_collection(records);
        std::fs::write(&target, serde_json::to_string_pretty(&collection)?)?;
        Ok(Some(target))
    }

    /// Writes records as a pretty-printed JSON array, creating parent
    /// directories as needed
    pub fn export_records(&self, path: &Path, records: &[Record]) -> StorageResult<PathBuf> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(records)?)?;
        Ok(path.to_path_buf())
    }
}

/// Stable snapshot name for a URL
pub fn snapshot_identifier(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

/// Builds a GeoJSON FeatureCollection of points
pub fn to_feature_collection(records: &[Record]) -> Value {
    let features: Vec<Value> = records
        .iter()
        .filter_map(|record| {
            let lng = record.get_f64("longitude")?;
            let lat = record.get_f64("latitude")?;
            let properties: Map<String, Value> = record
                .fields()
                .filter(|(field, _)| *field != "longitude" && *field != "latitude")
                .map(|(field, value)| (field.to_string(), value.clone()))
                .collect();

            Some(json!({
                "type": "Feature",
                "geometry": { "type": "Point", "coordinates": [lng, lat] },
                "properties": properties,
            }))
        })
        .collect();

    json!({ "type": "FeatureCollection", "features": features })
}
