//! Composed read model and document output
//!
//! The presentation layer consumes three plain documents: coordinates,
//! graph and per-identifier metadata. They are built by
//! [`MapState::export`](crate::MapState::export) and can be written to disk
//! as pretty JSON.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;
use crate::graph::GraphDocument;
use crate::projection::CoordinateDocument;
use crate::types::{Coords, Metadata, VectorId, VectorRecord};

/// Metadata keys lifted out of the free-form map
pub const THUMB_KEY: &str = "thumb";
pub const FILENAME_KEY: &str = "filename";
pub const LABELS_KEY: &str = "labels";

/// One identifier's entry in the metadata document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub id: VectorId,
    pub thumb: Option<String>,
    pub filename: Option<String>,
    pub coords: Option<Coords>,
    pub labels: Vec<String>,
    /// Every other metadata field, untouched
    pub fields: Metadata,
}

impl MetadataEntry {
    pub fn from_record(record: &VectorRecord) -> Self {
        let mut fields = record.metadata.clone();
        let thumb = take_string(&mut fields, THUMB_KEY);
        let filename = take_string(&mut fields, FILENAME_KEY);
        let labels = match fields.remove(LABELS_KEY) {
            Some(serde_json::Value::Array(values)) => values
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_owned))
                .collect(),
            Some(serde_json::Value::String(label)) => vec![label],
            Some(other) => {
                // Not a label list; keep it visible as a plain field
                fields.insert(LABELS_KEY.to_owned(), other);
                Vec::new()
            }
            None => Vec::new(),
        };

        Self {
            id: record.id,
            thumb,
            filename,
            coords: record.coords,
            labels,
            fields,
        }
    }
}

fn take_string(fields: &mut Metadata, key: &str) -> Option<String> {
    match fields.remove(key) {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => {
            fields.insert(key.to_owned(), other);
            None
        }
        None => None,
    }
}

/// Everything the presentation layer needs in one value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapExport {
    /// `None` until the first successful projection
    pub coords: Option<CoordinateDocument>,
    /// Most recently built graph
    pub graph: Option<GraphDocument>,
    pub meta: Vec<MetadataEntry>,
    pub fitted: bool,
}

/// Write any document as pretty JSON, creating parent directories.
pub fn write_json<T: Serialize>(path: impl AsRef<Path>, document: &T) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, document)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn record_with(metadata: serde_json::Value) -> VectorRecord {
        let mut record = VectorRecord::new(VectorId::new(), vec![1.0]);
        record.metadata = metadata.as_object().cloned().unwrap_or_default();
        record
    }

    #[test]
    fn test_entry_lifts_known_keys() {
        let record = record_with(json!({
            "thumb": "/images/a.jpg",
            "filename": "a.jpg",
            "labels": ["Cozy desks", 3, "Coffee"],
            "camera": "x100",
        }));
        let entry = MetadataEntry::from_record(&record);

        assert_eq!(entry.thumb.as_deref(), Some("/images/a.jpg"));
        assert_eq!(entry.filename.as_deref(), Some("a.jpg"));
        assert_eq!(entry.labels, vec!["Cozy desks", "Coffee"]);
        assert_eq!(entry.fields.len(), 1);
        assert_eq!(entry.fields["camera"], json!("x100"));
        assert!(entry.coords.is_none());
    }

    #[test]
    fn test_entry_keeps_odd_values_as_fields() {
        let record = record_with(json!({ "filename": 12, "labels": {"a": 1} }));
        let entry = MetadataEntry::from_record(&record);
        assert!(entry.filename.is_none());
        assert!(entry.labels.is_empty());
        assert_eq!(entry.fields["filename"], json!(12));
        assert_eq!(entry.fields["labels"], json!({"a": 1}));
    }

    #[test]
    fn test_write_json_creates_parents() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data").join("graph.json");
        let doc = GraphDocument {
            k: 8,
            num_nodes: 0,
            num_edges: 0,
            edges: Vec::new(),
        };

        write_json(&path, &doc).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let back: GraphDocument = serde_json::from_str(&text).unwrap();
        assert_eq!(back, doc);
    }
}
