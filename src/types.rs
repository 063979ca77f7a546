//! Core type definitions for the atlas index

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AtlasError;

/// Opaque identifier naming one ingested vector.
///
/// Generated once at ingestion (random 128-bit), never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorId(Uuid);

impl VectorId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for VectorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for VectorId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for VectorId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Similarity metric used by the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Inner product of L2-normalized vectors, higher is more similar
    #[default]
    Cosine,
    /// Squared L2 distance, lower is more similar
    Euclidean,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
            Metric::Euclidean => "euclidean",
        }
    }

    /// Whether larger raw scores rank first.
    #[inline]
    pub fn higher_is_better(&self) -> bool {
        matches!(self, Metric::Cosine)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = AtlasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(Metric::Cosine),
            "euclidean" | "l2" => Ok(Metric::Euclidean),
            other => Err(AtlasError::InvalidConfig(format!("unknown metric: {other}"))),
        }
    }
}

/// A 3-D visualization coordinate
pub type Coords = [f32; 3];

/// Free-form per-identifier metadata
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// One stored vector and its auxiliary state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: VectorId,
    pub embedding: Vec<f32>,
    pub coords: Option<Coords>,
    pub metadata: Metadata,
}

impl VectorRecord {
    pub fn new(id: VectorId, embedding: Vec<f32>) -> Self {
        Self {
            id,
            embedding,
            coords: None,
            metadata: Metadata::new(),
        }
    }

    /// Get the dimensionality of the embedding
    pub fn dim(&self) -> usize {
        self.embedding.len()
    }
}

/// Represents a search result with ID and raw metric score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: VectorId,
    /// Cosine similarity or squared L2 distance, depending on the metric
    pub score: f32,
}

impl SearchResult {
    pub fn new(id: VectorId, score: f32) -> Self {
        Self { id, score }
    }
}

/// Search result enriched with the record's map state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: VectorId,
    pub score: f32,
    pub coords: Option<Coords>,
    pub filename: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_ids_are_distinct() {
        let a = VectorId::new();
        let b = VectorId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_vector_id_roundtrips_through_string() {
        let id = VectorId::new();
        let parsed: VectorId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_metric_parsing() {
        assert_eq!("cosine".parse::<Metric>().unwrap(), Metric::Cosine);
        assert_eq!(" Euclidean ".parse::<Metric>().unwrap(), Metric::Euclidean);
        assert!("manhattan".parse::<Metric>().is_err());
        assert_eq!(Metric::Euclidean.to_string(), "euclidean");
    }

    #[test]
    fn test_metric_serde_lowercase() {
        let json = serde_json::to_string(&Metric::Cosine).unwrap();
        assert_eq!(json, "\"cosine\"");
    }

    #[test]
    fn test_new_record_is_empty() {
        let record = VectorRecord::new(VectorId::new(), vec![0.0; 4]);
        assert_eq!(record.dim(), 4);
        assert!(record.coords.is_none());
        assert!(record.metadata.is_empty());
    }
}
