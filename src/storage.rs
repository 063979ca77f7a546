//! In-memory vector store
//!
//! Canonical mapping from identifiers to embeddings, coordinates and
//! metadata. Records are append-only and keep their insertion order, which
//! the similarity index relies on for position alignment.

use std::collections::HashMap;

use crate::error::{AtlasError, Result};
use crate::types::{Coords, Metadata, VectorId, VectorRecord};

#[derive(Debug, Clone, Default)]
pub struct VectorStore {
    dimension: Option<usize>,
    records: Vec<VectorRecord>,
    positions: HashMap<VectorId, usize>,
}

impl VectorStore {
    /// Store whose dimension is fixed by the first registered vector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with a declared dimension.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: Some(dimension),
            ..Self::default()
        }
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Check a vector against the store dimension without mutating.
    pub fn check_dimension(&self, embedding: &[f32]) -> Result<()> {
        match self.dimension {
            Some(expected) if expected != embedding.len() => Err(AtlasError::DimensionMismatch {
                expected,
                actual: embedding.len(),
            }),
            None if embedding.is_empty() => Err(AtlasError::DimensionMismatch {
                expected: 1,
                actual: 0,
            }),
            _ => Ok(()),
        }
    }

    /// Append a new record and return its freshly generated identifier
    pub fn register(&mut self, embedding: Vec<f32>) -> Result<VectorId> {
        self.check_dimension(&embedding)?;
        if self.dimension.is_none() {
            self.dimension = Some(embedding.len());
        }

        let mut id = VectorId::new();
        while self.positions.contains_key(&id) {
            id = VectorId::new();
        }

        self.positions.insert(id, self.records.len());
        self.records.push(VectorRecord::new(id, embedding));
        Ok(id)
    }

    pub fn get(&self, id: &VectorId) -> Result<&VectorRecord> {
        self.positions
            .get(id)
            .map(|&pos| &self.records[pos])
            .ok_or(AtlasError::NotFound(*id))
    }

    fn get_mut(&mut self, id: &VectorId) -> Result<&mut VectorRecord> {
        match self.positions.get(id) {
            Some(&pos) => Ok(&mut self.records[pos]),
            None => Err(AtlasError::NotFound(*id)),
        }
    }

    pub fn contains(&self, id: &VectorId) -> bool {
        self.positions.contains_key(id)
    }

    /// Insertion position of an identifier
    pub fn position(&self, id: &VectorId) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn set_coordinates(&mut self, id: &VectorId, coords: Coords) -> Result<()> {
        self.get_mut(id)?.coords = Some(coords);
        Ok(())
    }

    /// Merge `patch` into the record's metadata, overwriting existing keys.
    pub fn update_metadata(&mut self, id: &VectorId, patch: Metadata) -> Result<()> {
        let record = self.get_mut(id)?;
        for (key, value) in patch {
            record.metadata.insert(key, value);
        }
        Ok(())
    }

    /// Mutable access to a record's metadata map.
    pub fn metadata_mut(&mut self, id: &VectorId) -> Result<&mut Metadata> {
        Ok(&mut self.get_mut(id)?.metadata)
    }

    /// Identifiers in insertion order
    pub fn all_identifiers(&self) -> Vec<VectorId> {
        self.records.iter().map(|r| r.id).collect()
    }

    /// Get the number of vectors stored
    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over all records in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, VectorRecord> {
        self.records.iter()
    }
}

impl<'a> IntoIterator for &'a VectorStore {
    type Item = &'a VectorRecord;
    type IntoIter = std::slice::Iter<'a, VectorRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
