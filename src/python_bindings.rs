//! Python bindings using PyO3
//!
//! Thin wrapper over [`MapState`] for notebook and script use. Heavy work
//! (graph builds, projection installs) runs with the GIL released.

use pyo3::exceptions::{PyKeyError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use std::sync::Arc;

use crate::collaborators::PrecomputedProjection;
use crate::config::AtlasConfig;
use crate::error::AtlasError;
use crate::export::FILENAME_KEY;
use crate::state::MapState;
use crate::types::{Metadata, Metric, VectorId};

fn to_py_err(err: AtlasError) -> PyErr {
    match err {
        AtlasError::NotFound(_) => PyKeyError::new_err(err.to_string()),
        AtlasError::CollaboratorUnavailable { .. } | AtlasError::Io(_) => {
            PyRuntimeError::new_err(err.to_string())
        }
        _ => PyValueError::new_err(err.to_string()),
    }
}

fn parse_id(id: &str) -> PyResult<VectorId> {
    id.parse()
        .map_err(|e| PyValueError::new_err(format!("invalid identifier {id:?}: {e}")))
}

/// Embedding map with exact search, k-NN graph and 3-D coordinates
#[pyclass]
pub struct AtlasMap {
    map: Arc<MapState>,
}

#[pymethods]
impl AtlasMap {
    /// Create a new map
    ///
    /// Args:
    ///     dimension: Embedding dimension
    ///     metric: "cosine" or "euclidean"
    ///     default_k: Out-degree used by build_graph() when k is omitted
    ///     scale: Half-width of the coordinate cube
    #[new]
    #[pyo3(signature = (dimension, metric = "cosine", default_k = 8, scale = 10.0))]
    fn new(dimension: usize, metric: &str, default_k: usize, scale: f32) -> PyResult<Self> {
        let metric: Metric = metric.parse().map_err(to_py_err)?;
        let config = AtlasConfig {
            default_k,
            scale,
            ..AtlasConfig::new(dimension, metric)
        };
        let map = MapState::new(config).map_err(to_py_err)?;
        Ok(Self { map: Arc::new(map) })
    }

    /// Add one embedding, returning its identifier
    #[pyo3(signature = (embedding, filename = None))]
    fn ingest(&self, embedding: Vec<f32>, filename: Option<String>) -> PyResult<String> {
        let mut metadata = Metadata::new();
        if let Some(name) = filename {
            metadata.insert(FILENAME_KEY.to_owned(), name.into());
        }
        let id = self
            .map
            .ingest_with_metadata(embedding, metadata)
            .map_err(to_py_err)?;
        Ok(id.to_string())
    }

    /// Add embeddings in bulk (all or nothing)
    fn ingest_batch(&self, embeddings: Vec<Vec<f32>>) -> PyResult<Vec<String>> {
        let ids = self.map.ingest_batch(embeddings).map_err(to_py_err)?;
        Ok(ids.iter().map(VectorId::to_string).collect())
    }

    /// Search for similar vectors
    ///
    /// Returns:
    ///     List of (id, score) tuples, best match first
    fn search(&self, py: Python<'_>, query: Vec<f32>, k: usize) -> PyResult<Vec<(String, f32)>> {
        let map = Arc::clone(&self.map);
        let hits = py
            .allow_threads(move || map.search(&query, k))
            .map_err(to_py_err)?;
        Ok(hits.into_iter().map(|h| (h.id.to_string(), h.score)).collect())
    }

    /// Identifiers in canonical order (the row order project() expects)
    fn identifiers(&self) -> Vec<String> {
        self.map.identifiers().iter().map(VectorId::to_string).collect()
    }

    /// Install externally computed 3-D coordinates, one row per identifier
    #[pyo3(signature = (coords, kind = "external"))]
    fn project(&self, py: Python<'_>, coords: Vec<(f32, f32, f32)>, kind: &str) -> PyResult<usize> {
        let projector = PrecomputedProjection::new(
            kind,
            coords.into_iter().map(|(x, y, z)| [x, y, z]).collect(),
        );
        let map = Arc::clone(&self.map);
        let summary = py
            .allow_threads(move || map.project_all(&projector))
            .map_err(to_py_err)?;
        Ok(summary.projected)
    }

    /// Build the k-NN graph and return it as a JSON document
    #[pyo3(signature = (k = None))]
    fn build_graph(&self, py: Python<'_>, k: Option<usize>) -> PyResult<String> {
        let map = Arc::clone(&self.map);
        let k = k.unwrap_or(map.config().default_k);
        let document = py
            .allow_threads(move || map.build_graph(k))
            .map_err(to_py_err)?;
        serde_json::to_string(&document).map_err(|e| PyRuntimeError::new_err(e.to_string()))
    }

    /// Get one record's metadata as a JSON string
    fn metadata(&self, id: String) -> PyResult<String> {
        let record = self.map.get(&parse_id(&id)?).map_err(to_py_err)?;
        serde_json::to_string(&record.metadata).map_err(|e| PyRuntimeError::new_err(e.to_string()))
    }

    /// Coordinates, graph and metadata as one JSON document
    fn export_json(&self) -> PyResult<String> {
        serde_json::to_string(&self.map.export()).map_err(|e| PyRuntimeError::new_err(e.to_string()))
    }

    /// Count, dimension, metric and fitted flag as a JSON string
    fn stats(&self) -> PyResult<String> {
        serde_json::to_string(&self.map.stats()).map_err(|e| PyRuntimeError::new_err(e.to_string()))
    }

    fn __len__(&self) -> usize {
        self.map.len()
    }

    fn __repr__(&self) -> String {
        let stats = self.map.stats();
        format!(
            "AtlasMap(vectors={}, dimension={}, metric={}, fitted={})",
            stats.total_vectors, stats.dimension, stats.metric, stats.fitted
        )
    }
}

/// Python module initialization
#[pymodule]
fn atlas_index(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<AtlasMap>()?;
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}
